//! Watch registration for a set of paths.
//!
//! Each path is an independent [`WatchTarget`] running its own loop: register,
//! pump events, and re-register whenever the handle may have gone stale
//! (delete, rename-over, or the path vanishing). All decisions about handle
//! validity live here so the debouncer only ever sees a plain event stream.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::event::{ChangeKind, RawChangeEvent};

/// Errors raised while registering a watch.
#[derive(Error, Debug)]
pub enum WatchError {
    /// The path does not exist (yet). Retried, never surfaced.
    #[error("path {0} does not exist")]
    Missing(PathBuf),

    #[error("failed to watch {path}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Low-level notification primitive.
///
/// `register` installs one watch for one path and forwards its events into
/// `sink`; the returned handle keeps the watch alive and releases it on drop.
pub trait WatchBackend: Send + Sync + 'static {
    type Handle: Send + 'static;

    fn register(
        &self,
        path: &Path,
        sink: mpsc::UnboundedSender<RawChangeEvent>,
    ) -> Result<Self::Handle, WatchError>;

    fn is_present(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// [`WatchBackend`] on top of the platform's recommended `notify` watcher,
/// one watcher instance per path.
///
/// On Linux every instance is a separate inotify instance with its own event
/// thread, and `fs.inotify.max_user_instances` defaults to 128 per user.
/// Registrations beyond that limit fail with a non-missing error and leave
/// the path unwatched, so keep watch sets to a handful of files.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotifyBackend;

impl WatchBackend for NotifyBackend {
    type Handle = RecommendedWatcher;

    fn register(
        &self,
        path: &Path,
        sink: mpsc::UnboundedSender<RawChangeEvent>,
    ) -> Result<RecommendedWatcher, WatchError> {
        let target = path.to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            match res {
                Ok(event) => {
                    if let Some(change) = RawChangeEvent::from_notify(&target, &event) {
                        // Receiver gone means the target is being torn down.
                        let _ = sink.send(change);
                    }
                }
                Err(err) => {
                    warn!(path = %target.display(), error = %err, "notify backend error");
                }
            }
        })
        .map_err(|source| classify(path, source))?;

        watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| classify(path, source))?;

        Ok(watcher)
    }
}

fn classify(path: &Path, source: notify::Error) -> WatchError {
    let missing = match &source.kind {
        notify::ErrorKind::PathNotFound => true,
        notify::ErrorKind::Io(err) => err.kind() == io::ErrorKind::NotFound,
        _ => false,
    };
    if missing {
        WatchError::Missing(path.to_path_buf())
    } else {
        WatchError::Register {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A watched path and the handle currently registered against it.
pub struct WatchTarget<B: WatchBackend> {
    path: PathBuf,
    handle: Option<B::Handle>,
}

impl<B: WatchBackend> WatchTarget<B> {
    pub fn new(path: PathBuf) -> Self {
        Self { path, handle: None }
    }

    /// Register a fresh handle. Any previous handle is released first, so the
    /// target never holds two live handles.
    pub fn arm(
        &mut self,
        backend: &B,
        sink: mpsc::UnboundedSender<RawChangeEvent>,
    ) -> Result<(), WatchError> {
        self.handle = None;
        self.handle = Some(backend.register(&self.path, sink)?);
        Ok(())
    }

    pub fn disarm(&mut self) {
        self.handle = None;
    }

    /// Whether the handle that delivered `event` can still be trusted.
    fn is_stale(&self, backend: &B, event: &RawChangeEvent) -> bool {
        event.kind.invalidates_watch() || !backend.is_present(&self.path)
    }

    async fn run(
        mut self,
        backend: Arc<B>,
        retry_interval: Duration,
        out: mpsc::Sender<RawChangeEvent>,
        cancel: CancellationToken,
    ) {
        let mut rearming = false;

        loop {
            let (sink, mut raw) = mpsc::unbounded_channel();
            match self.arm(&backend, sink) {
                Ok(()) => {}
                Err(WatchError::Missing(_)) => {
                    debug!(path = %self.path.display(), "path missing; retrying registration");
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(retry_interval) => continue,
                    }
                }
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "leaving path unwatched");
                    return;
                }
            }

            if rearming {
                debug!(path = %self.path.display(), "watch re-armed");
                let created = RawChangeEvent::new(self.path.clone(), ChangeKind::Created);
                if !forward(&out, created, &cancel).await {
                    return;
                }
            }

            loop {
                let event = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    event = raw.recv() => event,
                };
                // The sink lives inside our own handle, so a closed stream
                // means the backend gave up on it.
                let Some(event) = event else { break };

                let stale = self.is_stale(&backend, &event);
                if !forward(&out, event, &cancel).await {
                    return;
                }
                if stale {
                    break;
                }
            }

            debug!(path = %self.path.display(), "watch handle stale; releasing");
            self.disarm();
            rearming = true;
        }
    }
}

async fn forward(
    out: &mpsc::Sender<RawChangeEvent>,
    event: RawChangeEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = out.send(event) => sent.is_ok(),
    }
}

/// Owns the watch targets for one set of paths.
pub struct WatchSetManager<B: WatchBackend> {
    backend: Arc<B>,
    retry_interval: Duration,
}

impl<B: WatchBackend> WatchSetManager<B> {
    pub fn new(backend: Arc<B>, retry_interval: Duration) -> Self {
        Self {
            backend,
            retry_interval,
        }
    }

    /// Watch `paths`, forwarding every change into `events`, until `cancel`
    /// fires or every target has given up. Returns immediately for an empty
    /// path list. Handles are released when their target task ends.
    pub async fn watch(
        &self,
        cancel: &CancellationToken,
        paths: &[PathBuf],
        events: mpsc::Sender<RawChangeEvent>,
    ) {
        let mut seen = HashSet::new();
        let mut targets = JoinSet::new();

        for path in paths {
            if !seen.insert(path.as_path()) {
                continue;
            }
            let target = WatchTarget::<B>::new(path.clone());
            targets.spawn(target.run(
                Arc::clone(&self.backend),
                self.retry_interval,
                events.clone(),
                cancel.clone(),
            ));
        }
        drop(events);

        if targets.is_empty() {
            debug!("no paths to watch");
            return;
        }

        while let Some(res) = targets.join_next().await {
            if let Err(err) = res {
                warn!(error = %err, "watch target task failed");
            }
        }
    }
}
