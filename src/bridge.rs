//! Delivery of settled changes to the agent.

use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::hash::ChangeDetector;
use crate::watcher::CertWatcher;
use crate::watcher::watch_set::{NotifyBackend, WatchBackend};

/// "A watched set changed." The agent re-reads whatever state it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signal;

/// Watches a set of paths and forwards each settled change to the agent's
/// inbound channel.
pub struct Watcher<B: WatchBackend = NotifyBackend> {
    paths: Vec<PathBuf>,
    config_tx: mpsc::Sender<Signal>,
    watcher: CertWatcher<B>,
    detector: Option<ChangeDetector>,
}

impl Watcher<NotifyBackend> {
    pub fn new(
        paths: Vec<PathBuf>,
        config_tx: mpsc::Sender<Signal>,
        watcher: CertWatcher<NotifyBackend>,
    ) -> Self {
        Self::with_watcher(paths, config_tx, watcher)
    }
}

impl<B: WatchBackend> Watcher<B> {
    pub fn with_watcher(
        paths: Vec<PathBuf>,
        config_tx: mpsc::Sender<Signal>,
        watcher: CertWatcher<B>,
    ) -> Self {
        Self {
            paths,
            config_tx,
            watcher,
            detector: None,
        }
    }

    /// Drop settle events whose content digest matches the last delivered
    /// one.
    pub fn skip_unchanged(mut self, enabled: bool) -> Self {
        self.detector = enabled.then(|| ChangeDetector::new(self.paths.clone()));
        self
    }

    /// Send one signal straight away, then one per settled change, until
    /// `cancel` fires. Nothing is sent after cancellation.
    pub async fn run(mut self, cancel: CancellationToken) {
        // Kick-start the agent with the current state in case no change
        // notification ever arrives.
        self.content_changed().await;
        if !self.deliver(&cancel).await {
            cancel.cancelled().await;
            return;
        }

        let (settled_tx, mut settled_rx) = mpsc::channel::<()>(1);
        let watch_cancel = cancel.child_token();
        let watch = {
            let watcher = self.watcher.clone();
            let paths = self.paths.clone();
            let cancel = watch_cancel.clone();
            tokio::spawn(async move {
                watcher
                    .watch(&cancel, &paths, move || {
                        // A pending settle already covers this one.
                        let _ = settled_tx.try_send(());
                    })
                    .await;
            })
        };

        let mut watching = true;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                settled = settled_rx.recv(), if watching => match settled {
                    Some(()) => {
                        if !self.content_changed().await {
                            debug!("settled change left content unchanged; skipping");
                            continue;
                        }
                        if !self.deliver(&cancel).await {
                            // Agent is gone: stop watching, wait for shutdown.
                            watching = false;
                            watch_cancel.cancel();
                        }
                    }
                    None => watching = false,
                },
            }
        }

        watch_cancel.cancel();
        if let Err(err) = watch.await {
            warn!(error = %err, "watch task failed");
        }
    }

    /// Refresh the content digest off the runtime threads. Always true when
    /// skip-unchanged is off.
    async fn content_changed(&mut self) -> bool {
        let Some(mut detector) = self.detector.take() else {
            return true;
        };
        let refreshed = tokio::task::spawn_blocking(move || {
            let changed = detector.refresh();
            (detector, changed)
        })
        .await;

        match refreshed {
            Ok((detector, changed)) => {
                self.detector = Some(detector);
                changed
            }
            Err(err) => {
                warn!(error = %err, "digest refresh failed; treating as changed");
                self.detector = Some(ChangeDetector::new(self.paths.clone()));
                true
            }
        }
    }

    async fn deliver(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = self.config_tx.send(Signal) => match sent {
                Ok(()) => {
                    info!(paths = self.paths.len(), "change signal delivered");
                    true
                }
                Err(_) => {
                    warn!("agent channel closed; dropping change signal");
                    false
                }
            },
        }
    }
}
