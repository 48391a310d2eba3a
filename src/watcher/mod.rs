pub mod debounce;
pub mod event;
pub mod watch_set;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use debounce::debounce;
use watch_set::{NotifyBackend, WatchBackend, WatchSetManager};

/// Capacity of the channel between the watch set and the debouncer.
const EVENT_BUFFER: usize = 256;

/// Watches a set of certificate (or config) paths and calls back once per
/// settled burst of changes.
///
/// Holds no watch state between calls: every [`CertWatcher::watch`] builds its
/// own watch set and debouncer, so concurrent or sequential calls sharing one
/// backend never disturb each other's registrations.
#[derive(Debug)]
pub struct CertWatcher<B: WatchBackend = NotifyBackend> {
    backend: Arc<B>,
    quiet_period: Duration,
    retry_interval: Duration,
}

impl<B: WatchBackend> Clone for CertWatcher<B> {
    fn clone(&self) -> Self {
        Self::with_backend(Arc::clone(&self.backend), self.quiet_period, self.retry_interval)
    }
}

impl CertWatcher<NotifyBackend> {
    pub fn new(quiet_period: Duration, retry_interval: Duration) -> Self {
        Self::with_backend(Arc::new(NotifyBackend), quiet_period, retry_interval)
    }
}

impl<B: WatchBackend> CertWatcher<B> {
    pub fn with_backend(backend: Arc<B>, quiet_period: Duration, retry_interval: Duration) -> Self {
        Self {
            backend,
            quiet_period,
            retry_interval,
        }
    }

    /// Watch `paths` until `cancel` fires, calling `on_changed` once per
    /// settled burst.
    ///
    /// Returns immediately for an empty path list. If no path can be watched
    /// at all, idles until cancelled.
    pub async fn watch<F>(&self, cancel: &CancellationToken, paths: &[PathBuf], on_changed: F)
    where
        F: FnMut(),
    {
        if paths.is_empty() {
            debug!("no paths to watch");
            return;
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let manager = WatchSetManager::new(Arc::clone(&self.backend), self.retry_interval);

        tokio::join!(
            manager.watch(cancel, paths, tx),
            debounce(cancel, rx, self.quiet_period, on_changed),
        );

        cancel.cancelled().await;
    }
}

/// Watch `paths` with the notify backend. See [`CertWatcher::watch`].
pub async fn watch_certs<F>(
    cancel: &CancellationToken,
    paths: &[PathBuf],
    quiet_period: Duration,
    retry_interval: Duration,
    on_changed: F,
) where
    F: FnMut(),
{
    CertWatcher::new(quiet_period, retry_interval)
        .watch(cancel, paths, on_changed)
        .await;
}
