//! Quiet-period debouncing of raw change events.
//!
//! A burst of events of any size collapses into one settle callback, fired
//! once no event has arrived for the quiet period. The loop is an explicit
//! state machine over a single owned timer:
//!
//! ```text
//! Idle --event--> Armed --event--> Armed (timer reset)
//! Armed --quiet period elapses--> settle callback --> Idle
//! any --cancellation--> Stopped
//! ```

use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::event::RawChangeEvent;

/// State of one debounced stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Armed,
    Stopped,
}

/// Single-shot timer that can be re-armed in place.
///
/// There is exactly one underlying `Sleep`; arming while already armed moves
/// its deadline instead of starting a second timer, so at most one expiry can
/// be pending.
pub struct QuietTimer {
    period: Duration,
    sleep: Pin<Box<Sleep>>,
    armed: bool,
}

impl QuietTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            sleep: Box::pin(tokio::time::sleep(period)),
            armed: false,
        }
    }

    /// Arm the timer, or push its deadline out to `period` from now.
    pub fn arm(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.period);
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Future completing at the current deadline. Only meaningful while armed.
    fn expired(&mut self) -> Pin<&mut Sleep> {
        self.sleep.as_mut()
    }
}

/// Run the debounce loop until `cancel` fires.
///
/// Every event received (re)arms the quiet-period timer; `on_settle` runs once
/// when the timer expires with no intervening event. After cancellation a
/// pending timer is discarded and `on_settle` is never called again.
///
/// If the event channel closes, a pending timer still fires once and the loop
/// then returns; with no pending timer it returns immediately.
pub async fn debounce<F>(
    cancel: &CancellationToken,
    mut events: mpsc::Receiver<RawChangeEvent>,
    quiet_period: Duration,
    mut on_settle: F,
) -> DebounceState
where
    F: FnMut(),
{
    let mut timer = QuietTimer::new(quiet_period);
    let mut state = DebounceState::Idle;
    let mut open = true;
    let mut coalesced = 0usize;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if state == DebounceState::Armed {
                    debug!(coalesced, "debounce cancelled with a pending settle; discarding");
                }
                timer.disarm();
                state = DebounceState::Stopped;
                break;
            }

            _ = timer.expired(), if timer.is_armed() => {
                timer.disarm();
                state = DebounceState::Idle;
                debug!(coalesced, "quiet period elapsed; settling");
                coalesced = 0;
                on_settle();
                if !open {
                    break;
                }
            }

            event = events.recv(), if open => match event {
                Some(event) => {
                    trace!(%event, "change event");
                    timer.arm();
                    state = DebounceState::Armed;
                    coalesced += 1;
                }
                None => {
                    open = false;
                    if !timer.is_armed() {
                        break;
                    }
                }
            },
        }
    }

    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::event::ChangeKind;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn event(name: &str) -> RawChangeEvent {
        RawChangeEvent::new(name, ChangeKind::Modified)
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() + Send + 'static) {
        let called = Arc::new(AtomicUsize::new(0));
        let handle = Arc::clone(&called);
        (called, move || {
            handle.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_burst_settles_exactly_once() {
        let quiet = Duration::from_millis(500);
        let (called, callback) = counter();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(10);

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move { debounce(&loop_cancel, rx, quiet, callback).await });

        tx.send(event("f1")).await.unwrap();
        tx.send(event("f2")).await.unwrap();
        tx.send(event("f3")).await.unwrap();

        sleep(quiet / 2).await;
        assert_eq!(called.load(Ordering::SeqCst), 0, "settled before quiet period");

        sleep(quiet).await;
        assert_eq!(called.load(Ordering::SeqCst), 1);

        cancel.cancel();
        assert_eq!(task.await.unwrap(), DebounceState::Stopped);
    }

    #[tokio::test]
    async fn test_events_extend_quiet_period() {
        let quiet = Duration::from_millis(200);
        let (called, callback) = counter();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(10);

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move { debounce(&loop_cancel, rx, quiet, callback).await });

        // Keep the stream busy for longer than one quiet period.
        for i in 0..6 {
            tx.send(event(&format!("f{i}"))).await.unwrap();
            sleep(quiet / 4).await;
        }
        assert_eq!(called.load(Ordering::SeqCst), 0);

        sleep(quiet * 2).await;
        assert_eq!(called.load(Ordering::SeqCst), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_separate_bursts_settle_separately() {
        let quiet = Duration::from_millis(100);
        let (called, callback) = counter();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(10);

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move { debounce(&loop_cancel, rx, quiet, callback).await });

        tx.send(event("a")).await.unwrap();
        sleep(quiet * 3).await;
        tx.send(event("b")).await.unwrap();
        tx.send(event("c")).await.unwrap();
        sleep(quiet * 3).await;

        assert_eq!(called.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_discards_pending_settle() {
        let quiet = Duration::from_millis(200);
        let (called, callback) = counter();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(10);

        let loop_cancel = cancel.clone();
        let task = tokio::spawn(async move { debounce(&loop_cancel, rx, quiet, callback).await });

        tx.send(event("f1")).await.unwrap();
        sleep(quiet / 4).await;
        cancel.cancel();
        assert_eq!(task.await.unwrap(), DebounceState::Stopped);

        sleep(quiet * 2).await;
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_closed_channel_flushes_pending_then_returns() {
        let quiet = Duration::from_millis(50);
        let (called, callback) = counter();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(10);

        tx.send(event("f1")).await.unwrap();
        drop(tx);

        let state = tokio::time::timeout(
            Duration::from_secs(1),
            debounce(&cancel, rx, quiet, callback),
        )
        .await
        .expect("debounce should return once the channel is drained");

        assert_eq!(state, DebounceState::Idle);
        assert_eq!(called.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_closed_idle_channel_returns_without_settling() {
        let (called, callback) = counter();
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<RawChangeEvent>(1);
        drop(tx);

        let state = debounce(&cancel, rx, Duration::from_millis(50), callback).await;

        assert_eq!(state, DebounceState::Idle);
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rearm_moves_deadline() {
        let mut timer = QuietTimer::new(Duration::from_millis(100));
        assert!(!timer.is_armed());

        timer.arm();
        sleep(Duration::from_millis(60)).await;
        timer.arm();

        let start = Instant::now();
        timer.expired().await;
        assert!(start.elapsed() >= Duration::from_millis(80));
        assert!(timer.is_armed());
        timer.disarm();
        assert!(!timer.is_armed());
    }
}
