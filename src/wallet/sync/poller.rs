//! Periodic, single-flight polling of one sync strategy.
//!
//! A `Poller` owns a timer task that fires every `interval` (the first tick is immediate) and a
//! three-state machine held in an atomic:
//!
//! ```text
//!  Paused --resume--> Idle --tick/trigger--> Fetching --done--> Idle
//!    ^                  |                        |
//!    +------pause-------+----------pause---------+
//! ```
//!
//! Only the `Idle -> Fetching` edge starts a fetch, and it is taken with a compare-and-swap, so a
//! tick that lands while a fetch is in flight is skipped rather than queued. `pause()` cancels the
//! timer and the in-flight fetch's `CancellationToken` and aborts the fetch task; strategies check
//! that token before every store mutation, so a fetch that completes after `pause()` cannot write.
//! `resume()` leaves the poller `Paused` until the aborted fetch has unwound, so a quick
//! pause/resume never runs two fetches at once.

use crate::wallet::WalletSyncError;
use crate::wallet::sync::events::{EventBus, SyncEvent};
use crate::wallet::sync::progress_tracker::{PollerStats, PollerStatsTracker};
use crate::wallet::sync::strategies::SyncStrategy;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PollerState {
    Idle = 0,
    Fetching = 1,
    Paused = 2,
}

impl PollerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PollerState::Idle,
            1 => PollerState::Fetching,
            _ => PollerState::Paused,
        }
    }
}

struct PollerControl {
    timer: Option<JoinHandle<()>>,
    /// Most recently spawned fetch.
    fetch: Option<JoinHandle<()>>,
    /// Cancelled on pause; a fresh token is issued on every resume.
    cancel: CancellationToken,
}

pub struct Poller {
    strategy: Arc<dyn SyncStrategy>,
    interval: Duration,
    state: AtomicU8,
    events: Arc<EventBus>,
    stats: Mutex<PollerStatsTracker>,
    control: Mutex<PollerControl>,
}

impl Poller {
    /// Create a paused poller. Nothing runs until `resume()`.
    pub fn new(strategy: Arc<dyn SyncStrategy>, interval: Duration, events: Arc<EventBus>) -> Self {
        let cancel = CancellationToken::new();
        cancel.cancel();

        Self {
            stats: Mutex::new(PollerStatsTracker::new(strategy.name())),
            strategy,
            interval,
            state: AtomicU8::new(PollerState::Paused as u8),
            events,
            control: Mutex::new(PollerControl {
                timer: None,
                fetch: None,
                cancel,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> PollerState {
        PollerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> PollerStats {
        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_stats()
    }

    fn transition(&self, from: PollerState, to: PollerState) -> Result<(), PollerState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(PollerState::from_u8)
    }

    /// Start the periodic timer. A no-op while already running.
    pub fn resume(self: &Arc<Self>) {
        let mut control = self.control.lock().unwrap_or_else(|e| e.into_inner());
        if control.timer.is_some() {
            debug!("Poller {} already running", self.name());
            return;
        }

        control.cancel = CancellationToken::new();
        let previous = control.fetch.take();

        let poller = Arc::clone(self);
        let token = control.cancel.clone();
        let interval = self.interval;
        control.timer = Some(tokio::spawn(async move {
            // The fetch aborted by the last pause must be gone before a new one may start
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            {
                let _control = poller.control.lock().unwrap_or_else(|e| e.into_inner());
                if token.is_cancelled() {
                    return;
                }
                let _ = poller.transition(PollerState::Paused, PollerState::Idle);
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        poller.trigger();
                    }
                }
            }
        }));

        info!(
            "Poller {} resumed (every {}s)",
            self.name(),
            self.interval.as_secs()
        );
    }

    /// Stop the timer and cancel any in-flight fetch.
    pub fn pause(&self) {
        let mut control = self.control.lock().unwrap_or_else(|e| e.into_inner());
        control.cancel.cancel();
        if let Some(timer) = control.timer.take() {
            timer.abort();
        }
        if let Some(fetch) = &control.fetch {
            fetch.abort();
        }
        self.state.store(PollerState::Paused as u8, Ordering::Release);
        drop(control);

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.log_progress(true);
        info!("Poller {} paused", self.name());
    }

    /// Start a fetch now if the poller is idle. Returns whether a fetch was started.
    pub fn trigger(self: &Arc<Self>) -> bool {
        let mut control = self.control.lock().unwrap_or_else(|e| e.into_inner());
        let token = control.cancel.clone();
        if token.is_cancelled() {
            return false;
        }

        match self.transition(PollerState::Idle, PollerState::Fetching) {
            Ok(()) => {}
            Err(PollerState::Fetching) => {
                debug!("Poller {} still fetching, skipping tick", self.name());
                self.stats
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_skipped();
                return false;
            }
            Err(_) => return false,
        }

        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record_started();

        let poller = Arc::clone(self);
        control.fetch = Some(tokio::spawn(async move {
            poller.run_cycle(token).await;
        }));
        true
    }

    async fn run_cycle(&self, token: CancellationToken) {
        let result = self.strategy.sync(&token).await;

        let failure = match result {
            Ok(events) => {
                self.stats
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_success();
                if !token.is_cancelled() {
                    for event in &events {
                        self.events.dispatch(event).await;
                    }
                }
                None
            }
            Err(WalletSyncError::Cancelled) => {
                debug!("Poller {} fetch cancelled", self.name());
                None
            }
            Err(e) => {
                if e.is_not_connected() {
                    debug!("Poller {} offline, cycle skipped", self.name());
                } else {
                    warn!("Poller {} cycle failed: {}", self.name(), e);
                }
                self.stats
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .record_failure(&e.to_string());
                Some(e.to_string())
            }
        };

        if let Some(error) = failure {
            if !token.is_cancelled() {
                self.events
                    .dispatch(&SyncEvent::PollerFailed {
                        poller: self.name(),
                        error,
                    })
                    .await;
            }
        }

        self.stats
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .log_progress(false);

        if !token.is_cancelled() {
            let _ = self.transition(PollerState::Fetching, PollerState::Idle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::sync::events::ChannelEventHandler;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Strategy that blocks every fetch until released.
    struct GatedStrategy {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        gate: Notify,
    }

    impl GatedStrategy {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                gate: Notify::new(),
            })
        }
    }

    /// Counts a fetch as in flight until dropped, including when its task is aborted.
    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl SyncStrategy for GatedStrategy {
        async fn sync(&self, cancel: &CancellationToken) -> Result<Vec<SyncEvent>, WalletSyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            self.gate.notified().await;
            if cancel.is_cancelled() {
                return Err(WalletSyncError::Cancelled);
            }
            Ok(vec![SyncEvent::PricesChanged { count: 1 }])
        }

        fn name(&self) -> &'static str {
            "gated"
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn resume_twice_starts_one_fetch() {
        let strategy = GatedStrategy::new();
        let bus = Arc::new(EventBus::new());
        let poller = Arc::new(Poller::new(
            strategy.clone(),
            Duration::from_secs(3600),
            bus,
        ));

        poller.resume();
        poller.resume();
        settle().await;

        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
        assert_eq!(poller.state(), PollerState::Fetching);

        // a manual trigger during the fetch is skipped
        assert!(!poller.trigger());
        assert_eq!(poller.stats().cycles_skipped, 1);

        strategy.gate.notify_one();
        settle().await;
        assert_eq!(poller.state(), PollerState::Idle);
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 1);
        poller.pause();
    }

    #[tokio::test]
    async fn trigger_is_ignored_while_paused() {
        let strategy = GatedStrategy::new();
        let poller = Arc::new(Poller::new(
            strategy.clone(),
            Duration::from_secs(3600),
            Arc::new(EventBus::new()),
        ));

        assert_eq!(poller.state(), PollerState::Paused);
        assert!(!poller.trigger());
        settle().await;
        assert_eq!(strategy.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn pause_suppresses_late_completion() {
        let strategy = GatedStrategy::new();
        let bus = Arc::new(EventBus::new());
        let (handler, mut receiver) = ChannelEventHandler::new();
        bus.register_handler(Arc::new(handler));

        let poller = Arc::new(Poller::new(
            strategy.clone(),
            Duration::from_secs(3600),
            bus,
        ));
        poller.resume();
        settle().await;
        assert_eq!(poller.state(), PollerState::Fetching);

        poller.pause();
        strategy.gate.notify_one();
        settle().await;

        assert_eq!(poller.state(), PollerState::Paused);
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn pause_then_resume_never_overlaps_fetches() {
        let strategy = GatedStrategy::new();
        let poller = Arc::new(Poller::new(
            strategy.clone(),
            Duration::from_secs(3600),
            Arc::new(EventBus::new()),
        ));

        poller.resume();
        settle().await;
        assert_eq!(poller.state(), PollerState::Fetching);

        poller.pause();
        poller.resume();
        settle().await;

        assert_eq!(strategy.calls.load(Ordering::SeqCst), 2);
        assert_eq!(strategy.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(strategy.in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(poller.state(), PollerState::Fetching);
        poller.pause();
    }

    #[tokio::test]
    async fn completed_fetch_dispatches_events() {
        let strategy = GatedStrategy::new();
        let bus = Arc::new(EventBus::new());
        let (handler, mut receiver) = ChannelEventHandler::new();
        bus.register_handler(Arc::new(handler));

        let poller = Arc::new(Poller::new(
            strategy.clone(),
            Duration::from_secs(3600),
            bus,
        ));
        poller.resume();
        settle().await;
        strategy.gate.notify_one();
        settle().await;

        assert_eq!(
            receiver.try_recv().unwrap(),
            SyncEvent::PricesChanged { count: 1 }
        );
        assert_eq!(poller.stats().cycles_succeeded, 1);
        poller.pause();
    }
}
