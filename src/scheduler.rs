//! Delivery scheduler.
//!
//! One tokio task fires ticks at a configurable interval. The interval can be
//! changed at runtime and the task stopped through watch channels; the
//! scheduler object is owned by the composition root and passed by
//! reference to whatever needs to control it.
//!
//! Ticks never overlap: a tick runs inside the scheduler loop, so a slow
//! tick delays the next one instead of running concurrently with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;

/// Shortest tick period ever accepted, whatever the configured minimum.
pub const MIN_INTERVAL_FLOOR: Duration = Duration::from_secs(60);

/// Longest accepted tick period (30 days).
pub const MAX_INTERVAL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Work performed on every tick.
#[async_trait]
pub trait TickHandler: Send + Sync + 'static {
    /// Run one tick. Errors are the handler's to log.
    async fn tick(&self);
}

/// Lifecycle state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// The timer task is alive.
    Running,
    /// Shutdown was requested or the timer task ended.
    Stopped,
}

/// Outcome of an interval change request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntervalChange {
    /// The new period is in effect; the next tick is one period from now.
    Applied(Duration),
    /// The request was refused.
    Rejected(String),
}

/// Periodic tick driver.
pub struct DeliveryScheduler {
    interval_tx: watch::Sender<Duration>,
    shutdown_tx: watch::Sender<bool>,
    trigger: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stopping: AtomicBool,
    min_interval: Duration,
}

impl DeliveryScheduler {
    /// Spawn the timer task. The first tick fires one interval from now.
    pub fn start(handler: Arc<dyn TickHandler>, config: &SchedulerConfig) -> Self {
        let min_interval = Duration::from_secs(config.min_interval_secs).max(MIN_INTERVAL_FLOOR);
        let period = Duration::from_secs(config.interval_secs)
            .max(min_interval)
            .min(MAX_INTERVAL);
        let grace = Duration::from_secs(config.shutdown_grace_secs);

        let (interval_tx, interval_rx) = watch::channel(period);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let trigger = Arc::new(Notify::new());

        let handle = tokio::spawn(run_loop(
            handler,
            interval_rx,
            shutdown_rx,
            Arc::clone(&trigger),
            grace,
        ));

        info!("Delivery scheduler started (interval: {} seconds)", period.as_secs());

        Self {
            interval_tx,
            shutdown_tx,
            trigger,
            handle: Mutex::new(Some(handle)),
            stopping: AtomicBool::new(false),
            min_interval,
        }
    }

    /// Current tick period.
    pub fn interval(&self) -> Duration {
        *self.interval_tx.borrow()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SchedulerState {
        let finished = self
            .handle
            .lock()
            .map(|h| h.as_ref().map_or(true, |h| h.is_finished()))
            .unwrap_or(true);

        if self.stopping.load(Ordering::SeqCst) || finished {
            SchedulerState::Stopped
        } else {
            SchedulerState::Running
        }
    }

    /// Change the interval, given in minutes.
    pub fn reconfigure_interval(&self, minutes: i64) -> IntervalChange {
        if minutes < 1 {
            return IntervalChange::Rejected("interval must be at least 1 minute".to_string());
        }
        match u64::try_from(minutes).ok().and_then(|m| m.checked_mul(60)) {
            Some(secs) => self.set_interval(Duration::from_secs(secs)),
            None => IntervalChange::Rejected(format!(
                "interval must be at most {} minutes",
                MAX_INTERVAL.as_secs() / 60
            )),
        }
    }

    /// Change the interval.
    ///
    /// The running timer is replaced, not duplicated; a tick already in
    /// flight finishes first.
    pub fn set_interval(&self, period: Duration) -> IntervalChange {
        if period < self.min_interval {
            return IntervalChange::Rejected(format!(
                "interval must be at least {} seconds",
                self.min_interval.as_secs()
            ));
        }
        if period > MAX_INTERVAL {
            return IntervalChange::Rejected(format!(
                "interval must be at most {} minutes",
                MAX_INTERVAL.as_secs() / 60
            ));
        }
        if self.state() == SchedulerState::Stopped {
            return IntervalChange::Rejected("scheduler is stopped".to_string());
        }

        self.interval_tx.send_replace(period);
        info!("Delivery interval set to {} seconds", period.as_secs());
        IntervalChange::Applied(period)
    }

    /// Request an extra tick as soon as the current one (if any) finishes.
    pub fn trigger_now(&self) {
        self.trigger.notify_one();
    }

    /// Stop the timer and wait for the task to end.
    ///
    /// An in-flight tick gets the configured grace period before it is
    /// abandoned. Calling this again once stopping has begun is a no-op.
    pub async fn shutdown(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            debug!("Scheduler shutdown already in progress");
            return;
        }

        info!("Stopping delivery scheduler");
        self.shutdown_tx.send_replace(true);

        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Scheduler task join error: {}", e);
            }
        }
        info!("Delivery scheduler stopped");
    }
}

fn new_timer(period: Duration) -> Interval {
    let mut timer = interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}

async fn run_loop(
    handler: Arc<dyn TickHandler>,
    mut interval_rx: watch::Receiver<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
    trigger: Arc<Notify>,
    grace: Duration,
) {
    let mut timer = new_timer(*interval_rx.borrow_and_update());

    loop {
        tokio::select! {
            biased;

            _ = shutdown_rx.changed() => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let period = *interval_rx.borrow_and_update();
                timer = new_timer(period);
                debug!("Timer reset, next tick in {} seconds", period.as_secs());
                continue;
            }
            _ = timer.tick() => debug!("Scheduled tick"),
            _ = trigger.notified() => debug!("Manual tick"),
        }

        let tick = handler.tick();
        tokio::pin!(tick);

        tokio::select! {
            _ = &mut tick => {}
            _ = shutdown_rx.changed() => {
                info!("Waiting up to {} seconds for the running tick", grace.as_secs());
                if tokio::time::timeout(grace, &mut tick).await.is_err() {
                    warn!("Tick did not finish within the grace period; abandoning it");
                }
                break;
            }
        }
    }

    debug!("Scheduler loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingHandler {
        ticks: AtomicUsize,
        delay: Duration,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl TickHandler for CountingHandler {
        async fn tick(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config(interval_secs: u64) -> SchedulerConfig {
        SchedulerConfig {
            interval_secs,
            min_interval_secs: 60,
            shutdown_grace_secs: 5,
            retention_days: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_at_configured_interval() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::start(handler.clone(), &config(120));

        tokio::time::sleep(Duration::from_secs(119)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_rejects_below_minimum() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::start(handler, &config(1800));

        assert!(matches!(
            scheduler.reconfigure_interval(0),
            IntervalChange::Rejected(_)
        ));
        assert!(matches!(
            scheduler.reconfigure_interval(-5),
            IntervalChange::Rejected(_)
        ));
        assert!(matches!(
            scheduler.set_interval(Duration::from_secs(59)),
            IntervalChange::Rejected(_)
        ));
        assert_eq!(scheduler.interval(), Duration::from_secs(1800));

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_rejects_overflowing_minutes() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::start(handler, &config(1800));

        assert!(matches!(
            scheduler.reconfigure_interval(i64::MAX),
            IntervalChange::Rejected(_)
        ));
        assert_eq!(scheduler.interval(), Duration::from_secs(1800));

        assert!(matches!(
            scheduler.reconfigure_interval(i64::MAX / 60 + 1),
            IntervalChange::Rejected(_)
        ));

        let max_minutes = (MAX_INTERVAL.as_secs() / 60) as i64;
        assert!(matches!(
            scheduler.reconfigure_interval(max_minutes + 1),
            IntervalChange::Rejected(_)
        ));
        assert_eq!(
            scheduler.reconfigure_interval(max_minutes),
            IntervalChange::Applied(MAX_INTERVAL)
        );
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_configured_minimum_never_below_floor() {
        let handler = Arc::new(CountingHandler::default());
        let config = SchedulerConfig {
            min_interval_secs: 5,
            interval_secs: 10,
            ..config(1800)
        };
        let scheduler = DeliveryScheduler::start(handler, &config);

        assert_eq!(scheduler.interval(), MIN_INTERVAL_FLOOR);
        assert!(matches!(
            scheduler.set_interval(Duration::from_secs(30)),
            IntervalChange::Rejected(_)
        ));

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_moves_next_tick() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::start(handler.clone(), &config(1800));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            scheduler.reconfigure_interval(1),
            IntervalChange::Applied(Duration::from_secs(60))
        );
        assert_eq!(scheduler.interval(), Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_keeps_in_flight_tick() {
        let handler = Arc::new(CountingHandler {
            delay: Duration::from_secs(30),
            ..Default::default()
        });
        let scheduler = DeliveryScheduler::start(handler.clone(), &config(60));

        // Tick starts at 60s and runs until 90s
        tokio::time::sleep(Duration::from_secs(70)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 1);

        scheduler.reconfigure_interval(2);
        tokio::time::sleep(Duration::from_secs(25)).await;
        assert_eq!(handler.finished.load(Ordering::SeqCst), 1);

        // Next tick is two minutes after the change was applied (90s + 120s)
        tokio::time::sleep(Duration::from_secs(110)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_do_not_overlap() {
        let handler = Arc::new(CountingHandler {
            delay: Duration::from_secs(150),
            ..Default::default()
        });
        let scheduler = DeliveryScheduler::start(handler.clone(), &config(60));

        // A 150s tick starting at 60s blocks the ticks due at 120s and 180s
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 1);
        assert_eq!(handler.finished.load(Ordering::SeqCst), 0);

        // The missed tick runs once, right after the slow one ends at 210s
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(handler.finished.load(Ordering::SeqCst), 1);
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_now() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::start(handler.clone(), &config(1800));

        scheduler.trigger_now();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 1);

        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent() {
        let handler = Arc::new(CountingHandler::default());
        let scheduler = DeliveryScheduler::start(handler.clone(), &config(60));
        assert_eq!(scheduler.state(), SchedulerState::Running);

        scheduler.shutdown().await;
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        scheduler.shutdown().await;

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 0);

        assert_eq!(
            scheduler.reconfigure_interval(5),
            IntervalChange::Rejected("scheduler is stopped".to_string())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_abandons_slow_tick_after_grace() {
        let handler = Arc::new(CountingHandler {
            delay: Duration::from_secs(3600),
            ..Default::default()
        });
        let scheduler = DeliveryScheduler::start(handler.clone(), &config(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(handler.ticks.load(Ordering::SeqCst), 1);

        let started = Instant::now();
        scheduler.shutdown().await;
        assert!(started.elapsed() <= Duration::from_secs(6));
        assert_eq!(handler.finished.load(Ordering::SeqCst), 0);
    }
}
