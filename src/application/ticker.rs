//! Elapsed-time ticker
//!
//! Fires on a fixed interval whether or not any event arrived, so the elapsed
//! time shown by the dashboard keeps moving while a long step runs.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic clock measuring time since the session started
#[derive(Debug)]
pub struct ElapsedTicker {
    started_at: Instant,
    period: Duration,
    interval: Option<Interval>,
}

impl ElapsedTicker {
    /// Start ticking every `period`; the first tick fires one period from now
    pub fn start(period: Duration) -> Self {
        let started_at = Instant::now();
        let mut interval = interval_at(started_at + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        Self {
            started_at,
            period,
            interval: Some(interval),
        }
    }

    pub const fn started_at(&self) -> Instant {
        self.started_at
    }

    pub const fn period(&self) -> Duration {
        self.period
    }

    /// Monotonic time since start; keeps counting after cancellation
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Wait for the next tick and return the elapsed time at that tick
    ///
    /// A cancelled ticker never completes this future.
    pub async fn tick(&mut self) -> Duration {
        match self.interval.as_mut() {
            Some(interval) => interval.tick().await.duration_since(self.started_at),
            None => std::future::pending().await,
        }
    }

    /// Stop the ticker. Returns `true` only for the call that actually stopped it.
    pub fn cancel(&mut self) -> bool {
        self.interval.take().is_some()
    }

    pub const fn is_active(&self) -> bool {
        self.interval.is_some()
    }
}
