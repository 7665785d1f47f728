//! Adaptive request pacing for one shop.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::config::GovernorSettings;

/// Paces requests to a single shop.
///
/// Requests wait for the next tick of a periodic timer. A throttled response
/// doubles the period (up to `max_interval`); every success shortens it by
/// `speedup_step` (down to `min_interval`). Interval and timer live under one
/// lock, so concurrent waiters are paced one at a time.
#[derive(Debug)]
pub struct RateGovernor {
    settings: GovernorSettings,
    state: Mutex<GovernorState>,
}

#[derive(Debug)]
struct GovernorState {
    interval: Duration,
    ticker: Interval,
}

impl GovernorState {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            ticker: ticker(interval),
        }
    }
}

/// A ticker whose first tick fires one full period from now.
fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

impl RateGovernor {
    /// Create a governor starting at `settings.initial_interval`.
    #[must_use]
    pub fn new(settings: GovernorSettings) -> Self {
        let initial = settings
            .initial_interval
            .clamp(settings.min_interval, settings.max_interval);
        Self {
            settings,
            state: Mutex::new(GovernorState::new(initial)),
        }
    }

    /// Wait for the next tick.
    pub async fn wait(&self) {
        let mut state = self.state.lock().await;
        state.ticker.tick().await;
    }

    /// Slow down after a throttled response, speed up after a success.
    pub async fn adjust(&self, throttled: bool) {
        let mut state = self.state.lock().await;
        let previous = state.interval;
        let next = if throttled {
            (previous * 2).min(self.settings.max_interval)
        } else {
            previous
                .saturating_sub(self.settings.speedup_step)
                .max(self.settings.min_interval)
        };

        if next != previous {
            *state = GovernorState::new(next);
            debug!(
                throttled,
                previous_ms = previous.as_millis(),
                interval_ms = next.as_millis(),
                "Adjusted request interval"
            );
        }
    }

    /// Current pacing interval.
    pub async fn interval(&self) -> Duration {
        self.state.lock().await.interval
    }
}
