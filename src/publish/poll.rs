//! Deadline accounting for readiness polling.
//!
//! All elapsed-time checks for a poll loop go through [`PollBudget`], so the
//! loop itself never compares timestamps.

use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::config::PollSettings;

/// The poll deadline passed while waiting for the next attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExhausted {
    pub elapsed: Duration,
}

/// Fixed-interval retry budget with an explicit deadline.
#[derive(Debug)]
pub struct PollBudget {
    settings: PollSettings,
    started: Instant,
}

impl PollBudget {
    /// Start the clock. The deadline is `settings.timeout` from now.
    pub fn start(settings: PollSettings) -> Self {
        Self {
            settings,
            started: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn timeout(&self) -> Duration {
        self.settings.timeout
    }

    /// Sleep one interval, then check the deadline.
    ///
    /// Returns `Err` when the time since [`PollBudget::start`] exceeds the
    /// timeout, in which case no further attempt should be made.
    pub async fn wait(&self) -> Result<(), BudgetExhausted> {
        sleep(self.settings.interval).await;
        let elapsed = self.elapsed();
        if elapsed > self.settings.timeout {
            Err(BudgetExhausted { elapsed })
        } else {
            Ok(())
        }
    }
}
