use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Timing knobs for the poller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Wall-clock spacing between ticks.
    pub interval: Duration,
    /// How long without a successful merge before the table counts as stale.
    pub stale_after: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(4000),
            stale_after: Duration::from_millis(12000),
        }
    }
}

impl PollConfig {
    pub fn with_interval(mut self, ms: u64) -> Self {
        self.interval = Duration::from_millis(ms);
        self
    }

    pub fn with_stale_after(mut self, ms: u64) -> Self {
        self.stale_after = Duration::from_millis(ms);
        self
    }
}
