use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunables for one session run. Defaults match the product behavior:
/// a 3 second countdown, a 60 second hard cap per answer, and a short
/// settle pause before the next question is narrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub countdown_secs: u32,
    pub max_answer_secs: u32,
    pub settle_delay_ms: u64,
}

impl SessionConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn max_answer_duration(&self) -> Duration {
        Duration::from_secs(self.max_answer_secs as u64)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            countdown_secs: 3,
            max_answer_secs: 60,
            settle_delay_ms: 800,
        }
    }
}
