use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::DISCONNECT_DELAY_SECS;

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Idle time after the last `update()` before the link is dropped.
    pub disconnect_delay_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            disconnect_delay_secs: DISCONNECT_DELAY_SECS,
        }
    }
}

impl SessionConfig {
    pub fn disconnect_delay(&self) -> Duration {
        Duration::from_secs(self.disconnect_delay_secs)
    }
}
