use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::bluetooth::constants::{
    CONNECT_RETRY_DELAY_MS, DEFAULT_SCAN_DURATION_SECS, MAX_CONNECT_RETRIES, WAND_NAME_PREFIX,
};

/// Adapter-level settings: connect retry policy and discovery filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BluetoothConfig {
    /// Connection attempts per connect, before the failure is reported upward.
    pub max_connect_retries: u32,
    pub connect_retry_delay_ms: u64,
    /// How long a scan runs before giving up.
    pub scan_timeout_secs: u64,
    /// Advertised-name prefix identifying a wand.
    pub name_prefix: String,
}

impl Default for BluetoothConfig {
    fn default() -> Self {
        BluetoothConfig {
            max_connect_retries: MAX_CONNECT_RETRIES,
            connect_retry_delay_ms: CONNECT_RETRY_DELAY_MS,
            scan_timeout_secs: DEFAULT_SCAN_DURATION_SECS,
            name_prefix: WAND_NAME_PREFIX.to_string(),
        }
    }
}

impl BluetoothConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}
