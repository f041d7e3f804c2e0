//! Bluetooth device representation and related functionality

/// A wand we know about, with the advertisement data cached at discovery time
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct WandDevice {
    /// Platform-specific unique identifier for the device (especially important on macOS)
    pub id: String,
    /// The name of the device, if available
    pub name: Option<String>,
    /// The address of the device (MAC address on most platforms, may be 00:00:00:00:00:00 on macOS)
    pub address: String,
    /// The signal strength (RSSI) from the last advertisement, if any
    pub rssi: Option<i16>,
}

impl WandDevice {
    /// Creates a new WandDevice instance
    pub fn new(id: String, name: Option<String>, address: String, rssi: Option<i16>) -> Self {
        Self {
            id,
            name,
            address,
            rssi,
        }
    }

    /// The advertised name, or the address when the device has none
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// RSSI formatted for logs
    pub fn rssi_label(&self) -> String {
        self.rssi
            .map(|rssi| rssi.to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}
