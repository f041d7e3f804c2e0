//! Wand discovery
//! Looks for an already connected wand first, then scans for one advertising
//! the configured name prefix.

use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, info, warn};
use regex::Regex;

use crate::config::bluetooth_config::BluetoothConfig;
use crate::core::bluetooth::adapter::DeviceRegistry;
use crate::core::bluetooth::device::WandDevice;
use crate::error::TransportError;

const MAC_ADDRESS_PATTERN: &str = r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})";

pub struct BluetoothScanner {
    adapter: Adapter,
    devices: DeviceRegistry,
    config: BluetoothConfig,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, devices: DeviceRegistry, config: BluetoothConfig) -> Self {
        Self {
            adapter,
            devices,
            config,
        }
    }

    /// Finds the first wand whose name contains `name_prefix`.
    ///
    /// Returns `None` when nothing turned up within the configured scan timeout.
    pub async fn find_wand(&self, name_prefix: &str) -> Result<Option<WandDevice>, TransportError> {
        let timeout = self.config.scan_timeout();
        match tokio::time::timeout(timeout, self.internal_scan(name_prefix)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("No wand found within {} s", timeout.as_secs());
                Ok(None)
            }
        }
    }

    async fn internal_scan(&self, name_prefix: &str) -> Result<Option<WandDevice>, TransportError> {
        // find connected device first
        info!("Checking for connected devices");
        for device in self.adapter.connected_devices().await? {
            let name = device.name().ok();
            if is_wand_name(name.as_deref(), name_prefix) {
                let rssi = device.rssi().await.ok();
                return Ok(Some(self.register(device, name, rssi)));
            }
        }
        info!("No connected wand detected");

        info!("Starting bluetooth scan");
        let mut scan_stream = self.adapter.scan(&[]).await?;
        while let Some(discovered) = scan_stream.next().await {
            let name = discovered
                .device
                .name()
                .ok()
                .or(discovered.adv_data.local_name.clone());
            debug!("Found device - Device: {:?}, RSSI: {:?}", discovered.device, discovered.rssi);

            if is_wand_name(name.as_deref(), name_prefix) {
                return Ok(Some(self.register(discovered.device, name, discovered.rssi)));
            }
        }

        info!("Bluetooth scan stream has ended.");
        Ok(None)
    }

    /// Remembers `device` for connecting and describes it.
    fn register(&self, device: Device, name: Option<String>, rssi: Option<i16>) -> WandDevice {
        let id = device.id().to_string();
        let address = extract_mac_address(&id).unwrap_or_else(|| id.clone());
        let wand = WandDevice::new(id.clone(), name, address, rssi);
        info!(
            "Found wand: Address: {}, ID: {}, Name: {:?}, RSSI: {}",
            wand.address,
            wand.id,
            wand.name,
            wand.rssi_label()
        );

        self.devices
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(id, device);
        wand
    }
}

fn is_wand_name(name: Option<&str>, name_prefix: &str) -> bool {
    name.is_some_and(|name| name.contains(name_prefix))
}

/// Pulls a MAC address out of a platform device id, upper-cased.
fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(MAC_ADDRESS_PATTERN).ok()?;
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}
