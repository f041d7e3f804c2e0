//! Magic Caster wand BLE library
//! Connects to a wand over Bluetooth LE, decodes spell and battery notifications,
//! and keeps the link alive only while it is being used.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod utils;

pub use crate::config::WandConfig;
pub use crate::config::bluetooth_config::BluetoothConfig;
pub use crate::config::session_config::SessionConfig;
pub use crate::core::bluetooth::{
    BluestTransport, BluetoothScanner, CallbackHandle, ConnectionState, DisconnectKind, WandDevice,
    WandSession,
};
pub use crate::core::{WandEvent, WandState};
pub use crate::error::{TransportError, WandError};
