//! Bluetooth functionality for Magic Caster wands
//! This module handles all bluetooth operations including scanning,
//! connecting, and receiving data from the wand.

mod adapter;
mod callbacks;
mod connection;
pub mod constants;
mod device;
#[cfg(test)]
mod fake;
mod manager;
mod notification;
mod resolver;
mod scanner;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use adapter::{BluestLink, BluestTransport, DeviceRegistry};
pub use callbacks::{CallbackHandle, CallbackRegistry};
pub use connection::ConnectionManager;
pub use device::WandDevice;
pub use manager::WandSession;
pub use notification::NotificationHandler;
pub use resolver::resolve;
pub use scanner::BluetoothScanner;
pub use transport::{
    EventSink, GattCharacteristic, GattService, Link, LinkEvent, ServiceCatalog, Transport,
};
pub use types::{
    Channel, ConnectionState, DisconnectKind, LinkId, RequiredChannel, ResolvedCharacteristics,
};
