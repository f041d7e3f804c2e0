//! Constants used throughout the application
//! This module contains the GATT UUIDs of the wand, the channel table and
//! default timing values.

use uuid::Uuid;

use crate::core::bluetooth::types::{Channel, RequiredChannel};

/// Advertised name prefix of Magic Caster wands
pub const WAND_NAME_PREFIX: &str = "MCW-";

/// Standard Bluetooth Service UUIDs
pub const UUID_BATTERY_SERVICE: Uuid = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);

/// Standard Bluetooth Characteristic UUIDs
pub const UUID_BATTERY_LEVEL: Uuid = Uuid::from_u128(0x00002a19_0000_1000_8000_00805f9b34fb);

/// The UUID of the wand vendor service
pub const UUID_WAND_SERVICE: Uuid = Uuid::from_u128(0x57420001_587e_48a0_974c_544d6163c577);

/// Write & notify characteristic used to send commands to the wand
pub const UUID_WAND_COMMAND_CHAR: Uuid = Uuid::from_u128(0x57420002_587e_48a0_974c_544d6163c577);

/// Notify-only characteristic carrying spells and other activity
pub const UUID_WAND_ACTIVITY_CHAR: Uuid = Uuid::from_u128(0x57420003_587e_48a0_974c_544d6163c577);

pub const BATTERY_LEVEL_CHANNEL: RequiredChannel =
    RequiredChannel::new(Channel::BatteryLevelNotify, UUID_BATTERY_SERVICE, UUID_BATTERY_LEVEL);

pub const WAND_COMMAND_CHANNEL: RequiredChannel =
    RequiredChannel::new(Channel::WandCommand, UUID_WAND_SERVICE, UUID_WAND_COMMAND_CHAR);

pub const WAND_ACTIVITY_CHANNEL: RequiredChannel =
    RequiredChannel::new(Channel::WandActivityNotify, UUID_WAND_SERVICE, UUID_WAND_ACTIVITY_CHAR);

/// Every channel the wand exposes
pub const WAND_CHANNELS: [RequiredChannel; 3] =
    [BATTERY_LEVEL_CHANNEL, WAND_COMMAND_CHANNEL, WAND_ACTIVITY_CHANNEL];

/// Channels that must resolve before a connection is usable
pub const REQUIRED_CHANNELS: [RequiredChannel; 2] = [BATTERY_LEVEL_CHANNEL, WAND_ACTIVITY_CHANNEL];

/// Number of connect/verify attempts before giving up on missing characteristics
pub const VERIFY_ATTEMPTS: usize = 2;

/// Idle time in seconds after which the connection is dropped
pub const DISCONNECT_DELAY_SECS: u64 = 120;

/// Maximum number of transport-level connection retries
pub const MAX_CONNECT_RETRIES: u32 = 3;

/// Delay between connection retries in milliseconds
pub const CONNECT_RETRY_DELAY_MS: u64 = 1000;

/// Scan duration in seconds
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 30;
