//! Defines shared data structures for the Bluetooth module.

use std::collections::BTreeMap;
use std::fmt;

use uuid::Uuid;

/// GATT channels the wand exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Channel {
    BatteryLevelNotify,
    WandCommand,
    WandActivityNotify,
}

impl Channel {
    pub fn friendly_name(self) -> &'static str {
        match self {
            Self::BatteryLevelNotify => "Battery_Level_Notify",
            Self::WandCommand => "Wand_Command_Channel",
            Self::WandActivityNotify => "Wand_Activity_Notify",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.friendly_name())
    }
}

/// A channel and the service/characteristic pair that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredChannel {
    pub channel: Channel,
    pub service_id: Uuid,
    pub characteristic_id: Uuid,
}

impl RequiredChannel {
    pub const fn new(channel: Channel, service_id: Uuid, characteristic_id: Uuid) -> Self {
        Self {
            channel,
            service_id,
            characteristic_id,
        }
    }
}

/// Characteristic handles found for each channel of a single connection attempt.
#[derive(Debug, Clone)]
pub struct ResolvedCharacteristics<C> {
    entries: BTreeMap<Channel, Option<C>>,
}

impl<C> Default for ResolvedCharacteristics<C> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<C> ResolvedCharacteristics<C> {
    pub fn insert(&mut self, channel: Channel, characteristic: Option<C>) {
        self.entries.insert(channel, characteristic);
    }

    /// The handle for `channel`, if it was looked up and found.
    pub fn get(&self, channel: Channel) -> Option<&C> {
        self.entries.get(&channel).and_then(Option::as_ref)
    }

    pub fn is_complete(&self) -> bool {
        self.entries.values().all(Option::is_some)
    }

    /// Channels that were looked up but not found.
    pub fn missing(&self) -> impl Iterator<Item = Channel> + '_ {
        self.entries
            .iter()
            .filter(|(_, c)| c.is_none())
            .map(|(channel, _)| *channel)
    }

    /// Channels that resolved, with their handles.
    pub fn present(&self) -> impl Iterator<Item = (Channel, &C)> + '_ {
        self.entries
            .iter()
            .filter_map(|(channel, c)| c.as_ref().map(|c| (*channel, c)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Verifying,
    Subscribing,
    Connected,
    Disconnecting,
}

/// How the last link teardown came about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectKind {
    /// We asked for it (stop, idle timeout, verification retry).
    Expected,
    /// The link dropped on its own.
    Unexpected,
}

/// Identifies one transport link; a new id is issued for every connect attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(u64);

impl LinkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}
