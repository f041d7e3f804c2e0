//! Wand state snapshot
//! The state is an immutable value; every update produces a new snapshot.

use serde::{Deserialize, Serialize};

use crate::core::protocol::WandEvent;

/// Protocol version reported for a freshly created session.
pub const PROTOCOL_VERSION: f32 = 0.1;

/// Snapshot of everything we know about the wand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WandState {
    /// Version of the activity protocol
    pub protocol_version: f32,
    /// Name of the last spell the wand detected, empty until the first one arrives
    pub last_spell: String,
    /// Battery level in percent, as reported by the battery service
    pub battery_level: u32,
}

impl Default for WandState {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            last_spell: String::new(),
            battery_level: 0,
        }
    }
}

impl WandState {
    pub fn with_last_spell(&self, spell: impl Into<String>) -> Self {
        Self {
            last_spell: spell.into(),
            ..self.clone()
        }
    }

    pub fn with_battery_level(&self, battery_level: u32) -> Self {
        Self {
            battery_level,
            ..self.clone()
        }
    }

    /// Folds a decoded activity event into a new snapshot.
    ///
    /// Returns `None` when the event doesn't change the state.
    pub fn apply(&self, event: &WandEvent) -> Option<Self> {
        match event {
            WandEvent::SpellDetected(spell) => Some(self.with_last_spell(spell.as_str())),
            WandEvent::Unknown(_) => None,
        }
    }
}
