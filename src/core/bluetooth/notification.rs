//! Notification handling for the wand
//! This module decodes notification payloads, folds them into the wand state and
//! notifies registered callbacks.

use std::sync::{Arc, PoisonError, RwLock};

use log::{debug, info};

use crate::core::bluetooth::callbacks::CallbackRegistry;
use crate::core::bluetooth::types::Channel;
use crate::core::protocol::{self, WandEvent};
use crate::core::wand::WandState;

/// Notification handler for wand data
#[derive(Clone)]
pub struct NotificationHandler {
    state: Arc<RwLock<WandState>>,
    callbacks: CallbackRegistry,
}

impl NotificationHandler {
    /// Create a new NotificationHandler
    pub fn new(callbacks: CallbackRegistry) -> Self {
        Self {
            state: Arc::new(RwLock::new(WandState::default())),
            callbacks,
        }
    }

    /// Current snapshot
    pub fn state(&self) -> WandState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Processes one notification payload.
    ///
    /// Returns the new snapshot when the state changed; callbacks have been called by then.
    pub fn handle(&self, channel: Channel, payload: &[u8]) -> Option<WandState> {
        let current = self.state();
        let next = match channel {
            Channel::WandActivityNotify => self.handle_activity(&current, payload),
            Channel::BatteryLevelNotify => self.handle_battery(&current, payload),
            Channel::WandCommand => {
                debug!("Ignoring notification on {}: {:02x?}", channel, payload);
                None
            }
        }?;

        *self.state.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        self.callbacks.fire(&next);
        Some(next)
    }

    fn handle_activity(&self, current: &WandState, payload: &[u8]) -> Option<WandState> {
        match protocol::decode(payload)? {
            WandEvent::SpellDetected(spell) => {
                info!("Spell detected: {}", spell);
                current.apply(&WandEvent::SpellDetected(spell))
            }
            WandEvent::Unknown(opcode) => {
                debug!("Unknown opcode encountered: 0x{:02X} ({:02x?})", opcode, payload);
                None
            }
        }
    }

    fn handle_battery(&self, current: &WandState, payload: &[u8]) -> Option<WandState> {
        debug!("Battery reply received: {:02x?}", payload);
        let battery = protocol::decode_battery(payload)?;
        debug!("Battery reply received: {}%", battery);
        Some(current.with_battery_level(battery))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn handler() -> (NotificationHandler, Arc<Mutex<Vec<WandState>>>) {
        let callbacks = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _handle = callbacks.register(move |state| sink.lock().unwrap().push(state.clone()));
        (NotificationHandler::new(callbacks), seen)
    }

    #[test]
    fn test_spell_notification_updates_state_and_fires() {
        let (handler, seen) = handler();

        let next = handler.handle(Channel::WandActivityNotify, &[0x24, 0, 0, 0, 3, b'c', b'a', b't']);

        assert_eq!(next.as_ref().map(|s| s.last_spell.as_str()), Some("cat"));
        assert_eq!(handler.state().last_spell, "cat");
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_opcode_changes_nothing() {
        let (handler, seen) = handler();

        assert_eq!(handler.handle(Channel::WandActivityNotify, &[0x10, 0, 0, 0, 1]), None);
        assert_eq!(handler.handle(Channel::WandActivityNotify, &[0x24, 0]), None);

        assert_eq!(handler.state(), WandState::default());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_battery_notification_updates_level_only() {
        let (handler, seen) = handler();
        handler.handle(Channel::WandActivityNotify, &[0x24, 0, 0, 0, 5, b'L', b'u', b'm', b'o', b's']);

        let next = handler.handle(Channel::BatteryLevelNotify, &[0x32]).unwrap();

        assert_eq!(next.battery_level, 50);
        assert_eq!(next.last_spell, "Lumos");
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_empty_battery_payload_is_ignored() {
        let (handler, seen) = handler();
        assert_eq!(handler.handle(Channel::BatteryLevelNotify, &[]), None);
        assert!(seen.lock().unwrap().is_empty());
    }
}
