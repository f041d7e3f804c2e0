//! Core functionality for the Magic Caster wand
//! This module contains the protocol decoding, the wand state and the BLE session.

pub mod bluetooth;
pub mod protocol;
pub mod wand;

// Re-export commonly used types
pub use bluetooth::WandSession;
pub use protocol::WandEvent;
pub use wand::WandState;
