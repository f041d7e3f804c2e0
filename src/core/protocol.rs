//! Wand activity protocol decoding
//! This module turns raw notification payloads into typed events. It holds no state and
//! performs no I/O.

use log::{debug, trace};

/// Length of the frame header that prefixes every activity notification.
pub const HEADER_LEN: usize = 4;

/// Smallest spell frame: header, length byte and at least one name byte.
pub const MIN_SPELL_FRAME_LEN: usize = HEADER_LEN + 2;

/// Opcodes carried in the first header byte of an activity notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    SpellDetected = 0x24,
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x24 => Ok(Self::SpellDetected),
            other => Err(other),
        }
    }
}

/// An event decoded from the activity channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WandEvent {
    /// The wand recognised a spell.
    SpellDetected(String),
    /// A well-framed packet with an opcode we don't handle.
    Unknown(u8),
}

/// Returns the 4 header bytes, or `None` when the frame is too short.
pub fn parse_header(data: &[u8]) -> Option<[u8; HEADER_LEN]> {
    data.get(..HEADER_LEN)?.try_into().ok()
}

/// The opcode lives in the first (little-endian low) byte of the header.
pub fn parse_opcode(data: &[u8]) -> Option<u8> {
    data.first().copied()
}

/// Parses the length-prefixed spell name that follows the header.
///
/// Returns `None` if the frame is shorter than the advertised name length,
/// if the name is not ASCII, or if nothing is left after trimming.
pub fn parse_spell(data: &[u8]) -> Option<String> {
    if data.len() < MIN_SPELL_FRAME_LEN {
        return None;
    }

    let spell_length = data[HEADER_LEN] as usize;
    let start = HEADER_LEN + 1;
    let Some(spell_bytes) = data.get(start..start + spell_length) else {
        debug!(
            "Spell frame truncated: name length {} but only {} bytes available",
            spell_length,
            data.len() - start
        );
        return None;
    };

    if !spell_bytes.is_ascii() {
        debug!("Spell decode failed: non-ASCII name bytes {:02x?}", spell_bytes);
        return None;
    }

    // ASCII is always valid UTF-8
    let spell_name = std::str::from_utf8(spell_bytes).ok()?.trim();
    if spell_name.is_empty() {
        return None;
    }
    Some(spell_name.to_string())
}

/// Decodes one activity-channel notification.
///
/// Frames shorter than the header, and spell frames that don't decode, yield `None`.
pub fn decode(data: &[u8]) -> Option<WandEvent> {
    let header = parse_header(data)?;
    let opcode = parse_opcode(data)?;

    trace!(
        "Header 0x{:08X}, opcode 0x{:X}, packet {:02x?} (len={})",
        u32::from_le_bytes(header),
        opcode,
        data,
        data.len()
    );

    match OpCode::try_from(opcode) {
        Ok(OpCode::SpellDetected) => parse_spell(data).map(WandEvent::SpellDetected),
        Err(other) => Some(WandEvent::Unknown(other)),
    }
}

/// Decodes a battery-level notification: the whole payload is a little-endian unsigned integer.
///
/// Empty payloads and values that don't fit in a `u32` yield `None`.
pub fn decode_battery(data: &[u8]) -> Option<u32> {
    if data.is_empty() {
        return None;
    }

    let (low, high) = data.split_at(data.len().min(4));
    if high.iter().any(|&b| b != 0) {
        debug!("Battery payload {:02x?} overflows u32, ignoring", data);
        return None;
    }

    let mut bytes = [0u8; 4];
    bytes[..low.len()].copy_from_slice(low);
    Some(u32::from_le_bytes(bytes))
}
