//! Gossip wire format.
//!
//! ```text
//! ┌──────────┬───────────────────┬─────────────────┐
//! │ 1 byte   │ 4 bytes (BE)      │ length bytes    │
//! │ type     │ payload length    │ payload         │
//! └──────────┴───────────────────┴─────────────────┘
//! ```
//!
//! NEW_TX carries the `0x`-prefixed ASCII hex of a signed transaction's
//! RLP; NEW_BLOCK the same for a block.

use thiserror::Error;

/// Frames above this size are dropped before allocation.
pub const MAX_FRAME_PAYLOAD: usize = 4 * 1024 * 1024;

pub const HEADER_LEN: usize = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("message shorter than the {HEADER_LEN}-byte header")]
    ShortHeader,
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("declared payload length {0} exceeds the frame cap")]
    OversizedPayload(usize),
    #[error("payload truncated: declared {declared}, found {found}")]
    Truncated { declared: usize, found: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Hello = 0,
    NewTx = 1,
    NewBlock = 2,
    GetBlocks = 3,
    BlocksResponse = 4,
    Ping = 5,
    Pong = 6,
}

impl MessageType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MessageType::Hello),
            1 => Some(MessageType::NewTx),
            2 => Some(MessageType::NewBlock),
            3 => Some(MessageType::GetBlocks),
            4 => Some(MessageType::BlocksResponse),
            5 => Some(MessageType::Ping),
            6 => Some(MessageType::Pong),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageType,
    pub payload: Vec<u8>,
}

impl Message {
    pub fn new(kind: MessageType, payload: Vec<u8>) -> Self {
        Message { kind, payload }
    }

    /// Text payloads (the hex gossip forms) as a message.
    pub fn from_str_payload(kind: MessageType, payload: &str) -> Self {
        Message::new(kind, payload.as_bytes().to_vec())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.push(self.kind as u8);
        out.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.payload);
        out
    }

    pub fn decode(data: &[u8]) -> Result<Self, WireError> {
        if data.len() < HEADER_LEN {
            return Err(WireError::ShortHeader);
        }
        let kind = MessageType::from_u8(data[0]).ok_or(WireError::UnknownType(data[0]))?;
        let len = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as usize;
        if len > MAX_FRAME_PAYLOAD {
            return Err(WireError::OversizedPayload(len));
        }
        if data.len() < HEADER_LEN + len {
            return Err(WireError::Truncated {
                declared: len,
                found: data.len() - HEADER_LEN,
            });
        }
        Ok(Message {
            kind,
            payload: data[HEADER_LEN..HEADER_LEN + len].to_vec(),
        })
    }
}
