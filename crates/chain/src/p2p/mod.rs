//! Peer-to-peer gossip: length-framed TCP, per-peer receive tasks, and
//! block/transaction broadcast.

pub mod message;
pub mod node;
pub mod peer;

pub use message::{Message, MessageType, WireError, MAX_FRAME_PAYLOAD};
pub use node::P2pNode;
pub use peer::Peer;
