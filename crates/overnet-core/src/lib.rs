//! Core types, constants, and wire formats for the overnet overlay stack.
//!
//! This crate defines the overlay address and prefix types, the overlay
//! packet wire format, the `RPv0` routing control-plane codec, and the
//! DHT protocol codec and hash function shared by the three cores.

pub mod control;
pub mod dht;
pub mod error;
pub mod packet;
pub mod prefix;
pub mod types;

pub use control::ControlMsg;
pub use error::CodecError;
pub use packet::{Packet, Protocol};
pub use prefix::Prefix;
pub use types::NodeAddr;
