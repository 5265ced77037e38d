//! DHT protocol pieces: the key hash and the `CSE473 DHTPv0.1` codec.

pub mod hash;
pub mod wire;

pub use hash::hashit;
pub use wire::{DhtPacket, HashRange, NodeInfo};
