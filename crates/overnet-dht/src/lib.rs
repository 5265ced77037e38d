//! Chord-style distributed hash table.
//!
//! Each server owns an inclusive range of the `[0, 2^31)` hash space
//! and serves `get`/`put` for keys that hash into it, forwarding
//! everything else toward the closest known predecessor on the ring.
//! Membership changes split the range on join and merge it back on
//! leave; the bounded routing table pins the successor at slot 0 and
//! learns shortcuts from the `senderInfo` of passing traffic.
//!
//! [`DhtNode`] holds the pure protocol state; [`DhtServer`] drives it
//! over a UDP socket.

pub mod client;
pub mod error;
pub mod node;
pub mod routing;
pub mod server;

pub use error::DhtError;
pub use node::DhtNode;
pub use routing::RouteTable;
pub use server::{DhtServer, DhtServerConfig};
