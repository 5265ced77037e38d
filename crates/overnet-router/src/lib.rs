//! Overlay router core: packet forwarder and path-vector routing daemon.
//!
//! The forwarder moves packets between the substrate, the local
//! source/sink, and the local router, consulting a longest-prefix-match
//! forwarding table. The router runs the `RPv0` path-vector protocol:
//! hellos every second, advertisements every ten, EWMA link costs, and
//! failure detection after three missed hello replies.
//!
//! Protocol state ([`RouterState`]) is deliberately decoupled from I/O:
//! it produces action lists that the drivers ([`Forwarder`], [`Router`])
//! act on over bounded channels and the [`LinkSubstrate`] seam.

pub mod error;
pub mod forwarder;
pub mod router;
pub mod state;
pub mod substrate;
pub mod table;
pub mod testing;

pub use error::RouterError;
pub use forwarder::{Forwarder, RouterLink, SourceHandle};
pub use router::Router;
pub use state::{Actions, LinkInfo, Outbound, Route, RouterState};
pub use substrate::LinkSubstrate;
pub use table::{ForwardingTable, SharedTable};
