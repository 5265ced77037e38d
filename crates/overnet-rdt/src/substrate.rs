//! The seam between the transport loop and the packet I/O layer.

use std::future::Future;

use crate::wire::RdtPacket;

/// Unreliable packet I/O toward a single peer.
///
/// The substrate may drop, reorder, or duplicate packets, but never
/// corrupts them. `ready` gates admission of fresh DATA; ACKs and
/// retransmissions are sent unconditionally, and the substrate is free
/// to shed them under pressure.
pub trait Substrate: Send + Sync + 'static {
    /// True iff a fresh packet can be accepted right now.
    fn ready(&self) -> bool;

    /// Send a packet toward the peer (best effort).
    fn send(&self, pkt: RdtPacket);

    /// Await the next inbound packet. Returns `None` once the
    /// substrate has shut down.
    fn recv(&self) -> impl Future<Output = Option<RdtPacket>> + Send;
}
