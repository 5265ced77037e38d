//! The seam between the forwarder and the link I/O layer.

use std::future::Future;

use overnet_core::Packet;

/// Packet I/O over a fixed set of numbered links.
///
/// The substrate owns the sockets and per-link admission control. The
/// forwarder only probes readiness and moves packets; a `try_send`
/// refusal means the packet is dropped for this iteration and the
/// protocol's periodic retransmission recovers.
pub trait LinkSubstrate: Send + Sync + 'static {
    /// Number of links (the fixed neighbor set).
    fn links(&self) -> usize;

    /// Nonblocking send on `link`. Returns false when the link cannot
    /// accept a packet right now.
    fn try_send(&self, pkt: Packet, link: usize) -> bool;

    /// Await the next inbound packet and the link it arrived on.
    /// Returns `None` once the substrate has shut down.
    fn recv(&self) -> impl Future<Output = Option<(Packet, usize)>> + Send;
}
