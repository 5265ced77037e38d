//! The packet forwarder and its application/router surfaces.
//!
//! The forwarder moves packets between three parties: the substrate,
//! the local source/sink (protocol 1), and the local router (protocol
//! 2). Each party talks to the loop over bounded channels (capacity
//! 1000); producers block when a queue fills, so packets are never
//! dropped in-process. Within one iteration the loop prefers inbound
//! substrate traffic over the router outbox over the source outbox.

use tokio::sync::{mpsc, watch};

use overnet_core::{NodeAddr, Packet, Protocol};

use crate::error::RouterError;
use crate::substrate::LinkSubstrate;
use crate::table::SharedTable;

/// Capacity of each in-process queue.
pub const QUEUE_CAPACITY: usize = 1000;

/// Application-facing surface of the forwarder, callable from any task.
pub struct SourceHandle {
    my_adr: NodeAddr,
    to_fwd: mpsc::Sender<Packet>,
    from_fwd: tokio::sync::Mutex<mpsc::Receiver<Packet>>,
}

impl SourceHandle {
    /// Send a payload to another overlay host. Blocks while the
    /// outgoing queue is full.
    pub async fn send(&self, payload: &str, dest: &str) -> Result<(), RouterError> {
        let dest: NodeAddr = dest.parse().map_err(RouterError::Codec)?;
        let pkt = Packet::data(self.my_adr, dest, payload);
        self.to_fwd.send(pkt).await.map_err(|_| RouterError::Closed)
    }

    /// True iff the outgoing queue has room.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.to_fwd.capacity() > 0
    }

    /// Receive the next delivered payload and its source address.
    /// Blocks while none is available.
    pub async fn receive(&self) -> Result<(String, String), RouterError> {
        let pkt = self
            .from_fwd
            .lock()
            .await
            .recv()
            .await
            .ok_or(RouterError::Closed)?;
        Ok((pkt.payload, pkt.src.to_string()))
    }

    /// True iff a delivered payload is waiting.
    pub async fn incoming(&self) -> bool {
        !self.from_fwd.lock().await.is_empty()
    }
}

/// Router-facing surface of the forwarder.
pub struct RouterLink {
    to_fwd: mpsc::Sender<(Packet, usize)>,
    from_fwd: mpsc::Receiver<(Packet, usize)>,
}

impl RouterLink {
    /// Hand a control packet to the forwarder for transmission on `link`.
    pub async fn send_pkt(&self, pkt: Packet, link: usize) -> Result<(), RouterError> {
        self.to_fwd
            .send((pkt, link))
            .await
            .map_err(|_| RouterError::Closed)
    }

    /// True iff the control outbox has room.
    #[must_use]
    pub fn ready_for_pkt(&self) -> bool {
        self.to_fwd.capacity() > 0
    }

    /// Receive the next control packet and the link it arrived on.
    pub async fn receive_pkt(&mut self) -> Option<(Packet, usize)> {
        self.from_fwd.recv().await
    }

    /// True iff a control packet is waiting.
    #[must_use]
    pub fn incoming_pkt(&self) -> bool {
        !self.from_fwd.is_empty()
    }
}

/// The forwarder event loop.
#[must_use]
pub struct Forwarder<S> {
    my_adr: NodeAddr,
    substrate: S,
    table: SharedTable,
    from_src: mpsc::Receiver<Packet>,
    to_snk: mpsc::Sender<Packet>,
    from_rtr: mpsc::Receiver<(Packet, usize)>,
    to_rtr: mpsc::Sender<(Packet, usize)>,
    shutdown: watch::Receiver<bool>,
}

impl<S: LinkSubstrate> Forwarder<S> {
    /// Build a forwarder plus its two surfaces.
    pub fn new(
        my_adr: NodeAddr,
        substrate: S,
        table: SharedTable,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, SourceHandle, RouterLink) {
        let (src_tx, from_src) = mpsc::channel(QUEUE_CAPACITY);
        let (to_snk, snk_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (rtr_tx, from_rtr) = mpsc::channel(QUEUE_CAPACITY);
        let (to_rtr, rtr_rx) = mpsc::channel(QUEUE_CAPACITY);

        let forwarder = Self {
            my_adr,
            substrate,
            table,
            from_src,
            to_snk,
            from_rtr,
            to_rtr,
            shutdown,
        };
        let source = SourceHandle {
            my_adr,
            to_fwd: src_tx,
            from_fwd: tokio::sync::Mutex::new(snk_rx),
        };
        let router = RouterLink {
            to_fwd: rtr_tx,
            from_fwd: rtr_rx,
        };
        (forwarder, source, router)
    }

    /// Run until shutdown is signalled or the substrate closes.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                inbound = self.substrate.recv() => {
                    let Some((pkt, lnk)) = inbound else { break };
                    self.handle_inbound(pkt, lnk).await;
                }
                Some((pkt, lnk)) = self.from_rtr.recv() => {
                    if !self.substrate.try_send(pkt, lnk) {
                        tracing::trace!(link = lnk, "substrate not ready, control packet dropped");
                    }
                }
                Some(pkt) = self.from_src.recv() => self.dispatch_local(pkt),
            }
        }
        tracing::debug!("forwarder stopped");
    }

    /// A packet arrived from the substrate: deliver it locally or
    /// forward it along the best matching route.
    async fn handle_inbound(&mut self, mut pkt: Packet, lnk: usize) {
        if pkt.dest == self.my_adr {
            match pkt.protocol {
                Protocol::Data => {
                    let _ = self.to_snk.send(pkt).await;
                }
                Protocol::Control => {
                    let _ = self.to_rtr.send((pkt, lnk)).await;
                }
            }
            return;
        }
        pkt.ttl = pkt.ttl.saturating_sub(1);
        if pkt.ttl == 0 {
            tracing::warn!(dest = %pkt.dest, "expired ttl, packet dropped");
            return;
        }
        match self.table.lookup(pkt.dest) {
            Some(out) => {
                if !self.substrate.try_send(pkt, out) {
                    tracing::trace!(link = out, "substrate not ready, packet dropped");
                }
            }
            None => tracing::warn!(dest = %pkt.dest, "no matching forwarding entry"),
        }
    }

    /// A locally originated payload: route it by destination address.
    fn dispatch_local(&self, pkt: Packet) {
        match self.table.lookup(pkt.dest) {
            Some(out) => {
                if !self.substrate.try_send(pkt, out) {
                    tracing::trace!(link = out, "substrate not ready, packet dropped");
                }
            }
            None => tracing::warn!(dest = %pkt.dest, "no matching forwarding entry"),
        }
    }
}
