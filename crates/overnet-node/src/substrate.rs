//! UDP-backed substrates for the router and transport cores.
//!
//! Each substrate owns one datagram socket. Inbound datagrams are
//! decoded on a reader task and queued; outbound packets pass through
//! bounded per-link queues that provide the admission control the
//! cores probe with `ready`/`try_send`. Overflow sheds packets, which
//! the protocols above recover from.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use overnet_core::Packet;
use overnet_rdt::wire::RdtPacket;
use overnet_rdt::Substrate;
use overnet_router::LinkSubstrate;

use crate::error::NodeError;

/// Receive buffer size for substrate datagrams.
const RECV_BUFFER: usize = 4096;

/// Per-link admission queue depth.
const LINK_QUEUE: usize = 64;

// ---------------------------------------------------------------------------
// Router substrate
// ---------------------------------------------------------------------------

/// A [`LinkSubstrate`] where link `i` is a UDP peer address.
pub struct UdpLinkSubstrate {
    send_txs: Vec<mpsc::Sender<Packet>>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<(Packet, usize)>>,
}

impl UdpLinkSubstrate {
    /// Bind `bind_addr` and wire one link per peer address.
    pub async fn bind(bind_addr: SocketAddr, peers: Vec<SocketAddr>) -> Result<Self, NodeError> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        tracing::info!(
            local = %socket.local_addr()?,
            links = peers.len(),
            "substrate bound"
        );

        // One bounded sender queue per link.
        let mut send_txs = Vec::with_capacity(peers.len());
        for (link, peer) in peers.iter().copied().enumerate() {
            let (tx, mut rx) = mpsc::channel::<Packet>(LINK_QUEUE);
            let sock = Arc::clone(&socket);
            tokio::spawn(async move {
                while let Some(pkt) = rx.recv().await {
                    if let Err(e) = sock.send_to(pkt.emit().as_bytes(), peer).await {
                        tracing::warn!(link, %peer, error = %e, "substrate send failed");
                    }
                }
            });
            send_txs.push(tx);
        }

        // Reader task: decode and map the source address to a link.
        let (inbound_tx, inbound_rx) = mpsc::channel(LINK_QUEUE * peers.len().max(1));
        let sock = Arc::clone(&socket);
        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER];
            loop {
                let (len, from) = match sock.recv_from(&mut buf).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "substrate receive failed");
                        continue;
                    }
                };
                let Some(link) = peers.iter().position(|p| *p == from) else {
                    tracing::trace!(%from, "datagram from unknown peer dropped");
                    continue;
                };
                let Ok(text) = std::str::from_utf8(&buf[..len]) else {
                    tracing::warn!(link, "non-text datagram dropped");
                    continue;
                };
                match Packet::parse(text) {
                    Ok(pkt) => {
                        if inbound_tx.send((pkt, link)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!(link, error = %e, "malformed packet dropped"),
                }
            }
        });

        Ok(Self {
            send_txs,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        })
    }
}

impl LinkSubstrate for UdpLinkSubstrate {
    fn links(&self) -> usize {
        self.send_txs.len()
    }

    fn try_send(&self, pkt: Packet, link: usize) -> bool {
        self.send_txs[link].try_send(pkt).is_ok()
    }

    async fn recv(&self) -> Option<(Packet, usize)> {
        self.inbound_rx.lock().await.recv().await
    }
}

// ---------------------------------------------------------------------------
// Transport substrate
// ---------------------------------------------------------------------------

/// A [`Substrate`] over UDP toward a single peer.
pub struct UdpSubstrate {
    send_tx: mpsc::Sender<RdtPacket>,
    inbound_rx: tokio::sync::Mutex<mpsc::Receiver<RdtPacket>>,
}

impl UdpSubstrate {
    /// Bind `bind_addr` and exchange packets with `peer`.
    pub async fn bind(bind_addr: SocketAddr, peer: SocketAddr) -> Result<Self, NodeError> {
        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        tracing::info!(local = %socket.local_addr()?, %peer, "transport substrate bound");

        let (send_tx, mut send_rx) = mpsc::channel::<RdtPacket>(LINK_QUEUE);
        let sock = Arc::clone(&socket);
        tokio::spawn(async move {
            while let Some(pkt) = send_rx.recv().await {
                if let Err(e) = sock.send_to(&pkt.encode(), peer).await {
                    tracing::warn!(%peer, error = %e, "transport send failed");
                }
            }
        });

        let (inbound_tx, inbound_rx) = mpsc::channel(LINK_QUEUE);
        let sock = Arc::clone(&socket);
        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER];
            loop {
                let (len, from) = match sock.recv_from(&mut buf).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "transport receive failed");
                        continue;
                    }
                };
                if from != peer {
                    tracing::trace!(%from, "datagram from unknown peer dropped");
                    continue;
                }
                match RdtPacket::decode(&buf[..len]) {
                    Ok(pkt) => {
                        if inbound_tx.send(pkt).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "malformed packet dropped"),
                }
            }
        });

        Ok(Self {
            send_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
        })
    }
}

impl Substrate for UdpSubstrate {
    fn ready(&self) -> bool {
        self.send_tx.capacity() > 0
    }

    fn send(&self, pkt: RdtPacket) {
        // Best effort: shed under pressure.
        let _ = self.send_tx.try_send(pkt);
    }

    async fn recv(&self) -> Option<RdtPacket> {
        self.inbound_rx.lock().await.recv().await
    }
}
