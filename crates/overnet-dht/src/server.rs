//! The UDP driver for a DHT node.
//!
//! Binds one datagram socket, records its address in the configuration
//! file, optionally joins an existing ring through a predecessor, and
//! then serves packets until a termination signal starts the leave
//! sequence. Packets keep flowing while the leave circles the ring;
//! the update/transfer hand-off runs once it returns.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use tokio::net::UdpSocket;

use overnet_core::dht::wire::DhtPacket;

use crate::error::DhtError;
use crate::node::{DhtNode, Outputs};

/// Receive buffer size for DHT datagrams.
const RECV_BUFFER: usize = 4096;

/// Startup configuration for a DHT server.
#[derive(Debug, Clone)]
pub struct DhtServerConfig {
    /// Address to bind the server socket to (an ephemeral port is
    /// chosen).
    pub my_ip: IpAddr,
    /// Routing table bound, typically lg of the expected ring size.
    pub num_routes: usize,
    /// File the server writes its `<ip> <port>` line to.
    pub cfg_file: PathBuf,
    /// Whether the value cache is enabled.
    pub cache: bool,
    /// Configuration file of the predecessor to join through, if any.
    pub pred_file: Option<PathBuf>,
}

/// A running DHT server.
#[must_use]
pub struct DhtServer {
    socket: UdpSocket,
    node: DhtNode,
    predecessor: Option<SocketAddr>,
}

impl DhtServer {
    /// Bind the socket, persist our address, and read the
    /// predecessor's address if one was configured.
    pub async fn bind(config: DhtServerConfig) -> Result<Self, DhtError> {
        let socket = UdpSocket::bind((config.my_ip, 0)).await?;
        let my_adr = socket.local_addr()?;
        std::fs::write(
            &config.cfg_file,
            format!("{} {}\n", my_adr.ip(), my_adr.port()),
        )?;
        tracing::info!(%my_adr, cfg = %config.cfg_file.display(), "dht server bound");

        let predecessor = match &config.pred_file {
            Some(path) => Some(read_peer_addr(path)?),
            None => None,
        };
        Ok(Self {
            socket,
            node: DhtNode::new(my_adr, config.num_routes, config.cache),
            predecessor,
        })
    }

    /// The bound socket address.
    pub fn local_addr(&self) -> Result<SocketAddr, DhtError> {
        Ok(self.socket.local_addr()?)
    }

    /// Serve until a termination signal and the subsequent leave
    /// sequence complete.
    pub async fn run(mut self) -> Result<(), DhtError> {
        if let Some(pred) = self.predecessor {
            self.join(pred).await?;
        }

        let mut buf = vec![0u8; RECV_BUFFER];
        let mut leaving = false;
        loop {
            tokio::select! {
                _ = shutdown_signal() => {
                    if self.node.is_singleton() {
                        tracing::info!("last node leaving, nothing to hand off");
                        return Ok(());
                    }
                    if !leaving {
                        leaving = true;
                        let pkt = self.node.leave_packet();
                        let succ = self.node.succ_info().adr;
                        self.send_one(&pkt, succ).await;
                    }
                }
                recv = self.socket.recv_from(&mut buf) => {
                    let (len, sender) = match recv {
                        Ok(pair) => pair,
                        Err(e) => {
                            tracing::warn!(error = %e, "receive failed");
                            continue;
                        }
                    };
                    self.process(&buf[..len], sender).await;
                    if leaving && self.node.leave_complete() {
                        let outputs = self.node.finish_leave();
                        self.send_all(outputs).await;
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Join the ring through `pred`: send the join request and process
    /// packets until the success reply installs our range.
    async fn join(&mut self, pred: SocketAddr) -> Result<(), DhtError> {
        let pkt = self.node.join_packet();
        self.send_one(&pkt, pred).await;
        tracing::info!(%pred, "join sent, waiting for success");

        let mut buf = vec![0u8; RECV_BUFFER];
        loop {
            let (len, sender) = self.socket.recv_from(&mut buf).await?;
            let Some(p) = self.parse(&buf[..len]) else {
                continue;
            };
            if p.ty != "success" {
                continue;
            }
            let outputs = self.node.handle_packet(p, sender);
            self.send_all(outputs).await;
            if self.node.joined() {
                return Ok(());
            }
        }
    }

    /// Decode, validate, and dispatch one datagram.
    async fn process(&mut self, datagram: &[u8], sender: SocketAddr) {
        let Some(mut p) = self.parse(datagram) else {
            return;
        };
        p.ttl -= 1;
        if p.ttl < 0 {
            tracing::trace!(%sender, "ttl exhausted, packet dropped");
            return;
        }
        if let Err(reason) = p.check() {
            tracing::warn!(%sender, reason, "invalid packet");
            let mut reply = DhtPacket::new("failure");
            reply.reason = Some(reason);
            reply.tag = p.tag.clone();
            reply.ttl = p.ttl;
            self.send_one(&reply, sender).await;
            return;
        }
        tracing::debug!(%sender, ty = %p.ty, key = ?p.key, "packet received");
        let outputs = self.node.handle_packet(p, sender);
        self.send_all(outputs).await;
    }

    fn parse(&self, datagram: &[u8]) -> Option<DhtPacket> {
        let text = std::str::from_utf8(datagram).ok()?;
        match DhtPacket::parse(text) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(error = %e, "malformed packet dropped");
                None
            }
        }
    }

    async fn send_all(&self, outputs: Outputs) {
        for (pkt, dest) in outputs {
            self.send_one(&pkt, dest).await;
        }
    }

    async fn send_one(&self, pkt: &DhtPacket, dest: SocketAddr) {
        tracing::debug!(%dest, ty = %pkt.ty, "packet sent");
        if let Err(e) = self.socket.send_to(pkt.emit().as_bytes(), dest).await {
            tracing::warn!(%dest, error = %e, "send failed");
        }
    }
}

/// Read a `"<ip> <port>"` line from a peer's configuration file.
pub fn read_peer_addr(path: &std::path::Path) -> Result<SocketAddr, DhtError> {
    let content = std::fs::read_to_string(path)?;
    let mut parts = content.split_whitespace();
    let (Some(ip), Some(port)) = (parts.next(), parts.next()) else {
        return Err(DhtError::Config(format!(
            "malformed peer config file {}",
            path.display()
        )));
    };
    let ip: IpAddr = ip
        .parse()
        .map_err(|_| DhtError::Config(format!("bad ip in {}", path.display())))?;
    let port: u16 = port
        .parse()
        .map_err(|_| DhtError::Config(format!("bad port in {}", path.display())))?;
    Ok(SocketAddr::new(ip, port))
}

/// Resolves on SIGINT, and on SIGTERM where available.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to register SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
