//! One-shot DHT client operations.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use tokio::net::UdpSocket;

use overnet_core::dht::wire::DhtPacket;

use crate::error::DhtError;
use crate::server::read_peer_addr;

/// Tag carried by client requests and echoed in replies.
const CLIENT_TAG: &str = "12345";

/// How long to wait for the server's reply.
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Read the server address from its configuration file.
pub fn server_addr(cfg_file: &Path) -> Result<SocketAddr, DhtError> {
    read_peer_addr(cfg_file)
}

/// Perform one get or put against the server and return its reply.
///
/// A put with `value = None` removes the pair.
pub async fn request(
    my_ip: IpAddr,
    server: SocketAddr,
    op: &str,
    key: &str,
    value: Option<&str>,
) -> Result<DhtPacket, DhtError> {
    let socket = UdpSocket::bind((my_ip, 0)).await?;

    let mut p = DhtPacket::new(op);
    p.tag = Some(CLIENT_TAG.to_string());
    p.key = Some(key.to_string());
    p.val = value.map(str::to_string);
    socket.send_to(p.emit().as_bytes(), server).await?;
    tracing::debug!(%server, op, key, "request sent");

    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(REPLY_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .map_err(|_| DhtError::Timeout)??;
    let text = std::str::from_utf8(&buf[..len])
        .map_err(|_| DhtError::Config("reply is not valid UTF-8".to_string()))?;
    let reply = DhtPacket::parse(text)?;
    if reply.ty == "failure" {
        return Err(DhtError::Failure(
            reply.reason.unwrap_or_else(|| "unspecified".to_string()),
        ));
    }
    Ok(reply)
}
