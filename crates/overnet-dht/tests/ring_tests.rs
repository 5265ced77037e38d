//! Ring membership and key placement, driven as a pure two-node
//! simulation: every handler output is routed to the addressed node,
//! the way the UDP driver would.

use std::collections::VecDeque;
use std::net::SocketAddr;

use overnet_core::dht::wire::DhtPacket;
use overnet_core::dht::{HashRange, hashit};
use overnet_dht::DhtNode;
use overnet_dht::node::Outputs;

const RING_TOP: u32 = i32::MAX as u32; // 2^31 - 1
const MID: u32 = 1 << 30; // split point of the full range

fn sock(port: u16) -> SocketAddr {
    format!("127.0.0.1:{port}").parse().unwrap()
}

struct TwoNodeRing {
    n0: DhtNode,
    n1: DhtNode,
    a0: SocketAddr,
    a1: SocketAddr,
    /// Replies that left the ring toward a client address.
    to_client: Vec<(DhtPacket, SocketAddr)>,
}

impl TwoNodeRing {
    fn new(cache: bool) -> Self {
        Self {
            n0: DhtNode::new(sock(5000), 4, cache),
            n1: DhtNode::new(sock(5001), 4, cache),
            a0: sock(5000),
            a1: sock(5001),
            to_client: Vec::new(),
        }
    }

    /// Route packets between the two nodes until the exchange settles.
    fn pump(&mut self, outputs: Outputs, from: SocketAddr) {
        let mut queue: VecDeque<(DhtPacket, SocketAddr, SocketAddr)> =
            outputs.into_iter().map(|(p, d)| (p, d, from)).collect();
        while let Some((pkt, dest, from)) = queue.pop_front() {
            let (node, here) = if dest == self.a0 {
                (&mut self.n0, self.a0)
            } else if dest == self.a1 {
                (&mut self.n1, self.a1)
            } else {
                self.to_client.push((pkt, dest));
                continue;
            };
            let out = node.handle_packet(pkt, from);
            queue.extend(out.into_iter().map(|(p, d)| (p, d, here)));
        }
    }

    /// Have n1 join the ring through n0.
    fn join(&mut self) {
        let join = self.n1.join_packet();
        let out = self.n0.handle_packet(join, self.a1);
        self.pump(out, self.a0);
        assert!(self.n1.joined());
    }

    /// Issue a client request at `entry` (0 or 1) and return the reply
    /// that reached the client.
    fn client_request(&mut self, entry: usize, p: DhtPacket, client: SocketAddr) -> DhtPacket {
        let (node, here) = if entry == 0 {
            (&mut self.n0, self.a0)
        } else {
            (&mut self.n1, self.a1)
        };
        let out = node.handle_packet(p, client);
        self.pump(out, here);
        let (reply, dest) = self.to_client.pop().expect("no reply reached the client");
        assert_eq!(dest, client);
        reply
    }
}

fn put(key: &str, val: &str) -> DhtPacket {
    let mut p = DhtPacket::new("put");
    p.tag = Some("12345".to_string());
    p.key = Some(key.to_string());
    p.val = Some(val.to_string());
    p
}

fn get(key: &str) -> DhtPacket {
    let mut p = DhtPacket::new("get");
    p.tag = Some("12345".to_string());
    p.key = Some(key.to_string());
    p
}

#[test]
fn join_splits_the_full_range_at_two_to_the_thirty() {
    let mut ring = TwoNodeRing::new(false);
    // Preload the original owner with keys on both sides of the split.
    let client = sock(6000);
    let out = ring.n0.handle_packet(put("dungeons", "dragons"), client);
    assert_eq!(out[0].0.ty, "success");
    let out = ring.n0.handle_packet(put("key", "value"), client);
    assert_eq!(out[0].0.ty, "success");
    assert!(hashit("dungeons") >= MID);
    assert!(hashit("key") < MID);

    ring.join();

    // Exact partition of [0, 2^31).
    assert_eq!(ring.n0.hash_range(), HashRange::new(0, MID - 1));
    assert_eq!(ring.n1.hash_range(), HashRange::new(MID, RING_TOP));
    assert_eq!(ring.n1.my_info().first_hash, MID);

    // Neighbors point at each other.
    assert_eq!(ring.n0.succ_info(), ring.n1.my_info());
    assert_eq!(ring.n0.pred_info(), ring.n1.my_info());
    assert_eq!(ring.n1.pred_info(), ring.n0.my_info());
    assert_eq!(ring.n1.succ_info(), ring.n0.my_info());

    // The new successor sits at slot 0 of the old owner's table.
    assert_eq!(ring.n0.routes().entries()[0], ring.n1.my_info());

    // Each key lives exactly on the node whose range covers its hash.
    assert_eq!(
        ring.n1.map().get("dungeons").map(String::as_str),
        Some("dragons")
    );
    assert!(!ring.n0.map().contains_key("dungeons"));
    assert_eq!(ring.n0.map().get("key").map(String::as_str), Some("value"));
    assert!(!ring.n1.map().contains_key("key"));
}

#[test]
fn out_of_range_put_is_relayed_and_answered_through_the_entry_node() {
    let mut ring = TwoNodeRing::new(false);
    ring.join();

    let client = sock(6000);
    // "dungeons" hashes into n1's half; the client asks n0.
    let reply = ring.client_request(0, put("dungeons", "dragons"), client);
    assert_eq!(reply.ty, "success");
    assert_eq!(reply.tag.as_deref(), Some("12345"));
    // Relay bookkeeping must not leak back to the client.
    assert!(reply.client_adr.is_none());
    assert!(reply.relay_adr.is_none());
    assert!(reply.sender_info.is_none());

    assert_eq!(
        ring.n1.map().get("dungeons").map(String::as_str),
        Some("dragons")
    );
    assert!(!ring.n0.map().contains_key("dungeons"));

    let reply = ring.client_request(0, get("dungeons"), client);
    assert_eq!(reply.ty, "success");
    assert_eq!(reply.val.as_deref(), Some("dragons"));
}

#[test]
fn relay_node_caches_successful_replies_when_enabled() {
    let mut ring = TwoNodeRing::new(true);
    ring.join();

    let client = sock(6000);
    ring.client_request(0, put("dungeons", "dragons"), client);
    // The put reply already populated the relay's cache.
    assert_eq!(
        ring.n0.cached("dungeons").map(String::as_str),
        Some("dragons")
    );

    // A later get at the relay is served from cache, straight back to
    // the immediate sender.
    let out = ring.n0.handle_packet(get("dungeons"), client);
    assert_eq!(out.len(), 1);
    assert_eq!(out[0].1, client);
    assert_eq!(out[0].0.ty, "success");
    assert_eq!(out[0].0.val.as_deref(), Some("dragons"));

    // A fresh put invalidates the stale entry on its way out, and the
    // success reply re-caches the new value on its way back.
    ring.client_request(0, put("dungeons", "wyverns"), client);
    assert_eq!(
        ring.n0.cached("dungeons").map(String::as_str),
        Some("wyverns")
    );
}

#[test]
fn leave_returns_keys_and_range_to_the_predecessor() {
    let mut ring = TwoNodeRing::new(false);
    ring.join();

    let client = sock(6000);
    ring.client_request(0, put("dungeons", "dragons"), client);
    ring.client_request(0, put("zanzibar", "island"), client);
    assert!(hashit("zanzibar") < MID, "zanzibar stays with n0");
    assert_eq!(ring.n1.map().len(), 1);

    // n1 starts its leave: the packet circles n1 → n0 → n1.
    let leave = ring.n1.leave_packet();
    let out = vec![(leave, ring.n1.succ_info().adr)];
    ring.pump(out, ring.a1);
    assert!(ring.n1.leave_complete());

    // Hand-off: updates to both neighbors plus every key.
    let out = ring.n1.finish_leave();
    ring.pump(out, ring.a1);

    assert_eq!(ring.n0.hash_range(), HashRange::FULL);
    assert!(ring.n0.is_singleton());
    assert_eq!(ring.n0.pred_info(), ring.n0.my_info());
    assert_eq!(
        ring.n0.map().get("dungeons").map(String::as_str),
        Some("dragons")
    );
    assert_eq!(
        ring.n0.map().get("zanzibar").map(String::as_str),
        Some("island")
    );
    assert!(ring.n1.map().is_empty());
    assert!(ring.n1.routes().entries().is_empty());
}
