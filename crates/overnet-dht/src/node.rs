//! Pure DHT protocol state and handlers.
//!
//! [`DhtNode`] never touches a socket: every handler returns the list
//! of `(packet, destination)` pairs the server should transmit. That
//! keeps ring-membership and key-placement logic testable without I/O.

use std::collections::HashMap;
use std::net::SocketAddr;

use overnet_core::dht::wire::DhtPacket;
use overnet_core::dht::{HashRange, NodeInfo, hashit};

/// Packets to transmit, produced by a handler.
pub type Outputs = Vec<(DhtPacket, SocketAddr)>;

/// One DHT server's protocol state.
#[must_use]
pub struct DhtNode {
    my_adr: SocketAddr,
    my_info: NodeInfo,
    pred_info: NodeInfo,
    succ_info: NodeInfo,
    hash_range: HashRange,
    map: HashMap<String, String>,
    /// Present iff the caching feature is enabled.
    cache: Option<HashMap<String, String>>,
    routes: crate::routing::RouteTable,
    send_tag: u64,
    /// Set once a join success has installed our range.
    joined: bool,
    /// Set once our own leave packet has circled the ring.
    leave_complete: bool,
}

impl DhtNode {
    /// A fresh node owning the whole hash space (the first node of a
    /// ring, or a joiner before its `join` handshake completes).
    pub fn new(my_adr: SocketAddr, num_routes: usize, cache_enabled: bool) -> Self {
        let my_info = NodeInfo::new(my_adr, 0);
        Self {
            my_adr,
            my_info,
            pred_info: my_info,
            succ_info: my_info,
            hash_range: HashRange::FULL,
            map: HashMap::new(),
            cache: cache_enabled.then(HashMap::new),
            routes: crate::routing::RouteTable::new(num_routes),
            send_tag: 12345,
            joined: false,
            leave_complete: false,
        }
    }

    #[must_use]
    pub fn my_info(&self) -> NodeInfo {
        self.my_info
    }

    #[must_use]
    pub fn pred_info(&self) -> NodeInfo {
        self.pred_info
    }

    #[must_use]
    pub fn succ_info(&self) -> NodeInfo {
        self.succ_info
    }

    #[must_use]
    pub fn hash_range(&self) -> HashRange {
        self.hash_range
    }

    #[must_use]
    pub fn routes(&self) -> &crate::routing::RouteTable {
        &self.routes
    }

    #[must_use]
    pub fn map(&self) -> &HashMap<String, String> {
        &self.map
    }

    #[must_use]
    pub fn cached(&self, key: &str) -> Option<&String> {
        self.cache.as_ref().and_then(|c| c.get(key))
    }

    /// True once a join success has installed our range.
    #[must_use]
    pub fn joined(&self) -> bool {
        self.joined
    }

    /// True once our own leave packet has circled back.
    #[must_use]
    pub fn leave_complete(&self) -> bool {
        self.leave_complete
    }

    /// True iff this node is alone on the ring.
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.succ_info == self.my_info
    }

    fn next_tag(&mut self) -> String {
        let tag = self.send_tag;
        self.send_tag += 1;
        tag.to_string()
    }

    // ------------------------------------------------------------------ //
    // Membership
    // ------------------------------------------------------------------ //

    /// The join request this node sends to its chosen predecessor.
    pub fn join_packet(&mut self) -> DhtPacket {
        let mut p = DhtPacket::new("join");
        p.tag = Some(self.next_tag());
        p
    }

    /// The leave request this node sends to its successor to start the
    /// circle-back.
    pub fn leave_packet(&mut self) -> DhtPacket {
        let mut p = DhtPacket::new("leave");
        p.tag = Some(self.next_tag());
        p.sender_info = Some(self.my_info);
        p
    }

    /// Dispatch a validated inbound packet.
    ///
    /// Any packet carrying `senderInfo`, except a leave, teaches us a
    /// shortcut route.
    pub fn handle_packet(&mut self, p: DhtPacket, sender: SocketAddr) -> Outputs {
        if let Some(info) = p.sender_info {
            if p.ty != "leave" {
                self.add_route(info);
            }
        }
        match p.ty.as_str() {
            "get" => self.handle_get(p, sender),
            "put" => self.handle_put(p, sender),
            "transfer" => self.handle_xfer(p),
            "success" | "no match" | "failure" => self.handle_reply(p),
            "join" => self.handle_join(p, sender),
            "update" => self.handle_update(p),
            "leave" => self.handle_leave(p),
            other => {
                tracing::warn!(ty = other, "unhandled packet type");
                Vec::new()
            }
        }
    }

    /// A prospective node wants in: split our range at the midpoint,
    /// hand the top half (and the keys in it) to the joiner, and splice
    /// it between us and our old successor.
    fn handle_join(&mut self, p: DhtPacket, joiner_adr: SocketAddr) -> Outputs {
        let mut out = Vec::new();
        let HashRange { left, right } = self.hash_range;
        let mid = left + (right - left + 1) / 2;

        let mut reply = DhtPacket::new("success");
        reply.tag = p.tag.clone();
        reply.hash_range = Some(HashRange::new(mid, right));
        reply.succ_info = Some(self.succ_info);
        reply.pred_info = Some(self.my_info);
        out.push((reply, joiner_adr));

        // Tell the old successor its predecessor is now the joiner.
        let joiner_info = NodeInfo::new(joiner_adr, mid);
        let mut update = DhtPacket::new("update");
        update.tag = Some(self.next_tag());
        update.sender_info = Some(self.my_info);
        update.pred_info = Some(joiner_info);
        out.push((update, self.succ_info.adr));

        self.succ_info = joiner_info;
        self.add_route(joiner_info);
        self.hash_range = HashRange::new(left, mid - 1);
        tracing::info!(range = %self.hash_range, succ = %self.succ_info, "split range for joiner");

        // Hand over every pair that now belongs to the joiner.
        let moved: Vec<String> = self
            .map
            .keys()
            .filter(|k| hashit(k) >= mid)
            .cloned()
            .collect();
        for key in moved {
            let val = self.map.remove(&key).expect("key just listed");
            let mut xfer = DhtPacket::new("transfer");
            xfer.tag = Some(self.next_tag());
            xfer.key = Some(key);
            xfer.val = Some(val);
            out.push((xfer, joiner_adr));
        }
        out
    }

    /// Apply predecessor/successor/range updates from a neighbor.
    fn handle_update(&mut self, p: DhtPacket) -> Outputs {
        if let Some(pred) = p.pred_info {
            self.pred_info = pred;
        }
        if let Some(succ) = p.succ_info {
            self.succ_info = succ;
            self.add_route(succ);
        }
        if let Some(range) = p.hash_range {
            self.hash_range = range;
        }
        Vec::new()
    }

    /// A leave packet circling the ring: ours means the circle is
    /// complete; anyone else's is passed along and forgotten.
    fn handle_leave(&mut self, p: DhtPacket) -> Outputs {
        let Some(leaver) = p.sender_info else {
            return Vec::new();
        };
        if leaver == self.my_info {
            self.leave_complete = true;
            return Vec::new();
        }
        let out = vec![(p, self.succ_info.adr)];
        self.remove_route(&leaver);
        out
    }

    /// After our leave has circled back: re-point the neighbors, hand
    /// every key to the predecessor, and clear local state.
    pub fn finish_leave(&mut self) -> Outputs {
        let mut out = Vec::new();

        // The predecessor absorbs our range.
        let mut update_pred = DhtPacket::new("update");
        update_pred.tag = Some(self.next_tag());
        update_pred.succ_info = Some(self.succ_info);
        update_pred.hash_range = Some(HashRange::new(
            self.pred_info.first_hash,
            self.hash_range.right,
        ));
        out.push((update_pred, self.pred_info.adr));

        let mut update_succ = DhtPacket::new("update");
        update_succ.tag = Some(self.next_tag());
        update_succ.pred_info = Some(self.pred_info);
        out.push((update_succ, self.succ_info.adr));

        let pred_adr = self.pred_info.adr;
        for (key, val) in self.map.drain() {
            let mut xfer = DhtPacket::new("transfer");
            xfer.tag = Some(self.send_tag.to_string());
            xfer.key = Some(key);
            xfer.val = Some(val);
            out.push((xfer, pred_adr));
        }
        self.send_tag += 1;
        if let Some(cache) = &mut self.cache {
            cache.clear();
        }
        self.routes.clear();
        tracing::info!("left the ring");
        out
    }

    // ------------------------------------------------------------------ //
    // Key operations
    // ------------------------------------------------------------------ //

    /// Serve or forward a get request.
    fn handle_get(&mut self, mut p: DhtPacket, sender: SocketAddr) -> Outputs {
        let Some(key) = p.key.clone() else {
            return Vec::new();
        };
        // Cache shortcut: answer the immediate sender directly, even
        // when the request came through a relay.
        if let Some(val) = self.cached(&key) {
            p.ty = "success".to_string();
            p.val = Some(val.clone());
            return vec![(p, sender)];
        }
        let hash = hashit(&key);
        if self.hash_range.contains(hash) {
            let reply_adr = match p.relay_adr {
                Some(relay) => {
                    // Answering on behalf of a relay: identify ourselves
                    // so the relay can learn a shortcut.
                    p.sender_info = Some(self.my_info);
                    relay
                }
                None => sender,
            };
            match self.map.get(&key) {
                Some(val) => {
                    p.ty = "success".to_string();
                    p.val = Some(val.clone());
                }
                None => p.ty = "no match".to_string(),
            }
            vec![(p, reply_adr)]
        } else {
            if p.relay_adr.is_none() {
                p.relay_adr = Some(self.my_adr);
                p.client_adr = Some(sender);
            }
            self.forward(p, hash)
        }
    }

    /// Apply or forward a put request. A put without a value removes
    /// the pair.
    fn handle_put(&mut self, mut p: DhtPacket, sender: SocketAddr) -> Outputs {
        let Some(key) = p.key.clone() else {
            return Vec::new();
        };
        if let Some(cache) = &mut self.cache {
            cache.remove(&key);
        }
        let hash = hashit(&key);
        if self.hash_range.contains(hash) {
            p.ty = "success".to_string();
            match &p.val {
                Some(val) => {
                    self.map.insert(key, val.clone());
                }
                None => {
                    self.map.remove(&key);
                }
            }
            let reply_adr = match p.relay_adr {
                Some(relay) => {
                    p.sender_info = Some(self.my_info);
                    relay
                }
                None => sender,
            };
            vec![(p, reply_adr)]
        } else {
            if p.relay_adr.is_none() {
                p.relay_adr = Some(self.my_adr);
                p.client_adr = Some(sender);
            }
            self.forward(p, hash)
        }
    }

    /// A transfer packet: adopt the pair, no reply.
    fn handle_xfer(&mut self, p: DhtPacket) -> Outputs {
        if let (Some(key), Some(val)) = (p.key, p.val) {
            self.map.insert(key, val);
        } else {
            tracing::warn!("transfer packet without key/value");
        }
        Vec::new()
    }

    /// A reply packet: either the success that completes our join, or
    /// a get/put response we relayed for a client.
    fn handle_reply(&mut self, mut p: DhtPacket) -> Outputs {
        if let Some(range) = p.hash_range {
            // Join success: adopt the assigned range and neighbors.
            self.hash_range = range;
            if let Some(succ) = p.succ_info {
                self.succ_info = succ;
            }
            if let Some(pred) = p.pred_info {
                self.pred_info = pred;
            }
            self.my_info = NodeInfo::new(self.my_adr, range.left);
            let succ = self.succ_info;
            self.add_route(succ);
            self.joined = true;
            tracing::info!(range = %self.hash_range, "joined the ring");
            return Vec::new();
        }

        // We are the relay: strip the routing fields and pass the
        // answer back to the client.
        let Some(client) = p.client_adr else {
            tracing::warn!("relayed reply without clientAdr");
            return Vec::new();
        };
        p.client_adr = None;
        p.relay_adr = None;
        p.sender_info = None;
        if p.ty == "success" {
            if let (Some(cache), Some(key), Some(val)) = (self.cache.as_mut(), &p.key, &p.val) {
                cache.insert(key.clone(), val.clone());
            }
        }
        vec![(p, client)]
    }

    // ------------------------------------------------------------------ //
    // Routing
    // ------------------------------------------------------------------ //

    fn add_route(&mut self, route: NodeInfo) {
        self.routes.add(route, self.my_info, self.succ_info);
    }

    fn remove_route(&mut self, route: &NodeInfo) {
        self.routes.remove(route);
    }

    /// Send `p` toward the node closest below `hash` on the ring.
    fn forward(&self, p: DhtPacket, hash: u32) -> Outputs {
        match self.routes.forward_target(hash) {
            Some(adr) => vec![(p, adr)],
            None => {
                tracing::warn!(hash, "no route to forward packet");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sock(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    fn get_packet(key: &str) -> DhtPacket {
        let mut p = DhtPacket::new("get");
        p.tag = Some("12345".to_string());
        p.key = Some(key.to_string());
        p
    }

    fn put_packet(key: &str, val: Option<&str>) -> DhtPacket {
        let mut p = DhtPacket::new("put");
        p.tag = Some("12345".to_string());
        p.key = Some(key.to_string());
        p.val = val.map(str::to_string);
        p
    }

    #[test]
    fn singleton_node_owns_the_full_range() {
        let n = DhtNode::new(sock(5000), 4, false);
        assert!(n.is_singleton());
        assert_eq!(n.hash_range(), HashRange::FULL);
        assert_eq!(n.my_info().first_hash, 0);
    }

    #[test]
    fn put_then_get_in_range() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        let client = sock(6000);

        let out = n.handle_packet(put_packet("dungeons", Some("dragons")), client);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1, client);
        assert_eq!(out[0].0.ty, "success");
        assert_eq!(n.map().get("dungeons").map(String::as_str), Some("dragons"));

        let out = n.handle_packet(get_packet("dungeons"), client);
        assert_eq!(out[0].0.ty, "success");
        assert_eq!(out[0].0.val.as_deref(), Some("dragons"));
    }

    #[test]
    fn get_of_missing_key_is_no_match() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        let out = n.handle_packet(get_packet("absent"), sock(6000));
        assert_eq!(out[0].0.ty, "no match");
        assert!(out[0].0.val.is_none());
    }

    #[test]
    fn put_without_value_removes_the_pair() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        let client = sock(6000);
        n.handle_packet(put_packet("k", Some("v")), client);
        assert!(n.map().contains_key("k"));

        let out = n.handle_packet(put_packet("k", None), client);
        assert_eq!(out[0].0.ty, "success");
        assert!(!n.map().contains_key("k"));
    }

    #[test]
    fn transfer_is_adopted_without_reply() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        let mut p = DhtPacket::new("transfer");
        p.tag = Some("1".to_string());
        p.key = Some("k".to_string());
        p.val = Some("v".to_string());
        let out = n.handle_packet(p, sock(6000));
        assert!(out.is_empty());
        assert_eq!(n.map().get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn sender_info_teaches_shortcut_routes() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        let peer = NodeInfo::new(sock(7000), 42);
        let mut p = DhtPacket::new("update");
        p.tag = Some("1".to_string());
        p.sender_info = Some(peer);
        n.handle_packet(p, sock(7000));
        assert_eq!(n.routes().entries(), &[peer]);
    }

    #[test]
    fn leave_sender_info_is_not_learned() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        let leaver = NodeInfo::new(sock(7000), 42);
        let mut p = DhtPacket::new("leave");
        p.tag = Some("1".to_string());
        p.sender_info = Some(leaver);
        n.handle_packet(p, sock(7000));
        assert!(n.routes().entries().is_empty());
    }

    #[test]
    fn own_leave_circling_back_sets_completion() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        let mut p = DhtPacket::new("leave");
        p.tag = Some("1".to_string());
        p.sender_info = Some(n.my_info());
        let out = n.handle_packet(p, sock(5000));
        assert!(out.is_empty());
        assert!(n.leave_complete());
    }

    #[test]
    fn foreign_leave_is_forwarded_then_unlearned() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        // Teach the route first, via an update.
        let leaver = NodeInfo::new(sock(7000), 42);
        let mut teach = DhtPacket::new("update");
        teach.tag = Some("1".to_string());
        teach.sender_info = Some(leaver);
        n.handle_packet(teach, sock(7000));
        assert_eq!(n.routes().entries().len(), 1);

        let mut p = DhtPacket::new("leave");
        p.tag = Some("2".to_string());
        p.sender_info = Some(leaver);
        let out = n.handle_packet(p, sock(7000));
        // Forwarded to the successor before the route is dropped.
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1, n.succ_info().adr);
        assert_eq!(out[0].0.ty, "leave");
        assert!(n.routes().entries().is_empty());
    }

    #[test]
    fn cache_shortcut_answers_the_immediate_sender() {
        let mut n = DhtNode::new(sock(5000), 4, true);
        // Shrink the range so the key is out of range; the cache must
        // still short-circuit before any range check.
        let mut update = DhtPacket::new("update");
        update.tag = Some("1".to_string());
        update.hash_range = Some(HashRange::new(0, 10));
        n.handle_packet(update, sock(5001));

        // Seed the cache through a relayed success reply.
        let mut reply = DhtPacket::new("success");
        reply.tag = Some("2".to_string());
        reply.key = Some("dungeons".to_string());
        reply.val = Some("dragons".to_string());
        reply.client_adr = Some(sock(6000));
        reply.relay_adr = Some(sock(5000));
        n.handle_packet(reply, sock(7000));
        assert_eq!(n.cached("dungeons").map(String::as_str), Some("dragons"));

        // A relayed get still gets its answer sent to the sender, not
        // the recorded client address.
        let mut p = get_packet("dungeons");
        p.relay_adr = Some(sock(8000));
        p.client_adr = Some(sock(9000));
        let relay_peer = sock(8500);
        let out = n.handle_packet(p, relay_peer);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].1, relay_peer);
        assert_eq!(out[0].0.ty, "success");
        assert_eq!(out[0].0.val.as_deref(), Some("dragons"));
    }

    #[test]
    fn put_invalidates_cache_entry() {
        let mut n = DhtNode::new(sock(5000), 4, true);
        // Seed cache via relayed reply.
        let mut reply = DhtPacket::new("success");
        reply.tag = Some("1".to_string());
        reply.key = Some("k".to_string());
        reply.val = Some("old".to_string());
        reply.client_adr = Some(sock(6000));
        n.handle_packet(reply, sock(7000));
        assert!(n.cached("k").is_some());

        n.handle_packet(put_packet("k", Some("new")), sock(6000));
        assert!(n.cached("k").is_none());
    }

    #[test]
    fn relayed_reply_is_stripped_and_returned_to_client() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        let owner = NodeInfo::new(sock(7000), 99);
        let mut reply = DhtPacket::new("success");
        reply.tag = Some("1".to_string());
        reply.key = Some("k".to_string());
        reply.val = Some("v".to_string());
        reply.client_adr = Some(sock(6000));
        reply.relay_adr = Some(sock(5000));
        reply.sender_info = Some(owner);

        let out = n.handle_packet(reply, sock(7000));
        assert_eq!(out.len(), 1);
        let (stripped, dest) = &out[0];
        assert_eq!(*dest, sock(6000));
        assert!(stripped.client_adr.is_none());
        assert!(stripped.relay_adr.is_none());
        assert!(stripped.sender_info.is_none());
        // The shortcut was learned from senderInfo on the way through.
        assert_eq!(n.routes().entries(), &[owner]);
    }

    #[test]
    fn out_of_range_request_acquires_relay_fields_once() {
        let mut n = DhtNode::new(sock(5000), 4, false);
        // Not responsible for anything above 10.
        let mut update = DhtPacket::new("update");
        update.tag = Some("1".to_string());
        update.hash_range = Some(HashRange::new(0, 10));
        update.succ_info = Some(NodeInfo::new(sock(7000), 11));
        n.handle_packet(update, sock(7000));

        let client = sock(6000);
        let out = n.handle_packet(get_packet("dungeons"), client);
        assert_eq!(out.len(), 1);
        let (fwd, dest) = &out[0];
        assert_eq!(*dest, sock(7000));
        assert_eq!(fwd.relay_adr, Some(sock(5000)));
        assert_eq!(fwd.client_adr, Some(client));

        // A second hop must not overwrite the relay bookkeeping.
        let mut n2 = DhtNode::new(sock(5001), 4, false);
        let mut update = DhtPacket::new("update");
        update.tag = Some("2".to_string());
        update.hash_range = Some(HashRange::new(0, 10));
        update.succ_info = Some(NodeInfo::new(sock(7001), 11));
        n2.handle_packet(update, sock(7001));

        let out = n2.handle_packet(out.into_iter().next().unwrap().0, sock(5000));
        let (fwd2, _) = &out[0];
        assert_eq!(fwd2.relay_adr, Some(sock(5000)));
        assert_eq!(fwd2.client_adr, Some(client));
    }
}
