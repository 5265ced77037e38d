//! Path-vector protocol state.
//!
//! [`RouterState`] is deliberately decoupled from I/O: it tracks link
//! health, costs, and the routing table, and every handler returns an
//! [`Actions`] list that the [`crate::Router`] driver acts on. Times are
//! seconds since the daemon started, supplied by the caller.

use std::fmt::Write as _;

use overnet_core::control::{ControlMsg, LinkFailure, PathVector};
use overnet_core::{NodeAddr, Packet, Prefix};

/// EWMA weight for new round-trip samples.
const ALPHA: f64 = 0.1;

/// Hello health counter value after a reply is received.
const HELLO_STATE_MAX: u8 = 3;

/// Per-link state for one neighbor.
#[derive(Debug, Clone)]
pub struct LinkInfo {
    /// Neighbor's overlay address.
    pub peer: NodeAddr,
    /// Current link cost estimate in seconds (EWMA of rtt/2).
    pub cost: f64,
    /// Set when a hello reply arrived within the current interval.
    pub got_reply: bool,
    /// Decaying health counter; 0 means the link is down.
    pub hello_state: u8,

    // Cost statistics over all successful hello round-trips.
    pub count: u64,
    pub total_cost: f64,
    pub min_cost: f64,
    pub max_cost: f64,
}

impl LinkInfo {
    pub fn new(peer: NodeAddr, initial_cost: f64) -> Self {
        Self {
            peer,
            cost: initial_cost,
            got_reply: true,
            hello_state: HELLO_STATE_MAX,
            count: 0,
            total_cost: 0.0,
            min_cost: 10.0,
            max_cost: 0.0,
        }
    }

    /// Whether the link is currently considered up.
    #[must_use]
    pub fn is_up(&self) -> bool {
        self.hello_state > 0
    }
}

/// Routing table entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub prefix: Prefix,
    /// Time the route was generated, in seconds.
    pub timestamp: f64,
    /// Path cost in seconds.
    pub cost: f64,
    /// Router addresses along the path, destination last.
    pub path: Vec<NodeAddr>,
    /// Outgoing link for this route.
    pub out_link: usize,
    pub valid: bool,
}

/// A control packet to transmit on a specific link.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub packet: Packet,
    pub link: usize,
}

/// What a state transition asks the driver to do.
#[derive(Debug, Clone, Default)]
pub struct Actions {
    /// Control packets to hand to the forwarder.
    pub outbound: Vec<Outbound>,
    /// Forwarding-table updates, applied before the next dispatch cycle.
    pub fib_updates: Vec<(Prefix, usize)>,
}

impl Actions {
    fn merge(&mut self, other: Actions) {
        self.outbound.extend(other.outbound);
        self.fib_updates.extend(other.fib_updates);
    }
}

/// Path-vector routing state for one overlay node.
#[must_use]
pub struct RouterState {
    my_adr: NodeAddr,
    /// Prefixes owned by this router; the first is advertised.
    prefixes: Vec<Prefix>,
    links: Vec<LinkInfo>,
    routes: Vec<Route>,
    /// Whether link-failure advertisements are emitted.
    enable_fadvert: bool,
}

impl RouterState {
    pub fn new(
        my_adr: NodeAddr,
        prefixes: Vec<Prefix>,
        neighbors: Vec<(NodeAddr, f64)>,
        enable_fadvert: bool,
    ) -> Self {
        let links = neighbors
            .into_iter()
            .map(|(peer, cost)| LinkInfo::new(peer, cost))
            .collect();
        Self {
            my_adr,
            prefixes,
            links,
            routes: Vec::new(),
            enable_fadvert,
        }
    }

    #[must_use]
    pub fn links(&self) -> &[LinkInfo] {
        &self.links
    }

    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    // ------------------------------------------------------------------ //
    // Hello subprotocol
    // ------------------------------------------------------------------ //

    /// One hello round: age link health, invalidate routes through dead
    /// links, then emit a hello on every link.
    pub fn send_hellos(&mut self, now: f64) -> Actions {
        let mut actions = Actions::default();
        for lnk in 0..self.links.len() {
            if !self.links[lnk].got_reply && self.links[lnk].hello_state > 0 {
                self.links[lnk].hello_state -= 1;
            }
            if self.links[lnk].hello_state == 0 {
                let peer = self.links[lnk].peer;
                let mut failed_routes = 0;
                for rte in &mut self.routes {
                    if rte.path.first() == Some(&peer) {
                        rte.valid = false;
                        failed_routes += 1;
                    }
                }
                if failed_routes > 0 {
                    tracing::debug!(link = lnk, %peer, table = %self.table_string(now),
                        "link down, routes invalidated");
                }
                if self.enable_fadvert {
                    // One advertisement per invalidated route, re-sent
                    // every hello round while the link stays down.
                    for _ in 0..failed_routes {
                        actions.merge(self.send_failure_advert(lnk, now));
                    }
                }
            }
            self.links[lnk].got_reply = false;
            actions.outbound.push(Outbound {
                packet: Packet::control(
                    self.my_adr,
                    self.links[lnk].peer,
                    ControlMsg::emit_hello(now),
                ),
                link: lnk,
            });
        }
        actions
    }

    /// Originate an advertisement for our own prefix on every link.
    ///
    /// Routers advertise a single configured prefix, so only the first
    /// entry of the prefix list is used.
    pub fn send_adverts(&self, now: f64) -> Actions {
        let mut actions = Actions::default();
        let prefix = self.prefixes[0];
        for (lnk, link) in self.links.iter().enumerate() {
            actions.outbound.push(Outbound {
                packet: Packet::control(
                    self.my_adr,
                    link.peer,
                    ControlMsg::emit_origin_advert(prefix, now, self.my_adr),
                ),
                link: lnk,
            });
        }
        actions
    }

    /// Advertise the failure of `failed_link` to every live neighbor.
    pub fn send_failure_advert(&self, failed_link: usize, now: f64) -> Actions {
        let fail_peer = self.links[failed_link].peer;
        let lf = LinkFailure {
            from: self.my_adr,
            to: fail_peer,
            timestamp: now,
            path: vec![self.my_adr],
        };
        let mut actions = Actions::default();
        for (lnk, link) in self.links.iter().enumerate() {
            if !link.is_up() {
                continue;
            }
            actions.outbound.push(Outbound {
                packet: Packet::control(self.my_adr, link.peer, ControlMsg::emit_link_failure(&lf)),
                link: lnk,
            });
        }
        actions
    }

    // ------------------------------------------------------------------ //
    // Inbound control traffic
    // ------------------------------------------------------------------ //

    /// Process a control packet received on `lnk`.
    pub fn handle_incoming(&mut self, pkt: &Packet, lnk: usize, now: f64) -> Actions {
        let msg = match ControlMsg::parse(&pkt.payload) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::warn!(link = lnk, error = %e, "dropping malformed control packet");
                return Actions::default();
            }
        };
        match msg {
            ControlMsg::Hello { timestamp } => {
                // Echo the original timestamp back to the sender.
                let reply = Packet::control(
                    self.my_adr,
                    self.links[lnk].peer,
                    ControlMsg::emit_hello_reply(timestamp),
                );
                Actions {
                    outbound: vec![Outbound { packet: reply, link: lnk }],
                    fib_updates: Vec::new(),
                }
            }
            ControlMsg::HelloReply { timestamp } => {
                self.handle_hello_reply(lnk, timestamp, now);
                Actions::default()
            }
            ControlMsg::Advert(pv) => self.handle_advert(pv, lnk, now),
            ControlMsg::LinkFailure(lf) => self.handle_failure_advert(lf, lnk, now),
        }
    }

    /// A reply to one of our hellos: fold the measured round trip into
    /// the link cost and restore link health.
    fn handle_hello_reply(&mut self, lnk: usize, sent_at: f64, now: f64) {
        let rtt = now - sent_at;
        let link = &mut self.links[lnk];
        let cost = (1.0 - ALPHA) * link.cost + ALPHA * (rtt / 2.0);
        link.cost = cost;
        link.count += 1;
        link.total_cost += cost;
        link.min_cost = link.min_cost.min(cost);
        link.max_cost = link.max_cost.max(cost);
        link.hello_state = HELLO_STATE_MAX;
        link.got_reply = true;
        tracing::trace!(link = lnk, rtt, cost, "hello reply");
    }

    /// Process a path-vector advertisement received on `lnk`.
    fn handle_advert(&mut self, pv: PathVector, lnk: usize, now: f64) -> Actions {
        // Loop prevention: drop adverts whose path already contains us.
        if pv.path.contains(&self.my_adr) {
            tracing::trace!(prefix = %pv.prefix, "dropping looping advert");
            return Actions::default();
        }
        let nu = Route {
            prefix: pv.prefix,
            timestamp: pv.timestamp,
            cost: pv.cost + self.links[lnk].cost,
            path: pv.path,
            out_link: lnk,
            valid: true,
        };
        let mut actions = Actions::default();
        let (changed, fib_update) = self.update_route(nu.clone(), now);
        actions.fib_updates.extend(fib_update);
        if changed {
            // Extend the path vector with our own address and propagate
            // to every other live neighbor.
            let mut path = Vec::with_capacity(nu.path.len() + 1);
            path.push(self.my_adr);
            path.extend_from_slice(&nu.path);
            let advert = PathVector {
                prefix: nu.prefix,
                timestamp: nu.timestamp,
                cost: nu.cost,
                path,
            };
            for (lk, link) in self.links.iter().enumerate() {
                if lk == lnk || !link.is_up() {
                    continue;
                }
                actions.outbound.push(Outbound {
                    packet: Packet::control(
                        self.my_adr,
                        link.peer,
                        ControlMsg::emit_advert(&advert),
                    ),
                    link: lk,
                });
            }
        }
        actions
    }

    /// Apply the route-update policy.
    ///
    /// Returns whether the table changed and, when the outgoing link
    /// changed, the forwarding-table update to apply. In priority order:
    /// a route over a dead link is ignored; a new prefix is inserted; an
    /// invalid route is revived; a same-path-same-link route refreshes
    /// timestamp and cost; a much cheaper (< 0.9×), much newer (≥ 20 s),
    /// or dead-link route is replaced; anything else is rejected.
    fn update_route(&mut self, nu: Route, now: f64) -> (bool, Option<(Prefix, usize)>) {
        if !self.links[nu.out_link].is_up() {
            return (false, None);
        }
        let mut changed = true;
        let mut path_changed = false;
        let mut link_changed = false;
        match self.routes.iter().position(|r| r.prefix == nu.prefix) {
            None => {
                self.routes.push(nu.clone());
                path_changed = true;
                link_changed = true;
            }
            Some(i) => {
                let old_link_down = !self.links[self.routes[i].out_link].is_up();
                let rte = &mut self.routes[i];
                if !rte.valid {
                    rte.timestamp = nu.timestamp;
                    rte.cost = nu.cost;
                    if rte.path != nu.path {
                        rte.path = nu.path.clone();
                        path_changed = true;
                    }
                    if rte.out_link != nu.out_link {
                        rte.out_link = nu.out_link;
                        link_changed = true;
                    }
                    rte.valid = true;
                } else if rte.path == nu.path && rte.out_link == nu.out_link {
                    rte.timestamp = nu.timestamp;
                    rte.cost = nu.cost;
                } else if nu.cost < 0.9 * rte.cost
                    || nu.timestamp - rte.timestamp >= 20.0
                    || old_link_down
                {
                    rte.timestamp = nu.timestamp;
                    rte.cost = nu.cost;
                    if rte.path != nu.path {
                        rte.path = nu.path.clone();
                        path_changed = true;
                    }
                    if rte.out_link != nu.out_link {
                        rte.out_link = nu.out_link;
                        link_changed = true;
                    }
                    rte.valid = true;
                } else {
                    changed = false;
                }
            }
        }
        if path_changed {
            tracing::debug!(table = %self.table_string(now), "routing table path change");
        }
        // The data plane follows the control plane whenever the link
        // changed, even if the existing entry already used this link.
        let fib = link_changed.then_some((nu.prefix, nu.out_link));
        (changed, fib)
    }

    /// Process a link-failure advertisement received on `lnk`.
    fn handle_failure_advert(&mut self, lf: LinkFailure, lnk: usize, now: f64) -> Actions {
        if lf.path.contains(&self.my_adr) {
            tracing::trace!("dropping looping failure advert");
            return Actions::default();
        }
        let mut changed = false;
        for rte in &mut self.routes {
            for pair in rte.path.windows(2) {
                if pair[0] == lf.from && pair[1] == lf.to {
                    rte.valid = false;
                    rte.timestamp = now;
                    changed = true;
                    break;
                }
            }
        }
        let mut actions = Actions::default();
        if changed {
            tracing::debug!(from = %lf.from, to = %lf.to, table = %self.table_string(now),
                "routes invalidated by failure advert");
            let mut path = Vec::with_capacity(lf.path.len() + 1);
            path.push(self.my_adr);
            path.extend_from_slice(&lf.path);
            let forwarded = LinkFailure {
                from: lf.from,
                to: lf.to,
                timestamp: lf.timestamp,
                path,
            };
            for (lk, link) in self.links.iter().enumerate() {
                if lk == lnk || !link.is_up() {
                    continue;
                }
                actions.outbound.push(Outbound {
                    packet: Packet::control(
                        self.my_adr,
                        link.peer,
                        ControlMsg::emit_link_failure(&forwarded),
                    ),
                    link: lk,
                });
            }
        }
        actions
    }

    // ------------------------------------------------------------------ //
    // Reporting
    // ------------------------------------------------------------------ //

    /// Render the routing table for log output.
    #[must_use]
    pub fn table_string(&self, now: f64) -> String {
        let mut s = format!(
            "Routing table ({now:.3})\n{:>10} {:>10} {:>8} {:>5} {:>10} \t path\n",
            "prefix", "timestamp", "cost", "link", "VLD/INVLD"
        );
        for rte in &self.routes {
            let _ = write!(
                s,
                "{:>10} {:>10.3} {:>8.3} {:>5} {:>10}",
                rte.prefix.to_string(),
                rte.timestamp,
                rte.cost,
                rte.out_link,
                if rte.valid { "valid" } else { "invalid" }
            );
            for hop in &rte.path {
                let _ = write!(s, " {hop}");
            }
            if !self.links[rte.out_link].is_up() {
                let _ = write!(s, "\t ** disabled link");
            }
            s.push('\n');
        }
        s
    }

    /// Render the per-link cost statistics table, logged at shutdown.
    #[must_use]
    pub fn stats_string(&self) -> String {
        let mut s = format!(
            "Router link cost statistics\n{:>8} {:>8} {:>8} {:>8} {:>8}\n",
            "peerIp", "count", "avgCost", "minCost", "maxCost"
        );
        for link in &self.links {
            if link.count == 0 {
                continue;
            }
            let _ = writeln!(
                s,
                "{:>8} {:>8} {:>8.3} {:>8.3} {:>8.3}",
                link.peer.to_string(),
                link.count,
                link.total_cost / link.count as f64,
                link.min_cost,
                link.max_cost
            );
        }
        s
    }
}
