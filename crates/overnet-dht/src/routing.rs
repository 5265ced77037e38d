//! The bounded DHT routing table.

use std::net::SocketAddr;

use overnet_core::dht::NodeInfo;

/// Size of the hash space: `2^31`.
const HASH_SPACE: u64 = 1 << 31;

/// A bounded list of `(address, firstHash)` routes.
///
/// The successor, when present, sits at index 0. When the table is
/// full, new shortcut routes evict index 1, never the successor.
#[must_use]
pub struct RouteTable {
    routes: Vec<NodeInfo>,
    num_routes: usize,
}

impl RouteTable {
    /// A table bounded to `num_routes` entries.
    pub fn new(num_routes: usize) -> Self {
        Self {
            routes: Vec::with_capacity(num_routes),
            num_routes,
        }
    }

    /// Add a route. `my_info` is never stored; the successor is pinned
    /// at index 0. Returns true when the table changed.
    pub fn add(&mut self, new_route: NodeInfo, my_info: NodeInfo, succ_info: NodeInfo) -> bool {
        if new_route == my_info {
            return false;
        }
        if self.routes.len() == self.num_routes {
            if new_route == succ_info {
                self.routes.remove(0);
                self.routes.insert(0, new_route);
            } else {
                // A table of one slot holds only the successor.
                if self.num_routes == 1 {
                    return false;
                }
                self.routes.remove(1);
                self.routes.push(new_route);
            }
        } else if new_route == succ_info {
            self.routes.insert(0, new_route);
        } else {
            self.routes.push(new_route);
        }
        tracing::debug!(routes = ?self.routes, "route table changed");
        true
    }

    /// Remove a route by value if present. Returns true when removed.
    pub fn remove(&mut self, route: &NodeInfo) -> bool {
        if let Some(pos) = self.routes.iter().position(|r| r == route) {
            self.routes.remove(pos);
            tracing::debug!(routes = ?self.routes, "route table changed");
            true
        } else {
            false
        }
    }

    /// Drop every route.
    pub fn clear(&mut self) {
        self.routes.clear();
    }

    /// The stored routes, successor first when present.
    #[must_use]
    pub fn entries(&self) -> &[NodeInfo] {
        &self.routes
    }

    /// Pick the route closest below `hash` on the ring: the entry
    /// minimizing `(hash - firstHash) mod 2^31`.
    #[must_use]
    pub fn forward_target(&self, hash: u32) -> Option<SocketAddr> {
        let mut best: Option<(u64, SocketAddr)> = None;
        for route in &self.routes {
            let diff = (u64::from(hash) + HASH_SPACE - u64::from(route.first_hash)) % HASH_SPACE;
            if best.map_or(true, |(d, _)| diff < d) {
                best = Some((diff, route.adr));
            }
        }
        best.map(|(_, adr)| adr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(port: u16, hash: u32) -> NodeInfo {
        NodeInfo::new(format!("10.0.0.1:{port}").parse().unwrap(), hash)
    }

    #[test]
    fn own_info_is_never_stored() {
        let me = info(1, 0);
        let succ = info(2, 100);
        let mut tbl = RouteTable::new(4);
        assert!(!tbl.add(me, me, succ));
        assert!(tbl.entries().is_empty());
    }

    #[test]
    fn successor_is_pinned_at_index_zero() {
        let me = info(1, 0);
        let succ = info(2, 100);
        let mut tbl = RouteTable::new(4);
        tbl.add(info(3, 200), me, succ);
        tbl.add(succ, me, succ);
        assert_eq!(tbl.entries()[0], succ);
        assert_eq!(tbl.entries().len(), 2);
    }

    #[test]
    fn full_table_evicts_index_one_for_shortcuts() {
        let me = info(1, 0);
        let succ = info(2, 100);
        let mut tbl = RouteTable::new(3);
        tbl.add(succ, me, succ);
        tbl.add(info(3, 200), me, succ);
        tbl.add(info(4, 300), me, succ);
        assert_eq!(tbl.entries().len(), 3);

        // Full: the next shortcut displaces index 1, not the successor.
        tbl.add(info(5, 400), me, succ);
        assert_eq!(tbl.entries().len(), 3);
        assert_eq!(tbl.entries()[0], succ);
        assert_eq!(tbl.entries()[1], info(4, 300));
        assert_eq!(tbl.entries()[2], info(5, 400));
    }

    #[test]
    fn full_table_replaces_successor_in_place() {
        let me = info(1, 0);
        let succ = info(2, 100);
        let mut tbl = RouteTable::new(2);
        tbl.add(succ, me, succ);
        tbl.add(info(3, 200), me, succ);

        let new_succ = info(4, 150);
        tbl.add(new_succ, me, new_succ);
        assert_eq!(tbl.entries()[0], new_succ);
        assert_eq!(tbl.entries().len(), 2);
    }

    #[test]
    fn single_slot_table_only_ever_holds_the_successor() {
        let me = info(1, 0);
        let succ = info(2, 100);
        let mut tbl = RouteTable::new(1);
        tbl.add(succ, me, succ);
        assert!(!tbl.add(info(3, 200), me, succ));
        assert_eq!(tbl.entries(), &[succ]);
    }

    #[test]
    fn remove_by_value() {
        let me = info(1, 0);
        let succ = info(2, 100);
        let mut tbl = RouteTable::new(4);
        tbl.add(succ, me, succ);
        tbl.add(info(3, 200), me, succ);

        assert!(tbl.remove(&info(3, 200)));
        assert!(!tbl.remove(&info(3, 200)));
        assert_eq!(tbl.entries(), &[succ]);
    }

    #[test]
    fn forward_picks_closest_predecessor() {
        let me = info(1, 0);
        let succ = info(2, 100);
        let mut tbl = RouteTable::new(4);
        tbl.add(succ, me, succ); // firstHash 100
        tbl.add(info(3, 1000), me, succ);
        tbl.add(info(4, 500_000), me, succ);

        // hash 600 → best is firstHash 100 (diff 500); 1000 would wrap.
        assert_eq!(tbl.forward_target(600), Some(info(2, 100).adr));
        // hash 2000 → best is firstHash 1000.
        assert_eq!(tbl.forward_target(2000), Some(info(3, 1000).adr));
        // hash 600_000 → best is firstHash 500_000.
        assert_eq!(tbl.forward_target(600_000), Some(info(4, 500_000).adr));
    }

    #[test]
    fn forward_wraps_around_the_ring() {
        let me = info(1, 0);
        let succ = info(2, 2_000_000_000);
        let mut tbl = RouteTable::new(4);
        tbl.add(succ, me, succ);
        tbl.add(info(3, 1_000_000), me, succ);

        // hash 50 sits just past the top of the ring; the entry at
        // 2_000_000_000 is the closest predecessor across the wrap.
        assert_eq!(tbl.forward_target(50), Some(info(2, 2_000_000_000).adr));
    }

    #[test]
    fn forward_on_empty_table_is_none() {
        let tbl = RouteTable::new(4);
        assert_eq!(tbl.forward_target(123), None);
    }
}
