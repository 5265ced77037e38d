//! The forwarding table: prefix → outgoing link, longest match wins.

use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use overnet_core::{NodeAddr, Prefix};

/// Forwarding table mapping prefixes to link numbers.
///
/// At most one entry exists per distinct prefix. The table starts with
/// the default route `0.0.0.0/0 → 0`, so a lookup only fails once the
/// table has been emptied of matching entries.
#[must_use]
pub struct ForwardingTable {
    entries: Vec<(Prefix, usize)>,
}

impl ForwardingTable {
    /// New table holding only the default route to link 0.
    pub fn new() -> Self {
        Self {
            entries: vec![(Prefix::DEFAULT, 0)],
        }
    }

    /// Add a route, replacing the link of an existing entry with the
    /// same prefix.
    pub fn add_route(&mut self, prefix: Prefix, link: usize) {
        for entry in &mut self.entries {
            if entry.0 == prefix {
                entry.1 = link;
                return;
            }
        }
        self.entries.push((prefix, link));
    }

    /// Look up the link for the longest matching prefix.
    ///
    /// Ties on length go to the earliest insertion. Returns `None` only
    /// when no entry matches at all.
    #[must_use]
    pub fn lookup(&self, adr: NodeAddr) -> Option<usize> {
        let mut best_len: i32 = -1;
        let mut best_link = None;
        for (prefix, link) in &self.entries {
            if prefix.matches(adr) && i32::from(prefix.len()) > best_len {
                best_len = i32::from(prefix.len());
                best_link = Some(*link);
            }
        }
        best_link
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Render the table for log output.
    #[must_use]
    pub fn table_string(&self) -> String {
        let mut s = String::from("Forwarding table\n");
        for (prefix, link) in &self.entries {
            let _ = writeln!(s, "{prefix} {link}");
        }
        s
    }
}

impl Default for ForwardingTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a forwarding table shared between the forwarder loop and
/// the routing daemon. `add_route`, `lookup`, and `table_string` are
/// mutually exclusive.
#[derive(Clone)]
#[must_use]
pub struct SharedTable(Arc<Mutex<ForwardingTable>>);

impl SharedTable {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(ForwardingTable::new())))
    }

    pub fn add_route(&self, prefix: Prefix, link: usize) {
        self.0.lock().expect("forwarding table poisoned").add_route(prefix, link);
    }

    #[must_use]
    pub fn lookup(&self, adr: NodeAddr) -> Option<usize> {
        self.0.lock().expect("forwarding table poisoned").lookup(adr)
    }

    #[must_use]
    pub fn table_string(&self) -> String {
        self.0
            .lock()
            .expect("forwarding table poisoned")
            .table_string()
    }
}

impl Default for SharedTable {
    fn default() -> Self {
        Self::new()
    }
}
