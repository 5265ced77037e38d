//! TOML-based configuration for overlay router nodes.

use std::net::SocketAddr;
use std::path::Path;

use serde::Deserialize;

use overnet_core::{NodeAddr, Prefix};

use crate::error::NodeError;

/// Top-level router node configuration loaded from a TOML file.
#[derive(Debug, Deserialize)]
pub struct RouterConfig {
    pub node: NodeSection,
    #[serde(default)]
    pub neighbors: Vec<NeighborEntry>,
    pub source: Option<SourceSection>,
}

/// The `[node]` section.
#[derive(Debug, Deserialize)]
pub struct NodeSection {
    /// This node's overlay address, dotted quad.
    pub my_ip: String,
    /// UDP socket the substrate binds.
    pub bind: String,
    /// Prefixes owned by this router; the first is advertised.
    pub prefixes: Vec<String>,
    /// Whether link-failure advertisements are sent.
    #[serde(default)]
    pub failure_adverts: bool,
}

/// A `[[neighbors]]` entry; list order assigns link numbers.
#[derive(Debug, Deserialize)]
pub struct NeighborEntry {
    /// Neighbor's overlay address, dotted quad.
    pub peer_ip: String,
    /// Neighbor's substrate socket address.
    pub address: String,
    /// Initial link cost estimate in seconds.
    #[serde(default)]
    pub cost: f64,
}

/// The optional `[source]` section: periodic test traffic.
#[derive(Debug, Deserialize)]
pub struct SourceSection {
    /// Destination overlay address, dotted quad.
    pub dest: String,
    pub payload: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    5
}

impl RouterConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("failed to read config file: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, NodeError> {
        let config: Self =
            toml::from_str(s).map_err(|e| NodeError::Config(format!("failed to parse config: {e}")))?;
        if config.node.prefixes.is_empty() {
            return Err(NodeError::Config(
                "at least one prefix must be configured".to_string(),
            ));
        }
        if config.neighbors.is_empty() {
            return Err(NodeError::Config(
                "at least one neighbor must be configured".to_string(),
            ));
        }
        Ok(config)
    }

    /// This node's overlay address.
    pub fn my_adr(&self) -> Result<NodeAddr, NodeError> {
        Ok(self.node.my_ip.parse()?)
    }

    /// The configured prefixes, first one advertised.
    pub fn prefixes(&self) -> Result<Vec<Prefix>, NodeError> {
        self.node
            .prefixes
            .iter()
            .map(|p| p.parse().map_err(NodeError::Codec))
            .collect()
    }

    /// The substrate bind address.
    pub fn bind_addr(&self) -> Result<SocketAddr, NodeError> {
        self.node
            .bind
            .parse()
            .map_err(|e| NodeError::Config(format!("invalid bind address `{}`: {e}", self.node.bind)))
    }

    /// Per-link neighbor state: `(overlay address, initial cost)`,
    /// indexed by link number.
    pub fn neighbor_links(&self) -> Result<Vec<(NodeAddr, f64)>, NodeError> {
        self.neighbors
            .iter()
            .map(|n| Ok((n.peer_ip.parse()?, n.cost)))
            .collect()
    }

    /// Per-link substrate peer addresses, indexed by link number.
    pub fn neighbor_addrs(&self) -> Result<Vec<SocketAddr>, NodeError> {
        self.neighbors
            .iter()
            .map(|n| {
                n.address.parse().map_err(|e| {
                    NodeError::Config(format!("invalid neighbor address `{}`: {e}", n.address))
                })
            })
            .collect()
    }
}
