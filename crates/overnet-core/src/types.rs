//! Newtype wrapper for overlay node addresses.
//!
//! Overlay addresses are 32-bit values with the usual dotted-quad text
//! form. The newtype keeps them from mixing with link numbers, hash
//! values, and other plain integers in the routing code.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::CodecError;

/// A node address in the overlay network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[must_use]
pub struct NodeAddr(pub u32);

impl NodeAddr {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw 32-bit address value.
    #[must_use]
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl From<Ipv4Addr> for NodeAddr {
    fn from(ip: Ipv4Addr) -> Self {
        Self(u32::from(ip))
    }
}

impl From<NodeAddr> for Ipv4Addr {
    fn from(adr: NodeAddr) -> Self {
        Ipv4Addr::from(adr.0)
    }
}

impl FromStr for NodeAddr {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ip: Ipv4Addr = s
            .parse()
            .map_err(|_| CodecError::InvalidAddr(s.to_string()))?;
        Ok(Self(u32::from(ip)))
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ipv4Addr::from(self.0).fmt(f)
    }
}

impl fmt::Debug for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddr({})", Ipv4Addr::from(self.0))
    }
}
