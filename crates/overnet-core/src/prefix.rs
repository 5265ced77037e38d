//! Address prefixes and longest-prefix-match arithmetic.

use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;
use crate::types::NodeAddr;

/// An address prefix: a 32-bit value of which only the top `len` bits
/// are significant. `len == 0` matches every address (the default route).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct Prefix {
    value: u32,
    len: u8,
}

impl Prefix {
    /// Construct a prefix, masking off bits below the prefix length.
    ///
    /// Lengths above 32 are clamped to 32.
    pub fn new(value: u32, len: u8) -> Self {
        let len = len.min(32);
        Self {
            value: value & Self::mask(len),
            len,
        }
    }

    /// The all-matching default route, `0.0.0.0/0`.
    pub const DEFAULT: Prefix = Prefix { value: 0, len: 0 };

    fn mask(len: u8) -> u32 {
        if len == 0 {
            0
        } else {
            u32::MAX << (32 - len as u32)
        }
    }

    /// Prefix length in bits.
    #[must_use]
    pub fn len(&self) -> u8 {
        self.len
    }

    /// The masked prefix value.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.value
    }

    /// True iff the top `len` bits of `adr` equal this prefix.
    #[must_use]
    pub fn matches(&self, adr: NodeAddr) -> bool {
        (adr.raw() & Self::mask(self.len)) == self.value
    }
}

impl FromStr for Prefix {
    type Err = CodecError;

    /// Parse `a.b.c.d/len` notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (adr, len) = s
            .split_once('/')
            .ok_or_else(|| CodecError::InvalidPrefix(s.to_string()))?;
        let adr: NodeAddr = adr
            .parse()
            .map_err(|_| CodecError::InvalidPrefix(s.to_string()))?;
        let len: u8 = len
            .parse()
            .map_err(|_| CodecError::InvalidPrefix(s.to_string()))?;
        if len > 32 {
            return Err(CodecError::InvalidPrefix(s.to_string()));
        }
        Ok(Self::new(adr.raw(), len))
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", NodeAddr::new(self.value), self.len)
    }
}

impl fmt::Debug for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Prefix({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adr(s: &str) -> NodeAddr {
        s.parse().unwrap()
    }

    #[test]
    fn default_route_matches_everything() {
        assert!(Prefix::DEFAULT.matches(adr("0.0.0.0")));
        assert!(Prefix::DEFAULT.matches(adr("255.255.255.255")));
        assert!(Prefix::DEFAULT.matches(adr("10.1.2.3")));
    }

    #[test]
    fn slash16_matches_only_its_block() {
        let pfx: Prefix = "10.1.0.0/16".parse().unwrap();
        assert!(pfx.matches(adr("10.1.0.0")));
        assert!(pfx.matches(adr("10.1.255.255")));
        assert!(!pfx.matches(adr("10.2.0.0")));
        assert!(!pfx.matches(adr("11.1.0.0")));
    }

    #[test]
    fn slash32_matches_single_host() {
        let pfx: Prefix = "10.1.2.3/32".parse().unwrap();
        assert!(pfx.matches(adr("10.1.2.3")));
        assert!(!pfx.matches(adr("10.1.2.4")));
        assert!(!pfx.matches(adr("10.1.2.2")));
    }

    #[test]
    fn constructor_masks_low_bits() {
        // 10.1.2.3/16 normalizes to 10.1.0.0/16
        let pfx = Prefix::new(0x0A01_0203, 16);
        assert_eq!(pfx.to_string(), "10.1.0.0/16");
        let parsed: Prefix = "10.1.0.0/16".parse().unwrap();
        assert_eq!(pfx, parsed);
    }

    #[test]
    fn parse_and_display_roundtrip() {
        for s in ["0.0.0.0/0", "10.1.0.0/16", "1.2.0.0/16", "10.1.2.3/32"] {
            let pfx: Prefix = s.parse().unwrap();
            assert_eq!(pfx.to_string(), s);
        }
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!("10.1.0.0".parse::<Prefix>().is_err());
        assert!("10.1.0.0/33".parse::<Prefix>().is_err());
        assert!("10.1.0.0/x".parse::<Prefix>().is_err());
        assert!("10.1.0/16".parse::<Prefix>().is_err());
        assert!("/16".parse::<Prefix>().is_err());
    }

    #[test]
    fn length_clamped_to_32() {
        let pfx = Prefix::new(0xFFFF_FFFF, 40);
        assert_eq!(pfx.len(), 32);
        assert!(pfx.matches(adr("255.255.255.255")));
    }
}
