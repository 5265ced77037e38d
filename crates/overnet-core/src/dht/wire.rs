//! The `CSE473 DHTPv0.1` packet codec.
//!
//! DHT packets are UDP payloads of ASCII text. The first line is the
//! literal protocol identifier; every following line is `field:value`,
//! split on the *first* colon only (address values contain colons of
//! their own). Unrecognized packet types survive parsing so a server
//! can echo the tag back in a `failure` reply; `check` flags them.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::CodecError;

/// The required first line of every DHT packet.
pub const DHT_HEADER: &str = "CSE473 DHTPv0.1";

/// Default time-to-live for new packets.
pub const DHT_TTL: i32 = 100;

/// The recognized packet types.
pub const DHT_TYPES: &[&str] = &[
    "get", "put", "success", "no match", "failure", "join", "leave", "transfer", "update",
];

/// A server identity: its socket address and the first hash it owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeInfo {
    pub adr: SocketAddr,
    pub first_hash: u32,
}

impl NodeInfo {
    pub fn new(adr: SocketAddr, first_hash: u32) -> Self {
        Self { adr, first_hash }
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.adr, self.first_hash)
    }
}

impl FromStr for NodeInfo {
    type Err = CodecError;

    // `ip:port:firstHash`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (adr, hash) = s.rsplit_once(':').ok_or(malformed("senderInfo", s))?;
        Ok(Self {
            adr: adr.parse().map_err(|_| malformed("senderInfo", s))?,
            first_hash: hash.parse().map_err(|_| malformed("senderInfo", s))?,
        })
    }
}

/// An inclusive range of hash values owned by one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashRange {
    pub left: u32,
    pub right: u32,
}

impl HashRange {
    /// The full hash space, `[0, 2^31 - 1]`.
    pub const FULL: HashRange = HashRange {
        left: 0,
        right: i32::MAX as u32,
    };

    pub fn new(left: u32, right: u32) -> Self {
        Self { left, right }
    }

    /// True iff `hash` falls inside this range.
    #[must_use]
    pub fn contains(&self, hash: u32) -> bool {
        self.left <= hash && hash <= self.right
    }
}

impl fmt::Display for HashRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.left, self.right)
    }
}

impl FromStr for HashRange {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lo, hi) = s.split_once(':').ok_or(malformed("hashRange", s))?;
        Ok(Self {
            left: lo.parse().map_err(|_| malformed("hashRange", s))?,
            right: hi.parse().map_err(|_| malformed("hashRange", s))?,
        })
    }
}

/// A DHT protocol packet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DhtPacket {
    pub ty: String,
    pub key: Option<String>,
    pub val: Option<String>,
    pub tag: Option<String>,
    pub ttl: i32,
    pub reason: Option<String>,
    pub client_adr: Option<SocketAddr>,
    pub relay_adr: Option<SocketAddr>,
    pub sender_info: Option<NodeInfo>,
    pub pred_info: Option<NodeInfo>,
    pub succ_info: Option<NodeInfo>,
    pub hash_range: Option<HashRange>,
}

impl DhtPacket {
    /// A blank packet of the given type with a fresh TTL.
    pub fn new(ty: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            ttl: DHT_TTL,
            ..Self::default()
        }
    }

    /// Emit the wire form.
    #[must_use]
    pub fn emit(&self) -> String {
        let mut s = String::from(DHT_HEADER);
        s.push('\n');
        push_field(&mut s, "type", Some(&self.ty));
        push_field(&mut s, "key", self.key.as_deref());
        push_field(&mut s, "value", self.val.as_deref());
        push_field(&mut s, "tag", self.tag.as_deref());
        push_field(&mut s, "ttl", Some(&self.ttl.to_string()));
        push_field(&mut s, "reason", self.reason.as_deref());
        push_opt(&mut s, "clientAdr", self.client_adr.as_ref());
        push_opt(&mut s, "relayAdr", self.relay_adr.as_ref());
        push_opt(&mut s, "senderInfo", self.sender_info.as_ref());
        push_opt(&mut s, "predInfo", self.pred_info.as_ref());
        push_opt(&mut s, "succInfo", self.succ_info.as_ref());
        push_opt(&mut s, "hashRange", self.hash_range.as_ref());
        s
    }

    /// Parse the wire form.
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        let mut lines = s.split('\n');
        if lines.next() != Some(DHT_HEADER) {
            return Err(CodecError::MissingHeader);
        }
        let mut p = Self {
            ttl: DHT_TTL,
            ..Self::default()
        };
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (field, value) = line.split_once(':').ok_or(CodecError::MalformedField {
                field: "line",
                reason: format!("no separator in `{line}`"),
            })?;
            match field {
                "type" => p.ty = value.to_string(),
                "key" => p.key = Some(value.to_string()),
                "value" => p.val = Some(value.to_string()),
                "tag" => p.tag = Some(value.to_string()),
                "ttl" => p.ttl = value.parse().map_err(|_| malformed("ttl", value))?,
                "reason" => p.reason = Some(value.to_string()),
                "clientAdr" => {
                    p.client_adr = Some(value.parse().map_err(|_| malformed("clientAdr", value))?);
                }
                "relayAdr" => {
                    p.relay_adr = Some(value.parse().map_err(|_| malformed("relayAdr", value))?);
                }
                "senderInfo" => p.sender_info = Some(value.parse()?),
                "predInfo" => p.pred_info = Some(value.parse()?),
                "succInfo" => p.succ_info = Some(value.parse()?),
                "hashRange" => p.hash_range = Some(value.parse()?),
                other => {
                    return Err(CodecError::MalformedField {
                        field: "line",
                        reason: format!("unknown field `{other}`"),
                    });
                }
            }
        }
        Ok(p)
    }

    /// Validate a received packet, returning a failure reason if it
    /// cannot be processed.
    pub fn check(&self) -> Result<(), String> {
        if self.ty.is_empty() {
            return Err("missing type field".to_string());
        }
        if !DHT_TYPES.contains(&self.ty.as_str()) {
            return Err(format!("unrecognized type `{}`", self.ty));
        }
        if self.tag.is_none() {
            return Err("missing tag field".to_string());
        }
        if matches!(self.ty.as_str(), "get" | "put" | "transfer") && self.key.is_none() {
            return Err(format!("`{}` packet has no key", self.ty));
        }
        if self.ty == "leave" && self.sender_info.is_none() {
            return Err("`leave` packet has no senderInfo".to_string());
        }
        Ok(())
    }
}

fn push_field(s: &mut String, name: &str, value: Option<&str>) {
    if let Some(v) = value {
        s.push_str(name);
        s.push(':');
        s.push_str(v);
        s.push('\n');
    }
}

fn push_opt<T: fmt::Display>(s: &mut String, name: &str, value: Option<&T>) {
    if let Some(v) = value {
        s.push_str(name);
        s.push(':');
        s.push_str(&v.to_string());
        s.push('\n');
    }
}

fn malformed(field: &'static str, token: &str) -> CodecError {
    CodecError::MalformedField {
        field,
        reason: format!("bad token `{token}`"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sock(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    #[test]
    fn get_request_example() {
        let wire = "CSE473 DHTPv0.1\ntype:get\nkey:dungeons\ntag:12345\nttl:100\n";
        let p = DhtPacket::parse(wire).unwrap();
        assert_eq!(p.ty, "get");
        assert_eq!(p.key.as_deref(), Some("dungeons"));
        assert_eq!(p.tag.as_deref(), Some("12345"));
        assert_eq!(p.ttl, 100);
        assert!(p.check().is_ok());
    }

    #[test]
    fn emit_parse_roundtrip_full_packet() {
        let p = DhtPacket {
            ty: "success".to_string(),
            key: Some("dungeons".to_string()),
            val: Some("dragons".to_string()),
            tag: Some("12345".to_string()),
            ttl: 95,
            reason: None,
            client_adr: Some(sock("123.45.67.89:51349")),
            relay_adr: Some(sock("10.0.0.7:5001")),
            sender_info: Some(NodeInfo::new(sock("123.45.6.7:5678"), 987_654_321)),
            pred_info: Some(NodeInfo::new(sock("10.0.0.8:5002"), 0)),
            succ_info: Some(NodeInfo::new(sock("10.0.0.9:5003"), 7)),
            hash_range: Some(HashRange::new(0, 1_073_741_823)),
        };
        let parsed = DhtPacket::parse(&p.emit()).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn no_match_type_carries_a_space() {
        let p = DhtPacket {
            ty: "no match".to_string(),
            key: Some("dungeons".to_string()),
            tag: Some("12345".to_string()),
            ttl: 95,
            ..DhtPacket::default()
        };
        let parsed = DhtPacket::parse(&p.emit()).unwrap();
        assert_eq!(parsed.ty, "no match");
        assert!(parsed.check().is_ok());
    }

    #[test]
    fn sender_info_splits_on_last_colon() {
        let info: NodeInfo = "123.45.6.7:5678:987654321".parse().unwrap();
        assert_eq!(info.adr, sock("123.45.6.7:5678"));
        assert_eq!(info.first_hash, 987_654_321);
        assert_eq!(info.to_string(), "123.45.6.7:5678:987654321");
    }

    #[test]
    fn value_may_contain_colons() {
        let p = DhtPacket {
            ty: "put".to_string(),
            key: Some("url".to_string()),
            val: Some("http://example.com:8080/x".to_string()),
            tag: Some("1".to_string()),
            ttl: 100,
            ..DhtPacket::default()
        };
        let parsed = DhtPacket::parse(&p.emit()).unwrap();
        assert_eq!(parsed.val.as_deref(), Some("http://example.com:8080/x"));
    }

    #[test]
    fn parse_rejects_bad_header() {
        assert!(matches!(
            DhtPacket::parse("CSE473 DHTPv0.2\ntype:get\n"),
            Err(CodecError::MissingHeader)
        ));
        assert!(DhtPacket::parse("").is_err());
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let wire = "CSE473 DHTPv0.1\ntype:get\nbogus:1\n";
        assert!(DhtPacket::parse(wire).is_err());
    }

    #[test]
    fn check_flags_protocol_violations() {
        // Unknown type parses but fails check.
        let wire = "CSE473 DHTPv0.1\ntype:frobnicate\ntag:1\n";
        let p = DhtPacket::parse(wire).unwrap();
        assert!(p.check().is_err());

        // Missing tag.
        let p = DhtPacket::parse("CSE473 DHTPv0.1\ntype:get\nkey:k\n").unwrap();
        assert!(p.check().is_err());

        // get without key.
        let p = DhtPacket::parse("CSE473 DHTPv0.1\ntype:get\ntag:1\n").unwrap();
        assert!(p.check().is_err());
    }

    #[test]
    fn ttl_defaults_when_absent() {
        let p = DhtPacket::parse("CSE473 DHTPv0.1\ntype:get\nkey:k\ntag:1\n").unwrap();
        assert_eq!(p.ttl, DHT_TTL);
    }

    #[test]
    fn hash_range_contains_is_inclusive() {
        let r = HashRange::new(10, 20);
        assert!(r.contains(10));
        assert!(r.contains(20));
        assert!(!r.contains(9));
        assert!(!r.contains(21));
        assert!(HashRange::FULL.contains(0));
        assert!(HashRange::FULL.contains(i32::MAX as u32));
    }
}
