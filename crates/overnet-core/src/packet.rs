//! The overlay packet and its wire format.
//!
//! Overlay packets travel between nodes inside substrate datagrams. The
//! wire form is line-oriented text: four header lines followed by the
//! payload, which may itself contain newlines (control-plane payloads do).

use std::fmt;
use std::str::FromStr;

use crate::error::CodecError;
use crate::types::NodeAddr;

/// Protocol discriminator carried in every overlay packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Application data, dispatched to the local source/sink.
    Data = 1,
    /// Routing control traffic, dispatched to the local router.
    Control = 2,
}

impl TryFrom<u8> for Protocol {
    type Error = CodecError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            1 => Ok(Protocol::Data),
            2 => Ok(Protocol::Control),
            other => Err(CodecError::MalformedField {
                field: "protocol",
                reason: format!("unknown value {other}"),
            }),
        }
    }
}

/// Initial TTL for locally originated packets.
pub const INITIAL_TTL: u8 = 100;

/// An overlay packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub src: NodeAddr,
    pub dest: NodeAddr,
    pub protocol: Protocol,
    pub ttl: u8,
    pub payload: String,
}

impl Packet {
    /// Build a data packet with the standard initial TTL.
    pub fn data(src: NodeAddr, dest: NodeAddr, payload: impl Into<String>) -> Self {
        Self {
            src,
            dest,
            protocol: Protocol::Data,
            ttl: INITIAL_TTL,
            payload: payload.into(),
        }
    }

    /// Build a control packet with the standard initial TTL.
    pub fn control(src: NodeAddr, dest: NodeAddr, payload: impl Into<String>) -> Self {
        Self {
            src,
            dest,
            protocol: Protocol::Control,
            ttl: INITIAL_TTL,
            payload: payload.into(),
        }
    }

    /// Emit the wire form.
    #[must_use]
    pub fn emit(&self) -> String {
        format!(
            "srcAdr: {}\ndestAdr: {}\nprotocol: {}\nttl: {}\npayload: {}",
            self.src, self.dest, self.protocol as u8, self.ttl, self.payload
        )
    }

    /// Parse the wire form.
    pub fn parse(s: &str) -> Result<Self, CodecError> {
        let mut parts = s.splitn(5, '\n');
        let src = field(parts.next(), "srcAdr")?;
        let dest = field(parts.next(), "destAdr")?;
        let protocol: u8 = field(parts.next(), "protocol")?;
        let ttl: u8 = field(parts.next(), "ttl")?;
        let payload = parts
            .next()
            .and_then(|rest| rest.strip_prefix("payload: "))
            .ok_or(CodecError::MalformedField {
                field: "payload",
                reason: "missing".to_string(),
            })?;
        Ok(Self {
            src,
            dest,
            protocol: Protocol::try_from(protocol)?,
            ttl,
            payload: payload.to_string(),
        })
    }
}

fn field<T: FromStr>(line: Option<&str>, name: &'static str) -> Result<T, CodecError>
where
    T::Err: fmt::Display,
{
    let line = line.ok_or(CodecError::MalformedField {
        field: name,
        reason: "missing".to_string(),
    })?;
    let (label, value) = line.split_once(':').ok_or(CodecError::MalformedField {
        field: name,
        reason: "no separator".to_string(),
    })?;
    if label != name {
        return Err(CodecError::MalformedField {
            field: name,
            reason: format!("expected `{name}`, got `{label}`"),
        });
    }
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| CodecError::MalformedField {
            field: name,
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adr(s: &str) -> NodeAddr {
        s.parse().unwrap()
    }

    #[test]
    fn emit_parse_roundtrip() {
        let p = Packet::data(adr("10.9.0.1"), adr("10.1.2.3"), "hello world");
        let parsed = Packet::parse(&p.emit()).unwrap();
        assert_eq!(parsed, p);
    }

    #[test]
    fn payload_may_contain_newlines() {
        let p = Packet::control(
            adr("10.1.0.1"),
            adr("10.2.0.1"),
            "RPv0\ntype: hello\ntimestamp: 1.500\n",
        );
        let parsed = Packet::parse(&p.emit()).unwrap();
        assert_eq!(parsed.payload, "RPv0\ntype: hello\ntimestamp: 1.500\n");
        assert_eq!(parsed.protocol, Protocol::Control);
    }

    #[test]
    fn parse_rejects_missing_fields() {
        assert!(Packet::parse("").is_err());
        assert!(Packet::parse("srcAdr: 10.0.0.1").is_err());
        assert!(Packet::parse("srcAdr: 10.0.0.1\ndestAdr: 10.0.0.2\nprotocol: 1\nttl: 9").is_err());
    }

    #[test]
    fn parse_rejects_unknown_protocol() {
        let wire = "srcAdr: 10.0.0.1\ndestAdr: 10.0.0.2\nprotocol: 7\nttl: 9\npayload: x";
        assert!(Packet::parse(wire).is_err());
    }

    #[test]
    fn parse_rejects_swapped_labels() {
        let wire = "destAdr: 10.0.0.1\nsrcAdr: 10.0.0.2\nprotocol: 1\nttl: 9\npayload: x";
        assert!(Packet::parse(wire).is_err());
    }

    #[test]
    fn empty_payload_roundtrip() {
        let p = Packet::data(adr("10.0.0.1"), adr("10.0.0.2"), "");
        let parsed = Packet::parse(&p.emit()).unwrap();
        assert_eq!(parsed.payload, "");
    }
}
