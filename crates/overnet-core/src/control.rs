//! The `RPv0` routing control-plane codec.
//!
//! Control messages ride in the payload of protocol-2 overlay packets.
//! They are `\n`-separated ASCII lines; the first line is always `RPv0`,
//! the second names the message type, and the third carries the body.
//! Timestamps and costs are seconds with millisecond precision (`%.3f`).

use std::fmt::Write as _;

use crate::error::CodecError;
use crate::prefix::Prefix;
use crate::types::NodeAddr;

/// A parsed path-vector advertisement body.
#[derive(Debug, Clone, PartialEq)]
pub struct PathVector {
    pub prefix: Prefix,
    pub timestamp: f64,
    pub cost: f64,
    /// Router addresses along the path, destination last.
    pub path: Vec<NodeAddr>,
}

/// A parsed link-failure advertisement body: the link `from`→`to` failed.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFailure {
    pub from: NodeAddr,
    pub to: NodeAddr,
    pub timestamp: f64,
    /// Routers this advertisement has already visited.
    pub path: Vec<NodeAddr>,
}

/// A control-plane message.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMsg {
    Hello { timestamp: f64 },
    HelloReply { timestamp: f64 },
    Advert(PathVector),
    LinkFailure(LinkFailure),
}

impl ControlMsg {
    /// Parse a control payload.
    pub fn parse(payload: &str) -> Result<Self, CodecError> {
        let mut lines = payload.split('\n');
        if lines.next() != Some("RPv0") {
            return Err(CodecError::MissingHeader);
        }
        let type_line = lines.next().ok_or(CodecError::MalformedField {
            field: "type",
            reason: "missing".to_string(),
        })?;
        let (label, ty) = type_line.split_once(':').ok_or(CodecError::MalformedField {
            field: "type",
            reason: "no separator".to_string(),
        })?;
        if label != "type" {
            return Err(CodecError::MalformedField {
                field: "type",
                reason: format!("unexpected label `{label}`"),
            });
        }
        let body = lines.next().unwrap_or("");
        match ty.trim() {
            "hello" => Ok(ControlMsg::Hello {
                timestamp: parse_timestamp(body)?,
            }),
            "hello2u" => Ok(ControlMsg::HelloReply {
                timestamp: parse_timestamp(body)?,
            }),
            "advert" => Ok(ControlMsg::Advert(parse_pathvec(body)?)),
            "fadvert" => Ok(ControlMsg::LinkFailure(parse_linkfail(body)?)),
            other => Err(CodecError::UnknownType(other.to_string())),
        }
    }

    /// Emit the wire form of a hello.
    #[must_use]
    pub fn emit_hello(now: f64) -> String {
        format!("RPv0\ntype: hello\ntimestamp: {now:.3}\n")
    }

    /// Emit the wire form of a hello echo carrying the original timestamp.
    #[must_use]
    pub fn emit_hello_reply(timestamp: f64) -> String {
        format!("RPv0\ntype: hello2u\ntimestamp: {timestamp:.3}\n")
    }

    /// Emit an originated advertisement: zero path cost, our address as
    /// the only hop. This form carries no trailing newline.
    #[must_use]
    pub fn emit_origin_advert(prefix: Prefix, now: f64, my_adr: NodeAddr) -> String {
        format!("RPv0\ntype: advert\npathvec: {prefix} {now:.3} 0.000 {my_adr}")
    }

    /// Emit a propagated advertisement with the full path.
    #[must_use]
    pub fn emit_advert(pv: &PathVector) -> String {
        format!(
            "RPv0\ntype: advert\npathvec: {} {:.3} {:.3} {}\n",
            pv.prefix,
            pv.timestamp,
            pv.cost,
            join_path(&pv.path)
        )
    }

    /// Emit a link-failure advertisement.
    #[must_use]
    pub fn emit_link_failure(lf: &LinkFailure) -> String {
        format!(
            "RPv0\ntype: fadvert\nlinkfail: {} {} {:.3} {}\n",
            lf.from,
            lf.to,
            lf.timestamp,
            join_path(&lf.path)
        )
    }
}

fn join_path(path: &[NodeAddr]) -> String {
    let mut s = String::new();
    for (i, hop) in path.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{hop}");
    }
    s
}

fn parse_timestamp(body: &str) -> Result<f64, CodecError> {
    let (label, value) = body.split_once(':').ok_or(CodecError::MalformedField {
        field: "timestamp",
        reason: "no separator".to_string(),
    })?;
    if label != "timestamp" {
        return Err(CodecError::MalformedField {
            field: "timestamp",
            reason: format!("unexpected label `{label}`"),
        });
    }
    value
        .trim()
        .parse()
        .map_err(|_| CodecError::MalformedField {
            field: "timestamp",
            reason: format!("bad number `{}`", value.trim()),
        })
}

// Body layout: `pathvec: <prefix> <timestamp> <cost> <hop1> <hop2> ...`
fn parse_pathvec(body: &str) -> Result<PathVector, CodecError> {
    let chunks: Vec<&str> = body.split_whitespace().collect();
    if chunks.len() < 5 || chunks[0] != "pathvec:" {
        return Err(CodecError::MalformedField {
            field: "pathvec",
            reason: "expected `pathvec: <prefix> <ts> <cost> <hops..>`".to_string(),
        });
    }
    let prefix: Prefix = chunks[1]
        .parse()
        .map_err(|_| malformed("pathvec", chunks[1]))?;
    let timestamp: f64 = chunks[2]
        .parse()
        .map_err(|_| malformed("pathvec", chunks[2]))?;
    let cost: f64 = chunks[3]
        .parse()
        .map_err(|_| malformed("pathvec", chunks[3]))?;
    let path = parse_hops(&chunks[4..], "pathvec")?;
    Ok(PathVector {
        prefix,
        timestamp,
        cost,
        path,
    })
}

// Body layout: `linkfail: <ipA> <ipB> <timestamp> <hop1> ...`
fn parse_linkfail(body: &str) -> Result<LinkFailure, CodecError> {
    let chunks: Vec<&str> = body.split_whitespace().collect();
    if chunks.len() < 5 || chunks[0] != "linkfail:" {
        return Err(CodecError::MalformedField {
            field: "linkfail",
            reason: "expected `linkfail: <ipA> <ipB> <ts> <hops..>`".to_string(),
        });
    }
    let from: NodeAddr = chunks[1]
        .parse()
        .map_err(|_| malformed("linkfail", chunks[1]))?;
    let to: NodeAddr = chunks[2]
        .parse()
        .map_err(|_| malformed("linkfail", chunks[2]))?;
    let timestamp: f64 = chunks[3]
        .parse()
        .map_err(|_| malformed("linkfail", chunks[3]))?;
    let path = parse_hops(&chunks[4..], "linkfail")?;
    Ok(LinkFailure {
        from,
        to,
        timestamp,
        path,
    })
}

fn parse_hops(chunks: &[&str], field: &'static str) -> Result<Vec<NodeAddr>, CodecError> {
    chunks
        .iter()
        .map(|c| c.parse().map_err(|_| malformed(field, c)))
        .collect()
}

fn malformed(field: &'static str, token: &str) -> CodecError {
    CodecError::MalformedField {
        field,
        reason: format!("bad token `{token}`"),
    }
}
