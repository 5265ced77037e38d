//! The transport packet and its wire form.
//!
//! Three header bytes (type, then the sequence number big-endian)
//! followed by the payload. Sequence numbers use 15 bits; arithmetic is
//! modulo twice the window size.

use crate::error::RdtError;

/// Highest representable sequence number (15 bits).
pub const SEQ_MAX: u16 = (1 << 15) - 1;

/// Header length in bytes.
pub const HEADER_LEN: usize = 3;

/// Packet type discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Data = 0,
    Ack = 1,
}

impl TryFrom<u8> for PacketType {
    type Error = RdtError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        match v {
            0 => Ok(PacketType::Data),
            1 => Ok(PacketType::Ack),
            other => Err(RdtError::InvalidType(other)),
        }
    }
}

/// A transport packet: DATA carries a payload, ACK only a sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdtPacket {
    pub ty: PacketType,
    pub seq: u16,
    pub payload: String,
}

impl RdtPacket {
    pub fn data(seq: u16, payload: impl Into<String>) -> Self {
        Self {
            ty: PacketType::Data,
            seq,
            payload: payload.into(),
        }
    }

    pub fn ack(seq: u16) -> Self {
        Self {
            ty: PacketType::Ack,
            seq,
            payload: String::new(),
        }
    }

    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.push(self.ty as u8);
        buf.extend_from_slice(&self.seq.to_be_bytes());
        buf.extend_from_slice(self.payload.as_bytes());
        buf
    }

    /// Decode from wire bytes.
    pub fn decode(buf: &[u8]) -> Result<Self, RdtError> {
        if buf.len() < HEADER_LEN {
            return Err(RdtError::TooShort {
                min: HEADER_LEN,
                actual: buf.len(),
            });
        }
        let ty = PacketType::try_from(buf[0])?;
        let seq = u16::from_be_bytes([buf[1], buf[2]]);
        if seq > SEQ_MAX {
            return Err(RdtError::InvalidSequence(seq));
        }
        let payload = std::str::from_utf8(&buf[HEADER_LEN..])
            .map_err(|_| RdtError::InvalidPayload)?
            .to_string();
        Ok(Self { ty, seq, payload })
    }
}
