//! Control packet header and codes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{PppError, Result};

/// Code + identifier + length
pub const HEADER_LEN: usize = 4;

/// Largest payload the 16-bit length field can describe
pub const MAX_DATA_LEN: usize = u16::MAX as usize - HEADER_LEN;

/// Control packet code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Configure-Request
    ConfReq,
    /// Configure-Ack
    ConfAck,
    /// Configure-Nak
    ConfNak,
    /// Configure-Reject
    ConfRej,
    /// Terminate-Request
    TermReq,
    /// Terminate-Ack
    TermAck,
    /// Code-Reject
    CodeRej,
    /// Protocol-Reject (LCP only)
    ProtRej,
    /// Echo-Request (LCP only)
    EchoReq,
    /// Echo-Reply (LCP only)
    EchoRep,
    /// Discard-Request (LCP only)
    DiscReq,
    /// Anything else
    Other(u8),
}

impl Code {
    /// Decode a code byte
    pub fn from_byte(b: u8) -> Self {
        match b {
            1 => Code::ConfReq,
            2 => Code::ConfAck,
            3 => Code::ConfNak,
            4 => Code::ConfRej,
            5 => Code::TermReq,
            6 => Code::TermAck,
            7 => Code::CodeRej,
            8 => Code::ProtRej,
            9 => Code::EchoReq,
            10 => Code::EchoRep,
            11 => Code::DiscReq,
            other => Code::Other(other),
        }
    }

    /// Encode to a code byte
    pub fn as_byte(&self) -> u8 {
        match self {
            Code::ConfReq => 1,
            Code::ConfAck => 2,
            Code::ConfNak => 3,
            Code::ConfRej => 4,
            Code::TermReq => 5,
            Code::TermAck => 6,
            Code::CodeRej => 7,
            Code::ProtRej => 8,
            Code::EchoReq => 9,
            Code::EchoRep => 10,
            Code::DiscReq => 11,
            Code::Other(b) => *b,
        }
    }
}

/// A decoded control packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPacket {
    /// Packet code
    pub code: Code,
    /// Identifier used to match requests and replies
    pub id: u8,
    /// Payload after the header
    pub data: Bytes,
}

impl ControlPacket {
    /// Build a packet
    pub fn new(code: Code, id: u8, data: impl Into<Bytes>) -> Self {
        Self {
            code,
            id,
            data: data.into(),
        }
    }

    /// Parse a packet.
    ///
    /// Bytes past the declared length are link padding and are dropped. A
    /// declared length shorter than the header or longer than the buffer is
    /// rejected.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_LEN {
            return Err(PppError::MalformedPacket(format!(
                "packet too short: {} bytes",
                buf.len()
            )));
        }

        let length = u16::from_be_bytes([buf[2], buf[3]]) as usize;
        if length < HEADER_LEN {
            return Err(PppError::MalformedPacket(format!(
                "declared length {length} below header size"
            )));
        }
        if length > buf.len() {
            return Err(PppError::MalformedPacket(format!(
                "declared length {length} exceeds {} received bytes",
                buf.len()
            )));
        }

        Ok(Self {
            code: Code::from_byte(buf[0]),
            id: buf[1],
            data: Bytes::copy_from_slice(&buf[HEADER_LEN..length]),
        })
    }

    /// Total encoded length
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.data.len().min(MAX_DATA_LEN)
    }

    /// Encode to bytes.
    ///
    /// Data past [`MAX_DATA_LEN`] is cut so the length field always matches
    /// the bytes produced.
    pub fn encode(&self) -> Bytes {
        let data = &self.data[..self.data.len().min(MAX_DATA_LEN)];
        let mut buf = BytesMut::with_capacity(HEADER_LEN + data.len());
        buf.put_u8(self.code.as_byte());
        buf.put_u8(self.id);
        buf.put_u16((HEADER_LEN + data.len()) as u16);
        buf.put_slice(data);
        buf.freeze()
    }
}
