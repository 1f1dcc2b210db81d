//! Per-protocol capability object plugged into the automaton.

use std::any::Any;

use bytes::Bytes;

use crate::error::Result;
use crate::wire::{Code, ControlPacket};

/// Reply to a peer Configure-Request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigureReply {
    /// `ConfAck`, `ConfNak` or `ConfRej`
    pub code: Code,
    /// Option records to send back
    pub body: Bytes,
}

impl ConfigureReply {
    /// Ack echoing the request
    pub fn ack(body: impl Into<Bytes>) -> Self {
        Self {
            code: Code::ConfAck,
            body: body.into(),
        }
    }

    /// Nak carrying counter-proposals
    pub fn nak(body: impl Into<Bytes>) -> Self {
        Self {
            code: Code::ConfNak,
            body: body.into(),
        }
    }

    /// Reject listing unsupported options
    pub fn reject(body: impl Into<Bytes>) -> Self {
        Self {
            code: Code::ConfRej,
            body: body.into(),
        }
    }
}

/// Outcome of a protocol-specific code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtCode {
    /// Not understood: the automaton answers with a Code-Reject
    Unknown,
    /// Consumed with nothing to send
    Handled,
    /// Consumed, send this packet back
    Reply(ControlPacket),
    /// Peer rejected the given PPP protocol number
    ProtocolRejected(u16),
}

/// Protocol-specific half of a control protocol.
///
/// The automaton owns the packet exchange; the handler owns the option sets
/// and decides what goes into each Configure-* packet.
pub trait ProtocolHandler: Any + Send {
    /// PPP protocol number
    fn protocol(&self) -> u16;

    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Start of a negotiation attempt: copy "want" into "got"
    fn reset_ci(&mut self);

    /// Build our Configure-Request body from "got"
    fn add_ci(&mut self) -> Bytes;

    /// Apply a Configure-Nak to "got". An error means the nak was bogus and is
    /// ignored.
    fn nak_ci(&mut self, data: &[u8]) -> Result<()>;

    /// Apply a Configure-Reject to "got". An error means the reject was bogus
    /// and is ignored.
    fn rej_ci(&mut self, data: &[u8]) -> Result<()>;

    /// Classify a peer Configure-Request into "his".
    ///
    /// With `reject_if_disagree` set, options we would nak are rejected
    /// instead so the exchange converges.
    fn req_ci(&mut self, data: &[u8], reject_if_disagree: bool) -> ConfigureReply;

    /// Entered Opened
    fn up(&mut self) {}

    /// Left Opened
    fn down(&mut self) {}

    /// Need the lower layer
    fn starting(&mut self) {}

    /// Lower layer no longer needed
    fn finished(&mut self) {}

    /// Codes outside the seven core codes
    fn extended_code(&mut self, _packet: &ControlPacket) -> ExtCode {
        ExtCode::Unknown
    }
}
