//! Outbound packet path.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{PppError, Result};

/// Control packet handed to the framing layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// PPP protocol number
    pub protocol: u16,
    /// Encoded control packet
    pub payload: Bytes,
}

/// Send primitive of a link.
///
/// Framing (HDLC byte stuffing, FCS) happens behind this trait.
pub trait Transport: Send {
    /// Queue one encoded control packet for transmission
    fn send(&mut self, protocol: u16, payload: Bytes) -> Result<()>;
}

impl Transport for mpsc::UnboundedSender<Frame> {
    fn send(&mut self, protocol: u16, payload: Bytes) -> Result<()> {
        mpsc::UnboundedSender::send(self, Frame { protocol, payload }).map_err(|_| {
            PppError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "link receiver dropped",
            ))
        })
    }
}

/// In-memory transport collecting frames until drained
#[derive(Debug, Default)]
pub struct Outbox {
    frames: Vec<Frame>,
}

impl Outbox {
    /// Empty outbox
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued frame
    pub fn drain(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }
}

impl Transport for Outbox {
    fn send(&mut self, protocol: u16, payload: Bytes) -> Result<()> {
        self.frames.push(Frame { protocol, payload });
        Ok(())
    }
}
