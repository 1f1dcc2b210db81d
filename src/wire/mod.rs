//! PPP control packet wire format.
//!
//! Every control sub-protocol shares the same packet layout:
//!
//! ```text
//! +--------+------------+-----------------+------------------+
//! | code:1 | ident:1    | length:2 (BE)   | data: length - 4 |
//! +--------+------------+-----------------+------------------+
//! ```
//!
//! Configure-Request/Ack/Nak/Reject carry a sequence of option records:
//!
//! ```text
//! +--------+----------+---------------------+
//! | type:1 | length:1 | value: length - 2   |
//! +--------+----------+---------------------+
//! ```
//!
//! Declared lengths are always checked against the real buffer before any
//! field is read.

mod packet;
mod record;

pub use packet::{Code, ControlPacket, HEADER_LEN, MAX_DATA_LEN};
pub use record::{
    encode_records, parse_records, parse_records_strict, OptionRecord, ParsedOptions,
};

/// PPP protocol numbers of the control protocols hosted by a link
pub mod protocol_number {
    /// Link Control Protocol
    pub const LCP: u16 = 0xc021;
    /// IP Control Protocol
    pub const IPCP: u16 = 0x8021;
    /// Password Authentication Protocol
    pub const PAP: u16 = 0xc023;
    /// Challenge Handshake Authentication Protocol
    pub const CHAP: u16 = 0xc223;

    /// Human-readable protocol name
    pub fn name(protocol: u16) -> &'static str {
        match protocol {
            LCP => "LCP",
            IPCP => "IPCP",
            PAP => "PAP",
            CHAP => "CHAP",
            _ => "unknown",
        }
    }
}
