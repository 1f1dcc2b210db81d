//! Control protocol handlers.
//!
//! Each handler plugs into the generic [`Fsm`](crate::fsm::Fsm) and owns the
//! option sets of one control protocol on one link.
//!
//! | Protocol | Number   | Options                                         |
//! |----------|----------|-------------------------------------------------|
//! | LCP      | `0xc021` | MRU, ACCM, auth protocol, magic number, PFC, ACFC |
//! | IPCP     | `0x8021` | address(es), VJ compression, DNS/WINS servers   |
//!
//! ## Reply precedence
//!
//! A peer Configure-Request is classified record by record. The reply is a
//! Configure-Reject if anything was rejected (including an unparseable tail),
//! otherwise a Configure-Nak if anything was naked, otherwise a
//! Configure-Ack echoing the request:
//!
//! ```text
//! records ──> classify ──┬── any rejected? ──> Configure-Reject (rejected only)
//!                        ├── any naked?    ──> Configure-Nak    (counter-proposals)
//!                        └── otherwise     ──> Configure-Ack    (request echoed)
//! ```
//!
//! ## LCP phase coupling
//!
//! Network control protocols run only while LCP is Opened: LCP reaching
//! Opened raises their lower layer, LCP leaving Opened lowers it. The link
//! context wires this up.

pub mod ipcp;
pub mod lcp;

pub use ipcp::{Classification, Ipcp, IpcpOptions, IpcpSummary, VjMode};
pub use lcp::{Lcp, LcpOptions};
