//! # PPP Core - Control Protocol Negotiation
//!
//! Option negotiation for the Point-to-Point Protocol: the RFC 1661
//! automaton shared by every control protocol, the Link Control Protocol and
//! IP Control Protocol option codecs that plug into it, and the per-link
//! option store requesters populate before negotiation starts.
//!
//! ## Features
//!
//! - **Generic automaton**: one [`Fsm`] drives any [`ProtocolHandler`]
//! - **IPCP**: addresses (old and new form), Van Jacobson compression, DNS/WINS
//! - **LCP**: MRU, ACCM, authentication protocol, magic number, PFC/ACFC, keepalive
//! - **Option store**: validated, clamped and flagged per-requester settings
//! - **Link context**: timers, phase coupling and transport per link
//!
//! ## Architecture
//!
//! ```text
//! requester ── ControlMessage ──> LinkRegistry ──> LinkContext ──> OptionStore
//!                                                     │
//!                                        ┌────────────┴────────────┐
//!                                        v                         v
//!                                    Fsm<Lcp> ─── Up/Down ───> Fsm<Ipcp>
//!                                        │                         │
//!                                        └──── Transport::send ────┘
//! ```
//!
//! ### State Machine
//!
//! ```text
//!            open / lower_up
//!   [Initial] ──────────────> [Req-Sent] ── rcv Ack ──> [Ack-Rcvd]
//!                                 │                          │
//!                          send Ack│                          │send Ack
//!                                 v                          v
//!                            [Ack-Sent] ───── rcv Ack ───> [Opened]
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ppp::{Config, LinkContext, LinkId, Outbox, RequesterId, OptionId, OptionPayload};
//!
//! let mut link = LinkContext::new(LinkId(1), Config::default(), Box::new(Outbox::new()));
//! link.set_option(RequesterId(1), OptionId::IpcpLocalAddr, &OptionPayload::Numeric(0x0a000001))?;
//! link.connect(Some(RequesterId(1)));
//! link.lower_up();
//! ```
//!
//! ## Modules
//!
//! - [`fsm`]: Negotiation automaton and handler trait
//! - [`protocol`]: LCP and IPCP option codecs
//! - [`options`]: Per-requester option store and command dispatch
//! - [`wire`]: Control packet and option record codec
//! - [`link`]: Link context, timers, transport and registry
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result codes

pub mod config;
pub mod error;
pub mod fsm;
pub mod link;
pub mod options;
pub mod protocol;
pub mod wire;

// Re-exports for convenience
pub use config::Config;
pub use error::{PppError, Result};
pub use fsm::{Fsm, FsmAction, FsmState, Negotiator, ProtocolHandler};
pub use link::{
    ControlMessage, ControlReply, LinkContext, LinkEvent, LinkId, LinkRegistry, Outbox, Transport,
};
pub use options::{OptionId, OptionPayload, OptionStore, RequesterId};
pub use protocol::{Ipcp, IpcpSummary, Lcp};
pub use wire::{Code, ControlPacket, OptionRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
