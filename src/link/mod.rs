//! Link plumbing around the negotiation automata.
//!
//! A [`LinkContext`] owns one Link Control Protocol instance and the network
//! control protocols riding on it, the per-requester [`OptionStore`], a
//! logical [`TimerQueue`] and the [`Transport`] packets leave through. The
//! [`LinkRegistry`] resolves link handles and answers option commands with
//! controller result codes.
//!
//! ```text
//!   ControlMessage ──> LinkRegistry ──> LinkContext ──> OptionStore
//!                                           │
//!   Transport <── Send ── Fsm<Lcp> ── Up/Down ──> Fsm<Ipcp>
//!                            ▲                      ▲
//!                  input(protocol, bytes)      tick(elapsed)
//! ```
//!
//! [`OptionStore`]: crate::options::OptionStore

use std::fmt;

use serde::{Deserialize, Serialize};

mod context;
mod control;
mod registry;
mod timer;
mod transport;

pub use context::{LinkContext, LinkStatus};
pub use control::{ControlMessage, ControlReply};
pub use registry::{LinkRegistry, SharedLink};
pub use timer::{TimerKey, TimerQueue};
pub use transport::{Frame, Outbox, Transport};

/// Handle of a registered link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u32);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link{}", self.0)
    }
}

/// Upward notification from a link, keyed by PPP protocol number
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkEvent {
    /// Protocol reached Opened
    Up(u16),
    /// Protocol left Opened
    Down(u16),
    /// Protocol no longer needs the lower layer
    Finished(u16),
    /// Negotiation gave up
    Failed(u16, String),
    /// Keepalive echoes went unanswered
    EchoTimeout,
}
