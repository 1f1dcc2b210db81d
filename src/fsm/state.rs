//! Automaton states.

use std::fmt;

use serde::Serialize;

/// Negotiation automaton state (RFC 1661 section 4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FsmState {
    /// Lower layer down, not administratively open
    Initial,
    /// Administratively open, waiting for the lower layer
    Starting,
    /// Lower layer up, not administratively open
    Closed,
    /// Open but negotiation gave up (or passive and waiting for the peer)
    Stopped,
    /// Terminate-Request sent on administrative close
    Closing,
    /// Terminate-Request sent or received while staying open
    Stopping,
    /// Configure-Request sent, nothing acked yet
    ReqSent,
    /// Our Configure-Request was acked
    AckRcvd,
    /// We acked the peer's Configure-Request
    AckSent,
    /// Both sides acked
    Opened,
}

impl FsmState {
    /// States where a Configure-Request of ours is outstanding
    pub fn is_negotiating(&self) -> bool {
        matches!(self, FsmState::ReqSent | FsmState::AckRcvd | FsmState::AckSent)
    }

    /// States that process inbound packets
    pub fn accepts_packets(&self) -> bool {
        !matches!(self, FsmState::Initial | FsmState::Starting)
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FsmState::Initial => "Initial",
            FsmState::Starting => "Starting",
            FsmState::Closed => "Closed",
            FsmState::Stopped => "Stopped",
            FsmState::Closing => "Closing",
            FsmState::Stopping => "Stopping",
            FsmState::ReqSent => "Req-Sent",
            FsmState::AckRcvd => "Ack-Rcvd",
            FsmState::AckSent => "Ack-Sent",
            FsmState::Opened => "Opened",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(FsmState::AckSent.is_negotiating());
        assert!(!FsmState::Stopping.is_negotiating());
        assert!(!FsmState::Starting.accepts_packets());
        assert!(FsmState::Stopped.accepts_packets());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(FsmState::ReqSent.to_string(), "Req-Sent");
        assert_eq!(FsmState::Opened.to_string(), "Opened");
    }
}
