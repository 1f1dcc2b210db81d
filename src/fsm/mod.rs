//! Generic negotiation automaton.
//!
//! One [`Fsm`] drives one control protocol on one link. The automaton is the
//! RFC 1661 option negotiation state machine; everything protocol-specific
//! (which options exist, how to classify a peer request) lives behind the
//! [`ProtocolHandler`] capability object, so link control and network control
//! share this code unchanged.
//!
//! The automaton never performs I/O. Every event (`open`, `lower_up`,
//! `input`, `timeout`, ...) runs to completion and leaves [`FsmAction`]s in a
//! queue that the owner drains and executes: packets to send, timer requests
//! and upward notifications.
//!
//! ```text
//!  Initial ──open──> Starting ──lower_up──> Req-Sent ──ack──> Ack-Rcvd
//!                                              │                  │
//!                                          peer CR ok         peer CR ok
//!                                              v                  v
//!                                          Ack-Sent ───ack───> Opened
//! ```

mod handler;
mod state;

pub use handler::{ConfigureReply, ExtCode, ProtocolHandler};
pub use state::FsmState;

use std::any::Any;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::FsmConfig;
use crate::wire::{Code, ControlPacket, MAX_DATA_LEN};

/// Side effect requested by the automaton
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmAction {
    /// Transmit a control packet on this protocol
    Send(ControlPacket),
    /// (Re)arm the restart timer
    StartTimer(Duration),
    /// Disarm the restart timer
    CancelTimer,
    /// Protocol reached Opened
    Up,
    /// Protocol left Opened
    Down,
    /// Protocol needs the lower layer
    Starting,
    /// Protocol no longer needs the lower layer
    Finished,
    /// Negotiation attempt gave up
    Failed(String),
    /// Peer rejected another protocol on this link
    ProtocolRejected(u16),
}

/// RFC 1661 automaton parameterized by a protocol handler
pub struct Fsm<P: ProtocolHandler> {
    handler: P,
    config: FsmConfig,
    state: FsmState,
    /// Last identifier used
    id: u8,
    /// Identifier of our outstanding Configure-Request
    reqid: u8,
    /// A reply to `reqid` has already been processed
    seen_ack: bool,
    /// Body of our outstanding Configure-Request
    last_request: Bytes,
    retransmits: u32,
    /// Naks we sent since the last ack we sent
    nak_loops: u32,
    /// Naks we received in this attempt
    failures: u32,
    term_reason: String,
    actions: Vec<FsmAction>,
}

impl<P: ProtocolHandler> Fsm<P> {
    /// Create an automaton in `Initial`
    pub fn new(handler: P, config: FsmConfig) -> Self {
        Self {
            handler,
            config,
            state: FsmState::Initial,
            id: 0,
            reqid: 0,
            seen_ack: false,
            last_request: Bytes::new(),
            retransmits: 0,
            nak_loops: 0,
            failures: 0,
            term_reason: String::new(),
            actions: Vec::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> FsmState {
        self.state
    }

    /// Protocol handler
    pub fn handler(&self) -> &P {
        &self.handler
    }

    /// Protocol handler, mutable
    pub fn handler_mut(&mut self) -> &mut P {
        &mut self.handler
    }

    /// Remaining retransmissions of the outstanding request
    pub fn retransmits(&self) -> u32 {
        self.retransmits
    }

    /// Configure-Naks received in this attempt
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Drain pending actions
    pub fn take_actions(&mut self) -> Vec<FsmAction> {
        std::mem::take(&mut self.actions)
    }

    /// Administrative open
    pub fn open(&mut self) {
        match self.state {
            FsmState::Initial => {
                self.set_state(FsmState::Starting);
                self.starting();
            }
            FsmState::Closed => {
                if self.config.passive {
                    self.set_state(FsmState::Stopped);
                } else {
                    self.send_conf_req(false);
                    self.set_state(FsmState::ReqSent);
                }
            }
            FsmState::Closing => self.set_state(FsmState::Stopping),
            _ => {}
        }
    }

    /// Administrative close; runs the terminate handshake when needed
    pub fn close(&mut self, reason: &str) {
        self.term_reason = reason.to_string();
        match self.state {
            FsmState::Starting => {
                self.set_state(FsmState::Initial);
                self.finished();
            }
            FsmState::Stopped => self.set_state(FsmState::Closed),
            FsmState::Stopping => self.set_state(FsmState::Closing),
            FsmState::ReqSent | FsmState::AckRcvd | FsmState::AckSent | FsmState::Opened => {
                self.terminate_layer(FsmState::Closing)
            }
            _ => {}
        }
    }

    /// Lower layer became available
    pub fn lower_up(&mut self) {
        match self.state {
            FsmState::Initial => self.set_state(FsmState::Closed),
            FsmState::Starting => {
                if self.config.passive {
                    self.set_state(FsmState::Stopped);
                } else {
                    self.send_conf_req(false);
                    self.set_state(FsmState::ReqSent);
                }
            }
            state => debug!(
                protocol = self.handler.name(),
                %state,
                "lower layer up in unexpected state"
            ),
        }
    }

    /// Lower layer went away; no terminate handshake
    pub fn lower_down(&mut self) {
        match self.state {
            FsmState::Closed => self.set_state(FsmState::Initial),
            FsmState::Stopped => {
                self.set_state(FsmState::Starting);
                self.starting();
            }
            FsmState::Closing => {
                self.cancel_timer();
                self.set_state(FsmState::Initial);
            }
            FsmState::Stopping | FsmState::ReqSent | FsmState::AckRcvd | FsmState::AckSent => {
                self.cancel_timer();
                self.set_state(FsmState::Starting);
            }
            FsmState::Opened => {
                self.down();
                self.set_state(FsmState::Starting);
            }
            _ => {}
        }
    }

    /// Restart timer expired
    pub fn timeout(&mut self) {
        match self.state {
            FsmState::Closing | FsmState::Stopping => {
                if self.retransmits == 0 {
                    let next = if self.state == FsmState::Closing {
                        FsmState::Closed
                    } else {
                        FsmState::Stopped
                    };
                    self.set_state(next);
                    self.finished();
                } else {
                    self.send_term_req();
                }
            }
            FsmState::ReqSent | FsmState::AckRcvd | FsmState::AckSent => {
                if self.retransmits == 0 {
                    let reason = format!(
                        "{}: no response to {} configure-requests",
                        self.handler.name(),
                        self.config.max_configure
                    );
                    self.fail(reason);
                } else {
                    if self.state == FsmState::AckRcvd {
                        self.set_state(FsmState::ReqSent);
                    }
                    self.send_conf_req(true);
                }
            }
            state => debug!(
                protocol = self.handler.name(),
                %state,
                "stale timeout ignored"
            ),
        }
    }

    /// Peer sent a Protocol-Reject for this protocol
    pub fn protocol_rejected(&mut self) {
        match self.state {
            FsmState::Closing => {
                self.cancel_timer();
                self.set_state(FsmState::Closed);
                self.finished();
            }
            FsmState::Closed => {
                self.set_state(FsmState::Closed);
                self.finished();
            }
            FsmState::Stopping | FsmState::ReqSent | FsmState::AckRcvd | FsmState::AckSent => {
                self.cancel_timer();
                self.set_state(FsmState::Stopped);
                self.finished();
            }
            FsmState::Stopped => self.finished(),
            FsmState::Opened => {
                self.term_reason = "protocol rejected by peer".to_string();
                self.terminate_layer(FsmState::Stopping);
            }
            _ => {}
        }
    }

    /// Raw inbound packet. Unparseable packets are dropped with no state
    /// change.
    pub fn input(&mut self, buf: &[u8]) {
        match ControlPacket::parse(buf) {
            Ok(packet) => self.input_packet(packet),
            Err(e) => warn!(protocol = self.handler.name(), error = %e, "dropping packet"),
        }
    }

    /// Decoded inbound packet
    pub fn input_packet(&mut self, packet: ControlPacket) {
        if !self.state.accepts_packets() {
            debug!(
                protocol = self.handler.name(),
                state = %self.state,
                code = ?packet.code,
                "packet received before lower layer up"
            );
            return;
        }

        debug!(
            protocol = self.handler.name(),
            state = %self.state,
            code = ?packet.code,
            id = packet.id,
            len = packet.data.len(),
            "rcvd"
        );

        match packet.code {
            Code::ConfReq => self.rcv_conf_req(packet.id, &packet.data),
            Code::ConfAck => self.rcv_conf_ack(packet.id, &packet.data),
            Code::ConfNak | Code::ConfRej => {
                self.rcv_conf_nak_rej(packet.code, packet.id, &packet.data)
            }
            Code::TermReq => self.rcv_term_req(packet.id),
            Code::TermAck => self.rcv_term_ack(),
            Code::CodeRej => self.rcv_code_rej(&packet.data),
            _ => match self.handler.extended_code(&packet) {
                ExtCode::Handled => {}
                ExtCode::Reply(reply) => self.actions.push(FsmAction::Send(reply)),
                ExtCode::ProtocolRejected(protocol) => {
                    self.actions.push(FsmAction::ProtocolRejected(protocol))
                }
                ExtCode::Unknown => {
                    // the copy has to fit in a packet with our own header
                    let mut rejected = packet.encode();
                    rejected.truncate(MAX_DATA_LEN);
                    let id = self.next_id();
                    self.send(Code::CodeRej, id, rejected);
                }
            },
        }
    }

    fn rcv_conf_req(&mut self, id: u8, data: &[u8]) {
        match self.state {
            FsmState::Closed => {
                self.send(Code::TermAck, id, Bytes::new());
                return;
            }
            FsmState::Closing | FsmState::Stopping => return,
            FsmState::Opened => {
                self.down();
                self.send_conf_req(false);
                self.set_state(FsmState::ReqSent);
            }
            FsmState::Stopped => {
                self.send_conf_req(false);
                self.set_state(FsmState::ReqSent);
            }
            _ => {}
        }

        let reject_if_disagree = self.nak_loops >= self.config.max_nak_loops;
        let reply = self.handler.req_ci(data, reject_if_disagree);
        self.send(reply.code, id, reply.body);

        if reply.code == Code::ConfAck {
            if self.state == FsmState::AckRcvd {
                self.cancel_timer();
                self.set_state(FsmState::Opened);
                self.up();
            } else {
                self.set_state(FsmState::AckSent);
            }
            self.nak_loops = 0;
        } else {
            if self.state != FsmState::AckRcvd {
                self.set_state(FsmState::ReqSent);
            }
            if reply.code == Code::ConfNak {
                self.nak_loops += 1;
            }
        }
    }

    fn rcv_conf_ack(&mut self, id: u8, data: &[u8]) {
        if id != self.reqid || self.seen_ack {
            debug!(
                protocol = self.handler.name(),
                id,
                expected = self.reqid,
                "ignoring stale configure-ack"
            );
            return;
        }
        if data != self.last_request.as_ref() {
            warn!(
                protocol = self.handler.name(),
                id,
                "configure-ack does not match our request"
            );
            return;
        }
        self.seen_ack = true;

        match self.state {
            FsmState::Closed | FsmState::Stopped => self.send(Code::TermAck, id, Bytes::new()),
            FsmState::ReqSent => {
                self.set_state(FsmState::AckRcvd);
                self.retransmits = self.config.max_configure;
            }
            FsmState::AckRcvd => {
                // crossed connection
                self.cancel_timer();
                self.send_conf_req(false);
                self.set_state(FsmState::ReqSent);
            }
            FsmState::AckSent => {
                self.cancel_timer();
                self.set_state(FsmState::Opened);
                self.retransmits = self.config.max_configure;
                self.up();
            }
            FsmState::Opened => {
                self.down();
                self.send_conf_req(false);
                self.set_state(FsmState::ReqSent);
            }
            _ => {}
        }
    }

    fn rcv_conf_nak_rej(&mut self, code: Code, id: u8, data: &[u8]) {
        if id != self.reqid || self.seen_ack {
            debug!(
                protocol = self.handler.name(),
                id,
                expected = self.reqid,
                "ignoring stale configure-nak/rej"
            );
            return;
        }

        match self.state {
            FsmState::Closed | FsmState::Stopped => {
                self.send(Code::TermAck, id, Bytes::new());
                return;
            }
            FsmState::Closing | FsmState::Stopping => return,
            _ => {}
        }

        let applied = if code == Code::ConfNak {
            self.failures += 1;
            if self.failures > self.config.max_failure {
                let reason = format!(
                    "{}: peer sent {} configure-naks without converging",
                    self.handler.name(),
                    self.failures
                );
                self.fail(reason);
                return;
            }
            self.handler.nak_ci(data)
        } else {
            self.handler.rej_ci(data)
        };
        if let Err(e) = applied {
            warn!(protocol = self.handler.name(), ?code, error = %e, "ignoring bad reply");
            return;
        }
        self.seen_ack = true;

        match self.state {
            FsmState::ReqSent | FsmState::AckSent => {
                self.cancel_timer();
                self.send_conf_req(false);
            }
            FsmState::AckRcvd => {
                self.cancel_timer();
                self.send_conf_req(false);
                self.set_state(FsmState::ReqSent);
            }
            FsmState::Opened => {
                self.down();
                self.send_conf_req(false);
                self.set_state(FsmState::ReqSent);
            }
            _ => {}
        }
    }

    fn rcv_term_req(&mut self, id: u8) {
        match self.state {
            FsmState::AckRcvd | FsmState::AckSent => self.set_state(FsmState::ReqSent),
            FsmState::Opened => {
                info!(protocol = self.handler.name(), "terminated by peer");
                self.down();
                self.retransmits = 0;
                self.set_state(FsmState::Stopping);
                self.start_timer();
            }
            _ => {}
        }
        self.send(Code::TermAck, id, Bytes::new());
    }

    fn rcv_term_ack(&mut self) {
        match self.state {
            FsmState::Closing => {
                self.cancel_timer();
                self.set_state(FsmState::Closed);
                self.finished();
            }
            FsmState::Stopping => {
                self.cancel_timer();
                self.set_state(FsmState::Stopped);
                self.finished();
            }
            FsmState::AckRcvd => self.set_state(FsmState::ReqSent),
            FsmState::Opened => {
                self.down();
                self.send_conf_req(false);
                self.set_state(FsmState::ReqSent);
            }
            _ => {}
        }
    }

    fn rcv_code_rej(&mut self, data: &[u8]) {
        let rejected = data.first().copied().map(Code::from_byte);
        warn!(
            protocol = self.handler.name(),
            code = ?rejected,
            "peer sent code-reject"
        );
        if self.state == FsmState::AckRcvd {
            self.set_state(FsmState::ReqSent);
        }
    }

    fn terminate_layer(&mut self, next: FsmState) {
        if self.state == FsmState::Opened {
            self.down();
        } else {
            self.cancel_timer();
        }

        self.retransmits = self.config.max_terminate;
        if self.retransmits == 0 {
            // nobody to wait for
            let id = self.next_id();
            self.send(Code::TermReq, id, Bytes::from(self.term_reason.clone()));
            let done = if next == FsmState::Closing {
                FsmState::Closed
            } else {
                FsmState::Stopped
            };
            self.set_state(done);
            self.finished();
            return;
        }

        self.send_term_req();
        self.set_state(next);
    }

    fn send_term_req(&mut self) {
        let id = self.next_id();
        self.send(Code::TermReq, id, Bytes::from(self.term_reason.clone()));
        self.start_timer();
        self.retransmits = self.retransmits.saturating_sub(1);
    }

    fn send_conf_req(&mut self, retransmit: bool) {
        if !self.state.is_negotiating() {
            self.handler.reset_ci();
            self.nak_loops = 0;
            self.failures = 0;
        }

        if !retransmit {
            self.retransmits = self.config.max_configure;
            self.reqid = self.next_id();
            self.last_request = self.handler.add_ci();
        }
        self.seen_ack = false;

        self.send(Code::ConfReq, self.reqid, self.last_request.clone());
        self.retransmits = self.retransmits.saturating_sub(1);
        self.start_timer();
    }

    fn fail(&mut self, reason: String) {
        warn!(protocol = self.handler.name(), %reason, "negotiation failed");
        self.cancel_timer();
        self.set_state(FsmState::Stopped);
        self.actions.push(FsmAction::Failed(reason));
        if !self.config.passive {
            self.finished();
        }
    }

    fn next_id(&mut self) -> u8 {
        self.id = self.id.wrapping_add(1);
        self.id
    }

    fn send(&mut self, code: Code, id: u8, data: Bytes) {
        debug!(
            protocol = self.handler.name(),
            ?code,
            id,
            len = data.len(),
            "sent"
        );
        self.actions
            .push(FsmAction::Send(ControlPacket::new(code, id, data)));
    }

    fn set_state(&mut self, next: FsmState) {
        if self.state != next {
            debug!(
                protocol = self.handler.name(),
                from = %self.state,
                to = %next,
                "state change"
            );
        }
        self.state = next;
    }

    fn start_timer(&mut self) {
        self.actions
            .push(FsmAction::StartTimer(self.config.restart_interval()));
    }

    fn cancel_timer(&mut self) {
        self.actions.push(FsmAction::CancelTimer);
    }

    fn up(&mut self) {
        info!(protocol = self.handler.name(), "opened");
        self.handler.up();
        self.actions.push(FsmAction::Up);
    }

    fn down(&mut self) {
        info!(protocol = self.handler.name(), "down");
        self.handler.down();
        self.actions.push(FsmAction::Down);
    }

    fn starting(&mut self) {
        self.handler.starting();
        self.actions.push(FsmAction::Starting);
    }

    fn finished(&mut self) {
        self.handler.finished();
        self.actions.push(FsmAction::Finished);
    }
}

/// Object-safe view of an automaton, used by the link to host
/// heterogeneous protocols side by side
pub trait Negotiator: Send {
    /// PPP protocol number
    fn protocol(&self) -> u16;
    /// Short name for logs
    fn name(&self) -> &'static str;
    /// Current state
    fn state(&self) -> FsmState;
    /// Administrative open
    fn open(&mut self);
    /// Administrative close
    fn close(&mut self, reason: &str);
    /// Lower layer up
    fn lower_up(&mut self);
    /// Lower layer down
    fn lower_down(&mut self);
    /// Restart timer expired
    fn timeout(&mut self);
    /// Raw inbound packet
    fn input(&mut self, buf: &[u8]);
    /// Peer rejected this protocol
    fn protocol_rejected(&mut self);
    /// Drain pending actions
    fn take_actions(&mut self) -> Vec<FsmAction>;
    /// Protocol handler for downcasting
    fn handler_any(&self) -> &dyn Any;
    /// Protocol handler for downcasting, mutable
    fn handler_any_mut(&mut self) -> &mut dyn Any;
}

impl<P: ProtocolHandler> Negotiator for Fsm<P> {
    fn protocol(&self) -> u16 {
        self.handler.protocol()
    }

    fn name(&self) -> &'static str {
        self.handler.name()
    }

    fn state(&self) -> FsmState {
        self.state
    }

    fn open(&mut self) {
        Fsm::open(self)
    }

    fn close(&mut self, reason: &str) {
        Fsm::close(self, reason)
    }

    fn lower_up(&mut self) {
        Fsm::lower_up(self)
    }

    fn lower_down(&mut self) {
        Fsm::lower_down(self)
    }

    fn timeout(&mut self) {
        Fsm::timeout(self)
    }

    fn input(&mut self, buf: &[u8]) {
        Fsm::input(self, buf)
    }

    fn protocol_rejected(&mut self) {
        Fsm::protocol_rejected(self)
    }

    fn take_actions(&mut self) -> Vec<FsmAction> {
        Fsm::take_actions(self)
    }

    fn handler_any(&self) -> &dyn Any {
        &self.handler
    }

    fn handler_any_mut(&mut self) -> &mut dyn Any {
        &mut self.handler
    }
}

impl dyn Negotiator {
    /// Typed access to the protocol handler
    pub fn handler<P: ProtocolHandler>(&self) -> Option<&P> {
        self.handler_any().downcast_ref::<P>()
    }

    /// Typed mutable access to the protocol handler
    pub fn handler_mut<P: ProtocolHandler>(&mut self) -> Option<&mut P> {
        self.handler_any_mut().downcast_mut::<P>()
    }
}
