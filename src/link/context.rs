//! One link: its control protocols, option store, timers and transport.

use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::timer::{TimerKey, TimerQueue};
use super::transport::Transport;
use super::{LinkEvent, LinkId};
use crate::config::Config;
use crate::error::{PppError, Result};
use crate::fsm::{Fsm, FsmAction, FsmState, Negotiator, ProtocolHandler};
use crate::options::{apply_option, Applied, OptionId, OptionPayload, OptionStore, RequesterId};
use crate::protocol::{Ipcp, IpcpSummary, Lcp};
use crate::wire::protocol_number;

/// Per-link state.
///
/// Every event (packet, timer, command) runs to completion before the next
/// one is accepted; callers serialize access, typically through the
/// registry's per-link mutex.
pub struct LinkContext {
    id: LinkId,
    config: Config,
    store: OptionStore,
    /// Requester whose option set feeds negotiation
    active: Option<RequesterId>,
    /// LCP first, then network control protocols
    negotiators: Vec<Box<dyn Negotiator>>,
    timers: TimerQueue,
    transport: Box<dyn Transport>,
    events: Vec<LinkEvent>,
    alert: u32,
}

/// Snapshot of a link for reporting
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    /// Link handle
    pub link: LinkId,
    /// State per protocol name
    pub protocols: Vec<(String, FsmState)>,
    /// Negotiated IPCP result, once IPCP is opened
    pub ipcp: Option<IpcpSummary>,
    /// Alert-enable value
    pub alert: u32,
}

impl LinkContext {
    /// Create a link with LCP and IPCP registered in `Initial`
    pub fn new(id: LinkId, config: Config, transport: Box<dyn Transport>) -> Self {
        let lcp = Lcp::from_params(None, None, &config.lcp);
        let ipcp = Ipcp::from_params(None, &config.ipcp);
        let negotiators: Vec<Box<dyn Negotiator>> = vec![
            Box::new(Fsm::new(lcp, config.fsm.clone())),
            Box::new(Fsm::new(ipcp, config.fsm.clone())),
        ];

        Self {
            id,
            store: OptionStore::new(config.store.max_option_sets),
            config,
            active: None,
            negotiators,
            timers: TimerQueue::new(),
            transport,
            events: Vec::new(),
            alert: 0,
        }
    }

    /// Link handle
    pub fn id(&self) -> LinkId {
        self.id
    }

    /// Option store of this link
    pub fn store(&self) -> &OptionStore {
        &self.store
    }

    /// Option store of this link, mutable
    pub fn store_mut(&mut self) -> &mut OptionStore {
        &mut self.store
    }

    /// Current alert-enable value
    pub fn alert_enable(&self) -> u32 {
        self.alert
    }

    /// Logical time of this link's timers
    pub fn now(&self) -> Duration {
        self.timers.now()
    }

    /// Time until the next timer fires
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Register another control protocol, replacing any with the same number
    pub fn register(&mut self, negotiator: Box<dyn Negotiator>) {
        match self.index_of(negotiator.protocol()) {
            Some(idx) => self.negotiators[idx] = negotiator,
            None => self.negotiators.push(negotiator),
        }
    }

    /// State of a registered protocol
    pub fn state(&self, protocol: u16) -> Option<FsmState> {
        self.index_of(protocol).map(|idx| self.negotiators[idx].state())
    }

    /// Typed handler of a registered protocol
    pub fn handler<P: ProtocolHandler>(&self) -> Option<&P> {
        self.negotiators.iter().find_map(|n| n.handler::<P>())
    }

    /// Typed handler of a registered protocol, mutable
    pub fn handler_mut<P: ProtocolHandler>(&mut self) -> Option<&mut P> {
        self.negotiators
            .iter_mut()
            .find_map(|n| n.handler_mut::<P>())
    }

    /// Drain upward events
    pub fn take_events(&mut self) -> Vec<LinkEvent> {
        std::mem::take(&mut self.events)
    }

    /// Status snapshot
    pub fn status(&self) -> LinkStatus {
        let ipcp = match self.state(protocol_number::IPCP) {
            Some(FsmState::Opened) => self.handler::<Ipcp>().map(Ipcp::summary),
            _ => None,
        };
        LinkStatus {
            link: self.id,
            protocols: self
                .negotiators
                .iter()
                .map(|n| (n.name().to_string(), n.state()))
                .collect(),
            ipcp,
            alert: self.alert,
        }
    }

    /// Apply a raw option command from `requester`.
    ///
    /// The requester's option set is created first, so an allocation failure
    /// is reported before the identifier is even looked at.
    pub fn set_option_raw(
        &mut self,
        requester: RequesterId,
        option: u32,
        data: &[u8],
    ) -> Result<Applied> {
        self.store.get_or_create(requester)?;
        let id = OptionId::from_raw(option).ok_or(PppError::Unsupported(option))?;
        let payload = OptionPayload::from_wire(id, data)?;
        self.set_option(requester, id, &payload)
    }

    /// Apply a typed option command from `requester`
    pub fn set_option(
        &mut self,
        requester: RequesterId,
        id: OptionId,
        payload: &OptionPayload,
    ) -> Result<Applied> {
        let set = self.store.get_or_create(requester)?;
        let applied = apply_option(set, id, payload)?;

        match applied {
            // the one option that acts on the live link instead of the store
            Applied::AlertEnable(value) => {
                info!(link = %self.id, value, "alert enable changed");
                self.alert = value;
            }
            Applied::Stored => {
                debug!(link = %self.id, %requester, ?id, "option stored");
                if self.active == Some(requester) {
                    self.refresh_wants();
                }
            }
        }
        Ok(applied)
    }

    /// Drop a requester's option set
    pub fn remove_requester(&mut self, requester: RequesterId) {
        if self.store.remove(requester).is_some() {
            debug!(link = %self.id, %requester, "option set dropped");
        }
        if self.active == Some(requester) {
            self.active = None;
        }
    }

    /// Select whose options drive negotiation and open every protocol.
    ///
    /// LCP starts negotiating once the lower layer is up; network control
    /// protocols wait for LCP to open.
    pub fn connect(&mut self, requester: Option<RequesterId>) {
        info!(link = %self.id, requester = ?requester.map(|r| r.0), "connect");
        self.active = requester;
        self.refresh_wants();
        for idx in 0..self.negotiators.len() {
            self.negotiators[idx].open();
            self.run(idx);
        }
    }

    /// Physical layer came up
    pub fn lower_up(&mut self) {
        if let Some(idx) = self.index_of(protocol_number::LCP) {
            self.negotiators[idx].lower_up();
            self.run(idx);
        }
    }

    /// Physical layer went away. No terminate handshake; in-flight
    /// retransmissions are discarded.
    pub fn lower_down(&mut self) {
        if let Some(idx) = self.index_of(protocol_number::LCP) {
            self.negotiators[idx].lower_down();
            self.run(idx);
        }
        self.timers.clear();
    }

    /// Administrative close: network protocols first, then LCP. The link is
    /// released once LCP has finished its terminate handshake.
    pub fn close(&mut self, reason: &str) {
        info!(link = %self.id, reason, "close");
        for idx in (0..self.negotiators.len()).rev() {
            self.negotiators[idx].close(reason);
            self.run(idx);
        }
    }

    /// True when nothing is left to negotiate or terminate
    pub fn is_released(&self) -> bool {
        matches!(
            self.state(protocol_number::LCP),
            None | Some(FsmState::Initial | FsmState::Closed)
        )
    }

    /// Inbound control packet
    pub fn input(&mut self, protocol: u16, packet: &[u8]) {
        let lcp_open = self.state(protocol_number::LCP) == Some(FsmState::Opened);

        match self.index_of(protocol) {
            Some(idx) if protocol == protocol_number::LCP || lcp_open => {
                self.negotiators[idx].input(packet);
                self.run(idx);
            }
            Some(_) => debug!(
                link = %self.id,
                protocol = protocol_number::name(protocol),
                "dropping packet before LCP is open"
            ),
            None if lcp_open => {
                warn!(link = %self.id, protocol, "unsupported protocol");
                let reject = self
                    .handler_mut::<Lcp>()
                    .map(|lcp| lcp.protocol_reject(protocol, packet));
                if let Some(reject) = reject {
                    self.transmit(protocol_number::LCP, reject.encode());
                }
            }
            None => debug!(link = %self.id, protocol, "dropping packet for unknown protocol"),
        }
    }

    /// Advance the logical clock and fire expired timers
    pub fn tick(&mut self, elapsed: Duration) {
        for key in self.timers.advance(elapsed) {
            match key {
                TimerKey::Restart(protocol) => {
                    if let Some(idx) = self.index_of(protocol) {
                        self.negotiators[idx].timeout();
                        self.run(idx);
                    }
                }
                TimerKey::Echo => self.keepalive(),
            }
        }
    }

    fn keepalive(&mut self) {
        let Some(lcp) = self.handler_mut::<Lcp>() else {
            return;
        };
        if !lcp.is_opened() {
            return;
        }

        if lcp.echo_exhausted() {
            let pending = lcp.echos_pending();
            warn!(link = %self.id, pending, "no response to echo-requests");
            self.events.push(LinkEvent::EchoTimeout);
            self.lower_down();
            return;
        }

        let interval = Duration::from_secs(u64::from(lcp.echo_interval()));
        let request = lcp.echo_request();
        self.transmit(protocol_number::LCP, request.encode());
        self.timers.arm(TimerKey::Echo, interval);
    }

    fn refresh_wants(&mut self) {
        let set = self.active.and_then(|r| self.store.get(r));
        let lcp = Lcp::from_params(set.map(|s| &s.lcp), set.map(|s| &s.auth), &self.config.lcp);
        let ipcp = Ipcp::from_params(set.map(|s| &s.ipcp), &self.config.ipcp);

        if let Some(handler) = self.handler_mut::<Lcp>() {
            handler.reconfigure(lcp);
        }
        if let Some(handler) = self.handler_mut::<Ipcp>() {
            handler.reconfigure(ipcp);
        }
    }

    fn index_of(&self, protocol: u16) -> Option<usize> {
        self.negotiators.iter().position(|n| n.protocol() == protocol)
    }

    fn transmit(&mut self, protocol: u16, payload: Bytes) {
        if let Err(e) = self.transport.send(protocol, payload) {
            warn!(
                link = %self.id,
                protocol = protocol_number::name(protocol),
                error = %e,
                "send failed"
            );
        }
    }

    /// Execute the pending actions of one protocol, following any cascade
    /// into the others
    fn run(&mut self, idx: usize) {
        let protocol = self.negotiators[idx].protocol();
        let actions = self.negotiators[idx].take_actions();

        for action in actions {
            match action {
                FsmAction::Send(packet) => self.transmit(protocol, packet.encode()),
                FsmAction::StartTimer(after) => self.timers.arm(TimerKey::Restart(protocol), after),
                FsmAction::CancelTimer => self.timers.cancel(TimerKey::Restart(protocol)),
                FsmAction::Up => {
                    self.events.push(LinkEvent::Up(protocol));
                    if protocol == protocol_number::LCP {
                        self.lcp_up();
                    }
                }
                FsmAction::Down => {
                    self.events.push(LinkEvent::Down(protocol));
                    if protocol == protocol_number::LCP {
                        self.lcp_down();
                    }
                }
                FsmAction::Starting => {
                    debug!(link = %self.id, protocol = protocol_number::name(protocol), "starting");
                }
                FsmAction::Finished => self.events.push(LinkEvent::Finished(protocol)),
                FsmAction::Failed(reason) => {
                    self.events.push(LinkEvent::Failed(protocol, reason));
                }
                FsmAction::ProtocolRejected(rejected) => {
                    warn!(
                        link = %self.id,
                        protocol = protocol_number::name(rejected),
                        "peer rejected protocol"
                    );
                    if let Some(other) = self.index_of(rejected) {
                        if rejected != protocol_number::LCP {
                            self.negotiators[other].protocol_rejected();
                            self.run(other);
                        }
                    }
                }
            }
        }
    }

    fn lcp_up(&mut self) {
        for idx in 0..self.negotiators.len() {
            if self.negotiators[idx].protocol() != protocol_number::LCP {
                self.negotiators[idx].lower_up();
                self.run(idx);
            }
        }

        let interval = self.handler::<Lcp>().map_or(0, Lcp::echo_interval);
        if interval > 0 {
            self.timers
                .arm(TimerKey::Echo, Duration::from_secs(u64::from(interval)));
        }
    }

    fn lcp_down(&mut self) {
        self.timers.cancel(TimerKey::Echo);
        for idx in 0..self.negotiators.len() {
            if self.negotiators[idx].protocol() != protocol_number::LCP {
                self.negotiators[idx].lower_down();
                self.run(idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::transport::{Frame, Outbox};
    use std::sync::{Arc, Mutex};

    /// Transport sharing its frames with the test
    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Outbox>>);

    impl Transport for Shared {
        fn send(&mut self, protocol: u16, payload: Bytes) -> Result<()> {
            self.0.lock().unwrap().send(protocol, payload)
        }
    }

    impl Shared {
        fn drain(&self) -> Vec<Frame> {
            self.0.lock().unwrap().drain()
        }
    }

    fn link(id: u32) -> (LinkContext, Shared) {
        let wire = Shared::default();
        let ctx = LinkContext::new(LinkId(id), Config::default(), Box::new(wire.clone()));
        (ctx, wire)
    }

    fn set(ctx: &mut LinkContext, requester: u32, id: OptionId, value: u32) {
        ctx.set_option(RequesterId(requester), id, &OptionPayload::Numeric(value))
            .unwrap();
    }

    /// Deliver frames back and forth until both sides go quiet
    fn pump(a: &mut LinkContext, wa: &Shared, b: &mut LinkContext, wb: &Shared) {
        for _ in 0..64 {
            let from_a = wa.drain();
            let from_b = wb.drain();
            if from_a.is_empty() && from_b.is_empty() {
                return;
            }
            for f in from_a {
                b.input(f.protocol, &f.payload);
            }
            for f in from_b {
                a.input(f.protocol, &f.payload);
            }
        }
        panic!("links did not settle");
    }

    fn up_pair() -> (LinkContext, Shared, LinkContext, Shared) {
        let (mut a, wa) = link(1);
        let (mut b, wb) = link(2);
        set(&mut a, 7, OptionId::IpcpLocalAddr, 0x0a00_0001);
        set(&mut a, 7, OptionId::IpcpRemoteAddr, 0x0a00_0002);
        set(&mut b, 8, OptionId::IpcpLocalAddr, 0x0a00_0002);
        set(&mut b, 8, OptionId::IpcpRemoteAddr, 0x0a00_0001);
        a.connect(Some(RequesterId(7)));
        b.connect(Some(RequesterId(8)));
        a.lower_up();
        b.lower_up();
        pump(&mut a, &wa, &mut b, &wb);
        (a, wa, b, wb)
    }

    #[test]
    fn test_lcp_then_ipcp_open() {
        let (mut a, _wa, b, _wb) = up_pair();
        assert_eq!(a.state(protocol_number::LCP), Some(FsmState::Opened));
        assert_eq!(a.state(protocol_number::IPCP), Some(FsmState::Opened));
        assert_eq!(b.state(protocol_number::IPCP), Some(FsmState::Opened));

        let events = a.take_events();
        assert_eq!(
            events,
            vec![
                LinkEvent::Up(protocol_number::LCP),
                LinkEvent::Up(protocol_number::IPCP)
            ]
        );

        let summary = a.status().ipcp.unwrap();
        assert_eq!(summary.local.to_string(), "10.0.0.1");
        assert_eq!(summary.remote.to_string(), "10.0.0.2");
    }

    #[test]
    fn test_ipcp_waits_for_lcp() {
        let (mut a, wa) = link(1);
        a.connect(None);
        a.lower_up();
        let frames = wa.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].protocol, protocol_number::LCP);
        assert_eq!(a.state(protocol_number::IPCP), Some(FsmState::Starting));

        // IPCP from the peer before LCP is open is dropped
        a.input(protocol_number::IPCP, &[1, 1, 0, 4]);
        assert!(wa.drain().is_empty());
    }

    #[test]
    fn test_lower_down_cascades() {
        let (mut a, wa, _b, _wb) = up_pair();
        a.take_events();
        a.lower_down();
        assert!(wa.drain().is_empty());
        assert_eq!(a.state(protocol_number::LCP), Some(FsmState::Starting));
        assert_eq!(a.state(protocol_number::IPCP), Some(FsmState::Starting));
        let events = a.take_events();
        assert!(events.contains(&LinkEvent::Down(protocol_number::LCP)));
        assert!(events.contains(&LinkEvent::Down(protocol_number::IPCP)));
        assert_eq!(a.next_deadline(), None);
    }

    #[test]
    fn test_close_releases_after_handshake() {
        let (mut a, wa, mut b, wb) = up_pair();
        a.close("user request");
        assert!(!a.is_released());
        pump(&mut a, &wa, &mut b, &wb);
        assert!(a.is_released());
    }

    #[test]
    fn test_close_releases_after_timeout() {
        let (mut a, wa, _b, _wb) = up_pair();
        a.close("user request");
        wa.drain();
        for _ in 0..10 {
            a.tick(Duration::from_secs(3));
        }
        assert!(a.is_released());
    }

    #[test]
    fn test_unknown_protocol_rejected_when_open() {
        let (mut a, wa, _b, _wb) = up_pair();
        a.input(0x80fd, &[1, 1, 0, 4]);
        let frames = wa.drain();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].protocol, protocol_number::LCP);
        assert_eq!(&frames[0].payload[4..6], &[0x80, 0xfd]);
    }

    #[test]
    fn test_alert_enable_bypasses_store() {
        let (mut a, _wa) = link(1);
        let applied = a
            .set_option(RequesterId(3), OptionId::AlertEnable, &OptionPayload::Numeric(1))
            .unwrap();
        assert_eq!(applied, Applied::AlertEnable(1));
        assert_eq!(a.alert_enable(), 1);
        assert_eq!(a.store().get(RequesterId(3)), Some(&Default::default()));
    }

    #[test]
    fn test_raw_option_unknown_id() {
        let (mut a, _wa) = link(1);
        set(&mut a, 3, OptionId::LcpMru, 1400);
        let before = a.store().get(RequesterId(3)).cloned();
        let err = a.set_option_raw(RequesterId(3), 999, &[0; 4]).unwrap_err();
        assert!(matches!(err, PppError::Unsupported(999)));
        assert_eq!(a.store().get(RequesterId(3)).cloned(), before);
    }

    #[test]
    fn test_echo_keepalive_timeout() {
        let (mut a, wa, _b, _wb) = up_pair();
        a.set_option(
            RequesterId(7),
            OptionId::LcpEcho,
            &OptionPayload::Echo {
                interval: 5,
                failure: 2,
            },
        )
        .unwrap();
        // keepalive settings are picked up on the next LCP up
        a.lower_down();
        a.take_events();
        wa.drain();
        let (mut b, wb) = link(2);
        b.connect(None);
        b.lower_up();
        a.lower_up();
        pump(&mut a, &wa, &mut b, &wb);
        assert_eq!(a.state(protocol_number::LCP), Some(FsmState::Opened));

        // peer goes silent
        a.tick(Duration::from_secs(5));
        a.tick(Duration::from_secs(5));
        let echoes = wa
            .drain()
            .iter()
            .filter(|f| f.protocol == protocol_number::LCP && f.payload[0] == 9)
            .count();
        assert_eq!(echoes, 2);

        a.tick(Duration::from_secs(5));
        assert!(a.take_events().contains(&LinkEvent::EchoTimeout));
        assert_eq!(a.state(protocol_number::LCP), Some(FsmState::Starting));
    }
}
