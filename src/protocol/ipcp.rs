//! IP Control Protocol option codec (RFC 1332, RFC 1877).
//!
//! Four option sets drive the exchange:
//!
//! - `want`: what we would like, built from the requester's option set
//! - `got`: what we currently ask for; reset from `want` at the start of
//!   every attempt and adjusted by the peer's naks and rejects
//! - `allow`: what we let the peer ask for
//! - `his`: what we acked in the peer's last request
//!
//! A reject is permanent for the lifetime of the instance: a rejected
//! option is left out of every later request, even across renegotiation.

use std::net::Ipv4Addr;

use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{AddressPolicy, IpcpConfig};
use crate::error::{PppError, Result};
use crate::fsm::{ConfigureReply, ProtocolHandler};
use crate::options::IpcpParams;
use crate::wire::{
    encode_records, parse_records, parse_records_strict, protocol_number, OptionRecord,
};

/// IPCP configuration option types
pub mod ci {
    /// IP-Addresses (deprecated two-address form)
    pub const ADDRS: u8 = 1;
    /// IP-Compression-Protocol
    pub const COMPRESSTYPE: u8 = 2;
    /// IP-Address
    pub const ADDR: u8 = 3;
    /// Primary DNS server
    pub const MS_DNS1: u8 = 129;
    /// Primary WINS server
    pub const MS_WINS1: u8 = 130;
    /// Secondary DNS server
    pub const MS_DNS2: u8 = 131;
    /// Secondary WINS server
    pub const MS_WINS2: u8 = 132;
}

/// Van Jacobson compression protocol identifier
pub const VJ_COMP: u16 = 0x002d;
/// Pre-RFC identifier still used by some peers
pub const VJ_COMP_OLD: u16 = 0x0037;
/// VJ connection slots
pub const MAX_STATES: u8 = 16;

// record lengths including the type and length bytes
const CILEN_COMPRESS: usize = 4;
const CILEN_VJ: usize = 6;
const CILEN_ADDR: usize = 6;
const CILEN_ADDRS: usize = 10;

/// VJ compression option flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VjMode {
    /// Short option with the pre-RFC identifier
    Old,
    /// Short option with the RFC identifier
    Rfc1172,
    /// Long option with max-slot and slot-id compression
    Rfc1332,
}

/// IPCP option set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpcpOptions {
    /// Negotiate addresses
    pub neg_addr: bool,
    /// Use the two-address option
    pub old_addrs: bool,
    /// Nak the peer for its address when it does not offer one
    pub req_addr: bool,
    /// Negotiate VJ compression
    pub neg_vj: bool,
    /// Use the short VJ option
    pub old_vj: bool,
    /// Take the peer's value for our address
    pub accept_local: bool,
    /// Take the peer's value for its address
    pub accept_remote: bool,
    /// Ask the peer for a primary DNS server
    pub req_dns1: bool,
    /// Ask the peer for a secondary DNS server
    pub req_dns2: bool,
    /// VJ protocol identifier
    pub vj_protocol: u16,
    /// Highest VJ slot index
    pub maxslotindex: u8,
    /// Slot-id compression
    pub cflag: bool,
    /// Our address
    pub ouraddr: Ipv4Addr,
    /// Peer address
    pub hisaddr: Ipv4Addr,
    /// DNS servers (primary, secondary)
    pub dnsaddr: [Ipv4Addr; 2],
    /// WINS servers (primary, secondary)
    pub winsaddr: [Ipv4Addr; 2],
}

impl Default for IpcpOptions {
    fn default() -> Self {
        Self {
            neg_addr: false,
            old_addrs: false,
            req_addr: false,
            neg_vj: false,
            old_vj: false,
            accept_local: false,
            accept_remote: false,
            req_dns1: false,
            req_dns2: false,
            vj_protocol: VJ_COMP,
            maxslotindex: MAX_STATES - 1,
            cflag: true,
            ouraddr: Ipv4Addr::UNSPECIFIED,
            hisaddr: Ipv4Addr::UNSPECIFIED,
            dnsaddr: [Ipv4Addr::UNSPECIFIED; 2],
            winsaddr: [Ipv4Addr::UNSPECIFIED; 2],
        }
    }
}

impl IpcpOptions {
    /// Enable VJ compression in the given flavor
    pub fn set_vj_mode(&mut self, mode: VjMode) {
        self.neg_vj = true;
        match mode {
            VjMode::Old => {
                self.old_vj = true;
                self.vj_protocol = VJ_COMP_OLD;
            }
            VjMode::Rfc1172 => {
                self.old_vj = true;
                self.vj_protocol = VJ_COMP;
            }
            VjMode::Rfc1332 => {
                self.old_vj = false;
                self.vj_protocol = VJ_COMP;
            }
        }
    }

    fn req_dns(&self, slot: usize) -> bool {
        if slot == 0 {
            self.req_dns1
        } else {
            self.req_dns2
        }
    }

    fn set_req_dns(&mut self, slot: usize, on: bool) {
        if slot == 0 {
            self.req_dns1 = on;
        } else {
            self.req_dns2 = on;
        }
    }
}

/// Options the peer rejected on this instance
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Rejected {
    addr: bool,
    addrs: bool,
    vj: bool,
    dns: [bool; 2],
}

/// Per-record verdict on a peer Configure-Request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Accepted as sent
    pub acked: Vec<OptionRecord>,
    /// Counter-proposals
    pub naked: Vec<OptionRecord>,
    /// Unsupported or refused, as sent
    pub rejected: Vec<OptionRecord>,
    /// Unparseable tail of the request, rejected verbatim
    pub malformed: Option<Bytes>,
}

impl Classification {
    /// True when every record was accepted
    pub fn is_ack(&self) -> bool {
        self.naked.is_empty() && self.rejected.is_empty() && self.malformed.is_none()
    }

    /// Build the reply: reject beats nak beats ack
    pub fn reply(&self) -> ConfigureReply {
        if !self.rejected.is_empty() || self.malformed.is_some() {
            let mut body = BytesMut::from(encode_records(&self.rejected).as_ref());
            if let Some(tail) = &self.malformed {
                body.extend_from_slice(tail);
            }
            ConfigureReply::reject(body.freeze())
        } else if !self.naked.is_empty() {
            ConfigureReply::nak(encode_records(&self.naked))
        } else {
            ConfigureReply::ack(encode_records(&self.acked))
        }
    }

    fn disagree(
        &mut self,
        original: OptionRecord,
        counter: OptionRecord,
        reject_if_disagree: bool,
    ) {
        if reject_if_disagree {
            self.rejected.push(original);
        } else {
            self.naked.push(counter);
        }
    }
}

/// Negotiated result, for reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpcpSummary {
    /// Our address
    pub local: Ipv4Addr,
    /// Peer address
    pub remote: Ipv4Addr,
    /// VJ identifier we compress toward, if any
    pub vj_protocol: Option<u16>,
    /// Highest slot index in use toward the peer
    pub vj_max_slot: Option<u8>,
    /// DNS servers the peer gave us
    pub dns: Vec<Ipv4Addr>,
}

/// IPCP protocol handler
#[derive(Debug, Clone)]
pub struct Ipcp {
    want: IpcpOptions,
    got: IpcpOptions,
    allow: IpcpOptions,
    his: IpcpOptions,
    rejected: Rejected,
}

fn addr_record(kind: u8, addr: Ipv4Addr) -> OptionRecord {
    OptionRecord::with_u32(kind, u32::from(addr))
}

fn addr_at(record: &OptionRecord, offset: usize) -> Option<Ipv4Addr> {
    record.u32_at(offset).map(Ipv4Addr::from)
}

fn dns_slot(kind: u8) -> usize {
    usize::from(kind == ci::MS_DNS2)
}

fn wins_slot(kind: u8) -> usize {
    usize::from(kind == ci::MS_WINS2)
}

impl Ipcp {
    /// Handler with explicit `want` and `allow` sets
    pub fn new(want: IpcpOptions, allow: IpcpOptions) -> Self {
        let mut ipcp = Self {
            got: want.clone(),
            want,
            allow,
            his: IpcpOptions::default(),
            rejected: Rejected::default(),
        };
        ipcp.derive_want();
        ipcp
    }

    /// Build the handler from a requester's parameters and the IPCP policy.
    ///
    /// Addresses in `params` are host-order integers; zero (or unset) lets
    /// the peer choose.
    pub fn from_params(params: Option<&IpcpParams>, config: &IpcpConfig) -> Self {
        let local = params.map(|p| p.local_addr.value()).unwrap_or(0);
        let remote = params.map(|p| p.remote_addr.value()).unwrap_or(0);
        let vj = params.map(|p| p.hdrcomp.value() != 0).unwrap_or(false);
        let max_slot = config.max_slot_index.min(MAX_STATES - 1);

        let mut want = IpcpOptions {
            neg_addr: true,
            old_addrs: config.old_addrs,
            ouraddr: Ipv4Addr::from(local),
            hisaddr: Ipv4Addr::from(remote),
            accept_remote: config.address_policy == AddressPolicy::Peer,
            req_dns1: config.request_dns[0],
            req_dns2: config.request_dns[1],
            maxslotindex: max_slot,
            cflag: config.slot_compression,
            ..IpcpOptions::default()
        };
        if vj {
            want.set_vj_mode(VjMode::Rfc1332);
        }

        let mut allow = IpcpOptions {
            neg_addr: true,
            neg_vj: true,
            maxslotindex: max_slot,
            cflag: config.slot_compression,
            ..IpcpOptions::default()
        };
        for (slot, addr) in config.dns.iter().take(2).enumerate() {
            allow.dnsaddr[slot] = *addr;
        }
        for (slot, addr) in config.wins.iter().take(2).enumerate() {
            allow.winsaddr[slot] = *addr;
        }

        Self::new(want, allow)
    }

    /// What we would like
    pub fn want(&self) -> &IpcpOptions {
        &self.want
    }

    /// What we would like, mutable. Takes effect at the next attempt.
    pub fn want_mut(&mut self) -> &mut IpcpOptions {
        &mut self.want
    }

    /// Take `want` and `allow` from a freshly built handler. The current
    /// attempt keeps its `got`; the change shows at the next attempt.
    ///
    /// A required-address nak already given up on stays given up.
    pub fn reconfigure(&mut self, fresh: Ipcp) {
        let req_addr = self.want.req_addr && fresh.want.req_addr;
        self.want = fresh.want;
        self.want.req_addr = req_addr;
        self.allow = fresh.allow;
    }

    /// What we currently ask for
    pub fn got(&self) -> &IpcpOptions {
        &self.got
    }

    /// What we let the peer ask for
    pub fn allow(&self) -> &IpcpOptions {
        &self.allow
    }

    /// What we acked in the peer's last request
    pub fn his(&self) -> &IpcpOptions {
        &self.his
    }

    /// Negotiated addresses and compression
    pub fn summary(&self) -> IpcpSummary {
        let remote = if self.his.neg_addr {
            self.his.hisaddr
        } else {
            self.want.hisaddr
        };
        let dns = [0, 1]
            .into_iter()
            .filter(|&slot| self.got.req_dns(slot) && !self.got.dnsaddr[slot].is_unspecified())
            .map(|slot| self.got.dnsaddr[slot])
            .collect();
        IpcpSummary {
            local: self.got.ouraddr,
            remote,
            vj_protocol: self.his.neg_vj.then_some(self.his.vj_protocol),
            vj_max_slot: self.his.neg_vj.then_some(self.his.maxslotindex),
            dns,
        }
    }

    fn derive_want(&mut self) {
        let want = &mut self.want;
        want.req_addr = want.neg_addr && self.allow.neg_addr;
        if want.ouraddr.is_unspecified() {
            want.accept_local = true;
        }
        if want.hisaddr.is_unspecified() {
            want.accept_remote = true;
        }
    }

    /// Records of our Configure-Request, in the order they are sent
    pub fn request_records(&self) -> Vec<OptionRecord> {
        let go = &self.got;
        let mut records = Vec::new();

        if go.neg_addr && go.old_addrs {
            let mut data = Vec::with_capacity(8);
            data.extend_from_slice(&go.ouraddr.octets());
            data.extend_from_slice(&go.hisaddr.octets());
            records.push(OptionRecord::new(ci::ADDRS, data));
        }
        if go.neg_vj {
            if go.old_vj {
                records.push(OptionRecord::with_u16(ci::COMPRESSTYPE, go.vj_protocol));
            } else {
                let mut data = Vec::with_capacity(4);
                data.extend_from_slice(&go.vj_protocol.to_be_bytes());
                data.push(go.maxslotindex);
                data.push(u8::from(go.cflag));
                records.push(OptionRecord::new(ci::COMPRESSTYPE, data));
            }
        }
        if go.neg_addr && !go.old_addrs {
            records.push(addr_record(ci::ADDR, go.ouraddr));
        }
        if go.req_dns1 {
            records.push(addr_record(ci::MS_DNS1, go.dnsaddr[0]));
        }
        if go.req_dns2 {
            records.push(addr_record(ci::MS_DNS2, go.dnsaddr[1]));
        }
        records
    }

    fn apply_rejected(&mut self) {
        let r = self.rejected;
        if r.addr {
            self.got.neg_addr = false;
        }
        if r.addrs {
            self.got.old_addrs = false;
        }
        if r.vj {
            self.got.neg_vj = false;
        }
        for slot in 0..2 {
            if r.dns[slot] {
                self.got.set_req_dns(slot, false);
            }
        }
    }

    fn bad_length(record: &OptionRecord) -> PppError {
        PppError::MalformedPacket(format!(
            "IPCP option {} with length {}",
            record.kind,
            record.wire_len()
        ))
    }

    /// Classify a peer Configure-Request and record what we accept in `his`
    pub fn classify(&mut self, data: &[u8], reject_if_disagree: bool) -> Classification {
        self.his = IpcpOptions::default();
        let parsed = parse_records(data);
        let mut c = Classification {
            malformed: parsed.malformed,
            ..Classification::default()
        };
        let mut vj_seen = false;

        for record in parsed.records {
            let len = record.wire_len();
            match record.kind {
                ci::ADDRS => {
                    if !self.allow.neg_addr || len != CILEN_ADDRS {
                        c.rejected.push(record);
                        continue;
                    }
                    let (Some(mut his_addr), Some(mut our_addr)) =
                        (addr_at(&record, 0), addr_at(&record, 4))
                    else {
                        c.rejected.push(record);
                        continue;
                    };
                    let mut disagree = false;

                    if his_addr != self.want.hisaddr
                        && (his_addr.is_unspecified() || !self.want.accept_remote)
                    {
                        disagree = true;
                        his_addr = self.want.hisaddr;
                    } else if his_addr.is_unspecified() && self.want.hisaddr.is_unspecified() {
                        self.want.req_addr = false;
                        c.rejected.push(record);
                        continue;
                    }

                    if our_addr != self.want.ouraddr {
                        if our_addr.is_unspecified() || !self.want.accept_local {
                            disagree = true;
                            our_addr = self.want.ouraddr;
                        } else {
                            self.got.ouraddr = our_addr;
                        }
                    }

                    self.his.neg_addr = true;
                    self.his.old_addrs = true;
                    self.his.hisaddr = his_addr;
                    self.his.ouraddr = our_addr;

                    if disagree {
                        let mut value = Vec::with_capacity(8);
                        value.extend_from_slice(&his_addr.octets());
                        value.extend_from_slice(&our_addr.octets());
                        let counter = OptionRecord::new(ci::ADDRS, value);
                        c.disagree(record, counter, reject_if_disagree);
                    } else {
                        c.acked.push(record);
                    }
                }
                ci::ADDR => {
                    let his_addr = match addr_at(&record, 0) {
                        Some(addr) if self.allow.neg_addr && len == CILEN_ADDR => addr,
                        _ => {
                            c.rejected.push(record);
                            continue;
                        }
                    };

                    if his_addr != self.want.hisaddr
                        && (his_addr.is_unspecified() || !self.want.accept_remote)
                    {
                        self.his.neg_addr = true;
                        self.his.hisaddr = self.want.hisaddr;
                        let counter = addr_record(ci::ADDR, self.want.hisaddr);
                        c.disagree(record, counter, reject_if_disagree);
                    } else if his_addr.is_unspecified() && self.want.hisaddr.is_unspecified() {
                        // neither side knows the peer address
                        self.want.req_addr = false;
                        c.rejected.push(record);
                    } else {
                        self.his.neg_addr = true;
                        self.his.hisaddr = his_addr;
                        c.acked.push(record);
                    }
                }
                ci::MS_DNS1 | ci::MS_DNS2 | ci::MS_WINS1 | ci::MS_WINS2 => {
                    let served = match record.kind {
                        ci::MS_DNS1 | ci::MS_DNS2 => self.allow.dnsaddr[dns_slot(record.kind)],
                        _ => self.allow.winsaddr[wins_slot(record.kind)],
                    };
                    match addr_at(&record, 0) {
                        Some(_) if served.is_unspecified() || len != CILEN_ADDR => {
                            c.rejected.push(record)
                        }
                        None => c.rejected.push(record),
                        Some(asked) if asked != served => {
                            let counter = addr_record(record.kind, served);
                            c.disagree(record, counter, reject_if_disagree);
                        }
                        Some(_) => c.acked.push(record),
                    }
                }
                ci::COMPRESSTYPE => {
                    if vj_seen
                        || !self.allow.neg_vj
                        || (len != CILEN_VJ && len != CILEN_COMPRESS)
                    {
                        c.rejected.push(record);
                        continue;
                    }
                    let protocol = record.u16_at(0).unwrap_or(0);
                    if !(protocol == VJ_COMP || (protocol == VJ_COMP_OLD && len == CILEN_COMPRESS))
                    {
                        c.rejected.push(record);
                        continue;
                    }
                    vj_seen = true;
                    self.his.neg_vj = true;
                    self.his.vj_protocol = protocol;

                    if len == CILEN_VJ {
                        let mut max_slot = record.u8_at(2).unwrap_or(0);
                        let mut cflag = record.u8_at(3).unwrap_or(0) != 0;
                        let mut disagree = false;
                        if max_slot > self.allow.maxslotindex {
                            disagree = true;
                            max_slot = self.allow.maxslotindex;
                        }
                        if cflag && !self.allow.cflag {
                            disagree = true;
                            cflag = false;
                        }
                        self.his.maxslotindex = max_slot;
                        self.his.cflag = cflag;

                        if disagree {
                            let mut value = Vec::with_capacity(4);
                            value.extend_from_slice(&protocol.to_be_bytes());
                            value.push(max_slot);
                            value.push(u8::from(cflag));
                            let counter = OptionRecord::new(ci::COMPRESSTYPE, value);
                            c.disagree(record, counter, reject_if_disagree);
                        } else {
                            c.acked.push(record);
                        }
                    } else {
                        self.his.old_vj = true;
                        self.his.maxslotindex = MAX_STATES - 1;
                        self.his.cflag = true;
                        c.acked.push(record);
                    }
                }
                _ => c.rejected.push(record),
            }
        }

        // peer must tell us its address when we asked for it
        let rejecting = !c.rejected.is_empty() || c.malformed.is_some();
        if !rejecting && !self.his.neg_addr && self.want.req_addr && !reject_if_disagree {
            if c.naked.is_empty() {
                self.want.req_addr = false;
            }
            c.naked.push(addr_record(ci::ADDR, self.want.hisaddr));
        }

        debug!(
            acked = c.acked.len(),
            naked = c.naked.len(),
            rejected = c.rejected.len(),
            malformed = c.malformed.is_some(),
            "IPCP request classified"
        );
        c
    }
}

impl ProtocolHandler for Ipcp {
    fn protocol(&self) -> u16 {
        protocol_number::IPCP
    }

    fn name(&self) -> &'static str {
        "IPCP"
    }

    fn reset_ci(&mut self) {
        self.derive_want();
        self.got = self.want.clone();
        self.apply_rejected();
        self.his = IpcpOptions::default();
    }

    fn add_ci(&mut self) -> Bytes {
        encode_records(&self.request_records())
    }

    fn nak_ci(&mut self, data: &[u8]) -> Result<()> {
        let records = parse_records_strict(data)?;
        let mut next = self.got.clone();

        for record in &records {
            let len = record.wire_len();
            match record.kind {
                ci::ADDRS => {
                    if len != CILEN_ADDRS {
                        return Err(Self::bad_length(record));
                    }
                    if self.rejected.addrs || self.rejected.addr {
                        continue;
                    }
                    let ours = addr_at(record, 0).unwrap_or(Ipv4Addr::UNSPECIFIED);
                    let his = addr_at(record, 4).unwrap_or(Ipv4Addr::UNSPECIFIED);
                    next.neg_addr = true;
                    next.old_addrs = true;
                    if next.accept_local && !ours.is_unspecified() {
                        next.ouraddr = ours;
                    }
                    if next.accept_remote && !his.is_unspecified() {
                        next.hisaddr = his;
                    }
                }
                ci::ADDR => {
                    if len != CILEN_ADDR {
                        return Err(Self::bad_length(record));
                    }
                    if self.rejected.addr {
                        continue;
                    }
                    let ours = addr_at(record, 0).unwrap_or(Ipv4Addr::UNSPECIFIED);
                    next.neg_addr = true;
                    next.old_addrs = false;
                    if next.accept_local && !ours.is_unspecified() {
                        next.ouraddr = ours;
                    }
                }
                ci::COMPRESSTYPE => {
                    if len != CILEN_VJ && len != CILEN_COMPRESS {
                        return Err(Self::bad_length(record));
                    }
                    if !self.got.neg_vj {
                        continue;
                    }
                    let protocol = record.u16_at(0).unwrap_or(0);
                    if len == CILEN_VJ && protocol == VJ_COMP {
                        next.old_vj = false;
                        next.vj_protocol = VJ_COMP;
                        let max_slot = record.u8_at(2).unwrap_or(0);
                        if max_slot < next.maxslotindex {
                            next.maxslotindex = max_slot;
                        }
                        if record.u8_at(3) == Some(0) {
                            next.cflag = false;
                        }
                    } else if len == CILEN_COMPRESS
                        && (protocol == VJ_COMP || protocol == VJ_COMP_OLD)
                    {
                        next.old_vj = true;
                        next.vj_protocol = protocol;
                    } else {
                        next.neg_vj = false;
                    }
                }
                ci::MS_DNS1 | ci::MS_DNS2 => {
                    if len != CILEN_ADDR {
                        return Err(Self::bad_length(record));
                    }
                    let slot = dns_slot(record.kind);
                    if self.got.req_dns(slot) {
                        next.dnsaddr[slot] = addr_at(record, 0).unwrap_or(Ipv4Addr::UNSPECIFIED);
                    }
                }
                other => debug!(kind = other, "ignoring IPCP nak for unknown option"),
            }
        }

        self.got = next;
        Ok(())
    }

    fn rej_ci(&mut self, data: &[u8]) -> Result<()> {
        let records = parse_records_strict(data)?;
        let sent = self.request_records();
        if let Some(stray) = records.iter().find(|r| !sent.contains(r)) {
            return Err(PppError::MalformedPacket(format!(
                "IPCP reject of option {} we did not send",
                stray.kind
            )));
        }

        for record in &records {
            match record.kind {
                ci::ADDRS => self.rejected.addrs = true,
                ci::ADDR => self.rejected.addr = true,
                ci::COMPRESSTYPE => self.rejected.vj = true,
                ci::MS_DNS1 | ci::MS_DNS2 => self.rejected.dns[dns_slot(record.kind)] = true,
                _ => {}
            }
        }
        self.apply_rejected();
        Ok(())
    }

    fn req_ci(&mut self, data: &[u8], reject_if_disagree: bool) -> ConfigureReply {
        self.classify(data, reject_if_disagree).reply()
    }

    fn up(&mut self) {
        if !self.his.neg_addr {
            self.his.hisaddr = self.want.hisaddr;
        }
        if self.got.ouraddr.is_unspecified() {
            warn!("IPCP up without a local address");
        }
        info!(
            local = %self.got.ouraddr,
            remote = %self.his.hisaddr,
            vj = self.his.neg_vj,
            "IPCP up"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::Code;
    use hex_literal::hex;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    /// Handler with fixed local/remote addresses, optional VJ and DNS request
    fn ipcp(local: &str, remote: &str, vj: bool, request_dns: bool) -> Ipcp {
        let mut want = IpcpOptions {
            neg_addr: true,
            ouraddr: ip(local),
            hisaddr: ip(remote),
            req_dns1: request_dns,
            ..IpcpOptions::default()
        };
        if vj {
            want.set_vj_mode(VjMode::Rfc1332);
        }
        let allow = IpcpOptions {
            neg_addr: true,
            neg_vj: true,
            dnsaddr: [ip("10.0.0.53"), Ipv4Addr::UNSPECIFIED],
            ..IpcpOptions::default()
        };
        let mut ipcp = Ipcp::new(want, allow);
        ipcp.reset_ci();
        ipcp
    }

    #[test]
    fn test_request_encoding() {
        let mut a = ipcp("10.0.0.1", "10.0.0.2", true, true);
        assert_eq!(
            a.add_ci().as_ref(),
            &hex!("02 06 00 2d 0f 01 03 06 0a 00 00 01 81 06 00 00 00 00")
        );
    }

    #[test]
    fn test_old_forms_encoding() {
        let mut want = IpcpOptions {
            neg_addr: true,
            old_addrs: true,
            ouraddr: ip("192.168.1.1"),
            hisaddr: ip("192.168.1.2"),
            ..IpcpOptions::default()
        };
        want.set_vj_mode(VjMode::Old);
        let mut a = Ipcp::new(want, IpcpOptions::default());
        a.reset_ci();
        assert_eq!(
            a.add_ci().as_ref(),
            &hex!("01 0a c0 a8 01 01 c0 a8 01 02 02 04 00 37")
        );
    }

    #[test]
    fn test_mirrored_request_is_all_ack() {
        let mut a = ipcp("10.0.0.1", "10.0.0.2", true, false);
        let mut b = ipcp("10.0.0.2", "10.0.0.1", true, false);

        let request = a.add_ci();
        let c = b.classify(&request, false);
        assert!(c.is_ack(), "{c:?}");
        assert_eq!(c.reply(), ConfigureReply::ack(request));
        assert_eq!(b.his().hisaddr, ip("10.0.0.1"));
        assert!(b.his().neg_vj);
    }

    #[test]
    fn test_dns_request_served() {
        let mut a = ipcp("10.0.0.1", "10.0.0.2", false, true);
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);

        let reply = b.req_ci(&a.add_ci(), false);
        assert_eq!(reply.code, Code::ConfNak);
        assert_eq!(reply.body.as_ref(), &hex!("81 06 0a 00 00 35"));

        a.nak_ci(&reply.body).unwrap();
        assert_eq!(a.got().dnsaddr[0], ip("10.0.0.53"));
        assert_eq!(a.got().ouraddr, ip("10.0.0.1"));

        let reply = b.req_ci(&a.add_ci(), false);
        assert_eq!(reply.code, Code::ConfAck);
        assert_eq!(a.summary().dns, vec![ip("10.0.0.53")]);
    }

    #[test]
    fn test_unserved_dns_rejected() {
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);
        let c = b.classify(&hex!("03 06 0a 00 00 01 83 06 00 00 00 00"), false);
        assert_eq!(c.rejected, vec![OptionRecord::with_u32(ci::MS_DNS2, 0)]);
        assert_eq!(c.reply().code, Code::ConfRej);
    }

    #[test]
    fn test_host_policy_naks_conflicting_remote() {
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);
        let reply = b.req_ci(&hex!("03 06 0a 00 00 63"), false);
        assert_eq!(reply.code, Code::ConfNak);
        assert_eq!(reply.body.as_ref(), &hex!("03 06 0a 00 00 01"));
    }

    #[test]
    fn test_peer_policy_accepts_proposal() {
        let config = IpcpConfig {
            address_policy: AddressPolicy::Peer,
            ..IpcpConfig::default()
        };
        let mut b = Ipcp::from_params(None, &config);
        b.reset_ci();
        let c = b.classify(&hex!("03 06 0a 00 00 63"), false);
        assert!(c.is_ack());
        assert_eq!(b.his().hisaddr, ip("10.0.0.99"));
    }

    #[test]
    fn test_unknown_addresses_rejected() {
        let mut b = Ipcp::from_params(None, &IpcpConfig::default());
        b.reset_ci();
        let c = b.classify(&hex!("03 06 00 00 00 00"), false);
        assert_eq!(c.rejected.len(), 1);
        assert!(c.naked.is_empty());
        assert!(!b.want().req_addr);
    }

    #[test]
    fn test_reject_beats_nak() {
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);
        let c = b.classify(&hex!("03 06 0a 00 00 63 55 04 01 02"), false);
        assert_eq!(c.naked.len(), 1);
        let reply = c.reply();
        assert_eq!(reply.code, Code::ConfRej);
        assert_eq!(reply.body.as_ref(), &hex!("55 04 01 02"));
    }

    #[test]
    fn test_reject_if_disagree() {
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);
        let reply = b.req_ci(&hex!("03 06 0a 00 00 63"), true);
        assert_eq!(reply.code, Code::ConfRej);
        assert_eq!(reply.body.as_ref(), &hex!("03 06 0a 00 00 63"));
    }

    #[test]
    fn test_single_compression_option() {
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);
        let c = b.classify(
            &hex!("03 06 0a 00 00 01 02 06 00 2d 0f 01 02 04 00 37"),
            false,
        );
        assert_eq!(c.rejected, vec![OptionRecord::with_u16(ci::COMPRESSTYPE, VJ_COMP_OLD)]);
        assert_eq!(b.his().vj_protocol, VJ_COMP);
    }

    #[test]
    fn test_old_vj_variants() {
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);

        let c = b.classify(&hex!("03 06 0a 00 00 01 02 04 00 37"), false);
        assert!(c.is_ack());
        assert!(b.his().old_vj);
        assert_eq!(b.his().vj_protocol, VJ_COMP_OLD);

        // long form is only defined for the current identifier
        let c = b.classify(&hex!("03 06 0a 00 00 01 02 06 00 37 0f 01"), false);
        assert_eq!(c.rejected.len(), 1);
    }

    #[test]
    fn test_max_slot_naked_down() {
        let want = IpcpOptions {
            neg_addr: true,
            ouraddr: ip("10.0.0.2"),
            hisaddr: ip("10.0.0.1"),
            ..IpcpOptions::default()
        };
        let allow = IpcpOptions {
            neg_addr: true,
            neg_vj: true,
            maxslotindex: 7,
            cflag: false,
            ..IpcpOptions::default()
        };
        let mut b = Ipcp::new(want, allow);
        let c = b.classify(&hex!("03 06 0a 00 00 01 02 06 00 2d 0f 01"), false);
        assert_eq!(
            c.naked,
            vec![OptionRecord::new(ci::COMPRESSTYPE, hex!("00 2d 07 00").to_vec())]
        );

        let mut a = ipcp("10.0.0.1", "10.0.0.2", true, false);
        a.nak_ci(&encode_records(&c.naked)).unwrap();
        assert_eq!(a.got().maxslotindex, 7);
        assert!(!a.got().cflag);
        assert!(a.got().neg_vj);
        assert_eq!(a.got().ouraddr, ip("10.0.0.1"));
    }

    #[test]
    fn test_missing_address_naked() {
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);
        let reply = b.req_ci(&hex!("02 04 00 2d"), false);
        assert_eq!(reply.code, Code::ConfNak);
        assert_eq!(reply.body.as_ref(), &hex!("03 06 0a 00 00 01"));
        assert!(!b.want().req_addr);

        // asked once per attempt
        assert_eq!(b.req_ci(&hex!("02 04 00 2d"), false).code, Code::ConfAck);
    }

    #[test]
    fn test_address_nak_adopted_when_accepting_local() {
        let mut a = Ipcp::from_params(None, &IpcpConfig::default());
        a.reset_ci();
        assert_eq!(a.add_ci().as_ref(), &hex!("03 06 00 00 00 00"));

        a.nak_ci(&hex!("03 06 0a 40 00 07")).unwrap();
        assert_eq!(a.got().ouraddr, ip("10.64.0.7"));
        assert_eq!(a.add_ci().as_ref(), &hex!("03 06 0a 40 00 07"));
    }

    #[test]
    fn test_address_nak_ignored_when_fixed() {
        let mut a = ipcp("10.0.0.1", "10.0.0.2", false, false);
        a.nak_ci(&hex!("03 06 0a 40 00 07")).unwrap();
        assert_eq!(a.got().ouraddr, ip("10.0.0.1"));
    }

    #[test]
    fn test_reject_is_permanent() {
        let mut a = ipcp("10.0.0.1", "10.0.0.2", true, false);
        a.rej_ci(&hex!("03 06 0a 00 00 01")).unwrap();
        assert_eq!(a.add_ci().as_ref(), &hex!("02 06 00 2d 0f 01"));

        a.reset_ci();
        assert_eq!(a.add_ci().as_ref(), &hex!("02 06 00 2d 0f 01"));

        // a later nak cannot bring it back
        a.nak_ci(&hex!("03 06 0a 00 00 09")).unwrap();
        assert!(!a.got().neg_addr);
    }

    #[test]
    fn test_rejected_addrs_falls_back_to_addr() {
        let want = IpcpOptions {
            neg_addr: true,
            old_addrs: true,
            ouraddr: ip("10.0.0.1"),
            hisaddr: ip("10.0.0.2"),
            ..IpcpOptions::default()
        };
        let mut a = Ipcp::new(want, IpcpOptions::default());
        a.reset_ci();
        a.rej_ci(&hex!("01 0a 0a 00 00 01 0a 00 00 02")).unwrap();
        assert_eq!(a.add_ci().as_ref(), &hex!("03 06 0a 00 00 01"));
    }

    #[test]
    fn test_bogus_reject_ignored() {
        let mut a = ipcp("10.0.0.1", "10.0.0.2", false, false);
        assert!(a.rej_ci(&hex!("03 06 0a 00 00 09")).is_err());
        assert!(a.rej_ci(&hex!("02 04 00 2d")).is_err());
        assert!(a.got().neg_addr);
    }

    #[test]
    fn test_bad_nak_length() {
        let mut a = ipcp("10.0.0.1", "10.0.0.2", false, false);
        assert!(a.nak_ci(&hex!("03 04 0a 00")).is_err());
        assert!(a.nak_ci(&hex!("03 09 0a")).is_err());
    }

    #[test]
    fn test_malformed_tail_rejected() {
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);
        let reply = b.req_ci(&hex!("03 06 0a 00 00 01 81 09 00 00"), false);
        assert_eq!(reply.code, Code::ConfRej);
        assert_eq!(reply.body.as_ref(), &hex!("81 09 00 00"));
        assert!(b.his().neg_addr);
    }

    #[test]
    fn test_renegotiation_resets_his() {
        let mut b = ipcp("10.0.0.2", "10.0.0.1", false, false);
        assert!(b.classify(&hex!("03 06 0a 00 00 01 02 06 00 2d 0f 01"), false).is_ack());
        assert!(b.his().neg_vj);

        assert!(b.classify(&hex!("03 06 0a 00 00 01"), false).is_ack());
        assert!(!b.his().neg_vj);
        assert_eq!(b.his().hisaddr, ip("10.0.0.1"));
    }

    #[test]
    fn test_from_params() {
        let mut params = IpcpParams::default();
        crate::options::set_numeric(&mut params.local_addr, 0x0a00_0001, 0, u32::MAX, true)
            .unwrap();
        crate::options::set_numeric(&mut params.hdrcomp, 1, 0, 1, true).unwrap();
        let config = IpcpConfig {
            request_dns: [true, false],
            max_slot_index: 40,
            ..IpcpConfig::default()
        };

        let a = Ipcp::from_params(Some(&params), &config);
        assert_eq!(a.want().ouraddr, ip("10.0.0.1"));
        assert!(!a.want().accept_local);
        assert!(a.want().accept_remote);
        assert!(a.want().neg_vj);
        assert!(a.want().req_dns1);
        assert_eq!(a.want().maxslotindex, MAX_STATES - 1);
        assert!(a.want().req_addr);
    }

    #[test]
    fn test_reconfigure_keeps_dropped_address_nak() {
        let mut params = IpcpParams::default();
        crate::options::set_numeric(&mut params.local_addr, 0x0a00_0001, 0, u32::MAX, true)
            .unwrap();
        let config = IpcpConfig::default();

        let mut b = Ipcp::from_params(Some(&params), &config);
        b.reset_ci();
        assert!(b.want().req_addr);

        // peer offers no address: one nak, then the requirement is dropped
        let c = b.classify(&[], false);
        assert_eq!(c.naked.len(), 1);
        assert!(!b.want().req_addr);

        crate::options::set_numeric(&mut params.hdrcomp, 1, 0, 1, true).unwrap();
        b.reconfigure(Ipcp::from_params(Some(&params), &config));
        assert!(b.want().neg_vj);
        assert!(!b.want().req_addr);
        assert!(b.classify(&[], false).is_ack());
    }
}
