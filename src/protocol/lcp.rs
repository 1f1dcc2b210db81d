//! Link Control Protocol option codec (RFC 1661 section 6).
//!
//! Besides configuration options, LCP owns the link-level codes that other
//! control protocols never see: Echo-Request/Reply keepalives, Discard-Request
//! and Protocol-Reject.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::LcpConfig;
use crate::error::{PppError, Result};
use crate::fsm::{ConfigureReply, ExtCode, ProtocolHandler};
use crate::options::{auth_proto, AuthParams, LcpParams};
use crate::wire::{
    encode_records, parse_records, parse_records_strict, protocol_number, Code, ControlPacket,
    OptionRecord, HEADER_LEN,
};

/// LCP configuration option types
pub mod ci {
    /// Maximum-Receive-Unit
    pub const MRU: u8 = 1;
    /// Async-Control-Character-Map
    pub const ASYNCMAP: u8 = 2;
    /// Authentication-Protocol
    pub const AUTHTYPE: u8 = 3;
    /// Magic-Number
    pub const MAGIC: u8 = 5;
    /// Protocol-Field-Compression
    pub const PCOMPRESSION: u8 = 7;
    /// Address-and-Control-Field-Compression
    pub const ACCOMPRESSION: u8 = 8;
}

/// Default MRU; not sent when unchanged
pub const DEFAULT_MRU: u16 = 1500;
/// Smallest MRU we let the peer use
pub const MIN_MRU: u16 = 128;
/// ACCM escaping every control character; not sent when unchanged
pub const DEFAULT_ASYNCMAP: u32 = 0xffff_ffff;
/// CHAP digest algorithm: MD5
pub const CHAP_MD5: u8 = 5;

/// Consecutive loopback detections before the link is declared looped
const MAX_LOOPBACKS: u32 = 10;

/// LCP option set
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LcpOptions {
    /// Negotiate MRU
    pub neg_mru: bool,
    /// Maximum receive unit
    pub mru: u16,
    /// Negotiate ACCM
    pub neg_asyncmap: bool,
    /// Async control character map
    pub asyncmap: u32,
    /// PAP allowed / in use
    pub neg_upap: bool,
    /// CHAP allowed / in use
    pub neg_chap: bool,
    /// Negotiate a magic number
    pub neg_magic: bool,
    /// Magic number
    pub magicnumber: u32,
    /// Protocol-field compression
    pub neg_pcompression: bool,
    /// Address/control-field compression
    pub neg_accompression: bool,
}

impl Default for LcpOptions {
    fn default() -> Self {
        Self {
            neg_mru: false,
            mru: DEFAULT_MRU,
            neg_asyncmap: false,
            asyncmap: DEFAULT_ASYNCMAP,
            neg_upap: false,
            neg_chap: false,
            neg_magic: false,
            magicnumber: 0,
            neg_pcompression: false,
            neg_accompression: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Rejected {
    mru: bool,
    asyncmap: bool,
    magic: bool,
    pcompression: bool,
    accompression: bool,
}

fn new_magic() -> u32 {
    loop {
        let magic = rand::random::<u32>();
        if magic != 0 {
            return magic;
        }
    }
}

/// LCP protocol handler
#[derive(Debug, Clone)]
pub struct Lcp {
    want: LcpOptions,
    got: LcpOptions,
    allow: LcpOptions,
    his: LcpOptions,
    rejected: Rejected,
    opened: bool,
    /// Identifier for Echo-Request and Protocol-Reject
    ext_id: u8,
    echo_interval: u32,
    echo_failure: u32,
    echos_pending: u32,
    loopbacks: u32,
}

impl Lcp {
    /// Handler with explicit `want` and `allow` sets; keepalive disabled
    pub fn new(want: LcpOptions, allow: LcpOptions) -> Self {
        Self {
            got: want.clone(),
            want,
            allow,
            his: LcpOptions::default(),
            rejected: Rejected::default(),
            opened: false,
            ext_id: 0,
            echo_interval: 0,
            echo_failure: 0,
            echos_pending: 0,
            loopbacks: 0,
        }
    }

    /// Build the handler from a requester's parameters and the LCP defaults
    pub fn from_params(
        params: Option<&LcpParams>,
        auth: Option<&AuthParams>,
        config: &LcpConfig,
    ) -> Self {
        let mru = params
            .and_then(|p| p.mru.get())
            .map_or(config.mru, |v| v.min(u32::from(u16::MAX)) as u16);
        let asyncmap = params
            .and_then(|p| p.rcaccm.get())
            .unwrap_or(config.asyncmap);
        let pcomp = params.is_some_and(|p| p.pcomp.value() != 0);
        let accomp = params.is_some_and(|p| p.accomp.value() != 0);

        let want = LcpOptions {
            neg_mru: true,
            mru,
            neg_asyncmap: true,
            asyncmap,
            neg_magic: config.magic,
            neg_pcompression: pcomp,
            neg_accompression: accomp,
            ..LcpOptions::default()
        };

        let (neg_upap, neg_chap) = match auth.and_then(|a| a.proto.get()) {
            Some(auth_proto::NONE) => (false, false),
            Some(auth_proto::PAP) => (true, false),
            Some(auth_proto::CHAP) => (false, true),
            _ => (true, true),
        };
        let allow = LcpOptions {
            neg_mru: true,
            mru: DEFAULT_MRU,
            neg_asyncmap: true,
            asyncmap: 0,
            neg_upap,
            neg_chap,
            neg_magic: true,
            neg_pcompression: true,
            neg_accompression: true,
            ..LcpOptions::default()
        };

        let mut lcp = Self::new(want, allow);
        lcp.echo_interval = params
            .and_then(|p| p.echo_interval.get())
            .unwrap_or(config.echo_interval);
        lcp.echo_failure = params
            .and_then(|p| p.echo_failure.get())
            .unwrap_or(config.echo_failure);
        lcp
    }

    /// What we would like
    pub fn want(&self) -> &LcpOptions {
        &self.want
    }

    /// Take `want`, `allow` and keepalive settings from a freshly built
    /// handler. The current attempt keeps its `got`.
    pub fn reconfigure(&mut self, fresh: Lcp) {
        self.want = fresh.want;
        self.allow = fresh.allow;
        self.echo_interval = fresh.echo_interval;
        self.echo_failure = fresh.echo_failure;
    }

    /// What we currently ask for
    pub fn got(&self) -> &LcpOptions {
        &self.got
    }

    /// What we let the peer ask for
    pub fn allow(&self) -> &LcpOptions {
        &self.allow
    }

    /// What we acked in the peer's last request
    pub fn his(&self) -> &LcpOptions {
        &self.his
    }

    /// Whether LCP is in Opened
    pub fn is_opened(&self) -> bool {
        self.opened
    }

    /// Keepalive interval in seconds (0 = disabled)
    pub fn echo_interval(&self) -> u32 {
        self.echo_interval
    }

    /// Unanswered Echo-Requests tolerated (0 = never give up)
    pub fn echo_failure(&self) -> u32 {
        self.echo_failure
    }

    /// Echo-Requests sent without a reply
    pub fn echos_pending(&self) -> u32 {
        self.echos_pending
    }

    /// True once the tolerated number of echoes went unanswered
    pub fn echo_exhausted(&self) -> bool {
        self.echo_failure > 0 && self.echos_pending >= self.echo_failure
    }

    fn next_ext_id(&mut self) -> u8 {
        self.ext_id = self.ext_id.wrapping_add(1);
        self.ext_id
    }

    fn our_magic(&self) -> u32 {
        if self.got.neg_magic {
            self.got.magicnumber
        } else {
            0
        }
    }

    /// Build the next keepalive Echo-Request
    pub fn echo_request(&mut self) -> ControlPacket {
        self.echos_pending += 1;
        let id = self.next_ext_id();
        ControlPacket::new(Code::EchoReq, id, self.our_magic().to_be_bytes().to_vec())
    }

    /// Build a Protocol-Reject for a packet of an unsupported protocol.
    ///
    /// The rejected packet is cut so the reply fits the peer's MRU.
    pub fn protocol_reject(&mut self, protocol: u16, packet: &[u8]) -> ControlPacket {
        let mru = if self.his.neg_mru {
            self.his.mru
        } else {
            DEFAULT_MRU
        };
        let room = usize::from(mru).saturating_sub(HEADER_LEN + 2);
        let packet = &packet[..packet.len().min(room)];

        let mut data = BytesMut::with_capacity(2 + packet.len());
        data.put_u16(protocol);
        data.put_slice(packet);
        let id = self.next_ext_id();
        ControlPacket::new(Code::ProtRej, id, data.freeze())
    }

    /// Records of our Configure-Request, in the order they are sent
    pub fn request_records(&self) -> Vec<OptionRecord> {
        let go = &self.got;
        let mut records = Vec::new();
        if go.neg_mru && go.mru != DEFAULT_MRU {
            records.push(OptionRecord::with_u16(ci::MRU, go.mru));
        }
        if go.neg_asyncmap && go.asyncmap != DEFAULT_ASYNCMAP {
            records.push(OptionRecord::with_u32(ci::ASYNCMAP, go.asyncmap));
        }
        if go.neg_magic {
            records.push(OptionRecord::with_u32(ci::MAGIC, go.magicnumber));
        }
        if go.neg_pcompression {
            records.push(OptionRecord::flag(ci::PCOMPRESSION));
        }
        if go.neg_accompression {
            records.push(OptionRecord::flag(ci::ACCOMPRESSION));
        }
        records
    }

    fn apply_rejected(&mut self) {
        let r = self.rejected;
        let go = &mut self.got;
        go.neg_mru &= !r.mru;
        go.neg_asyncmap &= !r.asyncmap;
        go.neg_magic &= !r.magic;
        go.neg_pcompression &= !r.pcompression;
        go.neg_accompression &= !r.accompression;
    }

    fn auth_record(chap: bool) -> OptionRecord {
        if chap {
            let mut data = protocol_number::CHAP.to_be_bytes().to_vec();
            data.push(CHAP_MD5);
            OptionRecord::new(ci::AUTHTYPE, data)
        } else {
            OptionRecord::with_u16(ci::AUTHTYPE, protocol_number::PAP)
        }
    }

    fn classify_auth(
        &mut self,
        record: OptionRecord,
        naked: &mut Vec<OptionRecord>,
        rejected: &mut Vec<OptionRecord>,
        acked: &mut Vec<OptionRecord>,
        reject_if_disagree: bool,
    ) {
        if (!self.allow.neg_upap && !self.allow.neg_chap) || record.data.len() < 2 {
            rejected.push(record);
            return;
        }
        let protocol = record.u16_at(0).unwrap_or(0);
        let wants_pap = protocol == protocol_number::PAP && record.data.len() == 2;
        let wants_chap = protocol == protocol_number::CHAP
            && record.data.len() == 3
            && record.u8_at(2) == Some(CHAP_MD5);

        if wants_pap && self.allow.neg_upap {
            self.his.neg_upap = true;
            acked.push(record);
        } else if wants_chap && self.allow.neg_chap {
            self.his.neg_chap = true;
            acked.push(record);
        } else if reject_if_disagree {
            rejected.push(record);
        } else {
            naked.push(Self::auth_record(self.allow.neg_chap));
        }
    }
}

impl ProtocolHandler for Lcp {
    fn protocol(&self) -> u16 {
        protocol_number::LCP
    }

    fn name(&self) -> &'static str {
        "LCP"
    }

    fn reset_ci(&mut self) {
        self.want.magicnumber = new_magic();
        self.got = self.want.clone();
        self.apply_rejected();
        self.his = LcpOptions::default();
        self.loopbacks = 0;
    }

    fn add_ci(&mut self) -> Bytes {
        encode_records(&self.request_records())
    }

    fn nak_ci(&mut self, data: &[u8]) -> Result<()> {
        let records = parse_records_strict(data)?;
        let mut next = self.got.clone();

        for record in &records {
            match (record.kind, record.data.len()) {
                (ci::MRU, 2) => {
                    let mru = record.u16_at(0).unwrap_or(DEFAULT_MRU);
                    if next.neg_mru && (mru <= self.want.mru || mru < DEFAULT_MRU) {
                        next.mru = mru;
                    }
                }
                (ci::ASYNCMAP, 4) => {
                    if next.neg_asyncmap {
                        next.asyncmap |= record.u32_at(0).unwrap_or(0);
                    }
                }
                (ci::MAGIC, 4) => {
                    if next.neg_magic {
                        // peer saw its own number: possible loopback
                        self.loopbacks += 1;
                        next.magicnumber = new_magic();
                    }
                }
                (ci::MRU | ci::ASYNCMAP | ci::MAGIC, len) => {
                    return Err(PppError::MalformedPacket(format!(
                        "LCP option {} nak with {} value bytes",
                        record.kind, len
                    )));
                }
                (kind, _) => debug!(kind, "ignoring LCP nak"),
            }
        }

        if self.loopbacks >= MAX_LOOPBACKS {
            warn!(loopbacks = self.loopbacks, "serial line appears to be looped back");
        }
        self.got = next;
        Ok(())
    }

    fn rej_ci(&mut self, data: &[u8]) -> Result<()> {
        let records = parse_records_strict(data)?;
        let sent = self.request_records();
        if let Some(stray) = records.iter().find(|r| !sent.contains(r)) {
            return Err(PppError::MalformedPacket(format!(
                "LCP reject of option {} we did not send",
                stray.kind
            )));
        }

        for record in &records {
            match record.kind {
                ci::MRU => self.rejected.mru = true,
                ci::ASYNCMAP => self.rejected.asyncmap = true,
                ci::MAGIC => self.rejected.magic = true,
                ci::PCOMPRESSION => self.rejected.pcompression = true,
                ci::ACCOMPRESSION => self.rejected.accompression = true,
                _ => {}
            }
        }
        self.apply_rejected();
        Ok(())
    }

    fn req_ci(&mut self, data: &[u8], reject_if_disagree: bool) -> ConfigureReply {
        self.his = LcpOptions::default();
        let parsed = parse_records(data);
        let mut acked = Vec::new();
        let mut naked = Vec::new();
        let mut rejected = Vec::new();

        for record in parsed.records {
            match (record.kind, record.data.len()) {
                (ci::MRU, 2) if self.allow.neg_mru => {
                    let mru = record.u16_at(0).unwrap_or(0);
                    if mru < MIN_MRU {
                        if reject_if_disagree {
                            rejected.push(record);
                        } else {
                            naked.push(OptionRecord::with_u16(ci::MRU, MIN_MRU));
                        }
                    } else {
                        self.his.neg_mru = true;
                        self.his.mru = mru;
                        acked.push(record);
                    }
                }
                (ci::ASYNCMAP, 4) if self.allow.neg_asyncmap => {
                    let map = record.u32_at(0).unwrap_or(0);
                    // peer must escape at least what we require
                    if self.allow.asyncmap & !map != 0 {
                        if reject_if_disagree {
                            rejected.push(record);
                        } else {
                            naked.push(OptionRecord::with_u32(
                                ci::ASYNCMAP,
                                self.allow.asyncmap | map,
                            ));
                        }
                    } else {
                        self.his.neg_asyncmap = true;
                        self.his.asyncmap = map;
                        acked.push(record);
                    }
                }
                (ci::AUTHTYPE, _) => self.classify_auth(
                    record,
                    &mut naked,
                    &mut rejected,
                    &mut acked,
                    reject_if_disagree,
                ),
                (ci::MAGIC, 4) if self.allow.neg_magic => {
                    let magic = record.u32_at(0).unwrap_or(0);
                    if self.got.neg_magic && magic == self.got.magicnumber {
                        self.loopbacks += 1;
                        if reject_if_disagree {
                            rejected.push(record);
                        } else {
                            naked.push(OptionRecord::with_u32(ci::MAGIC, new_magic()));
                        }
                    } else {
                        self.his.neg_magic = true;
                        self.his.magicnumber = magic;
                        acked.push(record);
                    }
                }
                (ci::PCOMPRESSION, 0) if self.allow.neg_pcompression => {
                    self.his.neg_pcompression = true;
                    acked.push(record);
                }
                (ci::ACCOMPRESSION, 0) if self.allow.neg_accompression => {
                    self.his.neg_accompression = true;
                    acked.push(record);
                }
                _ => rejected.push(record),
            }
        }

        if !rejected.is_empty() || parsed.malformed.is_some() {
            let mut body = BytesMut::from(encode_records(&rejected).as_ref());
            if let Some(tail) = parsed.malformed {
                body.extend_from_slice(&tail);
            }
            ConfigureReply::reject(body.freeze())
        } else if !naked.is_empty() {
            ConfigureReply::nak(encode_records(&naked))
        } else {
            ConfigureReply::ack(encode_records(&acked))
        }
    }

    fn up(&mut self) {
        self.opened = true;
        self.echos_pending = 0;
        info!(
            mru = self.his.mru,
            magic = self.got.magicnumber,
            pfc = self.his.neg_pcompression,
            acfc = self.his.neg_accompression,
            "LCP up"
        );
    }

    fn down(&mut self) {
        self.opened = false;
        self.echos_pending = 0;
    }

    fn extended_code(&mut self, packet: &ControlPacket) -> ExtCode {
        match packet.code {
            Code::EchoReq => {
                if !self.opened {
                    return ExtCode::Handled;
                }
                let mut data = BytesMut::from(packet.data.as_ref());
                if data.len() < 4 {
                    debug!(len = data.len(), "short Echo-Request dropped");
                    return ExtCode::Handled;
                }
                data[..4].copy_from_slice(&self.our_magic().to_be_bytes());
                ExtCode::Reply(ControlPacket::new(Code::EchoRep, packet.id, data.freeze()))
            }
            Code::EchoRep => {
                let magic = packet
                    .data
                    .get(..4)
                    .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]));
                if self.got.neg_magic && magic == Some(self.got.magicnumber) {
                    warn!("received our own Echo-Reply: line looped back?");
                } else {
                    self.echos_pending = 0;
                }
                ExtCode::Handled
            }
            Code::DiscReq => ExtCode::Handled,
            Code::ProtRej => {
                if !self.opened {
                    return ExtCode::Handled;
                }
                match packet.data.get(..2) {
                    Some(b) => ExtCode::ProtocolRejected(u16::from_be_bytes([b[0], b[1]])),
                    None => ExtCode::Handled,
                }
            }
            _ => ExtCode::Unknown,
        }
    }
}
