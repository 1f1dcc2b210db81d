//! Option identifiers and the option-set dispatcher.

use serde::{Deserialize, Serialize};

use super::store::OptionSet;
use super::value::{round_speed, set_numeric, set_string, OptionValue};
use crate::error::{PppError, Result};

/// LCP header-compression bits carried by [`OptionId::LcpHdrComp`]
pub mod lcp_hdrcomp {
    /// Protocol-field compression
    pub const PROTO: u32 = 1 << 0;
    /// Address/control-field compression
    pub const ADDR: u32 = 1 << 1;
}

/// Authentication protocol selectors carried by [`OptionId::AuthProto`]
pub mod auth_proto {
    /// No authentication
    pub const NONE: u32 = 0;
    /// PAP or CHAP, whichever the peer asks for
    pub const PAP_CHAP: u32 = 1;
    /// PAP only
    pub const PAP: u32 = 2;
    /// CHAP only
    pub const CHAP: u32 = 3;
}

/// Option identifiers of the controller protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum OptionId {
    /// Device name (string)
    DevName = 1,
    /// Device speed (numeric, ladder-rounded)
    DevSpeed = 2,
    /// Connect script (string)
    DevConnectScript = 3,
    /// Idle timer (numeric)
    CommIdleTimer = 4,
    /// Remote dial address (string)
    CommRemoteAddr = 5,
    /// Authentication protocol (numeric, rejects beyond CHAP)
    AuthProto = 6,
    /// Authentication name (string)
    AuthName = 7,
    /// Authentication password (string)
    AuthPasswd = 8,
    /// LCP header compression bitmask (numeric)
    LcpHdrComp = 9,
    /// LCP MRU (numeric)
    LcpMru = 10,
    /// LCP MTU (numeric)
    LcpMtu = 11,
    /// LCP receive ACCM (numeric)
    LcpRcAccm = 12,
    /// LCP transmit ACCM (numeric)
    LcpTxAccm = 13,
    /// IPCP VJ header compression (numeric 0/1)
    IpcpHdrComp = 14,
    /// IPCP local address (numeric)
    IpcpLocalAddr = 15,
    /// IPCP remote address (numeric)
    IpcpRemoteAddr = 16,
    /// Log file (string)
    LogFile = 17,
    /// Reminder timer (numeric)
    CommReminderTimer = 19,
    /// Alert enable (numeric, applied to the live link)
    AlertEnable = 20,
    /// LCP echo interval and failure count (pair)
    LcpEcho = 21,
    /// Connect delay (numeric)
    CommConnectDelay = 22,
    /// Session timer (numeric)
    CommSessionTimer = 23,
    /// Terminal mode (numeric)
    CommTerminalMode = 24,
    /// Terminal script (string)
    CommTerminalScript = 25,
}

impl OptionId {
    /// All identifiers, in wire order
    pub const ALL: [OptionId; 24] = [
        OptionId::DevName,
        OptionId::DevSpeed,
        OptionId::DevConnectScript,
        OptionId::CommIdleTimer,
        OptionId::CommRemoteAddr,
        OptionId::AuthProto,
        OptionId::AuthName,
        OptionId::AuthPasswd,
        OptionId::LcpHdrComp,
        OptionId::LcpMru,
        OptionId::LcpMtu,
        OptionId::LcpRcAccm,
        OptionId::LcpTxAccm,
        OptionId::IpcpHdrComp,
        OptionId::IpcpLocalAddr,
        OptionId::IpcpRemoteAddr,
        OptionId::LogFile,
        OptionId::CommReminderTimer,
        OptionId::AlertEnable,
        OptionId::LcpEcho,
        OptionId::CommConnectDelay,
        OptionId::CommSessionTimer,
        OptionId::CommTerminalMode,
        OptionId::CommTerminalScript,
    ];

    /// Resolve a raw identifier
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.as_raw() == raw)
    }

    /// Raw identifier
    pub fn as_raw(&self) -> u32 {
        *self as u32
    }

    /// Whether the option takes a string payload
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            OptionId::DevName
                | OptionId::DevConnectScript
                | OptionId::CommRemoteAddr
                | OptionId::AuthName
                | OptionId::AuthPasswd
                | OptionId::LogFile
                | OptionId::CommTerminalScript
        )
    }
}

/// Typed payload of an option-set command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionPayload {
    /// 32-bit numeric value
    Numeric(u32),
    /// Byte string
    Bytes(Vec<u8>),
    /// Echo interval and failure count
    Echo {
        /// Seconds between Echo-Requests
        interval: u32,
        /// Unanswered echoes tolerated
        failure: u32,
    }
}

impl OptionPayload {
    /// Interpret a raw payload for `id`.
    ///
    /// Numeric payloads are host-order `u32`s; the echo payload is two of
    /// them. Short buffers are rejected rather than read past their end.
    pub fn from_wire(id: OptionId, data: &[u8]) -> Result<Self> {
        if id.is_string() {
            return Ok(OptionPayload::Bytes(data.to_vec()));
        }

        let word = |offset: usize| -> Result<u32> {
            data.get(offset..offset + 4)
                .and_then(|b| b.try_into().ok())
                .map(u32::from_ne_bytes)
                .ok_or_else(|| {
                    PppError::InvalidValue(format!(
                        "{:?} payload too short: {} bytes",
                        id,
                        data.len()
                    ))
                })
        };

        if id == OptionId::LcpEcho {
            Ok(OptionPayload::Echo {
                interval: word(0)?,
                failure: word(4)?,
            })
        } else {
            Ok(OptionPayload::Numeric(word(0)?))
        }
    }

    fn numeric(&self, id: OptionId) -> Result<u32> {
        match self {
            OptionPayload::Numeric(v) => Ok(*v),
            other => Err(PppError::InvalidValue(format!(
                "{:?} expects a numeric payload, got {:?}",
                id, other
            ))),
        }
    }

    fn bytes(&self, id: OptionId) -> Result<&[u8]> {
        match self {
            OptionPayload::Bytes(b) => Ok(b),
            other => Err(PppError::InvalidValue(format!(
                "{:?} expects a string payload, got {:?}",
                id, other
            ))),
        }
    }
}

/// What [`apply_option`] did with a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Value validated and written to the option set
    Stored,
    /// Alert-enable value that the caller must apply to the live link.
    ///
    /// This is the only option that bypasses the store: it takes effect
    /// immediately instead of at the next negotiation.
    AlertEnable(u32),
}

/// Validate `payload` and write it into `set`.
///
/// Composite options (LCP header compression, LCP echo) decompose into two
/// entries; each half is validated and written on its own and the first
/// error, if any, is returned after both have been attempted.
pub fn apply_option(
    set: &mut OptionSet,
    id: OptionId,
    payload: &OptionPayload,
) -> Result<Applied> {
    const ANY: u32 = u32::MAX;

    match id {
        OptionId::DevName => set_string(&mut set.dev.name, payload.bytes(id)?)?,
        OptionId::DevSpeed => {
            let speed = round_speed(payload.numeric(id)?);
            set_numeric(&mut set.dev.speed, speed, 0, ANY, false)?;
        }
        OptionId::DevConnectScript => set_string(&mut set.dev.connect_script, payload.bytes(id)?)?,
        OptionId::CommTerminalMode => {
            set_numeric(&mut set.comm.terminal_mode, payload.numeric(id)?, 0, ANY, true)?;
        }
        OptionId::CommTerminalScript => {
            set_string(&mut set.comm.terminal_script, payload.bytes(id)?)?;
        }
        OptionId::CommRemoteAddr => set_string(&mut set.comm.remote_addr, payload.bytes(id)?)?,
        OptionId::CommIdleTimer => {
            set_numeric(&mut set.comm.idle_timer, payload.numeric(id)?, 0, ANY, true)?;
        }
        OptionId::CommSessionTimer => {
            set_numeric(&mut set.comm.session_timer, payload.numeric(id)?, 0, ANY, true)?;
        }
        OptionId::CommConnectDelay => {
            set_numeric(&mut set.comm.connect_delay, payload.numeric(id)?, 0, ANY, true)?;
        }
        OptionId::CommReminderTimer => {
            set_numeric(&mut set.comm.reminder_timer, payload.numeric(id)?, 0, ANY, true)?;
        }
        OptionId::LcpHdrComp => {
            let mask = payload.numeric(id)?;
            let pcomp = set_numeric(
                &mut set.lcp.pcomp,
                u32::from(mask & lcp_hdrcomp::PROTO != 0),
                0,
                1,
                true,
            );
            let accomp = set_numeric(
                &mut set.lcp.accomp,
                u32::from(mask & lcp_hdrcomp::ADDR != 0),
                0,
                1,
                true,
            );
            pcomp.and(accomp)?;
        }
        OptionId::LcpMru => set_numeric(&mut set.lcp.mru, payload.numeric(id)?, 0, ANY, true)?,
        OptionId::LcpMtu => set_numeric(&mut set.lcp.mtu, payload.numeric(id)?, 0, ANY, true)?,
        OptionId::LcpRcAccm => {
            set_numeric(&mut set.lcp.rcaccm, payload.numeric(id)?, 0, ANY, true)?;
        }
        OptionId::LcpTxAccm => {
            set_numeric(&mut set.lcp.txaccm, payload.numeric(id)?, 0, ANY, true)?;
        }
        OptionId::LcpEcho => {
            let (interval, failure) = match payload {
                OptionPayload::Echo { interval, failure } => (*interval, *failure),
                other => {
                    return Err(PppError::InvalidValue(format!(
                        "{:?} expects an echo payload, got {:?}",
                        id, other
                    )));
                }
            };
            let interval = set_numeric(&mut set.lcp.echo_interval, interval, 0, ANY, true);
            let failure = set_numeric(&mut set.lcp.echo_failure, failure, 0, ANY, true);
            interval.and(failure)?;
        }
        // Values above CHAP are refused rather than clamped to CHAP, unlike
        // controllers that silently pin the value to the top of the range.
        OptionId::AuthProto => {
            set_numeric(&mut set.auth.proto, payload.numeric(id)?, 0, auth_proto::CHAP, false)?;
        }
        OptionId::AuthName => set_string(&mut set.auth.name, payload.bytes(id)?)?,
        OptionId::AuthPasswd => set_string(&mut set.auth.passwd, payload.bytes(id)?)?,
        OptionId::IpcpHdrComp => {
            set_numeric(&mut set.ipcp.hdrcomp, payload.numeric(id)?, 0, 1, true)?;
        }
        OptionId::IpcpRemoteAddr => {
            set_numeric(&mut set.ipcp.remote_addr, payload.numeric(id)?, 0, ANY, true)?;
        }
        OptionId::IpcpLocalAddr => {
            set_numeric(&mut set.ipcp.local_addr, payload.numeric(id)?, 0, ANY, true)?;
        }
        OptionId::LogFile => set_string(&mut set.misc.logfile, payload.bytes(id)?)?,
        OptionId::AlertEnable => return Ok(Applied::AlertEnable(payload.numeric(id)?)),
    }

    Ok(Applied::Stored)
}

impl OptionSet {
    /// Snapshot of the entry behind `id`.
    ///
    /// Composite options report their first half (protocol-field compression
    /// for `LcpHdrComp`, interval for `LcpEcho`). `AlertEnable` has no entry.
    pub fn value(&self, id: OptionId) -> Option<OptionValue> {
        let value = match id {
            OptionId::DevName => (&self.dev.name).into(),
            OptionId::DevSpeed => (&self.dev.speed).into(),
            OptionId::DevConnectScript => (&self.dev.connect_script).into(),
            OptionId::CommTerminalMode => (&self.comm.terminal_mode).into(),
            OptionId::CommTerminalScript => (&self.comm.terminal_script).into(),
            OptionId::CommRemoteAddr => (&self.comm.remote_addr).into(),
            OptionId::CommIdleTimer => (&self.comm.idle_timer).into(),
            OptionId::CommSessionTimer => (&self.comm.session_timer).into(),
            OptionId::CommConnectDelay => (&self.comm.connect_delay).into(),
            OptionId::CommReminderTimer => (&self.comm.reminder_timer).into(),
            OptionId::LcpHdrComp => (&self.lcp.pcomp).into(),
            OptionId::LcpMru => (&self.lcp.mru).into(),
            OptionId::LcpMtu => (&self.lcp.mtu).into(),
            OptionId::LcpRcAccm => (&self.lcp.rcaccm).into(),
            OptionId::LcpTxAccm => (&self.lcp.txaccm).into(),
            OptionId::LcpEcho => (&self.lcp.echo_interval).into(),
            OptionId::AuthProto => (&self.auth.proto).into(),
            OptionId::AuthName => (&self.auth.name).into(),
            OptionId::AuthPasswd => (&self.auth.passwd).into(),
            OptionId::IpcpHdrComp => (&self.ipcp.hdrcomp).into(),
            OptionId::IpcpRemoteAddr => (&self.ipcp.remote_addr).into(),
            OptionId::IpcpLocalAddr => (&self.ipcp.local_addr).into(),
            OptionId::LogFile => (&self.misc.logfile).into(),
            OptionId::AlertEnable => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(set: &mut OptionSet, id: OptionId, payload: OptionPayload) -> Result<Applied> {
        apply_option(set, id, &payload)
    }

    #[test]
    fn test_raw_ids_roundtrip() {
        for id in OptionId::ALL {
            assert_eq!(OptionId::from_raw(id.as_raw()), Some(id));
        }
        assert_eq!(OptionId::from_raw(0), None);
        assert_eq!(OptionId::from_raw(18), None);
        assert_eq!(OptionId::from_raw(999), None);
    }

    #[test]
    fn test_speed_rounds_up() {
        let mut set = OptionSet::default();
        apply(&mut set, OptionId::DevSpeed, OptionPayload::Numeric(5000)).unwrap();
        assert_eq!(set.dev.speed.get(), Some(9600));

        apply(&mut set, OptionId::DevSpeed, OptionPayload::Numeric(999_999)).unwrap();
        assert_eq!(set.dev.speed.get(), Some(115200));
    }

    #[test]
    fn test_lcp_hdrcomp_address_bit_only() {
        let mut set = OptionSet::default();
        apply(
            &mut set,
            OptionId::LcpHdrComp,
            OptionPayload::Numeric(lcp_hdrcomp::ADDR),
        )
        .unwrap();

        assert_eq!(set.lcp.pcomp.value(), 0);
        assert_eq!(set.lcp.accomp.value(), 1);
        assert!(set.lcp.accomp.is_set());
    }

    #[test]
    fn test_lcp_hdrcomp_both_bits() {
        let mut set = OptionSet::default();
        apply(
            &mut set,
            OptionId::LcpHdrComp,
            OptionPayload::Numeric(lcp_hdrcomp::ADDR | lcp_hdrcomp::PROTO),
        )
        .unwrap();
        assert_eq!(set.lcp.pcomp.get(), Some(1));
        assert_eq!(set.lcp.accomp.get(), Some(1));
    }

    #[test]
    fn test_echo_pair_sets_both() {
        let mut set = OptionSet::default();
        apply(
            &mut set,
            OptionId::LcpEcho,
            OptionPayload::Echo {
                interval: 10,
                failure: 4,
            },
        )
        .unwrap();
        assert_eq!(set.lcp.echo_interval.get(), Some(10));
        assert_eq!(set.lcp.echo_failure.get(), Some(4));
    }

    #[test]
    fn test_auth_proto_rejects_beyond_chap() {
        let mut set = OptionSet::default();
        apply(
            &mut set,
            OptionId::AuthProto,
            OptionPayload::Numeric(auth_proto::PAP),
        )
        .unwrap();

        let err = apply(&mut set, OptionId::AuthProto, OptionPayload::Numeric(9)).unwrap_err();
        assert!(matches!(err, PppError::InvalidValue(_)));
        assert_eq!(set.auth.proto.get(), Some(auth_proto::PAP));
    }

    #[test]
    fn test_ipcp_hdrcomp_clamps() {
        let mut set = OptionSet::default();
        apply(&mut set, OptionId::IpcpHdrComp, OptionPayload::Numeric(5)).unwrap();
        assert_eq!(set.ipcp.hdrcomp.get(), Some(1));
    }

    #[test]
    fn test_wrong_payload_shape() {
        let mut set = OptionSet::default();
        let err = apply(
            &mut set,
            OptionId::LcpMru,
            OptionPayload::Bytes(b"1500".to_vec()),
        )
        .unwrap_err();
        assert!(matches!(err, PppError::InvalidValue(_)));

        let err = apply(&mut set, OptionId::AuthName, OptionPayload::Numeric(1)).unwrap_err();
        assert!(matches!(err, PppError::InvalidValue(_)));
        assert_eq!(set, OptionSet::default());
    }

    #[test]
    fn test_alert_enable_bypasses_set() {
        let mut set = OptionSet::default();
        let applied = apply(&mut set, OptionId::AlertEnable, OptionPayload::Numeric(3)).unwrap();
        assert_eq!(applied, Applied::AlertEnable(3));
        assert_eq!(set, OptionSet::default());
        assert_eq!(set.value(OptionId::AlertEnable), None);
    }

    #[test]
    fn test_payload_from_wire() {
        let raw = 1492u32.to_ne_bytes();
        assert_eq!(
            OptionPayload::from_wire(OptionId::LcpMru, &raw).unwrap(),
            OptionPayload::Numeric(1492)
        );

        let mut echo = 30u32.to_ne_bytes().to_vec();
        echo.extend_from_slice(&5u32.to_ne_bytes());
        assert_eq!(
            OptionPayload::from_wire(OptionId::LcpEcho, &echo).unwrap(),
            OptionPayload::Echo {
                interval: 30,
                failure: 5
            }
        );

        assert!(OptionPayload::from_wire(OptionId::LcpMru, &[1, 2]).is_err());
        assert!(OptionPayload::from_wire(OptionId::LcpEcho, &raw).is_err());
        assert_eq!(
            OptionPayload::from_wire(OptionId::DevName, b"ttyS0").unwrap(),
            OptionPayload::Bytes(b"ttyS0".to_vec())
        );
    }

    #[test]
    fn test_value_snapshot() {
        let mut set = OptionSet::default();
        apply(&mut set, OptionId::DevName, OptionPayload::Bytes(b"modem".to_vec())).unwrap();
        assert_eq!(
            set.value(OptionId::DevName),
            Some(OptionValue::BoundedString {
                bytes: b"modem".to_vec(),
                is_set: true
            })
        );
        assert_eq!(
            set.value(OptionId::LcpMtu),
            Some(OptionValue::Numeric {
                value: 0,
                is_set: false
            })
        );
    }
}
