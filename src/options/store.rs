//! Per-link option sets, one per requester.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::value::{NumericOption, StringOption};
use crate::error::{PppError, Result};

/// Identity of the session/client on whose behalf options are set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequesterId(pub u32);

impl fmt::Display for RequesterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requester-{}", self.0)
    }
}

/// Device parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceParams {
    /// Device name
    pub name: StringOption,
    /// Line speed (ladder-rounded)
    pub speed: NumericOption,
    /// Connect script path
    pub connect_script: StringOption,
}

/// Communication parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommParams {
    /// Terminal mode
    pub terminal_mode: NumericOption,
    /// Terminal script path
    pub terminal_script: StringOption,
    /// Remote (dial) address
    pub remote_addr: StringOption,
    /// Idle timer in seconds
    pub idle_timer: NumericOption,
    /// Session timer in seconds
    pub session_timer: NumericOption,
    /// Connect delay in seconds
    pub connect_delay: NumericOption,
    /// Reminder timer in seconds
    pub reminder_timer: NumericOption,
}

/// Link control parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LcpParams {
    /// Protocol-field compression (0/1)
    pub pcomp: NumericOption,
    /// Address/control-field compression (0/1)
    pub accomp: NumericOption,
    /// Maximum receive unit
    pub mru: NumericOption,
    /// Maximum transmit unit
    pub mtu: NumericOption,
    /// Receive async control character map
    pub rcaccm: NumericOption,
    /// Transmit async control character map
    pub txaccm: NumericOption,
    /// Echo-Request interval in seconds
    pub echo_interval: NumericOption,
    /// Unanswered echoes tolerated
    pub echo_failure: NumericOption,
}

/// Authentication parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthParams {
    /// Authentication protocol selector
    pub proto: NumericOption,
    /// User name
    pub name: StringOption,
    /// Password
    pub passwd: StringOption,
}

/// Network control parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpcpParams {
    /// VJ header compression (0/1)
    pub hdrcomp: NumericOption,
    /// Local address, host byte order (0 = let the peer choose)
    pub local_addr: NumericOption,
    /// Remote address, host byte order (0 = let the peer choose)
    pub remote_addr: NumericOption,
}

/// Miscellaneous parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MiscParams {
    /// Log file path
    pub logfile: StringOption,
}

/// Everything a requester can set for one link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    /// Device parameters
    pub dev: DeviceParams,
    /// Communication parameters
    pub comm: CommParams,
    /// Link control parameters
    pub lcp: LcpParams,
    /// Authentication parameters
    pub auth: AuthParams,
    /// Network control parameters
    pub ipcp: IpcpParams,
    /// Miscellaneous parameters
    pub misc: MiscParams,
}

/// Option sets of one link, keyed by requester.
///
/// Sets are created on the first write by a requester and dropped when the
/// requester goes away or the link is destroyed.
#[derive(Debug, Clone)]
pub struct OptionStore {
    sets: HashMap<RequesterId, OptionSet>,
    max_sets: usize,
}

impl Default for OptionStore {
    fn default() -> Self {
        Self::new(crate::config::StoreConfig::default().max_option_sets)
    }
}

impl OptionStore {
    /// Create a store holding at most `max_sets` option sets
    pub fn new(max_sets: usize) -> Self {
        Self {
            sets: HashMap::new(),
            max_sets,
        }
    }

    /// Option set of a requester, if it ever wrote one
    pub fn get(&self, requester: RequesterId) -> Option<&OptionSet> {
        self.sets.get(&requester)
    }

    /// Option set of a requester, created on first use
    pub fn get_or_create(&mut self, requester: RequesterId) -> Result<&mut OptionSet> {
        if !self.sets.contains_key(&requester) && self.sets.len() >= self.max_sets {
            return Err(PppError::ResourceExhausted(format!(
                "link already holds {} option sets",
                self.max_sets
            )));
        }
        Ok(self.sets.entry(requester).or_default())
    }

    /// Drop a requester's option set
    pub fn remove(&mut self, requester: RequesterId) -> Option<OptionSet> {
        self.sets.remove(&requester)
    }

    /// Number of option sets held
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    /// True when no requester has written options
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
