//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables (`PPP_*`)
//! - CLI arguments (for `pppctl`)

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PppError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Automaton timers and limits
    #[serde(default)]
    pub fsm: FsmConfig,

    /// Link control defaults
    #[serde(default)]
    pub lcp: LcpConfig,

    /// Network control policy
    #[serde(default)]
    pub ipcp: IpcpConfig,

    /// Option store limits
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Default config file location (`<config_dir>/ppp/ppp.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("ppp").join("ppp.toml"))
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)
            .map_err(|e| PppError::Config(format!("Failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| PppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(val) = env_parse("PPP_RESTART_SECS") {
            config.fsm.restart_secs = val;
        }
        if let Some(val) = env_parse("PPP_MAX_CONFIGURE") {
            config.fsm.max_configure = val;
        }
        if let Some(val) = env_parse("PPP_MAX_TERMINATE") {
            config.fsm.max_terminate = val;
        }
        if let Some(val) = env_parse("PPP_MAX_FAILURE") {
            config.fsm.max_failure = val;
        }
        if let Some(val) = env_parse("PPP_LCP_MRU") {
            config.lcp.mru = val;
        }
        if let Ok(policy) = std::env::var("PPP_IPCP_ADDRESS_POLICY") {
            match policy.to_lowercase().as_str() {
                "peer" => config.ipcp.address_policy = AddressPolicy::Peer,
                "host" => config.ipcp.address_policy = AddressPolicy::Host,
                other => tracing::warn!("Ignoring unknown address policy '{}'", other),
            }
        }
        if let Ok(list) = std::env::var("PPP_IPCP_DNS") {
            config.ipcp.dns = list
                .split(',')
                .filter_map(|a| a.trim().parse().ok())
                .take(2)
                .collect();
        }
        if let Ok(level) = std::env::var("PPP_LOG") {
            config.log.level = level;
        }

        config
    }

    /// Merge with another config (other takes precedence where it differs
    /// from the defaults)
    pub fn merge(self, other: Self) -> Self {
        let defaults = Self::default();
        Self {
            fsm: if other.fsm != defaults.fsm { other.fsm } else { self.fsm },
            lcp: if other.lcp != defaults.lcp { other.lcp } else { self.lcp },
            ipcp: if other.ipcp != defaults.ipcp { other.ipcp } else { self.ipcp },
            store: if other.store != defaults.store { other.store } else { self.store },
            log: if other.log != defaults.log { other.log } else { self.log },
        }
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Negotiation automaton limits (RFC 1661 section 4.6)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsmConfig {
    /// Restart timer interval in seconds
    pub restart_secs: u64,

    /// Configure-Requests sent before giving up
    pub max_configure: u32,

    /// Terminate-Requests sent before giving up
    pub max_terminate: u32,

    /// Naks we send before switching to reject-if-disagree
    pub max_nak_loops: u32,

    /// Naks we accept from the peer before failing the attempt
    pub max_failure: u32,

    /// Wait for the peer's Configure-Request instead of sending first
    pub passive: bool,
}

impl Default for FsmConfig {
    fn default() -> Self {
        Self {
            restart_secs: 3,
            max_configure: 10,
            max_terminate: 2,
            max_nak_loops: 5,
            max_failure: 10,
            passive: false,
        }
    }
}

impl FsmConfig {
    /// Restart timer as a duration
    pub fn restart_interval(&self) -> Duration {
        Duration::from_secs(self.restart_secs)
    }
}

/// Link control defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LcpConfig {
    /// Maximum receive unit we ask for when none is set
    pub mru: u16,

    /// Async control character map we ask for when none is set
    pub asyncmap: u32,

    /// Negotiate a magic number
    pub magic: bool,

    /// Echo-Request interval in seconds (0 disables keepalive)
    pub echo_interval: u32,

    /// Unanswered echoes before the link is declared dead
    pub echo_failure: u32,
}

impl Default for LcpConfig {
    fn default() -> Self {
        Self {
            mru: 1500,
            asyncmap: 0xffff_ffff,
            magic: true,
            echo_interval: 0,
            echo_failure: 0,
        }
    }
}

/// Who decides the remote (peer) address
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressPolicy {
    /// Accept whatever address the peer proposes for itself
    Peer,
    /// A fixed remote address wins; conflicting proposals are naked
    #[default]
    Host,
}

/// Network control policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpcpConfig {
    /// Remote address acceptance policy
    pub address_policy: AddressPolicy,

    /// Ask the peer for DNS servers (primary, secondary)
    pub request_dns: [bool; 2],

    /// DNS servers handed to a peer that asks (primary, secondary)
    pub dns: Vec<Ipv4Addr>,

    /// WINS servers handed to a peer that asks (primary, secondary)
    pub wins: Vec<Ipv4Addr>,

    /// Highest VJ slot index we accept
    pub max_slot_index: u8,

    /// Allow slot-id compression
    pub slot_compression: bool,

    /// Use the old two-address option
    pub old_addrs: bool,
}

impl Default for IpcpConfig {
    fn default() -> Self {
        Self {
            address_policy: AddressPolicy::Host,
            request_dns: [false, false],
            dns: Vec::new(),
            wins: Vec::new(),
            max_slot_index: 15,
            slot_compression: true,
            old_addrs: false,
        }
    }
}

/// Option store limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Option sets a single link may hold (one per requester)
    pub max_option_sets: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_option_sets: 32,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
