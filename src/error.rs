//! PPP negotiation error types.
//!
//! Option-store errors (`InvalidValue`, `TooLong`, `Unsupported`,
//! `ResourceExhausted`, `NoSuchLink`) are returned to the requester that
//! issued the option command and map onto the controller result codes via
//! [`PppError::result_code`]. A negotiation attempt that runs out of
//! retransmit or nak budget is not an error value: the automaton emits
//! `FsmAction::Failed` and the link owner sees `LinkEvent::Failed`.
//! `MalformedPacket` never escapes the link: the offending packet is dropped.

use thiserror::Error;

/// Controller result codes (Darwin errno numbering).
pub mod result_code {
    /// Success
    pub const OK: u32 = 0;
    /// Out of memory (option set could not be created)
    pub const ENOMEM: u32 = 12;
    /// No such device (unknown link handle)
    pub const ENODEV: u32 = 19;
    /// Invalid argument (numeric out of range, clamp disabled)
    pub const EINVAL: u32 = 22;
    /// Message too large (string exceeds bound)
    pub const EMSGSIZE: u32 = 40;
    /// Operation not supported (unknown option identifier)
    pub const EOPNOTSUPP: u32 = 102;
}

/// PPP core errors.
#[derive(Error, Debug)]
pub enum PppError {
    /// Link handle does not resolve to a registered link.
    #[error("No such link: {0}")]
    NoSuchLink(u32),

    /// The per-link option store could not create another option set.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// String option exceeds its fixed bound.
    #[error("Value too long: {len} bytes (limit {limit})")]
    TooLong {
        /// Length of the rejected input.
        len: usize,
        /// Exclusive upper bound on the length.
        limit: usize,
    },

    /// Numeric option outside its bounds with clamping disabled, or a payload
    /// of the wrong shape for the option.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Unknown option identifier.
    #[error("Unsupported option: {0}")]
    Unsupported(u32),

    /// Wire decode error.
    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for PPP operations
pub type Result<T> = std::result::Result<T, PppError>;

impl PppError {
    /// Controller result code reported back to the requester.
    pub fn result_code(&self) -> u32 {
        match self {
            PppError::NoSuchLink(_) => result_code::ENODEV,
            PppError::ResourceExhausted(_) => result_code::ENOMEM,
            PppError::TooLong { .. } => result_code::EMSGSIZE,
            PppError::Unsupported(_) => result_code::EOPNOTSUPP,
            _ => result_code::EINVAL,
        }
    }
}

impl From<toml::de::Error> for PppError {
    fn from(err: toml::de::Error) -> Self {
        PppError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PppError {
    fn from(err: toml::ser::Error) -> Self {
        PppError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_codes() {
        assert_eq!(PppError::NoSuchLink(7).result_code(), result_code::ENODEV);
        assert_eq!(
            PppError::ResourceExhausted("full".into()).result_code(),
            result_code::ENOMEM
        );
        assert_eq!(
            PppError::TooLong { len: 300, limit: 256 }.result_code(),
            result_code::EMSGSIZE
        );
        assert_eq!(
            PppError::InvalidValue("x".into()).result_code(),
            result_code::EINVAL
        );
        assert_eq!(PppError::Unsupported(99).result_code(), result_code::EOPNOTSUPP);
    }

    #[test]
    fn test_internal_errors_report_invalid() {
        assert_eq!(
            PppError::MalformedPacket("short".into()).result_code(),
            result_code::EINVAL
        );
        let err: PppError = toml::from_str::<toml::Value>("= 1").unwrap_err().into();
        assert!(matches!(err, PppError::Config(_)));
        assert_eq!(err.result_code(), result_code::EINVAL);
    }
}
