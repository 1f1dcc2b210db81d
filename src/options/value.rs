//! Typed option values and their validating setters.

use crate::error::{PppError, Result};

/// Bound on string options. Inputs must be strictly shorter.
pub const OPT_STR_LEN: usize = 256;

/// Standard serial rates, ascending. Requested speeds round up to the next
/// entry and saturate at the last.
pub const SPEED_LADDER: [u32; 7] = [1200, 2400, 9600, 19200, 38400, 57600, 115200];

/// Numeric option with a "set" flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NumericOption {
    value: u32,
    set: bool,
}

impl NumericOption {
    /// Stored value (0 when unset)
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Whether a requester explicitly set this option
    pub fn is_set(&self) -> bool {
        self.set
    }

    /// Value if explicitly set
    pub fn get(&self) -> Option<u32> {
        self.set.then_some(self.value)
    }
}

/// Bounded byte-string option with a "set" flag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringOption {
    bytes: Vec<u8>,
    set: bool,
}

impl StringOption {
    /// Stored bytes (empty when unset)
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether a requester explicitly set this option
    pub fn is_set(&self) -> bool {
        self.set
    }

    /// Bytes if explicitly set
    pub fn get(&self) -> Option<&[u8]> {
        self.set.then_some(self.bytes.as_slice())
    }

    /// Lossy UTF-8 view for logging and display
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Snapshot of a single stored option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// 32-bit numeric option
    Numeric {
        /// Value
        value: u32,
        /// Explicitly set
        is_set: bool,
    },
    /// Bounded string option
    BoundedString {
        /// Bytes
        bytes: Vec<u8>,
        /// Explicitly set
        is_set: bool,
    },
}

impl From<&NumericOption> for OptionValue {
    fn from(opt: &NumericOption) -> Self {
        OptionValue::Numeric {
            value: opt.value,
            is_set: opt.set,
        }
    }
}

impl From<&StringOption> for OptionValue {
    fn from(opt: &StringOption) -> Self {
        OptionValue::BoundedString {
            bytes: opt.bytes.clone(),
            is_set: opt.set,
        }
    }
}

/// Validate `raw` against `[min, max]` and store it.
///
/// Out-of-range input is pulled to the nearest bound when `clamp` is true and
/// rejected with `InvalidValue` otherwise. The option is left untouched on
/// error.
pub fn set_numeric(
    option: &mut NumericOption,
    raw: u32,
    min: u32,
    max: u32,
    clamp: bool,
) -> Result<()> {
    let value = if raw < min {
        if !clamp {
            return Err(PppError::InvalidValue(format!("{raw} below minimum {min}")));
        }
        min
    } else if raw > max {
        if !clamp {
            return Err(PppError::InvalidValue(format!("{raw} above maximum {max}")));
        }
        max
    } else {
        raw
    };

    option.set = true;
    option.value = value;
    Ok(())
}

/// Store `raw` if it is shorter than [`OPT_STR_LEN`].
pub fn set_string(option: &mut StringOption, raw: &[u8]) -> Result<()> {
    if raw.len() >= OPT_STR_LEN {
        return Err(PppError::TooLong {
            len: raw.len(),
            limit: OPT_STR_LEN,
        });
    }

    option.set = true;
    option.bytes.clear();
    option.bytes.extend_from_slice(raw);
    Ok(())
}

/// Smallest ladder rate at or above `raw`, or the top rate.
pub fn round_speed(raw: u32) -> u32 {
    SPEED_LADDER
        .iter()
        .copied()
        .find(|&rate| raw <= rate)
        .unwrap_or(SPEED_LADDER[SPEED_LADDER.len() - 1])
}
