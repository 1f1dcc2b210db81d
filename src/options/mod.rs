//! Runtime option store.
//!
//! A requester populates negotiable parameters for a link before (or while)
//! negotiation runs. Every value is validated on the way in and carries an
//! explicit "set" flag so an option explicitly set to its default value can
//! be told apart from one that was never touched.
//!
//! ```text
//! ControlMessage ──> OptionId::from_raw ──> apply_option ──> setter ──> OptionSet
//!                                             │
//!                                             └── AlertEnable: live link state (no store)
//! ```
//!
//! Numeric setters clamp or reject out-of-range input per option, string
//! setters reject anything that does not fit [`OPT_STR_LEN`]. The device
//! speed setter rounds up to the next standard rate instead of rejecting.

mod dispatch;
mod store;
mod value;

pub use dispatch::{apply_option, auth_proto, lcp_hdrcomp, Applied, OptionId, OptionPayload};
pub use store::{
    AuthParams, CommParams, DeviceParams, IpcpParams, LcpParams, MiscParams, OptionSet,
    OptionStore, RequesterId,
};
pub use value::{
    round_speed, set_numeric, set_string, NumericOption, OptionValue, StringOption, OPT_STR_LEN,
    SPEED_LADDER,
};
