//! Option commands exchanged with the controller.

use serde::{Deserialize, Serialize};

use super::LinkId;
use crate::error::result_code;
use crate::options::RequesterId;

/// Option-set command: store `data` under `option` for `requester` on `link`.
///
/// Numeric payloads are 32-bit values in native byte order, the echo option
/// carries two of them (interval, then failure count). String payloads are
/// raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// Target link
    pub link: LinkId,
    /// Issuing requester
    pub requester: RequesterId,
    /// Controller option identifier
    pub option: u32,
    /// Option payload
    #[serde(default)]
    pub data: Vec<u8>,
}

impl ControlMessage {
    /// Command carrying one numeric value
    pub fn numeric(link: LinkId, requester: RequesterId, option: u32, value: u32) -> Self {
        Self {
            link,
            requester,
            option,
            data: value.to_ne_bytes().to_vec(),
        }
    }

    /// Command carrying a byte string
    pub fn bytes(
        link: LinkId,
        requester: RequesterId,
        option: u32,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            link,
            requester,
            option,
            data: data.into(),
        }
    }
}

/// Reply to a [`ControlMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlReply {
    /// Controller result code, see [`result_code`]
    pub result: u32,
}

impl ControlReply {
    /// Successful reply
    pub fn ok() -> Self {
        Self {
            result: result_code::OK,
        }
    }

    /// True for a zero result code
    pub fn is_ok(&self) -> bool {
        self.result == result_code::OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_json() {
        let msg = ControlMessage::numeric(LinkId(3), RequesterId(9), 10, 1400);
        let json = serde_json::to_string(&msg).unwrap();
        let back: ControlMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
        assert_eq!(back.data, 1400u32.to_ne_bytes().to_vec());
    }

    #[test]
    fn test_missing_data_defaults_empty() {
        let msg: ControlMessage =
            serde_json::from_str(r#"{"link":1,"requester":2,"option":7}"#).unwrap();
        assert!(msg.data.is_empty());
        assert!(ControlReply::ok().is_ok());
    }
}
