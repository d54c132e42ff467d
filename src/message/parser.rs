//! Parser for inbound dispatch frames

use crate::error::{DispatchError, Result};
use crate::protocol::InboundMessage;

/// Parse a JSON value into a typed inbound message
///
/// Unknown `status` values parse as [`InboundMessage::Unknown`].
///
/// # Errors
/// Returns `DispatchError::MessageParse` when the frame has no string `status`
/// or a known status carries fields of the wrong shape
pub fn parse_inbound(data: serde_json::Value) -> Result<InboundMessage> {
    if !data.get("status").is_some_and(serde_json::Value::is_string) {
        return Err(DispatchError::message_parse(
            "Frame has no status discriminator",
            Some(data),
        ));
    }

    serde_json::from_value(data.clone()).map_err(|e| {
        DispatchError::message_parse(format!("Failed to parse message: {e}"), Some(data))
    })
}
