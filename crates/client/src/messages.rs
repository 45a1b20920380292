//! Push-channel frame parsing.
//!
//! Frame shapes are defined once in `kindred_core::protocol`; this module
//! only adapts them to text frames.

use kindred_core::protocol::{ClientMessage, PushMessage};

/// Parse a server text frame.
///
/// Unknown `type` values are errors; callers log them and continue.
pub fn parse_message(text: &str) -> Result<PushMessage, serde_json::Error> {
    serde_json::from_str(text)
}

/// Serialize an outbound frame.
pub fn encode_message(message: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}
