//! Well-known event and message type names.
//!
//! The same strings are used as `PlatformEvent::event_type` on the server's
//! event bus and as the `"type"` tag of WebSocket messages, so the bus
//! router can forward events without a translation table.

/// A mutual like produced a new match.
pub const MATCH_CREATED: &str = "match.created";

/// A match popup was dismissed on some client.
pub const POPUP_DISMISSED: &str = "popup.dismissed";

/// A swipe was durably recorded.
pub const SWIPE_RECORDED: &str = "swipe.recorded";

/// A swipe was invalidated by an undo.
pub const SWIPE_INVALIDATED: &str = "swipe.invalidated";
