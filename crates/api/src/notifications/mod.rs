//! Match delivery and popup-dismissal relay.
//!
//! [`MatchRouter`] subscribes to the event bus and pushes `match.created`
//! and `popup.dismissed` frames to the participants' WebSocket connections.

pub mod delivery;
pub mod router;

pub use router::MatchRouter;
