//! In-process event bus for the discovery server.
//!
//! Handlers publish [`DomainEvent`]s such as `match.created` and
//! `popup.dismissed`; background routers subscribe and fan them out to
//! WebSocket connections.

pub mod bus;

pub use bus::{DomainEvent, EventBus};
