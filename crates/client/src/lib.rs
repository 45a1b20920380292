//! Kindred client runtime.
//!
//! Drives the pure state machines in `kindred-core` against a Kindred
//! server: a REST client for the candidate store and swipe ledger, a push
//! connection with backoff reconnects, the durable popup tracker and its
//! file watcher, the cross-tab sync channel, the match notifier and the
//! single-loop
//! [`DiscoverySession`](session::DiscoverySession) that ties them together.

pub mod api;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod notifier;
pub mod ports;
pub mod push;
pub mod reconnect;
pub mod session;
pub mod store;
pub mod sync;
pub mod tracker;
pub mod watch;
