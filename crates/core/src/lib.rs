//! Kindred core domain logic.
//!
//! Pure, synchronous building blocks shared by the server and the client
//! runtime. Nothing in this crate performs I/O; network and storage effects
//! are expressed as request values that callers execute.

pub mod candidate;
pub mod discovery;
pub mod error;
pub mod event_types;
pub mod matching;
pub mod popup;
pub mod processor;
pub mod protocol;
pub mod swipe;
pub mod types;
pub mod undo;
