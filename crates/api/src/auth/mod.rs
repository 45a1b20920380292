//! Authentication primitives.
//!
//! Accounts are managed outside this service; it only verifies HS256 access
//! tokens issued with the shared secret.

pub mod jwt;
