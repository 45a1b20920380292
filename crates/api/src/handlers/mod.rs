//! Request handlers, grouped by resource.

pub mod candidates;
pub mod matches;
pub mod profiles;
pub mod swipes;
