//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` entity struct matching the database
//! row and, where the API writes the table, a `Deserialize` create DTO.

pub mod match_record;
pub mod profile;
pub mod swipe;
pub mod user;
