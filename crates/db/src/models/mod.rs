//! Row structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and the insert/update DTOs its repository accepts.

pub mod campaign;
pub mod credentials;
pub mod message;
pub mod pricing;
pub mod report;
pub mod template;
pub mod wallet;
