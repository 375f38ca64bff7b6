//! Domain core for the bulk-messaging platform.
//!
//! Pure functions and types shared by the persistence, delivery and HTTP
//! layers. Nothing in this crate performs I/O.

pub mod audience;
pub mod campaign;
pub mod crypto;
pub mod delivery;
pub mod error;
pub mod inbox;
pub mod pagination;
pub mod phone;
pub mod pricing;
pub mod reporting;
pub mod roles;
pub mod status;
pub mod template;
pub mod types;
pub mod wallet;
