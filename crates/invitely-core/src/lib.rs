//! # invitely-core
//!
//! Core crate for the Invitely admin notification layer. Contains the
//! configuration schemas, typed identifiers and roles, the WebSocket wire
//! protocol shared by server and client, domain events emitted by the
//! business logic, and the unified error system.
//!
//! This crate has **no** internal dependencies on other Invitely crates.

pub mod config;
pub mod error;
pub mod events;
pub mod protocol;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
