//! Shared domain types used across all Invitely crates.

pub mod id;
pub mod role;

pub use id::{ConnectionId, PrincipalId};
pub use role::UserRole;
