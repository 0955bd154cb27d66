//! Session registry: live connections indexed by identity and group.

pub mod group;
pub mod session;
pub mod subscription;

pub use group::{Group, JoinOutcome, LeaveOutcome};
pub use session::{Departure, SessionRegistry};
