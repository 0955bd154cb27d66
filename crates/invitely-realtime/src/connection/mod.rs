//! WebSocket connection management: lifecycle, handles, heartbeat, auth.

pub mod authenticator;
pub mod flood;
pub mod handle;
pub mod heartbeat;
pub mod manager;
pub mod state;
pub mod transport;

pub use handle::{ConnectionHandle, DeliveryOutcome};
pub use manager::ConnectionManager;
pub use state::{ConnectionState, TeardownReason};
