//! # invitely-client
//!
//! Client side of the admin notification stream. [`ClientConnectionManager`]
//! keeps one logical subscription alive across transport churn: it connects,
//! waits for `connection_established`, pings on an interval, detects silent
//! connections, reconnects with capped exponential backoff and routes every
//! inbound envelope to callbacks registered by type.

pub mod backoff;
pub mod config;
pub mod error;
pub mod manager;
pub mod router;
pub mod state;
pub mod transport;

pub use backoff::{BackoffPolicy, sample_jitter};
pub use config::ClientConfig;
pub use error::ClientError;
pub use manager::ClientConnectionManager;
pub use router::MessageRouter;
pub use state::{ClientEvent, ClientState, ReconnectState};
pub use transport::{ClientFrame, Connector, WsConnector};
