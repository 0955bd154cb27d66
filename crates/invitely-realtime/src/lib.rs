//! # invitely-realtime
//!
//! Real-time WebSocket engine behind the Invitely admin dashboard. Provides:
//!
//! - Connection lifecycle with token authentication and role checks
//! - Session registry of live connections grouped by broadcast topic
//! - Heartbeat supervision and flood protection per connection
//! - Broadcast dispatcher mapping domain events to notification messages
//! - Presence announcements (`admin_joined` / `admin_left`)
//! - Pub/sub backbone abstraction (in-memory, or Redis for multi-node)

pub mod bridge;
pub mod connection;
pub mod message;
pub mod metrics;
pub mod notification;
pub mod presence;
pub mod registry;
pub mod server;
pub mod snapshot;

pub use bridge::{EventBus, MemoryPubSub, build_event_bus};
pub use connection::authenticator::{JwtAuthenticator, Principal, TokenAuthenticator};
pub use connection::manager::{ConnectionManager, HandshakeRequest};
pub use connection::transport::Frame;
pub use connection::state::TeardownReason;
pub use notification::dispatcher::{BroadcastDispatcher, PublishOutcome};
pub use registry::SessionRegistry;
pub use server::{EngineStats, RealtimeEngine};
pub use snapshot::{InMemorySnapshotProvider, SnapshotProvider};
