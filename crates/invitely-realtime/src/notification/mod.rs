//! Domain event → notification message mapping and publication.

pub mod dispatcher;
pub mod mapper;

pub use dispatcher::{BroadcastDispatcher, PublishOutcome};
pub use mapper::map_event;
