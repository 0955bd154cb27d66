//! Presence announcements for administrators joining and leaving groups.

pub mod tracker;

pub use tracker::PresenceTracker;
