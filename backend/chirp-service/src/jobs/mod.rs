//! Background jobs spawned alongside the HTTP server

pub mod scheduled_publisher;

pub use scheduled_publisher::{ScheduledPublisher, SweepReport};
