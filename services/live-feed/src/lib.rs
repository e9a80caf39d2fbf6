//! Real-time feed for dispatchers and technicians
//!
//! Fans dispatch events out over per-connection bounded queues. Delivery is
//! best-effort and at-most-once: a lagging consumer loses its oldest
//! messages, never the hub's throughput, and a disconnect never fails the
//! transition that produced the event.

pub mod frames;
pub mod hub;
pub mod queue;

pub use frames::{ServerFrame, TechFrame};
pub use hub::{BroadcastHub, FeedConfig, FeedConnection, PublishReport};
pub use queue::BoundedQueue;
