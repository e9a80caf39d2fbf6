//! Dispatch Engine Service
//!
//! The matching and lifecycle core of the field dispatch system:
//! - Eligibility filtering and multi-factor scoring of technicians
//! - Single and batch auto-assignment with in-batch reservation
//! - The job lifecycle state machine with centrally enforced transitions
//! - Typed domain events returned from every successful transition
//! - SLA compliance and technician performance aggregation
//!
//! **Key Invariants:**
//! - At most one active assignment per technician at any instant
//! - Assigned/in-progress jobs have exactly one active assignment
//! - Assignment creation requires full eligibility at that instant
//! - Deterministic matching (same inputs → same outputs, ties broken by id)
//!
//! Transition logic is transport-free: each operation returns its result
//! together with the event to publish, so it is testable without a socket.

pub mod engine;
pub mod events;
pub mod matching;
pub mod sla;
pub mod store;

pub use engine::{BatchOutcome, BatchReport, DispatchCore, Transition};
pub use events::DispatchEvent;
pub use matching::{Matcher, ScoringConfig};
pub use sla::{SlaAggregator, SlaConfig};
pub use store::{EntityStore, MemoryStore, WriteBatch};
