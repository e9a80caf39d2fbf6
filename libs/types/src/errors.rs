//! Error taxonomy for the dispatch core
//!
//! Every operation returns these as typed failures; none of them abort the
//! process. Storage failures propagate unmodified inside `Store`.

use crate::ids::{JobId, TechnicianId};
use thiserror::Error;

/// Top-level dispatch error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DispatchError {
    /// Malformed input: bad priority string, empty skill set, coordinates
    /// out of range, inverted shift window
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown entity id
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    /// The named technician fails the eligibility filter for this job
    #[error("Technician {technician_id} is not eligible for job {job_id}: {reason}")]
    IneligibleAssignment {
        job_id: JobId,
        technician_id: TechnicianId,
        reason: String,
    },

    /// No candidate passed the eligibility filter; the job stays pending
    #[error("No eligible technician for job {job_id}")]
    NoEligibleTechnician { job_id: JobId },

    /// Lifecycle rule violated (e.g. starting a pending job)
    #[error("Invalid transition: cannot {action} a {from} job")]
    InvalidTransition { from: String, action: String },

    /// Entity changed between read and serialized write; caller may retry
    #[error("{kind} {id} was modified concurrently")]
    ConcurrentModification { kind: EntityKind, id: String },

    /// Storage collaborator failure, fatal for this one operation
    #[error("Store error: {0}")]
    Store(String),
}

/// Entity discriminant used in not-found and conflict errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Customer,
    Technician,
    Job,
    Assignment,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EntityKind::Customer => "Customer",
            EntityKind::Technician => "Technician",
            EntityKind::Job => "Job",
            EntityKind::Assignment => "Assignment",
        };
        write!(f, "{}", s)
    }
}
