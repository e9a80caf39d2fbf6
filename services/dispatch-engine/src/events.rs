//! Domain event definitions
//!
//! Every successful lifecycle transition produces exactly one of these.
//! They are the only thing the broadcast layer ever sees: the engine never
//! talks to a socket, and the hub never touches the store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use types::prelude::*;

/// A typed domain event emitted by the dispatch core.
///
/// Serializes with a `type` tag (`assignment_created`, `job_started`,
/// `job_completed`, `job_cancelled`, `location_update`) so dashboard
/// clients can switch on it directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    AssignmentCreated {
        job_id: JobId,
        assignment_id: AssignmentId,
        technician_id: TechnicianId,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    JobStarted {
        job_id: JobId,
        technician_id: TechnicianId,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    JobCompleted {
        job_id: JobId,
        technician_id: TechnicianId,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    JobCancelled {
        job_id: JobId,
        /// None when the job was cancelled while still pending
        technician_id: Option<TechnicianId>,
        status: JobStatus,
        timestamp: DateTime<Utc>,
    },
    LocationUpdate {
        technician_id: TechnicianId,
        location: Location,
        timestamp: DateTime<Utc>,
    },
}

impl DispatchEvent {
    /// Short tag for logging
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchEvent::AssignmentCreated { .. } => "assignment_created",
            DispatchEvent::JobStarted { .. } => "job_started",
            DispatchEvent::JobCompleted { .. } => "job_completed",
            DispatchEvent::JobCancelled { .. } => "job_cancelled",
            DispatchEvent::LocationUpdate { .. } => "location_update",
        }
    }

    /// The technician connection this event should additionally reach.
    ///
    /// Location updates go to dispatchers only; the technician is the
    /// source, not a recipient.
    pub fn recipient_technician(&self) -> Option<TechnicianId> {
        match self {
            DispatchEvent::AssignmentCreated { technician_id, .. }
            | DispatchEvent::JobStarted { technician_id, .. }
            | DispatchEvent::JobCompleted { technician_id, .. } => Some(*technician_id),
            DispatchEvent::JobCancelled { technician_id, .. } => *technician_id,
            DispatchEvent::LocationUpdate { .. } => None,
        }
    }

    /// Job this event concerns, when any
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            DispatchEvent::AssignmentCreated { job_id, .. }
            | DispatchEvent::JobStarted { job_id, .. }
            | DispatchEvent::JobCompleted { job_id, .. }
            | DispatchEvent::JobCancelled { job_id, .. } => Some(*job_id),
            DispatchEvent::LocationUpdate { .. } => None,
        }
    }
}
