//! Assignment types
//!
//! An assignment binds exactly one technician to one job and mirrors the
//! job's progress. At most one active assignment exists per job and per
//! technician at any instant; the dispatch core enforces both.

use crate::ids::{AssignmentId, JobId, TechnicianId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Progress of an assignment, in lockstep with its job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Created, technician dispatched but not on site
    Assigned,
    /// Technician started work
    InProgress,
    /// Finalized with the job (terminal)
    Completed,
    /// Discarded with the job (terminal)
    Cancelled,
}

impl AssignmentStatus {
    /// Active means the assignment still occupies its technician
    pub fn is_active(&self) -> bool {
        matches!(self, AssignmentStatus::Assigned | AssignmentStatus::InProgress)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AssignmentStatus::Assigned => "assigned",
            AssignmentStatus::InProgress => "in_progress",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A job-technician binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub job_id: JobId,
    pub technician_id: TechnicianId,
    pub status: AssignmentStatus,
    pub assigned_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Straight-line miles from the technician's last known position at
    /// assignment time, when it was known
    pub distance_miles: Option<f64>,
    /// Matching score that won this assignment (lower is better);
    /// None for manual assignments
    pub match_score: Option<f64>,
}

impl Assignment {
    pub fn new(
        job_id: JobId,
        technician_id: TechnicianId,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AssignmentId::new(),
            job_id,
            technician_id,
            status: AssignmentStatus::Assigned,
            assigned_at,
            started_at: None,
            completed_at: None,
            distance_miles: None,
            match_score: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
