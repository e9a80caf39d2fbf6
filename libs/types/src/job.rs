//! Job lifecycle types
//!
//! A job is created `Pending` by the CRUD surface and driven through
//! `Assigned -> InProgress -> Completed` by the dispatch core, with
//! `Cancelled` reachable from every non-terminal state.

use crate::geo::Location;
use crate::ids::{CustomerId, JobId, TechnicianId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Urgency tier of a job. Ordering is derived so `Emergency` compares
/// highest, which the batch assigner relies on when sorting the queue.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Emergency,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "emergency" => Ok(Priority::Emergency),
            other => Err(format!("Unknown priority: {}", other)),
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Emergency => "emergency",
        };
        write!(f, "{}", s)
    }
}

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for a technician
    Pending,
    /// A technician holds an active assignment for this job
    Assigned,
    /// Work has started on site
    InProgress,
    /// Work finished (terminal)
    Completed,
    /// Abandoned from any non-terminal state (terminal)
    Cancelled,
}

impl JobStatus {
    /// Check if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }

    /// Whether an active assignment must exist for this status
    pub fn requires_active_assignment(&self) -> bool {
        matches!(self, JobStatus::Assigned | JobStatus::InProgress)
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "assigned" => Ok(JobStatus::Assigned),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("Unknown status: {}", other)),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Assigned => "assigned",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A service job at a customer site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub customer_id: CustomerId,
    pub title: String,
    pub required_skills: BTreeSet<String>,
    pub priority: Priority,
    pub status: JobStatus,
    pub location: Location,
    /// Estimated on-site duration in fractional hours
    pub estimated_hours: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Recorded on completion; falls back to the estimate in reporting
    pub actual_hours: Option<f64>,
    /// Set iff status is Assigned or InProgress
    pub assigned_technician: Option<TechnicianId>,
}

impl Job {
    /// Create a new pending job
    pub fn new(
        customer_id: CustomerId,
        title: impl Into<String>,
        required_skills: BTreeSet<String>,
        priority: Priority,
        location: Location,
        estimated_hours: f64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            customer_id,
            title: title.into(),
            required_skills,
            priority,
            status: JobStatus::Pending,
            location,
            estimated_hours,
            created_at,
            started_at: None,
            completed_at: None,
            actual_hours: None,
            assigned_technician: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Emergency > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("emergency".parse::<Priority>().unwrap(), Priority::Emergency);
        assert_eq!("High".parse::<Priority>().unwrap(), Priority::High);
        assert!("critical".parse::<Priority>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_active_assignment_requirement() {
        assert!(JobStatus::Assigned.requires_active_assignment());
        assert!(JobStatus::InProgress.requires_active_assignment());
        assert!(!JobStatus::Pending.requires_active_assignment());
        assert!(!JobStatus::Completed.requires_active_assignment());
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}
