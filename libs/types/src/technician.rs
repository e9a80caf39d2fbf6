//! Technician types
//!
//! Status and location are mutated only through dispatch core operations;
//! the CRUD surface owns everything else.

use crate::geo::Location;
use crate::ids::TechnicianId;
use crate::job::Job;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Availability of a technician
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TechStatus {
    /// Free to take an assignment
    Available,
    /// Holds an active assignment
    Busy,
    /// Off shift or unreachable
    Offline,
}

impl fmt::Display for TechStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TechStatus::Available => "available",
            TechStatus::Busy => "busy",
            TechStatus::Offline => "offline",
        };
        write!(f, "{}", s)
    }
}

/// A field technician
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technician {
    pub id: TechnicianId,
    pub name: String,
    pub skills: BTreeSet<String>,
    pub certifications: BTreeSet<String>,
    /// Shift window in whole hours, start inclusive, end exclusive
    pub shift_start: u32,
    pub shift_end: u32,
    /// Last reported position; None until the first location update
    pub location: Option<Location>,
    pub active: bool,
    pub status: TechStatus,
}

impl Technician {
    pub fn new(
        name: impl Into<String>,
        skills: BTreeSet<String>,
        shift_start: u32,
        shift_end: u32,
    ) -> Self {
        Self {
            id: TechnicianId::new(),
            name: name.into(),
            skills,
            certifications: BTreeSet::new(),
            shift_start,
            shift_end,
            location: None,
            active: true,
            status: TechStatus::Available,
        }
    }

    /// Whether the given instant falls inside the shift window
    pub fn on_shift(&self, at: DateTime<Utc>) -> bool {
        let hour = at.hour();
        hour >= self.shift_start && hour < self.shift_end
    }

    /// Whether this technician covers every required skill of the job
    pub fn has_skills_for(&self, job: &Job) -> bool {
        job.required_skills.is_subset(&self.skills)
    }
}
