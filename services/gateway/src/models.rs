//! Request and response bodies for the REST surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

use dispatch_engine::{BatchOutcome, BatchReport, SlaConfig};
use types::prelude::*;

use crate::error::AppError;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub phone: String,
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerResponse {
    pub id: CustomerId,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub lat: f64,
    pub lon: f64,
    pub email: Option<String>,
}

impl From<Customer> for CustomerResponse {
    fn from(c: Customer) -> Self {
        Self {
            id: c.id,
            name: c.name,
            phone: c.phone,
            address: c.address,
            lat: c.location.lat,
            lon: c.location.lon,
            email: c.email,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTechnicianRequest {
    pub name: String,
    pub skills: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default = "default_shift_start")]
    pub shift_start: u32,
    #[serde(default = "default_shift_end")]
    pub shift_end: u32,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

fn default_shift_start() -> u32 {
    8
}

fn default_shift_end() -> u32 {
    17
}

#[derive(Debug, Clone, Serialize)]
pub struct TechnicianResponse {
    pub id: TechnicianId,
    pub name: String,
    pub skills: BTreeSet<String>,
    pub certifications: BTreeSet<String>,
    pub shift_start: u32,
    pub shift_end: u32,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub active: bool,
    pub status: TechStatus,
}

impl From<Technician> for TechnicianResponse {
    fn from(t: Technician) -> Self {
        Self {
            id: t.id,
            name: t.name,
            skills: t.skills,
            certifications: t.certifications,
            shift_start: t.shift_start,
            shift_end: t.shift_end,
            lat: t.location.map(|l| l.lat),
            lon: t.location.map(|l| l.lon),
            active: t.active,
            status: t.status,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub customer_id: CustomerId,
    pub title: String,
    pub required_skills: Vec<String>,
    pub priority: String,
    pub lat: f64,
    pub lon: f64,
    pub estimated_hours: f64,
}

impl CreateJobRequest {
    pub fn priority(&self) -> Result<Priority, AppError> {
        Priority::from_str(&self.priority)
            .map_err(|e| AppError::Dispatch(DispatchError::Validation(e)))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobResponse {
    pub id: JobId,
    pub customer_id: CustomerId,
    pub title: String,
    pub required_skills: BTreeSet<String>,
    pub priority: Priority,
    pub status: JobStatus,
    pub lat: f64,
    pub lon: f64,
    pub estimated_hours: f64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub actual_hours: Option<f64>,
    pub assigned_technician: Option<TechnicianId>,
    /// Only meaningful for completed jobs
    pub sla_met: Option<bool>,
}

impl JobResponse {
    pub fn from_job(job: Job, sla: &SlaConfig) -> Self {
        let sla_met = sla.met(&job);
        Self {
            id: job.id,
            customer_id: job.customer_id,
            title: job.title,
            required_skills: job.required_skills,
            priority: job.priority,
            status: job.status,
            lat: job.location.lat,
            lon: job.location.lon,
            estimated_hours: job.estimated_hours,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            actual_hours: job.actual_hours,
            assigned_technician: job.assigned_technician,
            sla_met,
        }
    }
}

/// Query filters for `GET /jobs`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub status: Option<String>,
    pub priority: Option<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> Result<bool, AppError> {
        if let Some(status) = &self.status {
            let wanted = JobStatus::from_str(status)
                .map_err(|e| AppError::Dispatch(DispatchError::Validation(e)))?;
            if job.status != wanted {
                return Ok(false);
            }
        }
        if let Some(priority) = &self.priority {
            let wanted = Priority::from_str(priority)
                .map_err(|e| AppError::Dispatch(DispatchError::Validation(e)))?;
            if job.priority != wanted {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignRequest {
    pub technician_id: TechnicianId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub technician_id: TechnicianId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompleteRequest {
    pub actual_hours: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationRequest {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentResponse {
    pub assignment_id: AssignmentId,
    pub job_id: JobId,
    pub technician_id: TechnicianId,
    pub status: JobStatus,
    pub distance_miles: Option<f64>,
    pub match_score: Option<f64>,
}

impl AssignmentResponse {
    pub fn from_parts(job: &Job, assignment: &Assignment) -> Self {
        Self {
            assignment_id: assignment.id,
            job_id: job.id,
            technician_id: assignment.technician_id,
            status: job.status,
            distance_miles: assignment.distance_miles,
            match_score: assignment.match_score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItemResponse {
    pub job_id: JobId,
    pub assigned: bool,
    pub technician_id: Option<TechnicianId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResponse {
    pub assigned: usize,
    pub unassigned: usize,
    pub results: Vec<BatchItemResponse>,
}

impl From<&BatchReport> for BatchResponse {
    fn from(report: &BatchReport) -> Self {
        let results: Vec<BatchItemResponse> = report
            .outcomes
            .iter()
            .map(|(job_id, outcome)| match outcome {
                BatchOutcome::Assigned { technician_id } => BatchItemResponse {
                    job_id: *job_id,
                    assigned: true,
                    technician_id: Some(*technician_id),
                },
                BatchOutcome::NoEligibleTechnician => BatchItemResponse {
                    job_id: *job_id,
                    assigned: false,
                    technician_id: None,
                },
            })
            .collect();
        let assigned = report.assigned_count();
        Self {
            assigned,
            unassigned: results.len() - assigned,
            results,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    pub total_jobs: usize,
    pub pending_jobs: usize,
    pub in_progress_jobs: usize,
    pub completed_jobs: usize,
    pub active_technicians: usize,
    pub available_technicians: usize,
    pub sla_violations_today: usize,
}

/// Date range for `GET /dashboard/sla-metrics`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SlaQuery {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl SlaQuery {
    pub fn range(&self) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, AppError> {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) if start > end => Err(AppError::BadRequest(
                "start_date must not be after end_date".to_string(),
            )),
            (Some(start), Some(end)) => Ok(Some((start, end))),
            (None, None) => Ok(None),
            _ => Err(AppError::BadRequest(
                "start_date and end_date must be given together".to_string(),
            )),
        }
    }
}

pub fn skill_set(skills: Vec<String>) -> BTreeSet<String> {
    skills.into_iter().collect()
}
