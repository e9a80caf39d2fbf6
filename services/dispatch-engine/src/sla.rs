//! SLA compliance and technician performance aggregation
//!
//! A thin read-only consumer of stored history. Allowances per priority
//! tier are deployment parameters.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use types::prelude::*;

use crate::store::EntityStore;

/// Time-to-completion allowance per priority tier, in hours. Strictly
/// decreasing as priority rises.
#[derive(Debug, Clone)]
pub struct SlaConfig {
    pub emergency_hours: i64,
    pub high_hours: i64,
    pub normal_hours: i64,
    pub low_hours: i64,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            emergency_hours: 2,
            high_hours: 4,
            normal_hours: 8,
            low_hours: 24,
        }
    }
}

impl SlaConfig {
    pub fn allowance(&self, priority: Priority) -> Duration {
        let hours = match priority {
            Priority::Emergency => self.emergency_hours,
            Priority::High => self.high_hours,
            Priority::Normal => self.normal_hours,
            Priority::Low => self.low_hours,
        };
        Duration::hours(hours)
    }

    /// Latest completion instant that still meets the SLA.
    pub fn deadline(&self, job: &Job) -> DateTime<Utc> {
        job.created_at + self.allowance(job.priority)
    }

    /// Whether a completed job met its deadline. None when not completed.
    pub fn met(&self, job: &Job) -> Option<bool> {
        job.completed_at.map(|done| done <= self.deadline(job))
    }
}

/// Compliance over a set of completed jobs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlaReport {
    pub total: usize,
    pub met: usize,
    pub violated: usize,
    /// Fraction in [0, 1]; zero when no jobs completed in range.
    pub compliance_rate: f64,
}

/// Aggregate history for one technician.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TechPerformance {
    pub completed_count: usize,
    pub average_duration_hours: f64,
    pub on_time_rate: f64,
}

/// Read-only metrics over stored history.
pub struct SlaAggregator<'a, S: EntityStore> {
    store: &'a S,
    config: SlaConfig,
}

impl<'a, S: EntityStore> SlaAggregator<'a, S> {
    pub fn new(store: &'a S, config: SlaConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &SlaConfig {
        &self.config
    }

    /// Proportion of jobs completed inside their allowance, over jobs whose
    /// completion timestamp falls in the given range (or all, when None).
    pub fn compliance(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<SlaReport, DispatchError> {
        let completed = self.store.completed_jobs(range)?;
        let total = completed.len();
        let met = completed
            .iter()
            .filter(|job| self.config.met(job).unwrap_or(false))
            .count();

        Ok(SlaReport {
            total,
            met,
            violated: total - met,
            compliance_rate: if total == 0 {
                0.0
            } else {
                met as f64 / total as f64
            },
        })
    }

    /// Completed-job count, mean duration, and on-time rate for one
    /// technician, derived from assignment history.
    pub fn technician_performance(
        &self,
        tech_id: TechnicianId,
    ) -> Result<TechPerformance, DispatchError> {
        // Fails for unknown technicians rather than reporting zeros
        self.store.technician(tech_id)?;

        let assignments = self.store.assignments_for_technician(tech_id)?;
        let mut completed = 0usize;
        let mut on_time = 0usize;
        let mut total_hours = 0.0f64;

        for assignment in assignments
            .iter()
            .filter(|a| a.status == AssignmentStatus::Completed)
        {
            let job = self.store.job(assignment.job_id)?.record;
            completed += 1;
            total_hours += job.actual_hours.unwrap_or(job.estimated_hours);
            if self.config.met(&job).unwrap_or(false) {
                on_time += 1;
            }
        }

        Ok(TechPerformance {
            completed_count: completed,
            average_duration_hours: if completed == 0 {
                0.0
            } else {
                total_hours / completed as f64
            },
            on_time_rate: if completed == 0 {
                0.0
            } else {
                on_time as f64 / completed as f64
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    #[test]
    fn test_allowance_strictly_decreasing_with_priority() {
        let config = SlaConfig::default();
        assert!(config.allowance(Priority::Emergency) < config.allowance(Priority::High));
        assert!(config.allowance(Priority::High) < config.allowance(Priority::Normal));
        assert!(config.allowance(Priority::Normal) < config.allowance(Priority::Low));
    }

    #[test]
    fn test_deadline_and_met() {
        let config = SlaConfig::default();
        let created = Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap();
        let mut job = Job::new(
            CustomerId::new(),
            "Furnace",
            BTreeSet::from(["hvac".to_string()]),
            Priority::Emergency,
            Location::new(0.0, 0.0).unwrap(),
            1.0,
            created,
        );
        assert_eq!(config.deadline(&job), created + Duration::hours(2));
        assert_eq!(config.met(&job), None);

        job.completed_at = Some(created + Duration::hours(1));
        assert_eq!(config.met(&job), Some(true));

        job.completed_at = Some(created + Duration::hours(3));
        assert_eq!(config.met(&job), Some(false));
    }

    #[test]
    fn test_empty_compliance_report() {
        let store = crate::store::MemoryStore::new();
        let agg = SlaAggregator::new(&store, SlaConfig::default());
        let report = agg.compliance(None).unwrap();
        assert_eq!(report.total, 0);
        assert_eq!(report.compliance_rate, 0.0);
    }

    #[test]
    fn test_performance_unknown_tech_is_not_found() {
        let store = crate::store::MemoryStore::new();
        let agg = SlaAggregator::new(&store, SlaConfig::default());
        let err = agg.technician_performance(TechnicianId::new()).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { .. }));
    }
}
