//! Dispatch core
//!
//! Owns the job lifecycle state machine and assignment creation. Every
//! operation takes an explicit `now` so behavior is reproducible in tests,
//! and returns the typed event the caller must publish. Callers serialize
//! writes (one writer at a time); the versioned store turns any slip in
//! that discipline into `ConcurrentModification` instead of a lost update.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};
use types::prelude::*;

use crate::events::DispatchEvent;
use crate::matching::{ineligibility_reason, Matcher};
use crate::store::{EntityStore, Versioned, WriteBatch};

/// Result of a successful lifecycle transition: the updated job plus the
/// event to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub job: Job,
    pub assignment: Option<Assignment>,
    pub event: DispatchEvent,
}

/// Per-job outcome of a batch pass.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    Assigned { technician_id: TechnicianId },
    NoEligibleTechnician,
}

/// Everything one `auto_assign_all` pass produced. Earlier successes stand
/// even when later jobs found nobody.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchReport {
    pub outcomes: Vec<(JobId, BatchOutcome)>,
    pub events: Vec<DispatchEvent>,
}

impl BatchReport {
    pub fn assigned_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, BatchOutcome::Assigned { .. }))
            .count()
    }
}

/// The matching and lifecycle core.
pub struct DispatchCore<S: EntityStore> {
    store: S,
    matcher: Matcher,
}

impl<S: EntityStore> DispatchCore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            matcher: Matcher::default(),
        }
    }

    pub fn with_matcher(store: S, matcher: Matcher) -> Self {
        Self { store, matcher }
    }

    /// Read access to the underlying store (display queries, aggregation).
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Manual assignment of a named technician to a pending job.
    pub fn assign(
        &self,
        job_id: JobId,
        tech_id: TechnicianId,
        now: DateTime<Utc>,
    ) -> Result<Transition, DispatchError> {
        let job = self.store.job(job_id)?;
        if job.record.status != JobStatus::Pending {
            return Err(invalid(&job.record, "assign"));
        }

        let tech = self.store.technician(tech_id)?;
        if let Some(reason) = ineligibility_reason(&tech.record, &job.record, now) {
            return Err(DispatchError::IneligibleAssignment {
                job_id,
                technician_id: tech_id,
                reason,
            });
        }
        if self
            .store
            .active_assignment_for_technician(tech_id)?
            .is_some()
        {
            return Err(DispatchError::IneligibleAssignment {
                job_id,
                technician_id: tech_id,
                reason: "already holds an active assignment".to_string(),
            });
        }

        self.commit_assignment(job, tech, None, now)
    }

    /// Pick the best eligible technician for a pending job and assign them.
    pub fn auto_assign(
        &self,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<Transition, DispatchError> {
        let job = self.store.job(job_id)?;
        if job.record.status != JobStatus::Pending {
            return Err(invalid(&job.record, "assign"));
        }

        let candidates = self.store.active_technicians()?;
        let winner = self.pick_best(&job.record, &candidates, &BTreeSet::new(), now)?;

        match winner {
            Some((tech_id, score)) => {
                let tech = self.store.technician(tech_id)?;
                self.commit_assignment(job, tech, Some(score), now)
            }
            None => {
                debug!(%job_id, "no eligible technician; job stays pending");
                Err(DispatchError::NoEligibleTechnician { job_id })
            }
        }
    }

    /// One pass over every pending job, most urgent first, oldest first
    /// within a tier. A reservation set guarantees no technician is offered
    /// to two jobs inside the same pass.
    pub fn auto_assign_all(&self, now: DateTime<Utc>) -> Result<BatchReport, DispatchError> {
        let mut pending = self.store.pending_jobs()?;
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });

        let mut reserved: BTreeSet<TechnicianId> = BTreeSet::new();
        let mut report = BatchReport::default();

        for job in pending {
            let job_id = job.id;
            let candidates = self.store.active_technicians()?;
            let winner = self.pick_best(&job, &candidates, &reserved, now)?;

            match winner {
                Some((tech_id, score)) => {
                    let fresh = self.store.job(job_id)?;
                    let tech = self.store.technician(tech_id)?;
                    let transition = self.commit_assignment(fresh, tech, Some(score), now)?;
                    reserved.insert(tech_id);
                    report
                        .outcomes
                        .push((job_id, BatchOutcome::Assigned { technician_id: tech_id }));
                    report.events.push(transition.event);
                }
                None => {
                    report
                        .outcomes
                        .push((job_id, BatchOutcome::NoEligibleTechnician));
                }
            }
        }

        info!(
            assigned = report.assigned_count(),
            unmatched = report.outcomes.len() - report.assigned_count(),
            "batch assignment pass finished"
        );
        Ok(report)
    }

    /// Assigned → InProgress, by the technician holding the assignment.
    pub fn start(
        &self,
        job_id: JobId,
        tech_id: TechnicianId,
        now: DateTime<Utc>,
    ) -> Result<Transition, DispatchError> {
        let mut job = self.store.job(job_id)?;
        if job.record.status != JobStatus::Assigned {
            return Err(invalid(&job.record, "start"));
        }

        let mut assignment = self
            .store
            .active_assignment_for_job(job_id)?
            .ok_or_else(|| invalid(&job.record, "start"))?;
        if assignment.record.technician_id != tech_id {
            return Err(invalid(&job.record, "start"));
        }

        assignment.record.status = AssignmentStatus::InProgress;
        assignment.record.started_at = Some(now);
        job.record.status = JobStatus::InProgress;
        job.record.started_at = Some(now);

        self.store.commit(
            WriteBatch::new()
                .save_assignment(assignment.record.clone(), assignment.version)
                .save_job(job.record.clone(), job.version),
        )?;

        info!(%job_id, %tech_id, "job started");
        Ok(Transition {
            event: DispatchEvent::JobStarted {
                job_id,
                technician_id: tech_id,
                status: job.record.status,
                timestamp: now,
            },
            job: job.record,
            assignment: Some(assignment.record),
        })
    }

    /// InProgress → Completed. Frees the technician in the same step.
    pub fn complete(
        &self,
        job_id: JobId,
        actual_hours: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Transition, DispatchError> {
        let mut job = self.store.job(job_id)?;
        if job.record.status != JobStatus::InProgress {
            return Err(invalid(&job.record, "complete"));
        }

        let mut assignment = self
            .store
            .active_assignment_for_job(job_id)?
            .ok_or_else(|| invalid(&job.record, "complete"))?;
        let tech_id = assignment.record.technician_id;
        let mut tech = self.store.technician(tech_id)?;

        assignment.record.status = AssignmentStatus::Completed;
        assignment.record.completed_at = Some(now);
        job.record.status = JobStatus::Completed;
        job.record.completed_at = Some(now);
        job.record.actual_hours = actual_hours;
        tech.record.status = TechStatus::Available;

        self.store.commit(
            WriteBatch::new()
                .save_assignment(assignment.record.clone(), assignment.version)
                .save_job(job.record.clone(), job.version)
                .save_technician(tech.record, tech.version),
        )?;

        info!(%job_id, %tech_id, "job completed");
        Ok(Transition {
            event: DispatchEvent::JobCompleted {
                job_id,
                technician_id: tech_id,
                status: job.record.status,
                timestamp: now,
            },
            job: job.record,
            assignment: Some(assignment.record),
        })
    }

    /// Pending/Assigned/InProgress → Cancelled. Closing the assignment and
    /// freeing the technician happen in the same serialized step, so no
    /// reader ever sees a freed job still pinning a busy technician.
    pub fn cancel(&self, job_id: JobId, now: DateTime<Utc>) -> Result<Transition, DispatchError> {
        let mut job = self.store.job(job_id)?;
        if job.record.status.is_terminal() {
            return Err(invalid(&job.record, "cancel"));
        }

        let active = self.store.active_assignment_for_job(job_id)?;
        let tech_id = active.as_ref().map(|a| a.record.technician_id);

        let mut batch = WriteBatch::new();
        if let Some(mut assignment) = active {
            let mut tech = self.store.technician(assignment.record.technician_id)?;
            assignment.record.status = AssignmentStatus::Cancelled;
            assignment.record.completed_at = Some(now);
            tech.record.status = TechStatus::Available;

            batch = batch
                .save_assignment(assignment.record, assignment.version)
                .save_technician(tech.record, tech.version);
        }

        job.record.status = JobStatus::Cancelled;
        job.record.assigned_technician = None;
        batch = batch.save_job(job.record.clone(), job.version);
        self.store.commit(batch)?;

        info!(%job_id, technician = ?tech_id, "job cancelled");
        Ok(Transition {
            event: DispatchEvent::JobCancelled {
                job_id,
                technician_id: tech_id,
                status: job.record.status,
                timestamp: now,
            },
            job: job.record,
            assignment: None,
        })
    }

    /// Shared location-update operation, used by the HTTP surface and by
    /// the technician socket relay.
    pub fn update_location(
        &self,
        tech_id: TechnicianId,
        location: Location,
        now: DateTime<Utc>,
    ) -> Result<DispatchEvent, DispatchError> {
        let mut tech = self.store.technician(tech_id)?;
        tech.record.location = Some(location);
        self.store.save_technician(tech.record, tech.version)?;

        debug!(%tech_id, lat = location.lat, lon = location.lon, "location updated");
        Ok(DispatchEvent::LocationUpdate {
            technician_id: tech_id,
            location,
            timestamp: now,
        })
    }

    /// Run matching for one job over the given candidates, skipping any
    /// technician already reserved by the current batch pass.
    fn pick_best(
        &self,
        job: &Job,
        candidates: &[Technician],
        reserved: &BTreeSet<TechnicianId>,
        now: DateTime<Utc>,
    ) -> Result<Option<(TechnicianId, f64)>, DispatchError> {
        let free: Vec<Technician> = candidates
            .iter()
            .filter(|t| !reserved.contains(&t.id))
            .cloned()
            .collect();

        let window = Duration::days(self.matcher.config().workload_window_days);
        let since = now - window;
        let mut recent: BTreeMap<TechnicianId, usize> = BTreeMap::new();
        for tech in &free {
            recent.insert(tech.id, self.store.completed_count_since(tech.id, since)?);
        }

        Ok(self
            .matcher
            .find_best(job, &free, &recent, now)
            .map(|(tech, score)| (tech.id, score)))
    }

    /// Shared commit path for manual and automatic assignment: creates the
    /// assignment, moves the job to Assigned, marks the technician Busy.
    fn commit_assignment(
        &self,
        mut job: Versioned<Job>,
        mut tech: Versioned<Technician>,
        score: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Transition, DispatchError> {
        let mut assignment = Assignment::new(job.record.id, tech.record.id, now);
        assignment.match_score = score;
        assignment.distance_miles = tech
            .record
            .location
            .map(|loc| loc.haversine_miles(&job.record.location));

        job.record.status = JobStatus::Assigned;
        job.record.assigned_technician = Some(tech.record.id);
        tech.record.status = TechStatus::Busy;

        self.store.commit(
            WriteBatch::new()
                .insert_assignment(assignment.clone())
                .save_job(job.record.clone(), job.version)
                .save_technician(tech.record.clone(), tech.version),
        )?;

        info!(
            job_id = %job.record.id,
            technician_id = %tech.record.id,
            score = ?score,
            "assignment created"
        );

        Ok(Transition {
            event: DispatchEvent::AssignmentCreated {
                job_id: job.record.id,
                assignment_id: assignment.id,
                technician_id: tech.record.id,
                status: job.record.status,
                timestamp: now,
            },
            job: job.record,
            assignment: Some(assignment),
        })
    }
}

fn invalid(job: &Job, action: &str) -> DispatchError {
    warn!(job_id = %job.id, status = %job.status, action, "invalid transition");
    DispatchError::InvalidTransition {
        from: job.status.to_string(),
        action: action.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use std::collections::BTreeSet;

    fn skills(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap()
    }

    fn core() -> DispatchCore<MemoryStore> {
        DispatchCore::new(MemoryStore::new())
    }

    fn seed_tech(core: &DispatchCore<MemoryStore>, lat: f64) -> TechnicianId {
        let mut tech = Technician::new("T", skills(&["hvac"]), 8, 17);
        tech.location = Some(Location::new(lat, 0.0).unwrap());
        let id = tech.id;
        core.store().insert_technician(tech).unwrap();
        id
    }

    fn seed_job(core: &DispatchCore<MemoryStore>, priority: Priority) -> JobId {
        let job = Job::new(
            CustomerId::new(),
            "AC repair",
            skills(&["hvac"]),
            priority,
            Location::new(0.0, 1.0).unwrap(),
            2.0,
            noon(),
        );
        let id = job.id;
        core.store().insert_job(job).unwrap();
        id
    }

    #[test]
    fn test_auto_assign_happy_path() {
        let core = core();
        let tech_id = seed_tech(&core, 0.0);
        let job_id = seed_job(&core, Priority::Emergency);

        let transition = core.auto_assign(job_id, noon()).unwrap();

        assert_eq!(transition.job.status, JobStatus::Assigned);
        assert_eq!(transition.job.assigned_technician, Some(tech_id));
        let assignment = transition.assignment.unwrap();
        assert_eq!(assignment.technician_id, tech_id);
        assert!(assignment.match_score.is_some());
        assert!(assignment.distance_miles.unwrap() > 0.0);

        let tech = core.store().technician(tech_id).unwrap().record;
        assert_eq!(tech.status, TechStatus::Busy);

        assert!(matches!(
            transition.event,
            DispatchEvent::AssignmentCreated { .. }
        ));
    }

    #[test]
    fn test_auto_assign_no_candidates() {
        let core = core();
        let job_id = seed_job(&core, Priority::Normal);

        let err = core.auto_assign(job_id, noon()).unwrap_err();
        assert!(matches!(err, DispatchError::NoEligibleTechnician { .. }));

        // Job untouched
        let job = core.store().job(job_id).unwrap().record;
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_auto_assign_rejects_non_pending() {
        let core = core();
        seed_tech(&core, 0.0);
        let job_id = seed_job(&core, Priority::Normal);
        core.auto_assign(job_id, noon()).unwrap();

        let err = core.auto_assign(job_id, noon()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }

    #[test]
    fn test_manual_assign_checks_eligibility() {
        let core = core();
        let job_id = seed_job(&core, Priority::Normal);

        let mut tech = Technician::new("P", skills(&["plumbing"]), 8, 17);
        tech.location = Some(Location::new(0.0, 0.0).unwrap());
        let tech_id = tech.id;
        core.store().insert_technician(tech).unwrap();

        let err = core.assign(job_id, tech_id, noon()).unwrap_err();
        assert!(matches!(err, DispatchError::IneligibleAssignment { .. }));
    }

    #[test]
    fn test_technician_never_double_booked() {
        let core = core();
        let tech_id = seed_tech(&core, 0.0);
        let first = seed_job(&core, Priority::Normal);
        let second = seed_job(&core, Priority::Normal);

        core.assign(first, tech_id, noon()).unwrap();
        // Now busy: eligibility rejects the second manual attempt
        let err = core.assign(second, tech_id, noon()).unwrap_err();
        assert!(matches!(err, DispatchError::IneligibleAssignment { .. }));
    }

    #[test]
    fn test_start_requires_assigned_technician() {
        let core = core();
        let tech_id = seed_tech(&core, 0.0);
        let job_id = seed_job(&core, Priority::Normal);
        core.auto_assign(job_id, noon()).unwrap();

        // Wrong technician cannot start the job
        let imposter = TechnicianId::new();
        let err = core.start(job_id, imposter, noon()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));

        let transition = core.start(job_id, tech_id, noon()).unwrap();
        assert_eq!(transition.job.status, JobStatus::InProgress);

        // Double-start rejected
        let err = core.start(job_id, tech_id, noon()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }

    #[test]
    fn test_start_rejects_pending_job() {
        let core = core();
        let tech_id = seed_tech(&core, 0.0);
        let job_id = seed_job(&core, Priority::Normal);

        let err = core.start(job_id, tech_id, noon()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }

    #[test]
    fn test_complete_frees_technician() {
        let core = core();
        let tech_id = seed_tech(&core, 0.0);
        let job_id = seed_job(&core, Priority::Normal);
        core.auto_assign(job_id, noon()).unwrap();
        core.start(job_id, tech_id, noon()).unwrap();

        let later = noon() + Duration::hours(2);
        let transition = core.complete(job_id, Some(1.5), later).unwrap();

        assert_eq!(transition.job.status, JobStatus::Completed);
        assert_eq!(transition.job.actual_hours, Some(1.5));
        assert_eq!(transition.job.completed_at, Some(later));

        let tech = core.store().technician(tech_id).unwrap().record;
        assert_eq!(tech.status, TechStatus::Available);

        let assignment = transition.assignment.unwrap();
        assert_eq!(assignment.status, AssignmentStatus::Completed);
        assert!(!assignment.is_active());
    }

    #[test]
    fn test_complete_is_not_idempotent() {
        let core = core();
        let tech_id = seed_tech(&core, 0.0);
        let job_id = seed_job(&core, Priority::Normal);
        core.auto_assign(job_id, noon()).unwrap();
        core.start(job_id, tech_id, noon()).unwrap();
        core.complete(job_id, None, noon()).unwrap();

        let err = core.complete(job_id, None, noon()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));

        // No second completion record: still exactly one assignment
        let history = core.store().assignments_for_technician(tech_id).unwrap();
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_cancel_after_assign_frees_everything() {
        let core = core();
        let tech_id = seed_tech(&core, 0.0);
        let job_id = seed_job(&core, Priority::Normal);
        core.auto_assign(job_id, noon()).unwrap();

        let transition = core.cancel(job_id, noon()).unwrap();
        assert_eq!(transition.job.status, JobStatus::Cancelled);
        assert_eq!(transition.job.assigned_technician, None);

        let tech = core.store().technician(tech_id).unwrap().record;
        assert_eq!(tech.status, TechStatus::Available);

        // No residual active assignment
        assert!(core
            .store()
            .active_assignment_for_technician(tech_id)
            .unwrap()
            .is_none());
        assert!(core
            .store()
            .active_assignment_for_job(job_id)
            .unwrap()
            .is_none());

        match transition.event {
            DispatchEvent::JobCancelled { technician_id, .. } => {
                assert_eq!(technician_id, Some(tech_id))
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_cancel_pending_job_has_no_technician() {
        let core = core();
        let job_id = seed_job(&core, Priority::Low);

        let transition = core.cancel(job_id, noon()).unwrap();
        assert_eq!(transition.job.status, JobStatus::Cancelled);
        match transition.event {
            DispatchEvent::JobCancelled { technician_id, .. } => {
                assert_eq!(technician_id, None)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_cancel_terminal_job_rejected() {
        let core = core();
        let job_id = seed_job(&core, Priority::Low);
        core.cancel(job_id, noon()).unwrap();

        let err = core.cancel(job_id, noon()).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
    }

    #[test]
    fn test_batch_orders_by_priority_then_age() {
        let core = core();
        let tech_id = seed_tech(&core, 0.0);

        // Older normal job, newer emergency: emergency must win the tech
        let normal = Job::new(
            CustomerId::new(),
            "Routine",
            skills(&["hvac"]),
            Priority::Normal,
            Location::new(0.0, 1.0).unwrap(),
            1.0,
            noon() - Duration::hours(1),
        );
        let normal_id = normal.id;
        core.store().insert_job(normal).unwrap();

        let emergency = Job::new(
            CustomerId::new(),
            "Burst pipe freeze",
            skills(&["hvac"]),
            Priority::Emergency,
            Location::new(0.0, 1.0).unwrap(),
            1.0,
            noon(),
        );
        let emergency_id = emergency.id;
        core.store().insert_job(emergency).unwrap();

        let report = core.auto_assign_all(noon()).unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.assigned_count(), 1);

        let (first_job, first_outcome) = &report.outcomes[0];
        assert_eq!(*first_job, emergency_id);
        assert_eq!(
            *first_outcome,
            BatchOutcome::Assigned { technician_id: tech_id }
        );
        assert_eq!(
            report.outcomes[1],
            (normal_id, BatchOutcome::NoEligibleTechnician)
        );

        // The loser stays pending
        let job = core.store().job(normal_id).unwrap().record;
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(report.events.len(), 1);
    }

    #[test]
    fn test_batch_reservation_prevents_double_booking() {
        let core = core();
        seed_tech(&core, 0.0);
        seed_tech(&core, 0.5);
        for _ in 0..4 {
            seed_job(&core, Priority::Normal);
        }

        let report = core.auto_assign_all(noon()).unwrap();
        assert_eq!(report.assigned_count(), 2);

        let mut seen = BTreeSet::new();
        for (_, outcome) in &report.outcomes {
            if let BatchOutcome::Assigned { technician_id } = outcome {
                assert!(seen.insert(*technician_id), "technician double-booked");
            }
        }
    }

    #[test]
    fn test_update_location_feeds_matching() {
        let core = core();
        let tech_id = seed_tech(&core, 5.0);

        let event = core
            .update_location(tech_id, Location::new(0.0, 1.0).unwrap(), noon())
            .unwrap();
        assert!(matches!(event, DispatchEvent::LocationUpdate { .. }));

        let tech = core.store().technician(tech_id).unwrap().record;
        assert_eq!(tech.location.unwrap().lat, 0.0);
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let core = core();
        let err = core.auto_assign(JobId::new(), noon()).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { .. }));
    }
}
