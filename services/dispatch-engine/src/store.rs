//! Entity store interface and in-memory reference implementation
//!
//! The core treats storage as a transactional keyed collaborator: single
//! record reads and writes are atomic, and every write is guarded by the
//! version observed at read time. Multi-record transitions go through a
//! `WriteBatch` commit, which is all-or-nothing: a version conflict on any
//! record leaves every record untouched, so a retry after
//! `ConcurrentModification` never sees a torn transition.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;
use types::prelude::*;

/// Monotonic per-record version, bumped on every save.
pub type Version = u64;

/// A record together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub record: T,
    pub version: Version,
}

/// Storage-level failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} {id}: stale write (expected version {expected}, found {found})")]
    VersionConflict {
        kind: EntityKind,
        id: String,
        expected: Version,
        found: Version,
    },

    #[error("Backend failure: {0}")]
    Backend(String),
}

impl From<StoreError> for DispatchError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => DispatchError::NotFound { kind, id },
            StoreError::VersionConflict { kind, id, .. } => {
                DispatchError::ConcurrentModification { kind, id }
            }
            StoreError::Backend(msg) => DispatchError::Store(msg),
        }
    }
}

/// One write inside a batch commit.
#[derive(Debug, Clone)]
enum BatchWrite {
    InsertAssignment(Assignment),
    SaveAssignment(Assignment, Version),
    SaveJob(Job, Version),
    SaveTechnician(Technician, Version),
}

/// A set of writes that must land together.
///
/// `commit` validates every guarded version before touching any record, so
/// a conflict rejects the whole batch and the store stays consistent.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    writes: Vec<BatchWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_assignment(mut self, assignment: Assignment) -> Self {
        self.writes.push(BatchWrite::InsertAssignment(assignment));
        self
    }

    pub fn save_assignment(mut self, assignment: Assignment, expected: Version) -> Self {
        self.writes
            .push(BatchWrite::SaveAssignment(assignment, expected));
        self
    }

    pub fn save_job(mut self, job: Job, expected: Version) -> Self {
        self.writes.push(BatchWrite::SaveJob(job, expected));
        self
    }

    pub fn save_technician(mut self, tech: Technician, expected: Version) -> Self {
        self.writes.push(BatchWrite::SaveTechnician(tech, expected));
        self
    }
}

/// Read/write access to dispatch entities.
///
/// Versioned `save_*` methods and `commit` fail with `VersionConflict`
/// when the stored version has moved past the one the caller read,
/// surfaced to callers as `ConcurrentModification`, never silently
/// resolved.
pub trait EntityStore: Send + Sync {
    // Customers (plain CRUD, never versioned by the core)
    fn customer(&self, id: CustomerId) -> Result<Customer, StoreError>;
    fn insert_customer(&self, customer: Customer) -> Result<(), StoreError>;
    fn customers(&self) -> Result<Vec<Customer>, StoreError>;

    // Technicians
    fn technician(&self, id: TechnicianId) -> Result<Versioned<Technician>, StoreError>;
    fn insert_technician(&self, tech: Technician) -> Result<(), StoreError>;
    fn save_technician(&self, tech: Technician, expected: Version) -> Result<Version, StoreError>;
    fn technicians(&self) -> Result<Vec<Technician>, StoreError>;
    fn active_technicians(&self) -> Result<Vec<Technician>, StoreError>;

    // Jobs
    fn job(&self, id: JobId) -> Result<Versioned<Job>, StoreError>;
    fn insert_job(&self, job: Job) -> Result<(), StoreError>;
    fn save_job(&self, job: Job, expected: Version) -> Result<Version, StoreError>;
    fn jobs(&self) -> Result<Vec<Job>, StoreError>;
    fn pending_jobs(&self) -> Result<Vec<Job>, StoreError>;
    fn completed_jobs(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<Job>, StoreError>;

    // Assignments
    fn assignment(&self, id: AssignmentId) -> Result<Versioned<Assignment>, StoreError>;
    fn insert_assignment(&self, assignment: Assignment) -> Result<(), StoreError>;
    fn save_assignment(
        &self,
        assignment: Assignment,
        expected: Version,
    ) -> Result<Version, StoreError>;
    fn active_assignment_for_job(
        &self,
        job_id: JobId,
    ) -> Result<Option<Versioned<Assignment>>, StoreError>;
    fn active_assignment_for_technician(
        &self,
        tech_id: TechnicianId,
    ) -> Result<Option<Versioned<Assignment>>, StoreError>;
    fn assignments_for_technician(
        &self,
        tech_id: TechnicianId,
    ) -> Result<Vec<Assignment>, StoreError>;
    fn completed_count_since(
        &self,
        tech_id: TechnicianId,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Apply a multi-record transition atomically. No record changes
    /// unless every guarded version still matches.
    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

#[derive(Default)]
struct Tables {
    customers: BTreeMap<CustomerId, Customer>,
    technicians: BTreeMap<TechnicianId, (Technician, Version)>,
    jobs: BTreeMap<JobId, (Job, Version)>,
    assignments: BTreeMap<AssignmentId, (Assignment, Version)>,
}

/// In-memory entity store.
///
/// BTreeMap tables give deterministic iteration order; a single `RwLock`
/// makes every individual read and write atomic.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables
            .read()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables
            .write()
            .map_err(|e| StoreError::Backend(format!("lock poisoned: {}", e)))
    }
}

impl EntityStore for MemoryStore {
    fn customer(&self, id: CustomerId) -> Result<Customer, StoreError> {
        self.read()?
            .customers
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Customer,
                id: id.to_string(),
            })
    }

    fn insert_customer(&self, customer: Customer) -> Result<(), StoreError> {
        self.write()?.customers.insert(customer.id, customer);
        Ok(())
    }

    fn customers(&self) -> Result<Vec<Customer>, StoreError> {
        Ok(self.read()?.customers.values().cloned().collect())
    }

    fn technician(&self, id: TechnicianId) -> Result<Versioned<Technician>, StoreError> {
        self.read()?
            .technicians
            .get(&id)
            .map(|(t, v)| Versioned {
                record: t.clone(),
                version: *v,
            })
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Technician,
                id: id.to_string(),
            })
    }

    fn insert_technician(&self, tech: Technician) -> Result<(), StoreError> {
        self.write()?.technicians.insert(tech.id, (tech, 1));
        Ok(())
    }

    fn save_technician(&self, tech: Technician, expected: Version) -> Result<Version, StoreError> {
        let mut tables = self.write()?;
        let entry = tables
            .technicians
            .get_mut(&tech.id)
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Technician,
                id: tech.id.to_string(),
            })?;
        if entry.1 != expected {
            return Err(StoreError::VersionConflict {
                kind: EntityKind::Technician,
                id: tech.id.to_string(),
                expected,
                found: entry.1,
            });
        }
        *entry = (tech, expected + 1);
        Ok(expected + 1)
    }

    fn technicians(&self) -> Result<Vec<Technician>, StoreError> {
        Ok(self
            .read()?
            .technicians
            .values()
            .map(|(t, _)| t.clone())
            .collect())
    }

    fn active_technicians(&self) -> Result<Vec<Technician>, StoreError> {
        Ok(self
            .read()?
            .technicians
            .values()
            .filter(|(t, _)| t.active)
            .map(|(t, _)| t.clone())
            .collect())
    }

    fn job(&self, id: JobId) -> Result<Versioned<Job>, StoreError> {
        self.read()?
            .jobs
            .get(&id)
            .map(|(j, v)| Versioned {
                record: j.clone(),
                version: *v,
            })
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Job,
                id: id.to_string(),
            })
    }

    fn insert_job(&self, job: Job) -> Result<(), StoreError> {
        self.write()?.jobs.insert(job.id, (job, 1));
        Ok(())
    }

    fn save_job(&self, job: Job, expected: Version) -> Result<Version, StoreError> {
        let mut tables = self.write()?;
        let entry = tables.jobs.get_mut(&job.id).ok_or(StoreError::NotFound {
            kind: EntityKind::Job,
            id: job.id.to_string(),
        })?;
        if entry.1 != expected {
            return Err(StoreError::VersionConflict {
                kind: EntityKind::Job,
                id: job.id.to_string(),
                expected,
                found: entry.1,
            });
        }
        *entry = (job, expected + 1);
        Ok(expected + 1)
    }

    fn jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self.read()?.jobs.values().map(|(j, _)| j.clone()).collect())
    }

    fn pending_jobs(&self) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .read()?
            .jobs
            .values()
            .filter(|(j, _)| j.status == JobStatus::Pending)
            .map(|(j, _)| j.clone())
            .collect())
    }

    fn completed_jobs(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> Result<Vec<Job>, StoreError> {
        Ok(self
            .read()?
            .jobs
            .values()
            .filter(|(j, _)| j.status == JobStatus::Completed)
            .filter(|(j, _)| match (range, j.completed_at) {
                (Some((start, end)), Some(done)) => done >= start && done <= end,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .map(|(j, _)| j.clone())
            .collect())
    }

    fn assignment(&self, id: AssignmentId) -> Result<Versioned<Assignment>, StoreError> {
        self.read()?
            .assignments
            .get(&id)
            .map(|(a, v)| Versioned {
                record: a.clone(),
                version: *v,
            })
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Assignment,
                id: id.to_string(),
            })
    }

    fn insert_assignment(&self, assignment: Assignment) -> Result<(), StoreError> {
        self.write()?
            .assignments
            .insert(assignment.id, (assignment, 1));
        Ok(())
    }

    fn save_assignment(
        &self,
        assignment: Assignment,
        expected: Version,
    ) -> Result<Version, StoreError> {
        let mut tables = self.write()?;
        let entry = tables
            .assignments
            .get_mut(&assignment.id)
            .ok_or(StoreError::NotFound {
                kind: EntityKind::Assignment,
                id: assignment.id.to_string(),
            })?;
        if entry.1 != expected {
            return Err(StoreError::VersionConflict {
                kind: EntityKind::Assignment,
                id: assignment.id.to_string(),
                expected,
                found: entry.1,
            });
        }
        *entry = (assignment, expected + 1);
        Ok(expected + 1)
    }

    fn active_assignment_for_job(
        &self,
        job_id: JobId,
    ) -> Result<Option<Versioned<Assignment>>, StoreError> {
        Ok(self
            .read()?
            .assignments
            .values()
            .find(|(a, _)| a.job_id == job_id && a.is_active())
            .map(|(a, v)| Versioned {
                record: a.clone(),
                version: *v,
            }))
    }

    fn active_assignment_for_technician(
        &self,
        tech_id: TechnicianId,
    ) -> Result<Option<Versioned<Assignment>>, StoreError> {
        Ok(self
            .read()?
            .assignments
            .values()
            .find(|(a, _)| a.technician_id == tech_id && a.is_active())
            .map(|(a, v)| Versioned {
                record: a.clone(),
                version: *v,
            }))
    }

    fn assignments_for_technician(
        &self,
        tech_id: TechnicianId,
    ) -> Result<Vec<Assignment>, StoreError> {
        Ok(self
            .read()?
            .assignments
            .values()
            .filter(|(a, _)| a.technician_id == tech_id)
            .map(|(a, _)| a.clone())
            .collect())
    }

    fn completed_count_since(
        &self,
        tech_id: TechnicianId,
        since: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Ok(self
            .read()?
            .assignments
            .values()
            .filter(|(a, _)| {
                a.technician_id == tech_id
                    && a.status == AssignmentStatus::Completed
                    && a.completed_at.map(|t| t >= since).unwrap_or(false)
            })
            .count())
    }

    fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tables = self.write()?;

        // Validation pass: reject the whole batch before any mutation
        for write in &batch.writes {
            match write {
                BatchWrite::InsertAssignment(_) => {}
                BatchWrite::SaveAssignment(assignment, expected) => {
                    let found = tables
                        .assignments
                        .get(&assignment.id)
                        .map(|(_, v)| *v)
                        .ok_or(StoreError::NotFound {
                            kind: EntityKind::Assignment,
                            id: assignment.id.to_string(),
                        })?;
                    if found != *expected {
                        return Err(StoreError::VersionConflict {
                            kind: EntityKind::Assignment,
                            id: assignment.id.to_string(),
                            expected: *expected,
                            found,
                        });
                    }
                }
                BatchWrite::SaveJob(job, expected) => {
                    let found = tables.jobs.get(&job.id).map(|(_, v)| *v).ok_or(
                        StoreError::NotFound {
                            kind: EntityKind::Job,
                            id: job.id.to_string(),
                        },
                    )?;
                    if found != *expected {
                        return Err(StoreError::VersionConflict {
                            kind: EntityKind::Job,
                            id: job.id.to_string(),
                            expected: *expected,
                            found,
                        });
                    }
                }
                BatchWrite::SaveTechnician(tech, expected) => {
                    let found = tables.technicians.get(&tech.id).map(|(_, v)| *v).ok_or(
                        StoreError::NotFound {
                            kind: EntityKind::Technician,
                            id: tech.id.to_string(),
                        },
                    )?;
                    if found != *expected {
                        return Err(StoreError::VersionConflict {
                            kind: EntityKind::Technician,
                            id: tech.id.to_string(),
                            expected: *expected,
                            found,
                        });
                    }
                }
            }
        }

        for write in batch.writes {
            match write {
                BatchWrite::InsertAssignment(assignment) => {
                    tables.assignments.insert(assignment.id, (assignment, 1));
                }
                BatchWrite::SaveAssignment(assignment, expected) => {
                    tables
                        .assignments
                        .insert(assignment.id, (assignment, expected + 1));
                }
                BatchWrite::SaveJob(job, expected) => {
                    tables.jobs.insert(job.id, (job, expected + 1));
                }
                BatchWrite::SaveTechnician(tech, expected) => {
                    tables.technicians.insert(tech.id, (tech, expected + 1));
                }
            }
        }
        Ok(())
    }
}
