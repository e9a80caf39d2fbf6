//! Property tests for the batch assignment pass.
//!
//! Random fleets and job backlogs must never produce a pass that books
//! one technician onto two jobs, and every outcome must be reflected in
//! the store exactly.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

use dispatch_engine::{BatchOutcome, DispatchCore, EntityStore, MemoryStore};
use types::prelude::*;

const SKILL_POOL: [&str; 4] = ["hvac", "plumbing", "electrical", "appliance"];

fn skill_subset(mask: u8) -> BTreeSet<String> {
    SKILL_POOL
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, s)| s.to_string())
        .collect()
}

fn priority_from(ix: u8) -> Priority {
    match ix % 4 {
        0 => Priority::Low,
        1 => Priority::Normal,
        2 => Priority::High,
        _ => Priority::Emergency,
    }
}

prop_compose! {
    fn arb_tech()(mask in 1u8..16, lat in -1.0f64..1.0, lon in -1.0f64..1.0) -> Technician {
        let mut tech = Technician::new("T", skill_subset(mask), 8, 17);
        tech.location = Some(Location::new(lat, lon).unwrap());
        tech
    }
}

prop_compose! {
    fn arb_job()(
        mask in 0u8..16,
        prio in 0u8..4,
        lat in -1.0f64..1.0,
        lon in -1.0f64..1.0,
        age_minutes in 0i64..600,
    ) -> Job {
        let created = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(age_minutes);
        Job::new(
            CustomerId::new(),
            "J",
            skill_subset(mask),
            priority_from(prio),
            Location::new(lat, lon).unwrap(),
            1.0,
            created,
        )
    }
}

proptest! {
    #[test]
    fn batch_never_double_books(
        techs in proptest::collection::vec(arb_tech(), 0..8),
        jobs in proptest::collection::vec(arb_job(), 0..16),
    ) {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let core = DispatchCore::new(MemoryStore::new());
        for tech in techs {
            core.store().insert_technician(tech).unwrap();
        }
        let job_count = jobs.len();
        for job in jobs {
            core.store().insert_job(job).unwrap();
        }

        let report = core.auto_assign_all(now).unwrap();
        prop_assert_eq!(report.outcomes.len(), job_count);

        // One technician, at most one job per pass
        let mut booked = BTreeSet::new();
        for (_, outcome) in &report.outcomes {
            if let BatchOutcome::Assigned { technician_id } = outcome {
                prop_assert!(booked.insert(*technician_id));
            }
        }

        // Store agrees with the report
        let mut by_job: BTreeMap<JobId, &BatchOutcome> = BTreeMap::new();
        for (job_id, outcome) in &report.outcomes {
            by_job.insert(*job_id, outcome);
        }
        for job in core.store().jobs().unwrap() {
            match by_job.get(&job.id) {
                Some(BatchOutcome::Assigned { technician_id }) => {
                    prop_assert_eq!(job.status, JobStatus::Assigned);
                    prop_assert_eq!(job.assigned_technician, Some(*technician_id));
                    let tech = core.store().technician(*technician_id).unwrap().record;
                    prop_assert_eq!(tech.status, TechStatus::Busy);
                }
                Some(BatchOutcome::NoEligibleTechnician) => {
                    prop_assert_eq!(job.status, JobStatus::Pending);
                    prop_assert_eq!(job.assigned_technician, None);
                }
                None => prop_assert!(false, "job missing from report"),
            }
        }

        prop_assert_eq!(report.events.len(), report.assigned_count());
    }

    #[test]
    fn batch_respects_skill_coverage(
        techs in proptest::collection::vec(arb_tech(), 1..6),
        jobs in proptest::collection::vec(arb_job(), 1..10),
    ) {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let core = DispatchCore::new(MemoryStore::new());
        for tech in techs {
            core.store().insert_technician(tech).unwrap();
        }
        for job in jobs {
            core.store().insert_job(job).unwrap();
        }

        let report = core.auto_assign_all(now).unwrap();
        for (job_id, outcome) in &report.outcomes {
            if let BatchOutcome::Assigned { technician_id } = outcome {
                let job = core.store().job(*job_id).unwrap().record;
                let tech = core.store().technician(*technician_id).unwrap().record;
                prop_assert!(tech.has_skills_for(&job));
            }
        }
    }
}
