//! Technician-job matching
//!
//! Two stages: a hard eligibility filter, then a lower-is-better composite
//! score over the survivors. Ties break on the lowest technician id so a
//! rerun over the same state always picks the same winner.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use types::prelude::*;

/// Scoring weights. Deployment parameters, not hard-coded law.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Added miles per job the technician completed inside the workload
    /// window (load balancing).
    pub workload_weight: f64,
    /// Subtracted miles per certification that names a required skill.
    pub certification_bonus: f64,
    /// Stand-in distance for technicians that never reported a position.
    pub unknown_location_miles: f64,
    /// Lookback for the workload penalty, in days.
    pub workload_window_days: i64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            workload_weight: 2.0,
            certification_bonus: 5.0,
            unknown_location_miles: 15.0,
            workload_window_days: 7,
        }
    }
}

/// Distance multiplier per priority tier. Urgent work shrinks the distance
/// penalty so a further-away technician can still win an emergency.
fn urgency_factor(priority: Priority) -> f64 {
    match priority {
        Priority::Emergency => 0.25,
        Priority::High => 0.5,
        Priority::Normal => 0.75,
        Priority::Low => 1.0,
    }
}

/// Hard filter a technician must pass before being scored.
pub fn eligible(tech: &Technician, job: &Job, at: DateTime<Utc>) -> bool {
    ineligibility_reason(tech, job, at).is_none()
}

/// Why a technician fails the filter, or None if they pass.
pub fn ineligibility_reason(tech: &Technician, job: &Job, at: DateTime<Utc>) -> Option<String> {
    if !tech.active {
        return Some("technician is inactive".to_string());
    }
    if tech.status != TechStatus::Available {
        return Some(format!("technician status is {}", tech.status));
    }
    if !tech.has_skills_for(job) {
        return Some("missing required skills".to_string());
    }
    if !tech.on_shift(at) {
        return Some(format!(
            "outside shift window {}-{}",
            tech.shift_start, tech.shift_end
        ));
    }
    None
}

/// Ranks eligible technicians for a job.
pub struct Matcher {
    config: ScoringConfig,
}

impl Default for Matcher {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl Matcher {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Composite score, lower is better.
    ///
    /// `recent_completed` is the technician's completed-job count inside
    /// the workload window.
    pub fn score(&self, tech: &Technician, job: &Job, recent_completed: usize) -> f64 {
        let distance = tech
            .location
            .map(|loc| loc.haversine_miles(&job.location))
            .unwrap_or(self.config.unknown_location_miles);

        let workload = self.config.workload_weight * recent_completed as f64;

        let matching_certs = tech
            .certifications
            .intersection(&job.required_skills)
            .count() as f64;

        distance * urgency_factor(job.priority) + workload
            - self.config.certification_bonus * matching_certs
    }

    /// Filter by eligibility, rank by score ascending, break ties on the
    /// lowest technician id. Returns None when nobody qualifies.
    pub fn find_best<'a>(
        &self,
        job: &Job,
        candidates: &'a [Technician],
        recent_completed: &BTreeMap<TechnicianId, usize>,
        at: DateTime<Utc>,
    ) -> Option<(&'a Technician, f64)> {
        let mut best: Option<(&Technician, f64)> = None;

        for tech in candidates {
            if !eligible(tech, job, at) {
                continue;
            }
            let completed = recent_completed.get(&tech.id).copied().unwrap_or(0);
            let score = self.score(tech, job, completed);

            best = match best {
                None => Some((tech, score)),
                Some((current, current_score)) => {
                    if score < current_score
                        || (score == current_score && tech.id < current.id)
                    {
                        Some((tech, score))
                    } else {
                        Some((current, current_score))
                    }
                }
            };
        }

        best
    }
}
