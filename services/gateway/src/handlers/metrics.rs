use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use dispatch_engine::sla::SlaReport;
use dispatch_engine::{EntityStore, SlaAggregator};
use types::prelude::*;

use crate::error::AppError;
use crate::models::{DashboardStats, SlaQuery};
use crate::state::AppState;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn dashboard_stats(
    State(state): State<AppState>,
) -> Result<Json<DashboardStats>, AppError> {
    let core = state.core.read().await;
    let jobs = core.store().jobs()?;
    let technicians = core.store().technicians()?;

    let day_ago = Utc::now() - Duration::days(1);
    let sla_violations_today = jobs
        .iter()
        .filter(|job| job.created_at >= day_ago && state.sla.met(job) == Some(false))
        .count();

    let stats = DashboardStats {
        total_jobs: jobs.len(),
        pending_jobs: jobs.iter().filter(|j| j.status == JobStatus::Pending).count(),
        in_progress_jobs: jobs
            .iter()
            .filter(|j| j.status == JobStatus::InProgress)
            .count(),
        completed_jobs: jobs
            .iter()
            .filter(|j| j.status == JobStatus::Completed)
            .count(),
        active_technicians: technicians.iter().filter(|t| t.active).count(),
        available_technicians: technicians
            .iter()
            .filter(|t| t.active && t.status == TechStatus::Available)
            .count(),
        sla_violations_today,
    };
    Ok(Json(stats))
}

pub async fn sla_metrics(
    State(state): State<AppState>,
    Query(query): Query<SlaQuery>,
) -> Result<Json<SlaReport>, AppError> {
    let range = query.range()?;
    let core = state.core.read().await;
    let aggregator = SlaAggregator::new(core.store(), state.sla.clone());
    let report = aggregator.compliance(range)?;
    Ok(Json(report))
}
