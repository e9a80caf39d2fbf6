use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use dispatch_engine::{EntityStore, Transition};
use types::prelude::*;

use crate::error::AppError;
use crate::models::{
    skill_set, AssignRequest, AssignmentResponse, BatchResponse, CompleteRequest,
    CreateJobRequest, JobFilter, JobResponse, StartRequest,
};
use crate::state::AppState;

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(filter): Query<JobFilter>,
) -> Result<Json<Vec<JobResponse>>, AppError> {
    let core = state.core.read().await;
    let jobs = core.store().jobs()?;
    let mut result = Vec::new();
    for job in jobs {
        if filter.matches(&job)? {
            result.push(JobResponse::from_job(job, &state.sla));
        }
    }
    Ok(Json(result))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, AppError> {
    let core = state.core.read().await;
    let job = core.store().job(JobId::from_uuid(id))?;
    Ok(Json(JobResponse::from_job(job.record, &state.sla)))
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(payload): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobResponse>), AppError> {
    let priority = payload.priority()?;
    let location = Location::new(payload.lat, payload.lon)
        .map_err(|e| AppError::Dispatch(DispatchError::Validation(e.to_string())))?;
    if payload.required_skills.is_empty() {
        return Err(AppError::Dispatch(DispatchError::Validation(
            "job needs at least one required skill".to_string(),
        )));
    }
    if payload.estimated_hours <= 0.0 || !payload.estimated_hours.is_finite() {
        return Err(AppError::Dispatch(DispatchError::Validation(
            "estimated_hours must be positive".to_string(),
        )));
    }

    let core = state.core.write().await;
    // Reject jobs for unknown customers up front
    core.store().customer(payload.customer_id)?;

    let job = Job::new(
        payload.customer_id,
        payload.title,
        skill_set(payload.required_skills),
        priority,
        location,
        payload.estimated_hours,
        Utc::now(),
    );
    core.store().insert_job(job.clone())?;
    tracing::info!(job_id = %job.id, priority = %job.priority, "job created");
    Ok((
        StatusCode::CREATED,
        Json(JobResponse::from_job(job, &state.sla)),
    ))
}

/// Publish while the caller still holds the core write lock, so events
/// reach the feed in store-commit order. Publishing after the lock is
/// released can interleave back-to-back transitions on dispatcher sockets.
async fn publish(state: &AppState, transition: &Transition) {
    state.hub.publish(&transition.event).await;
}

pub async fn auto_assign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AssignmentResponse>, AppError> {
    let core = state.core.write().await;
    let transition = core.auto_assign(JobId::from_uuid(id), Utc::now())?;
    publish(&state, &transition).await;
    drop(core);

    let assignment = transition
        .assignment
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("assignment missing on transition")))?;
    Ok(Json(AssignmentResponse::from_parts(
        &transition.job,
        assignment,
    )))
}

pub async fn assign(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AssignRequest>,
) -> Result<Json<AssignmentResponse>, AppError> {
    let core = state.core.write().await;
    let transition = core.assign(JobId::from_uuid(id), payload.technician_id, Utc::now())?;
    publish(&state, &transition).await;
    drop(core);

    let assignment = transition
        .assignment
        .as_ref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("assignment missing on transition")))?;
    Ok(Json(AssignmentResponse::from_parts(
        &transition.job,
        assignment,
    )))
}

pub async fn auto_assign_all(
    State(state): State<AppState>,
) -> Result<Json<BatchResponse>, AppError> {
    let core = state.core.write().await;
    let report = core.auto_assign_all(Utc::now())?;
    for event in &report.events {
        state.hub.publish(event).await;
    }
    drop(core);
    Ok(Json(BatchResponse::from(&report)))
}

pub async fn start(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<StartRequest>,
) -> Result<Json<JobResponse>, AppError> {
    let core = state.core.write().await;
    let transition = core.start(JobId::from_uuid(id), payload.technician_id, Utc::now())?;
    publish(&state, &transition).await;
    drop(core);
    Ok(Json(JobResponse::from_job(transition.job, &state.sla)))
}

pub async fn complete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    payload: Option<Json<CompleteRequest>>,
) -> Result<Json<JobResponse>, AppError> {
    let actual_hours = payload.and_then(|Json(p)| p.actual_hours);
    if let Some(hours) = actual_hours {
        if hours <= 0.0 || !hours.is_finite() {
            return Err(AppError::Dispatch(DispatchError::Validation(
                "actual_hours must be positive".to_string(),
            )));
        }
    }

    let core = state.core.write().await;
    let transition = core.complete(JobId::from_uuid(id), actual_hours, Utc::now())?;
    publish(&state, &transition).await;
    drop(core);
    Ok(Json(JobResponse::from_job(transition.job, &state.sla)))
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobResponse>, AppError> {
    let core = state.core.write().await;
    let transition = core.cancel(JobId::from_uuid(id), Utc::now())?;
    publish(&state, &transition).await;
    drop(core);
    Ok(Json(JobResponse::from_job(transition.job, &state.sla)))
}
