use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use dispatch_engine::sla::TechPerformance;
use dispatch_engine::{EntityStore, SlaAggregator};
use types::prelude::*;

use crate::error::AppError;
use crate::models::{skill_set, CreateTechnicianRequest, LocationRequest, TechnicianResponse};
use crate::state::AppState;

pub async fn list_technicians(
    State(state): State<AppState>,
) -> Result<Json<Vec<TechnicianResponse>>, AppError> {
    let core = state.core.read().await;
    let technicians = core.store().technicians()?;
    Ok(Json(technicians.into_iter().map(Into::into).collect()))
}

pub async fn get_technician(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TechnicianResponse>, AppError> {
    let core = state.core.read().await;
    let tech = core.store().technician(TechnicianId::from_uuid(id))?;
    Ok(Json(tech.record.into()))
}

pub async fn create_technician(
    State(state): State<AppState>,
    Json(payload): Json<CreateTechnicianRequest>,
) -> Result<(StatusCode, Json<TechnicianResponse>), AppError> {
    if payload.shift_start >= payload.shift_end || payload.shift_end > 24 {
        return Err(AppError::Dispatch(DispatchError::Validation(format!(
            "invalid shift window {}..{}",
            payload.shift_start, payload.shift_end
        ))));
    }
    if payload.skills.is_empty() {
        return Err(AppError::Dispatch(DispatchError::Validation(
            "technician needs at least one skill".to_string(),
        )));
    }

    let mut tech = Technician::new(
        payload.name,
        skill_set(payload.skills),
        payload.shift_start,
        payload.shift_end,
    );
    tech.certifications = skill_set(payload.certifications);
    if let (Some(lat), Some(lon)) = (payload.lat, payload.lon) {
        let location = Location::new(lat, lon)
            .map_err(|e| AppError::Dispatch(DispatchError::Validation(e.to_string())))?;
        tech.location = Some(location);
    }

    let core = state.core.write().await;
    core.store().insert_technician(tech.clone())?;
    tracing::info!(technician_id = %tech.id, "technician created");
    Ok((StatusCode::CREATED, Json(tech.into())))
}

/// Position report over HTTP. The WebSocket path in `ws.rs` funnels into
/// the same core operation.
pub async fn update_location(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LocationRequest>,
) -> Result<StatusCode, AppError> {
    let location = Location::new(payload.lat, payload.lon)
        .map_err(|e| AppError::Dispatch(DispatchError::Validation(e.to_string())))?;

    // Published under the write lock so feed order matches commit order
    let core = state.core.write().await;
    let event = core.update_location(TechnicianId::from_uuid(id), location, Utc::now())?;
    state.hub.publish(&event).await;
    drop(core);

    Ok(StatusCode::NO_CONTENT)
}

pub async fn performance(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TechPerformance>, AppError> {
    let core = state.core.read().await;
    let aggregator = SlaAggregator::new(core.store(), state.sla.clone());
    let perf = aggregator.technician_performance(TechnicianId::from_uuid(id))?;
    Ok(Json(perf))
}
