use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use dispatch_engine::EntityStore;
use types::prelude::*;

use crate::error::AppError;
use crate::models::{CreateCustomerRequest, CustomerResponse};
use crate::state::AppState;

pub async fn list_customers(
    State(state): State<AppState>,
) -> Result<Json<Vec<CustomerResponse>>, AppError> {
    let core = state.core.read().await;
    let customers = core.store().customers()?;
    Ok(Json(customers.into_iter().map(Into::into).collect()))
}

pub async fn get_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CustomerResponse>, AppError> {
    let core = state.core.read().await;
    let customer = core.store().customer(CustomerId::from_uuid(id))?;
    Ok(Json(customer.into()))
}

pub async fn create_customer(
    State(state): State<AppState>,
    Json(payload): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerResponse>), AppError> {
    let location = Location::new(payload.lat, payload.lon)
        .map_err(|e| AppError::Dispatch(DispatchError::Validation(e.to_string())))?;

    let mut customer = Customer::new(payload.name, payload.phone, payload.address, location);
    customer.email = payload.email;

    let core = state.core.write().await;
    core.store().insert_customer(customer.clone())?;
    tracing::info!(customer_id = %customer.id, "customer created");
    Ok((StatusCode::CREATED, Json(customer.into())))
}
