use crate::handlers::{customers, jobs, metrics, technicians, ws};
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(metrics::health))
        .route(
            "/customers",
            get(customers::list_customers).post(customers::create_customer),
        )
        .route("/customers/{id}", get(customers::get_customer))
        .route(
            "/technicians",
            get(technicians::list_technicians).post(technicians::create_technician),
        )
        .route("/technicians/{id}", get(technicians::get_technician))
        .route(
            "/technicians/{id}/location",
            put(technicians::update_location),
        )
        .route(
            "/technicians/{id}/performance",
            get(technicians::performance),
        )
        .route("/jobs", get(jobs::list_jobs).post(jobs::create_job))
        .route("/jobs/{id}", get(jobs::get_job))
        .route("/jobs/{id}/auto-assign", post(jobs::auto_assign))
        .route("/jobs/{id}/assign", post(jobs::assign))
        .route("/jobs/{id}/start", post(jobs::start))
        .route("/jobs/{id}/complete", post(jobs::complete))
        .route("/jobs/{id}/cancel", post(jobs::cancel))
        .route("/auto-assign-all", post(jobs::auto_assign_all))
        .route("/dashboard/stats", get(metrics::dashboard_stats))
        .route("/dashboard/sla-metrics", get(metrics::sla_metrics))
        .route("/ws/dispatcher", get(ws::dispatcher_ws))
        .route("/ws/tech/{tech_id}", get(ws::technician_ws))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
