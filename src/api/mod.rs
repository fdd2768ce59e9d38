use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<RwLock<AppState>>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::get_health))
        .route("/api/vehicles", get(handlers::get_vehicles))
        .route("/api/vehicles/{name}/soc", get(handlers::get_vehicle_soc))
        .with_state(state)
}
