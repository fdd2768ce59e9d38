use crate::api::responses::{
    ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse, SocSuccessResponse,
    VehicleSummary, VehiclesSuccessResponse,
};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success(T),
    Error {
        status: StatusCode,
        body: ErrorResponse,
    },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_health_response(state, SystemTime::now())
}

pub async fn get_vehicles(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_vehicles_response(state, SystemTime::now())
}

pub async fn get_vehicle_soc(
    State(state): State<Arc<RwLock<AppState>>>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    build_soc_response(state, &name, SystemTime::now())
}

/// Degraded until every configured vehicle has published at least one snapshot.
fn build_health_response(
    state: Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<HealthSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/health", "state lock poisoned while reading vehicles");
        }
    };

    let vehicle_count = guard.vehicles().len();
    let all_reporting = vehicle_count > 0
        && guard
            .vehicles()
            .iter()
            .all(|v| guard.status(&v.name).is_some());
    drop(guard);

    let status = if all_reporting {
        HealthStatus::Ok
    } else {
        HealthStatus::Degraded
    };

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success(HealthSuccessResponse {
            status,
            vehicle_count,
            timestamp,
        }),
        Err(_) => internal_error("/api/health", "timestamp formatting failure"),
    }
}

fn build_vehicles_response(
    state: Arc<RwLock<AppState>>,
    now: SystemTime,
) -> ApiResponse<VehiclesSuccessResponse> {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error("/api/vehicles", "state lock poisoned while reading vehicles");
        }
    };

    let vehicles: Vec<VehicleSummary> = guard
        .vehicles()
        .iter()
        .map(|vehicle| {
            let snapshot = guard.status(&vehicle.name);
            VehicleSummary {
                name: vehicle.name.clone(),
                title: vehicle.title.clone(),
                phase: snapshot.map(|s| s.status.phase),
                estimated_soc: snapshot.map(|s| s.status.estimated_soc),
                target_reached: snapshot.is_some_and(|s| s.status.target_reached),
            }
        })
        .collect();
    drop(guard);

    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success(VehiclesSuccessResponse {
            vehicles,
            timestamp,
        }),
        Err(_) => internal_error("/api/vehicles", "timestamp formatting failure"),
    }
}

fn build_soc_response(
    state: Arc<RwLock<AppState>>,
    name: &str,
    now: SystemTime,
) -> ApiResponse<SocSuccessResponse> {
    const ROUTE: &str = "/api/vehicles/{name}/soc";

    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return internal_error(ROUTE, "state lock poisoned while reading status");
        }
    };

    if guard.vehicle(name).is_none() {
        drop(guard);
        return error_response(
            StatusCode::NOT_FOUND,
            ErrorCode::UnknownVehicle,
            format!("Unknown vehicle: {name}"),
            now,
            ROUTE,
        );
    }

    let snapshot = guard.status(name).cloned();
    drop(guard);

    let Some(snapshot) = snapshot else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::NoData,
            "No SoC estimate available yet".to_string(),
            now,
            ROUTE,
        );
    };

    match (format_timestamp(snapshot.updated_at), format_timestamp(now)) {
        (Ok(updated_at), Ok(timestamp)) => ApiResponse::Success(SocSuccessResponse {
            vehicle: snapshot.name,
            status: snapshot.status,
            updated_at,
            timestamp,
        }),
        _ => internal_error(ROUTE, "timestamp formatting failure"),
    }
}

fn error_response<T>(
    status: StatusCode,
    error_code: ErrorCode,
    error_message: String,
    now: SystemTime,
    route: &str,
) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status,
            body: ErrorResponse {
                error_code,
                error_message,
                timestamp,
            },
        },
        Err(_) => internal_error(route, "timestamp formatting failure"),
    }
}

fn internal_error<T>(route: &str, message: &str) -> ApiResponse<T> {
    error!(route = route, message = message, "Internal error while handling request");
    let formatted = format_timestamp(SystemTime::now()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: SystemTime) -> Result<String, TimestampError> {
    let datetime = OffsetDateTime::from(timestamp);
    datetime.format(&Rfc3339).map_err(TimestampError::Format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::{EstimatorStatus, SessionPhase};
    use crate::state::{VehicleInfo, VehicleStatus};
    use std::time::{Duration, UNIX_EPOCH};

    fn vehicle(name: &str) -> VehicleInfo {
        VehicleInfo {
            name: name.to_string(),
            title: format!("{name} title"),
        }
    }

    fn snapshot(name: &str) -> VehicleStatus {
        VehicleStatus {
            name: name.to_string(),
            status: EstimatorStatus {
                enabled: true,
                phase: SessionPhase::Estimating,
                estimation_active: true,
                estimated_soc: 76.0,
                target_soc: 80,
                target_reached: false,
                max_power: 11_000.0,
                measurement_count: 40,
                charging_duration: "35m".to_string(),
            },
            updated_at: UNIX_EPOCH + Duration::from_secs(3),
        }
    }

    fn state_with(
        vehicles: Vec<VehicleInfo>,
        statuses: Vec<VehicleStatus>,
    ) -> Arc<RwLock<AppState>> {
        let mut app_state = AppState::new();
        app_state.set_vehicles(vehicles).expect("set vehicles");
        app_state.set_statuses(statuses).expect("set statuses");
        Arc::new(RwLock::new(app_state))
    }

    fn poisoned_state() -> Arc<RwLock<AppState>> {
        let state = Arc::new(RwLock::new(AppState::new()));
        let state_for_thread = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = state_for_thread.write().expect("lock for poison");
            panic!("poison lock");
        })
        .join();
        state
    }

    #[test]
    fn soc_handler_returns_snapshot() {
        let state = state_with(vec![vehicle("ev")], vec![snapshot("ev")]);

        let response = build_soc_response(state, "ev", UNIX_EPOCH + Duration::from_secs(5));

        match response {
            ApiResponse::Success(body) => {
                assert_eq!(body.vehicle, "ev");
                assert_eq!(body.status.estimated_soc, 76.0);
                assert_eq!(body.status.phase, SessionPhase::Estimating);
                assert_eq!(body.updated_at, "1970-01-01T00:00:03Z");
                assert_eq!(body.timestamp, "1970-01-01T00:00:05Z");
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn soc_handler_returns_not_found_for_unknown_vehicle() {
        let state = state_with(vec![vehicle("ev")], vec![]);

        let response = build_soc_response(state, "truck", UNIX_EPOCH);

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::NOT_FOUND);
                assert_eq!(body.error_code, ErrorCode::UnknownVehicle);
                assert_eq!(body.error_message, "Unknown vehicle: truck");
            }
            ApiResponse::Success(_) => panic!("expected not found response"),
        }
    }

    #[test]
    fn soc_handler_returns_no_data_before_first_snapshot() {
        let state = state_with(vec![vehicle("ev")], vec![]);

        let response = build_soc_response(state, "ev", UNIX_EPOCH + Duration::from_secs(1));

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.error_code, ErrorCode::NoData);
                assert_eq!(body.timestamp, "1970-01-01T00:00:01Z");
            }
            ApiResponse::Success(_) => panic!("expected no data response"),
        }
    }

    #[test]
    fn soc_handler_returns_internal_error_when_lock_poisoned() {
        let response = build_soc_response(poisoned_state(), "ev", UNIX_EPOCH);

        match response {
            ApiResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, ErrorCode::InternalError);
                assert_eq!(body.error_message, "Internal server error");
            }
            ApiResponse::Success(_) => panic!("expected internal error response"),
        }
    }

    #[test]
    fn vehicles_handler_lists_vehicles_with_snapshots() {
        let state = state_with(vec![vehicle("a"), vehicle("b")], vec![snapshot("b")]);

        let response = build_vehicles_response(state, UNIX_EPOCH + Duration::from_secs(7));

        match response {
            ApiResponse::Success(body) => {
                assert_eq!(body.vehicles.len(), 2);
                assert_eq!(body.vehicles[0].name, "a");
                assert_eq!(body.vehicles[0].phase, None);
                assert_eq!(body.vehicles[0].estimated_soc, None);
                assert_eq!(body.vehicles[1].title, "b title");
                assert_eq!(body.vehicles[1].phase, Some(SessionPhase::Estimating));
                assert_eq!(body.vehicles[1].estimated_soc, Some(76.0));
                assert_eq!(body.timestamp, "1970-01-01T00:00:07Z");
            }
            ApiResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_is_degraded_until_all_vehicles_report() {
        let partial = state_with(vec![vehicle("a"), vehicle("b")], vec![snapshot("a")]);
        let complete = state_with(vec![vehicle("a")], vec![snapshot("a")]);

        match build_health_response(partial, UNIX_EPOCH) {
            ApiResponse::Success(body) => {
                assert_eq!(body.status, HealthStatus::Degraded);
                assert_eq!(body.vehicle_count, 2);
            }
            ApiResponse::Error { status, .. } => panic!("unexpected error: {status}"),
        }
        match build_health_response(complete, UNIX_EPOCH + Duration::from_secs(6)) {
            ApiResponse::Success(body) => {
                assert_eq!(body.status, HealthStatus::Ok);
                assert_eq!(body.timestamp, "1970-01-01T00:00:06Z");
            }
            ApiResponse::Error { status, .. } => panic!("unexpected error: {status}"),
        }
    }

    #[test]
    fn health_is_degraded_without_vehicles() {
        match build_health_response(Arc::new(RwLock::new(AppState::new())), UNIX_EPOCH) {
            ApiResponse::Success(body) => assert_eq!(body.status, HealthStatus::Degraded),
            ApiResponse::Error { status, .. } => panic!("unexpected error: {status}"),
        }
    }
}
