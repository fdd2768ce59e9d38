use crate::estimator::{EstimatorStatus, SessionPhase};
use serde::Serialize;

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub vehicle_count: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct VehiclesSuccessResponse {
    pub vehicles: Vec<VehicleSummary>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct VehicleSummary {
    pub name: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<SessionPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_soc: Option<f64>,
    pub target_reached: bool,
}

/// The estimator snapshot is nested verbatim so its keys match the estimator's own status map.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SocSuccessResponse {
    pub vehicle: String,
    pub status: EstimatorStatus,
    pub updated_at: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UnknownVehicle,
    NoData,
    InternalError,
}
