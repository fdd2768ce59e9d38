use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("meter error: {0}")]
    Meter(String),
    #[error("unknown vehicle: {0}")]
    UnknownVehicle(String),
    #[error("duplicate vehicle: {0}")]
    DuplicateVehicle(String),
    #[error("state lock poisoned")]
    StateLock,
}
