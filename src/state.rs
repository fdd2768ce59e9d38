use crate::error::AppError;
use crate::estimator::EstimatorStatus;
use std::collections::HashSet;
use std::time::SystemTime;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleInfo {
    pub name: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleStatus {
    pub name: String,
    pub status: EstimatorStatus,
    pub updated_at: SystemTime,
}

#[derive(Debug)]
pub struct AppState {
    vehicles: Vec<VehicleInfo>,
    statuses: Vec<VehicleStatus>,
    statuses_tx: watch::Sender<Vec<VehicleStatus>>,
}

impl AppState {
    pub fn new() -> Self {
        let (statuses_tx, _statuses_rx) = watch::channel(Vec::new());
        Self {
            vehicles: Vec::new(),
            statuses: Vec::new(),
            statuses_tx,
        }
    }

    pub fn vehicles(&self) -> &[VehicleInfo] {
        &self.vehicles
    }

    pub fn vehicle(&self, name: &str) -> Option<&VehicleInfo> {
        self.vehicles.iter().find(|v| v.name == name)
    }

    pub fn set_vehicles(&mut self, vehicles: Vec<VehicleInfo>) -> Result<(), AppError> {
        let mut seen = HashSet::new();
        for vehicle in &vehicles {
            if !seen.insert(vehicle.name.as_str()) {
                return Err(AppError::DuplicateVehicle(vehicle.name.clone()));
            }
        }
        self.statuses.retain(|s| seen.contains(s.name.as_str()));
        self.vehicles = vehicles;
        Ok(())
    }

    pub fn statuses(&self) -> &[VehicleStatus] {
        &self.statuses
    }

    pub fn status(&self, name: &str) -> Option<&VehicleStatus> {
        self.statuses.iter().find(|s| s.name == name)
    }

    pub fn subscribe_statuses(&self) -> watch::Receiver<Vec<VehicleStatus>> {
        self.statuses_tx.subscribe()
    }

    /// Replaces the published snapshots. Every snapshot must belong to a registered vehicle.
    pub fn set_statuses(&mut self, statuses: Vec<VehicleStatus>) -> Result<(), AppError> {
        if let Some(unknown) = statuses.iter().find(|s| self.vehicle(&s.name).is_none()) {
            return Err(AppError::UnknownVehicle(unknown.name.clone()));
        }
        self.statuses = statuses.clone();
        self.statuses_tx.send_replace(statuses);
        Ok(())
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
