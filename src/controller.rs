//! Drives one estimator per vehicle from its power meter.

use crate::error::AppError;
use crate::estimator::SpeedEstimator;
use crate::meter::PowerMeter;
use crate::state::{AppState, VehicleStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant, SystemTime};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerEvent {
    SessionStarted,
    SessionStopped,
    TargetReached,
}

/// Maps charger on/off edges to estimator session boundaries and feeds it every reading
/// taken while charging.
pub struct ChargingController {
    estimator: Arc<SpeedEstimator>,
    meter: Box<dyn PowerMeter + Send>,
    charging: bool,
    target_reported: bool,
}

impl ChargingController {
    pub fn new(estimator: Arc<SpeedEstimator>, meter: Box<dyn PowerMeter + Send>) -> Self {
        Self {
            estimator,
            meter,
            charging: false,
            target_reported: false,
        }
    }

    pub fn estimator(&self) -> &Arc<SpeedEstimator> {
        &self.estimator
    }

    pub fn is_charging(&self) -> bool {
        self.charging
    }

    /// Reads the meter once. A failed read leaves the session untouched.
    pub fn run_cycle(&mut self) -> Result<Vec<ControllerEvent>, AppError> {
        let reading = self.meter.read_power()?;
        let mut events = Vec::new();

        if reading.charging && !self.charging {
            self.estimator.start_charging();
            self.charging = true;
            self.target_reported = false;
            info!(vehicle = %self.estimator.name(), "Charging session started");
            events.push(ControllerEvent::SessionStarted);
        }

        if reading.charging {
            self.estimator.update_power(reading.power_w);
            if !self.target_reported && self.estimator.is_target_reached() {
                self.target_reported = true;
                info!(
                    vehicle = %self.estimator.name(),
                    estimated_soc = self.estimator.estimated_soc(),
                    "Estimated target SoC reached"
                );
                events.push(ControllerEvent::TargetReached);
            }
        } else if self.charging {
            self.estimator.stop_charging();
            self.charging = false;
            info!(vehicle = %self.estimator.name(), "Charging session stopped");
            events.push(ControllerEvent::SessionStopped);
        }

        Ok(events)
    }

    pub fn snapshot(&self, updated_at: SystemTime) -> VehicleStatus {
        VehicleStatus {
            name: self.estimator.name().to_string(),
            status: self.estimator.status(),
            updated_at,
        }
    }
}

/// Polls every controller once and publishes fresh snapshots. Meter failures are logged per
/// vehicle; only a poisoned state lock aborts the cycle.
pub fn run_refresh_cycle(
    controllers: &mut [ChargingController],
    state: &Arc<RwLock<AppState>>,
    now: SystemTime,
) -> Result<(), AppError> {
    for controller in controllers.iter_mut() {
        if let Err(err) = controller.run_cycle() {
            warn!(
                vehicle = %controller.estimator().name(),
                error = %err,
                "Failed to read charging power"
            );
        }
    }

    let statuses = controllers.iter().map(|c| c.snapshot(now)).collect();
    let mut guard = state.write().map_err(|_| AppError::StateLock)?;
    guard.set_statuses(statuses)
}

pub fn spawn_refresh_thread(
    mut controllers: Vec<ChargingController>,
    state: Arc<RwLock<AppState>>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        if controllers.is_empty() {
            warn!("Refresh thread started with no vehicles configured");
        }

        while !stop.load(Ordering::Relaxed) {
            let cycle_start = Instant::now();

            if let Err(e) = run_refresh_cycle(&mut controllers, &state, SystemTime::now()) {
                warn!("Error running refresh cycle: {}", e);
            }

            sleep_with_stop(interval, &stop, cycle_start);
        }
    })
}

fn sleep_with_stop(duration: Duration, stop: &AtomicBool, start: Instant) {
    let elapsed = start.elapsed();
    if elapsed >= duration {
        return;
    }
    let remaining = duration - elapsed;
    let step = Duration::from_millis(100);
    let mut slept = Duration::ZERO;

    while slept < remaining {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        std::thread::sleep(step.min(remaining - slept));
        slept += step;
    }
}
