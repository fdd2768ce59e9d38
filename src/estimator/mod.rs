//! Charging-speed based SoC estimation.
//!
//! Vehicles without a SoC API still show the charge-curve knee: once the battery nears full,
//! charge power tapers off. The estimator tracks the session's peak power, waits until power has
//! stayed clearly below that peak for a whole stability window, and then projects SoC linearly:
//!
//! `soc = clamp((target - 10) + 30 * (max - current) / max, 0, 100)`
//!
//! The 30-point taper band and 10-point offset are a vehicle-agnostic approximation.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

pub mod clock;
pub mod config;

use clock::{Clock, SystemClock, elapsed_between};
use config::ChargingSpeedConfig;

/// SoC points covered by the taper section of the charge curve.
pub const TAPER_SOC_BAND: f64 = 30.0;
/// How far below target the estimate starts when tapering is first detected.
pub const ESTIMATION_SOC_OFFSET: f64 = 10.0;
/// Samples required inside the stability window before a reduction is trusted.
pub const MIN_STABLE_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerMeasurement {
    pub timestamp: SystemTime,
    pub power_w: f64,
}

/// Where the current session stands. Phases only move forward until the next
/// `start_charging`/`stop_charging`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Idle,
    Charging,
    Estimating,
    TargetReached,
}

impl SessionPhase {
    pub fn is_charging(self) -> bool {
        !matches!(self, Self::Idle)
    }

    pub fn is_estimating(self) -> bool {
        matches!(self, Self::Estimating | Self::TargetReached)
    }

    pub fn is_target_reached(self) -> bool {
        matches!(self, Self::TargetReached)
    }
}

/// Snapshot for diagnostics and UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimatorStatus {
    pub enabled: bool,
    pub phase: SessionPhase,
    pub estimation_active: bool,
    pub estimated_soc: f64,
    pub target_soc: u8,
    pub target_reached: bool,
    pub max_power: f64,
    pub measurement_count: usize,
    pub charging_duration: String,
}

#[derive(Debug, Default)]
struct Session {
    phase: SessionPhase,
    charging_started: Option<SystemTime>,
    charging_stopped: Option<SystemTime>,
    history: VecDeque<PowerMeasurement>,
    max_power_w: f64,
    max_power_at: Option<SystemTime>,
    estimated_soc: f64,
    last_sample: Option<SystemTime>,
}

impl Session {
    fn started_at(&self, now: SystemTime) -> SystemTime {
        self.charging_started.unwrap_or(now)
    }
}

#[derive(Debug)]
pub struct SpeedEstimator {
    name: String,
    config: ChargingSpeedConfig,
    clock: Arc<dyn Clock>,
    session: RwLock<Session>,
}

impl SpeedEstimator {
    pub fn new(name: impl Into<String>, config: ChargingSpeedConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Builds an estimator on an explicit time source. A zero sample interval marks an unset
    /// configuration and is replaced by the full defaults.
    pub fn with_clock(
        name: impl Into<String>,
        config: ChargingSpeedConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let name = name.into();
        let config = if config.sample_interval.is_zero() {
            warn!(
                estimator = %name,
                "Sample interval unset, falling back to default estimator config"
            );
            ChargingSpeedConfig::default()
        } else {
            config
        };

        Self {
            name,
            config,
            clock,
            session: RwLock::new(Session::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ChargingSpeedConfig {
        &self.config
    }

    pub fn start_charging(&self) {
        let now = self.clock.now();
        let mut session = self.write();
        *session = Session {
            phase: SessionPhase::Charging,
            charging_started: Some(now),
            ..Session::default()
        };
        debug!(estimator = %self.name, "Charging session started");
    }

    /// Clears the estimation flags. History and peak power stay until the next session.
    pub fn stop_charging(&self) {
        let now = self.clock.now();
        let mut session = self.write();
        if session.phase.is_charging() {
            session.charging_stopped = Some(now);
        }
        session.phase = SessionPhase::Idle;
        debug!(estimator = %self.name, "Charging session stopped");
    }

    pub fn update_power(&self, power_w: f64) {
        if !self.config.enabled {
            return;
        }
        if !power_w.is_finite() {
            debug!(estimator = %self.name, power_w, "Ignoring non-finite power sample");
            return;
        }

        let now = self.clock.now();
        let mut session = self.write();

        if !session.phase.is_charging() {
            debug!(estimator = %self.name, power_w, "Ignoring sample outside a charging session");
            return;
        }

        if let Some(last) = session.last_sample
            && elapsed_between(now, last) < self.config.sample_interval
        {
            return;
        }
        session.last_sample = Some(now);
        session.history.push_back(PowerMeasurement {
            timestamp: now,
            power_w,
        });

        self.prune_history(&mut session, now);

        let since_start = elapsed_between(now, session.started_at(now));
        if power_w > session.max_power_w
            && (session.max_power_at.is_none() || since_start <= self.config.max_power_window)
        {
            session.max_power_w = power_w;
            session.max_power_at = Some(now);
            debug!(estimator = %self.name, max_power_w = power_w, "New max power");
        }

        if !session.phase.is_estimating() && self.can_start_estimation(&session, now, power_w) {
            session.phase = SessionPhase::Estimating;
            info!(
                estimator = %self.name,
                max_power_w = session.max_power_w,
                current_w = power_w,
                "Starting SoC estimation"
            );
        }

        if session.phase.is_estimating() {
            self.update_soc_estimation(&mut session, power_w);
        }
    }

    pub fn is_target_reached(&self) -> bool {
        self.read().phase.is_target_reached()
    }

    pub fn estimated_soc(&self) -> f64 {
        self.read().estimated_soc
    }

    pub fn is_estimation_active(&self) -> bool {
        self.read().phase.is_estimating()
    }

    pub fn phase(&self) -> SessionPhase {
        self.read().phase
    }

    pub fn max_power(&self) -> f64 {
        self.read().max_power_w
    }

    pub fn measurement_count(&self) -> usize {
        self.read().history.len()
    }

    pub fn history(&self) -> Vec<PowerMeasurement> {
        self.read().history.iter().copied().collect()
    }

    pub fn status(&self) -> EstimatorStatus {
        let now = self.clock.now();
        let session = self.read();
        let charging_duration = match session.charging_started {
            Some(started) => elapsed_between(session.charging_stopped.unwrap_or(now), started),
            None => Duration::ZERO,
        };

        EstimatorStatus {
            enabled: self.config.enabled,
            phase: session.phase,
            estimation_active: session.phase.is_estimating(),
            estimated_soc: session.estimated_soc,
            target_soc: self.config.target_soc,
            target_reached: session.phase.is_target_reached(),
            max_power: session.max_power_w,
            measurement_count: session.history.len(),
            charging_duration: format_charging_duration(charging_duration),
        }
    }

    fn can_start_estimation(&self, session: &Session, now: SystemTime, current_w: f64) -> bool {
        if elapsed_between(now, session.started_at(now)) < self.config.min_charging_time {
            return false;
        }

        let max_power_w = session.max_power_w;
        if max_power_w <= 0.0 || max_power_w < self.config.min_power_for_estimation {
            return false;
        }

        let power_reduction = (max_power_w - current_w) / max_power_w;
        if power_reduction < self.config.reduction_threshold {
            return false;
        }

        self.has_stable_power_reduction(session, now)
    }

    /// Every sample in the trailing stability window must sit at or below the reduced threshold.
    fn has_stable_power_reduction(&self, session: &Session, now: SystemTime) -> bool {
        let window = self.config.stability_window;
        let recent: Vec<&PowerMeasurement> = session
            .history
            .iter()
            .filter(|m| elapsed_between(now, m.timestamp) < window)
            .collect();

        if recent.len() < MIN_STABLE_SAMPLES {
            return false;
        }

        let threshold = self.config.reduced_power_threshold(session.max_power_w);
        recent.iter().all(|m| m.power_w <= threshold)
    }

    fn update_soc_estimation(&self, session: &mut Session, current_w: f64) {
        let max_power_w = session.max_power_w;
        if max_power_w <= 0.0 {
            return;
        }

        let target_soc = f64::from(self.config.target_soc);
        session.estimated_soc = project_soc(target_soc, max_power_w, current_w);

        if session.estimated_soc >= target_soc && !session.phase.is_target_reached() {
            session.phase = SessionPhase::TargetReached;
            info!(
                estimator = %self.name,
                target_soc = self.config.target_soc,
                estimated_soc = session.estimated_soc,
                "Target SoC reached"
            );
        }

        debug!(
            estimator = %self.name,
            power_w = current_w,
            percent_of_max = current_w / max_power_w * 100.0,
            estimated_soc = session.estimated_soc,
            "Updated SoC estimate"
        );
    }

    fn prune_history(&self, session: &mut Session, now: SystemTime) {
        let retention = self.config.history_retention;
        session
            .history
            .retain(|m| elapsed_between(now, m.timestamp) < retention);
    }

    fn read(&self) -> RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Linear projection of SoC from the fractional power drop below the session peak.
pub fn project_soc(target_soc: f64, max_power_w: f64, current_w: f64) -> f64 {
    let power_reduction = (max_power_w - current_w) / max_power_w;
    let base_soc = target_soc - ESTIMATION_SOC_OFFSET;
    (base_soc + power_reduction * TAPER_SOC_BAND).clamp(0.0, 100.0)
}

/// Human-readable elapsed time at one-second resolution, e.g. `1h 2m 5s`.
pub fn format_charging_duration(duration: Duration) -> String {
    humantime::format_duration(Duration::from_secs(duration.as_secs())).to_string()
}
