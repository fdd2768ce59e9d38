//! Synthetic charge curve for running the service without wallbox hardware.
//!
//! Power ramps up to `max_power_w`, holds until `taper_after_secs`, then declines linearly by
//! `taper_rate_w_per_min` until it drops below `cutoff_w`, where the charger reports the session
//! as finished for one read. The read after that starts the curve over.

use crate::error::AppError;
use crate::estimator::clock::{Clock, elapsed_between};
use crate::meter::{PowerMeter, PowerReading};
use serde::Deserialize;
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SimulatedMeterSettings {
    pub max_power_w: f64,
    pub ramp_secs: u64,
    pub taper_after_secs: u64,
    pub taper_rate_w_per_min: f64,
    pub cutoff_w: f64,
}

impl Default for SimulatedMeterSettings {
    fn default() -> Self {
        Self {
            max_power_w: 11_000.0,
            ramp_secs: 60,
            taper_after_secs: 30 * 60,
            taper_rate_w_per_min: 250.0,
            cutoff_w: 1_400.0,
        }
    }
}

impl SimulatedMeterSettings {
    /// Charger power `elapsed_secs` into the session, or `None` once the curve has ended.
    pub fn power_at(&self, elapsed_secs: f64) -> Option<f64> {
        let ramp = self.ramp_secs as f64;
        let taper_after = self.taper_after_secs as f64;

        let power = if elapsed_secs < ramp {
            self.max_power_w * elapsed_secs / ramp
        } else if elapsed_secs < taper_after {
            self.max_power_w
        } else {
            let minutes_tapering = (elapsed_secs - taper_after) / 60.0;
            self.max_power_w - self.taper_rate_w_per_min * minutes_tapering
        };

        if elapsed_secs >= ramp && power < self.cutoff_w {
            None
        } else {
            Some(power.max(0.0))
        }
    }
}

#[derive(Debug)]
pub struct SimulatedMeter {
    settings: SimulatedMeterSettings,
    clock: Arc<dyn Clock>,
    started: Option<SystemTime>,
}

impl SimulatedMeter {
    pub fn new(settings: SimulatedMeterSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            started: None,
        }
    }
}

impl PowerMeter for SimulatedMeter {
    fn read_power(&mut self) -> Result<PowerReading, AppError> {
        if !self.settings.max_power_w.is_finite() || self.settings.max_power_w <= 0.0 {
            return Err(AppError::Meter(format!(
                "simulated max power must be positive, got {}",
                self.settings.max_power_w
            )));
        }

        let now = self.clock.now();
        let started = *self.started.get_or_insert(now);
        let elapsed_secs = elapsed_between(now, started).as_secs_f64();

        match self.settings.power_at(elapsed_secs) {
            Some(power_w) => Ok(PowerReading::charging(power_w)),
            None => {
                // Curve finished; the next read plugs in a fresh session.
                self.started = None;
                Ok(PowerReading::idle())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimator::clock::MockClock;
    use std::time::Duration;

    fn settings() -> SimulatedMeterSettings {
        SimulatedMeterSettings {
            max_power_w: 10_000.0,
            ramp_secs: 100,
            taper_after_secs: 600,
            taper_rate_w_per_min: 1_000.0,
            cutoff_w: 2_000.0,
        }
    }

    #[test]
    fn curve_ramps_holds_and_tapers() {
        let settings = settings();

        assert_eq!(settings.power_at(50.0), Some(5_000.0));
        assert_eq!(settings.power_at(300.0), Some(10_000.0));
        assert_eq!(settings.power_at(720.0), Some(8_000.0));
        assert_eq!(settings.power_at(600.0 + 9.0 * 60.0), None);
    }

    #[test]
    fn meter_follows_clock() -> Result<(), AppError> {
        let clock = Arc::new(MockClock::new());
        let mut meter = SimulatedMeter::new(settings(), clock.clone());

        assert_eq!(meter.read_power()?, PowerReading::charging(0.0));

        clock.advance(Duration::from_secs(300));
        assert_eq!(meter.read_power()?, PowerReading::charging(10_000.0));

        clock.advance(Duration::from_secs(60 * 60));
        assert_eq!(meter.read_power()?, PowerReading::idle());
        Ok(())
    }

    #[test]
    fn finished_curve_restarts_on_next_read() -> Result<(), AppError> {
        let clock = Arc::new(MockClock::new());
        let mut meter = SimulatedMeter::new(settings(), clock.clone());

        meter.read_power()?;
        clock.advance(Duration::from_secs(60 * 60));
        assert_eq!(meter.read_power()?, PowerReading::idle());

        clock.advance(Duration::from_secs(5));
        assert_eq!(meter.read_power()?, PowerReading::charging(0.0));

        clock.advance(Duration::from_secs(300));
        assert_eq!(meter.read_power()?, PowerReading::charging(10_000.0));
        Ok(())
    }

    #[test]
    fn non_positive_max_power_is_an_error() {
        let clock = Arc::new(MockClock::new());
        let mut meter = SimulatedMeter::new(
            SimulatedMeterSettings {
                max_power_w: 0.0,
                ..settings()
            },
            clock,
        );

        assert!(matches!(meter.read_power(), Err(AppError::Meter(_))));
    }
}
