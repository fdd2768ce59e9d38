use crate::error::AppError;

pub mod mock;
pub mod simulated;

/// One instantaneous reading from a wallbox or vehicle power meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReading {
    pub power_w: f64,
    /// Whether the charger reports an active charging session.
    pub charging: bool,
}

impl PowerReading {
    pub fn charging(power_w: f64) -> Self {
        Self {
            power_w,
            charging: true,
        }
    }

    pub fn idle() -> Self {
        Self {
            power_w: 0.0,
            charging: false,
        }
    }
}

pub trait PowerMeter {
    fn read_power(&mut self) -> Result<PowerReading, AppError>;
}
