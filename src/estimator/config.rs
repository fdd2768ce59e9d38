//! Tuning parameters for charging-speed based SoC estimation.

use std::time::Duration;

pub const DEFAULT_TARGET_SOC: u8 = 80;
pub const DEFAULT_MAX_POWER_WINDOW: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_REDUCTION_THRESHOLD: f64 = 0.15;
pub const DEFAULT_MIN_CHARGING_TIME: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HISTORY_RETENTION: Duration = Duration::from_secs(2 * 60 * 60);
pub const DEFAULT_STABILITY_WINDOW: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_MIN_POWER_FOR_ESTIMATION_W: f64 = 1000.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ChargingSpeedConfig {
    /// Master switch; a disabled estimator ignores every power sample.
    pub enabled: bool,
    /// SoC percentage the caller wants detected.
    pub target_soc: u8,
    /// How long after session start a new peak may still raise the tracked maximum.
    pub max_power_window: Duration,
    /// Fractional drop from max power that counts as tapering (0.15 = 15%).
    pub reduction_threshold: f64,
    /// Minimum session time before estimation may activate.
    pub min_charging_time: Duration,
    /// Minimum spacing between accepted samples.
    pub sample_interval: Duration,
    /// Samples older than this are discarded.
    pub history_retention: Duration,
    /// Trailing window in which every sample must sit below the reduction threshold.
    pub stability_window: Duration,
    /// Minimum observed peak (W) before estimation engages at all.
    pub min_power_for_estimation: f64,
}

impl Default for ChargingSpeedConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_soc: DEFAULT_TARGET_SOC,
            max_power_window: DEFAULT_MAX_POWER_WINDOW,
            reduction_threshold: DEFAULT_REDUCTION_THRESHOLD,
            min_charging_time: DEFAULT_MIN_CHARGING_TIME,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            history_retention: DEFAULT_HISTORY_RETENTION,
            stability_window: DEFAULT_STABILITY_WINDOW,
            min_power_for_estimation: DEFAULT_MIN_POWER_FOR_ESTIMATION_W,
        }
    }
}

impl ChargingSpeedConfig {
    /// Defaults with the master switch turned on.
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            ..Self::default()
        }
    }

    /// Power level every sample in the stability window must stay at or below.
    pub fn reduced_power_threshold(&self, max_power_w: f64) -> f64 {
        max_power_w * (1.0 - self.reduction_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ChargingSpeedConfig::default();

        assert!(!config.enabled);
        assert_eq!(config.target_soc, 80);
        assert_eq!(config.max_power_window, Duration::from_secs(600));
        assert_eq!(config.reduction_threshold, 0.15);
        assert_eq!(config.min_charging_time, Duration::from_secs(900));
        assert_eq!(config.sample_interval, Duration::from_secs(30));
        assert_eq!(config.history_retention, Duration::from_secs(7200));
        assert_eq!(config.stability_window, Duration::from_secs(300));
        assert_eq!(config.min_power_for_estimation, 1000.0);
    }

    #[test]
    fn reduced_threshold_scales_with_max_power() {
        let config = ChargingSpeedConfig::default();

        assert!((config.reduced_power_threshold(5000.0) - 4250.0).abs() < 1e-9);
    }
}
