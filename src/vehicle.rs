//! Per-vehicle configuration blocks as they appear in `config.toml`.

use crate::config::ConfigError;
use crate::estimator::config::ChargingSpeedConfig;
use crate::meter::simulated::SimulatedMeterSettings;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct VehicleConfig {
    /// Unique identifier, used in API paths.
    pub name: String,
    pub title: Option<String>,
    #[serde(default)]
    pub charging_speed_limit: ChargingSpeedLimit,
    #[serde(default)]
    pub meter: SimulatedMeterSettings,
}

impl VehicleConfig {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.name)
    }

    pub fn estimator_config(&self) -> Result<ChargingSpeedConfig, ConfigError> {
        ChargingSpeedConfig::try_from(&self.charging_speed_limit)
    }
}

/// Override block for the speed estimator. Durations are strings such as `"10m"` or `"30s"`;
/// anything left out keeps the estimator default.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChargingSpeedLimit {
    #[serde(default)]
    pub enabled: bool,
    pub target_soc: Option<u8>,
    pub max_power_window: Option<String>,
    pub reduction_threshold: Option<f64>,
    pub min_charging_time: Option<String>,
    pub sample_interval: Option<String>,
    pub history_retention: Option<String>,
    pub stability_window: Option<String>,
    pub min_power_for_estimation: Option<f64>,
}

impl TryFrom<&ChargingSpeedLimit> for ChargingSpeedConfig {
    type Error = ConfigError;

    fn try_from(limit: &ChargingSpeedLimit) -> Result<Self, Self::Error> {
        let defaults = ChargingSpeedConfig::default();

        let target_soc = limit.target_soc.unwrap_or(defaults.target_soc);
        if target_soc > 100 {
            return Err(ConfigError::Invalid(format!(
                "target_soc must be within 0..=100, got {target_soc}"
            )));
        }

        let reduction_threshold = limit
            .reduction_threshold
            .unwrap_or(defaults.reduction_threshold);
        if !(reduction_threshold > 0.0 && reduction_threshold <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "reduction_threshold must be within (0, 1], got {reduction_threshold}"
            )));
        }

        let min_power_for_estimation = limit
            .min_power_for_estimation
            .unwrap_or(defaults.min_power_for_estimation);
        if !min_power_for_estimation.is_finite() || min_power_for_estimation < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "min_power_for_estimation must be a non-negative wattage, got {min_power_for_estimation}"
            )));
        }

        let sample_interval = parse_duration_field(
            "sample_interval",
            limit.sample_interval.as_deref(),
            defaults.sample_interval,
        )?;
        if sample_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "sample_interval must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            enabled: limit.enabled,
            target_soc,
            max_power_window: parse_duration_field(
                "max_power_window",
                limit.max_power_window.as_deref(),
                defaults.max_power_window,
            )?,
            reduction_threshold,
            min_charging_time: parse_duration_field(
                "min_charging_time",
                limit.min_charging_time.as_deref(),
                defaults.min_charging_time,
            )?,
            sample_interval,
            history_retention: parse_duration_field(
                "history_retention",
                limit.history_retention.as_deref(),
                defaults.history_retention,
            )?,
            stability_window: parse_duration_field(
                "stability_window",
                limit.stability_window.as_deref(),
                defaults.stability_window,
            )?,
            min_power_for_estimation,
        })
    }
}

fn parse_duration_field(
    field: &'static str,
    value: Option<&str>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let value = match value.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return Ok(default),
    };
    humantime::parse_duration(value).map_err(|source| ConfigError::InvalidDuration {
        field,
        value: value.to_string(),
        source,
    })
}
