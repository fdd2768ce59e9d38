use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use taper_soc::controller::{ChargingController, spawn_refresh_thread};
use taper_soc::estimator::SpeedEstimator;
use taper_soc::estimator::clock::{Clock, SystemClock};
use taper_soc::meter::simulated::SimulatedMeter;
use taper_soc::state::{AppState, VehicleInfo};
use taper_soc::{api, config};

fn init_tracing(level: tracing::Level) {
    let subscriber = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::load_default()?;
    init_tracing(config.log_level());
    tracing::info!(
        config_path = config::DEFAULT_CONFIG_PATH,
        app = %config.app.name,
        "taper-soc starting"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let controllers = build_controllers(&config, &clock)?;

    let mut app_state = AppState::new();
    app_state.set_vehicles(
        config
            .vehicles
            .iter()
            .map(|v| VehicleInfo {
                name: v.name.clone(),
                title: v.title().to_string(),
            })
            .collect(),
    )?;
    let state = Arc::new(RwLock::new(app_state));

    if controllers.is_empty() {
        tracing::warn!("No vehicles configured in [[vehicles]]");
    }

    let stop_flag = Arc::new(AtomicBool::new(false));
    let refresh_interval = config.refresh_interval();
    tracing::info!(
        interval_ms = refresh_interval.as_millis(),
        vehicles = controllers.len(),
        "Starting meter refresh thread"
    );
    let refresh_handle = spawn_refresh_thread(
        controllers,
        Arc::clone(&state),
        refresh_interval,
        Arc::clone(&stop_flag),
    );

    let app = api::router(Arc::clone(&state));
    let port = config.server_port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server listening");
    axum::serve(listener, app).await?;

    stop_flag.store(true, Ordering::Relaxed);
    if refresh_handle.join().is_err() {
        tracing::warn!("Refresh thread panicked");
    }

    Ok(())
}

/// One estimator, simulated meter and controller per configured vehicle.
fn build_controllers(
    config: &config::Config,
    clock: &Arc<dyn Clock>,
) -> Result<Vec<ChargingController>, config::ConfigError> {
    let mut controllers = Vec::with_capacity(config.vehicles.len());
    for vehicle in &config.vehicles {
        let estimator_config = vehicle.estimator_config()?;
        tracing::info!(
            vehicle = %vehicle.name,
            enabled = estimator_config.enabled,
            target_soc = estimator_config.target_soc,
            "Configured speed estimator"
        );
        let estimator = Arc::new(SpeedEstimator::with_clock(
            vehicle.name.clone(),
            estimator_config,
            Arc::clone(clock),
        ));
        let meter = SimulatedMeter::new(vehicle.meter.clone(), Arc::clone(clock));
        controllers.push(ChargingController::new(estimator, Box::new(meter)));
    }
    Ok(controllers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_a_controller_per_vehicle() -> Result<(), Box<dyn std::error::Error>> {
        let config = config::load_default()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let controllers = build_controllers(&config, &clock)?;

        assert_eq!(controllers.len(), config.vehicles.len());
        Ok(())
    }
}
