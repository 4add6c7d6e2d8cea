use std::{
    sync::OnceLock,
    time::{Duration, Instant},
};

use chrono_tz::Tz;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use oven_common::{Actuator, Clock, ControlLoop, RuntimeConfig, TemperatureSensor};

use crate::{
    sim::{SimulatedOven, SimulatedRelay, SimulatedThermocouple, SystemClock},
    store::SettingsStore,
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = SettingsStore::from_env();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let control = store.load_or_init_control_config().await;
    info!(
        target_c = control.target_temperature_c,
        window_start = %control.window_start,
        window_end = %control.window_end,
        "settings loaded"
    );

    let tz = parse_timezone(&runtime.timezone);
    let oven = SimulatedOven::shared(&runtime.simulation);
    let mut control_loop = ControlLoop::new(
        SystemClock::new(tz, oven.clone()),
        SimulatedThermocouple::new(oven.clone()),
        SimulatedRelay::new(oven),
        control,
        runtime.control_loop.clone(),
    );
    control_loop.start();

    let mut poll =
        tokio::time::interval(Duration::from_millis(runtime.control_loop.poll_interval_ms));
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status = tokio::time::interval(Duration::from_millis(
        runtime.control_loop.status_interval_ms,
    ));
    status.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(timezone = %tz, "oven controller running");
    loop {
        tokio::select! {
            _ = poll.tick() => {
                let report = control_loop.tick(monotonic_ms());
                if report.daily_reset {
                    reload_settings(&store, &mut control_loop).await;
                }
            }
            _ = status.tick() => {
                match serde_json::to_string(&control_loop.status()) {
                    Ok(body) => info!(status = %body, "oven status"),
                    Err(err) => warn!("status serialization failed: {err}"),
                }
            }
            result = &mut shutdown => {
                if let Err(err) = result {
                    warn!("failed to listen for shutdown signal: {err}");
                }
                break;
            }
        }
    }

    control_loop.shutdown();
    Ok(())
}

async fn reload_settings<C, S, A>(store: &SettingsStore, control_loop: &mut ControlLoop<C, S, A>)
where
    C: Clock,
    S: TemperatureSensor,
    A: Actuator,
{
    match store.load_control_config().await {
        Ok(Some(config)) => {
            if &config != control_loop.engine().config() {
                control_loop.apply_config(config);
            }
        }
        Ok(None) => warn!("settings file missing at daily reset, keeping current settings"),
        Err(err) => warn!("keeping current settings: {err:#}"),
    }
}

fn parse_timezone(name: &str) -> Tz {
    name.parse().unwrap_or_else(|err| {
        warn!("unknown timezone {name:?} ({err}), using UTC");
        Tz::UTC
    })
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}
