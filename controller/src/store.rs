use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use anyhow::Context;
use tokio::sync::Mutex;
use tracing::{info, warn};

use oven_common::{ControlConfig, RuntimeConfig};

#[derive(Clone)]
pub struct SettingsStore {
    settings_path: Arc<PathBuf>,
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl SettingsStore {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("OVEN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.oven"));
        Self::in_dir(data_dir)
    }

    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            settings_path: Arc::new(data_dir.join("settings.json")),
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn load_control_config(&self) -> anyhow::Result<Option<ControlConfig>> {
        let _guard = self.lock.lock().await;
        let path = self.settings_path.as_ref();
        match tokio::fs::read(path).await {
            Ok(raw) => {
                let config = ControlConfig::from_json(&raw)
                    .with_context(|| format!("invalid settings in {}", path.display()))?;
                Ok(Some(config))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    pub async fn save_control_config(&self, config: &ControlConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.settings_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = config.to_json_pretty()?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    pub async fn load_or_init_control_config(&self) -> ControlConfig {
        match self.load_control_config().await {
            Ok(Some(config)) => config,
            Ok(None) => {
                let config = ControlConfig::default();
                info!(
                    path = %self.settings_path.display(),
                    "no settings file, writing defaults"
                );
                if let Err(err) = self.save_control_config(&config).await {
                    warn!("failed to write default settings: {err:#}");
                }
                config
            }
            Err(err) => {
                warn!("falling back to default settings: {err:#}");
                ControlConfig::default()
            }
        }
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use oven_common::TimeOfDay;

    use super::*;

    #[tokio::test]
    async fn missing_settings_are_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path());

        let config = store.load_or_init_control_config().await;

        assert_eq!(config, ControlConfig::default());
        let written = std::fs::read(dir.path().join("settings.json")).unwrap();
        assert_eq!(ControlConfig::from_json(&written).unwrap(), config);
    }

    #[tokio::test]
    async fn corrupt_settings_fall_back_without_overwriting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let store = SettingsStore::in_dir(dir.path());

        assert!(store.load_control_config().await.is_err());
        assert_eq!(
            store.load_or_init_control_config().await,
            ControlConfig::default()
        );
        assert_eq!(std::fs::read(&path).unwrap(), b"{ not json");
    }

    #[tokio::test]
    async fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path().join("nested"));
        let config = ControlConfig {
            target_temperature_c: 62.5,
            window_start: TimeOfDay::from_hm(8, 15).unwrap(),
            window_end: TimeOfDay::from_hm(18, 45).unwrap(),
            reset_time: TimeOfDay::from_hm(2, 30),
            ..ControlConfig::default()
        };

        store.save_control_config(&config).await.unwrap();

        assert_eq!(store.load_control_config().await.unwrap(), Some(config));
    }

    #[tokio::test]
    async fn legacy_settings_file_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            br#"{"temperature(C)": 45, "start_hour": 9, "start_minute": 30, "end_hour": 16}"#,
        )
        .unwrap();
        let store = SettingsStore::in_dir(dir.path());

        let config = store.load_control_config().await.unwrap().unwrap();

        assert_eq!(config.target_temperature_c, 45.0);
        assert_eq!(config.window_start, TimeOfDay::from_hm(9, 30).unwrap());
        assert_eq!(config.window_end, TimeOfDay::from_hm(16, 0).unwrap());
    }

    #[tokio::test]
    async fn runtime_config_defaults_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::in_dir(dir.path());

        let runtime = store.load_runtime_config().await.unwrap();

        assert_eq!(runtime.timezone, "UTC");
        assert_eq!(runtime.control_loop.sensor_refresh_ms, 60_000);
    }
}
