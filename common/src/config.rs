use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, window::ControlWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MINUTES_PER_DAY: u16 = 24 * 60;

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes < u32::from(Self::MINUTES_PER_DAY)).then_some(Self(minutes as u16))
    }

    pub fn from_hm(hour: u32, minute: u32) -> Option<Self> {
        if hour >= 24 || minute >= 60 {
            return None;
        }
        Self::from_minutes(hour * 60 + minute)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.1,
            kd: 0.05,
        }
    }
}

impl PidGains {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("kP", self.kp), ("kI", self.ki), ("kD", self.kd)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidGain(name));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ControlConfig {
    pub target_temperature_c: f32,
    pub window_start: TimeOfDay,
    pub window_end: TimeOfDay,
    pub gains: PidGains,
    pub reset_time: Option<TimeOfDay>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            target_temperature_c: 50.0,
            window_start: TimeOfDay(11 * 60),
            window_end: TimeOfDay(17 * 60),
            gains: PidGains::default(),
            reset_time: None,
        }
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.target_temperature_c.is_finite() {
            return Err(ConfigError::InvalidTarget(self.target_temperature_c));
        }
        if self.window_start >= self.window_end {
            return Err(ConfigError::EmptyWindow {
                start: self.window_start,
                end: self.window_end,
            });
        }
        self.gains.validate()
    }

    pub fn window(&self) -> ControlWindow {
        ControlWindow::new(self.window_start, self.window_end)
    }

    pub fn from_json(raw: &[u8]) -> Result<Self, ConfigError> {
        let file: SettingsFile = serde_json::from_slice(raw)?;
        Self::try_from(file)
    }

    pub fn to_json_pretty(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(serde_json::to_vec_pretty(&SettingsFile::from(self))?)
    }
}

// Older firmware wrote `temperature(C)` and split hour/minute keys; both
// spellings are accepted on load, only the canonical keys are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(alias = "temperature(C)", skip_serializing_if = "Option::is_none")]
    pub control_temp: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_minute: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_minute: Option<u32>,
    #[serde(rename = "kP", skip_serializing_if = "Option::is_none")]
    pub kp: Option<f32>,
    #[serde(rename = "kI", skip_serializing_if = "Option::is_none")]
    pub ki: Option<f32>,
    #[serde(rename = "kD", skip_serializing_if = "Option::is_none")]
    pub kd: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time_hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_time_minute: Option<u32>,
}

impl TryFrom<SettingsFile> for ControlConfig {
    type Error = ConfigError;

    fn try_from(file: SettingsFile) -> Result<Self, Self::Error> {
        let target_temperature_c = file
            .control_temp
            .ok_or(ConfigError::Missing("control_temp"))?;
        let window_start = resolve_time(
            "start_time",
            file.start_time,
            file.start_hour,
            file.start_minute,
        )?;
        let window_end = resolve_time("end_time", file.end_time, file.end_hour, file.end_minute)?;

        let defaults = PidGains::default();
        let gains = PidGains {
            kp: file.kp.unwrap_or(defaults.kp),
            ki: file.ki.unwrap_or(defaults.ki),
            kd: file.kd.unwrap_or(defaults.kd),
        };

        // 00:00 is the "no reset" sentinel.
        let reset_time = match (
            file.reset_time_hour.unwrap_or(0),
            file.reset_time_minute.unwrap_or(0),
        ) {
            (0, 0) => None,
            (hour, minute) => Some(TimeOfDay::from_hm(hour, minute).ok_or(
                ConfigError::TimeOutOfRange {
                    field: "reset_time",
                    minutes: hour.saturating_mul(60).saturating_add(minute),
                },
            )?),
        };

        let config = Self {
            target_temperature_c,
            window_start,
            window_end,
            gains,
            reset_time,
        };
        config.validate()?;
        Ok(config)
    }
}

impl From<&ControlConfig> for SettingsFile {
    fn from(config: &ControlConfig) -> Self {
        let (reset_hour, reset_minute) = config
            .reset_time
            .map(|time| (u32::from(time.hour()), u32::from(time.minute())))
            .unwrap_or((0, 0));

        Self {
            control_temp: Some(config.target_temperature_c),
            start_time: Some(u32::from(config.window_start.minutes())),
            end_time: Some(u32::from(config.window_end.minutes())),
            kp: Some(config.gains.kp),
            ki: Some(config.gains.ki),
            kd: Some(config.gains.kd),
            reset_time_hour: Some(reset_hour),
            reset_time_minute: Some(reset_minute),
            ..Self::default()
        }
    }
}

fn resolve_time(
    field: &'static str,
    minutes: Option<u32>,
    hour: Option<u32>,
    minute: Option<u32>,
) -> Result<TimeOfDay, ConfigError> {
    match (minutes, hour) {
        (Some(total), _) => TimeOfDay::from_minutes(total).ok_or(ConfigError::TimeOutOfRange {
            field,
            minutes: total,
        }),
        (None, Some(hour)) => {
            let minute = minute.unwrap_or(0);
            TimeOfDay::from_hm(hour, minute).ok_or(ConfigError::TimeOutOfRange {
                field,
                minutes: hour.saturating_mul(60).saturating_add(minute),
            })
        }
        (None, None) => Err(ConfigError::Missing(field)),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopConfig {
    pub poll_interval_ms: u64,
    pub sensor_refresh_ms: u64,
    pub sensor_retry_ms: u64,
    pub sensor_read_attempts: u8,
    pub sensor_failure_limit: u32,
    pub clock_read_attempts: u8,
    pub alarm_blink_ms: u64,
    pub status_interval_ms: u64,
    pub min_valid_temp_c: f32,
    pub max_valid_temp_c: f32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            sensor_refresh_ms: 60_000,
            sensor_retry_ms: 5_000,
            sensor_read_attempts: 3,
            sensor_failure_limit: 3,
            clock_read_attempts: 3,
            alarm_blink_ms: 500,
            status_interval_ms: 10_000,
            min_valid_temp_c: -20.0,
            max_valid_temp_c: 1023.75,
        }
    }
}

impl LoopConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();

        self.poll_interval_ms = self.poll_interval_ms.clamp(1, 1_000);
        self.sensor_refresh_ms = self.sensor_refresh_ms.clamp(1_000, 600_000);
        self.sensor_retry_ms = self.sensor_retry_ms.clamp(100, self.sensor_refresh_ms);
        self.sensor_read_attempts = self.sensor_read_attempts.clamp(1, 10);
        self.sensor_failure_limit = self.sensor_failure_limit.max(1);
        self.clock_read_attempts = self.clock_read_attempts.clamp(1, 10);
        self.alarm_blink_ms = self.alarm_blink_ms.clamp(50, 5_000);
        self.status_interval_ms = self.status_interval_ms.max(1_000);

        if !self.min_valid_temp_c.is_finite()
            || !self.max_valid_temp_c.is_finite()
            || self.min_valid_temp_c >= self.max_valid_temp_c
        {
            self.min_valid_temp_c = defaults.min_valid_temp_c;
            self.max_valid_temp_c = defaults.max_valid_temp_c;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub ambient_c: f32,
    pub initial_c: f32,
    pub heater_power_w: f32,
    pub thermal_capacity_j_per_c: f32,
    pub heat_loss_w_per_c: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            ambient_c: 20.0,
            initial_c: 20.0,
            heater_power_w: 1_500.0,
            thermal_capacity_j_per_c: 15_000.0,
            heat_loss_w_per_c: 8.0,
        }
    }
}

impl SimulationConfig {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        for (value, fallback) in [
            (&mut self.ambient_c, defaults.ambient_c),
            (&mut self.initial_c, defaults.initial_c),
            (&mut self.heater_power_w, defaults.heater_power_w),
            (
                &mut self.thermal_capacity_j_per_c,
                defaults.thermal_capacity_j_per_c,
            ),
            (&mut self.heat_loss_w_per_c, defaults.heat_loss_w_per_c),
        ] {
            if !value.is_finite() {
                *value = fallback;
            }
        }

        self.heater_power_w = self.heater_power_w.max(0.0);
        self.thermal_capacity_j_per_c = self.thermal_capacity_j_per_c.max(1.0);
        self.heat_loss_w_per_c = self.heat_loss_w_per_c.max(0.01);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub control_loop: LoopConfig,
    pub timezone: String,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            control_loop: LoopConfig::default(),
            timezone: "UTC".to_string(),
            simulation: SimulationConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.control_loop.sanitize();
        self.simulation.sanitize();
        if self.timezone.trim().is_empty() {
            self.timezone = "UTC".to_string();
        }
    }
}
