use thiserror::Error;

use crate::config::TimeOfDay;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("missing setting `{0}`")]
    Missing(&'static str),
    #[error("`{field}` is not a valid time of day ({minutes} minutes)")]
    TimeOutOfRange { field: &'static str, minutes: u32 },
    #[error("control window {start}-{end} is empty")]
    EmptyWindow { start: TimeOfDay, end: TimeOfDay },
    #[error("gain `{0}` must be finite and non-negative")]
    InvalidGain(&'static str),
    #[error("target temperature {0} is not a finite value")]
    InvalidTarget(f32),
    #[error("malformed settings: {0}")]
    Malformed(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    #[error("thermocouple disconnected")]
    Disconnected,
    #[error("sensor bus error: {0}")]
    Bus(String),
    #[error("reading {0} °C is outside the plausible range")]
    OutOfRange(f32),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClockError {
    // RTC backup supply failed, the stored time is meaningless.
    #[error("real-time clock lost power")]
    PowerLost,
    #[error("clock read failed: {0}")]
    Unavailable(String),
}
