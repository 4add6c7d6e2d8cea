pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod pid;
pub mod ports;
pub mod types;
pub mod window;

pub use config::{
    ControlConfig, LoopConfig, PidGains, RuntimeConfig, SettingsFile, SimulationConfig, TimeOfDay,
};
pub use driver::{ControlLoop, TickReport};
pub use engine::{ControlState, EngineAction, OvenEngine};
pub use error::{ClockError, ConfigError, SensorError};
pub use pid::PidController;
pub use ports::{Actuator, Clock, TemperatureSensor};
pub use types::{IndicatorColor, OvenState, OvenStatus, TemperatureReading};
pub use window::{minute_of_day, ControlWindow};
