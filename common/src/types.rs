use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemperatureReading {
    Celsius(f32),
    Failed { consecutive: u32 },
}

impl TemperatureReading {
    pub fn celsius(self) -> Option<f32> {
        match self {
            Self::Celsius(value) => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Self::Celsius(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvenState {
    Idle,
    Armed,
    Heating,
    Satisfied,
    SensorFault,
    Alarm,
}

impl OvenState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Armed => "ARMED",
            Self::Heating => "HEATING",
            Self::Satisfied => "SATISFIED",
            Self::SensorFault => "SENSOR_FAULT",
            Self::Alarm => "ALARM",
        }
    }

    // The alarm blinks red/off in `ControlLoop`.
    pub fn indicator(self) -> IndicatorColor {
        match self {
            Self::Idle => IndicatorColor::Green,
            Self::Armed | Self::Satisfied => IndicatorColor::Amber,
            Self::Heating | Self::Alarm => IndicatorColor::Red,
            Self::SensorFault => IndicatorColor::Magenta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorColor {
    Off,
    Green,
    Amber,
    Red,
    Magenta,
}

impl IndicatorColor {
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Off => (0, 0, 0),
            Self::Green => (0, 255, 0),
            Self::Amber => (255, 160, 0),
            Self::Red => (255, 0, 0),
            Self::Magenta => (255, 0, 255),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OvenStatus {
    #[serde(rename = "ovenTemp")]
    pub oven_temp: Option<f32>,
    #[serde(rename = "airTemp")]
    pub air_temp: Option<f32>,
    #[serde(rename = "targetTemp")]
    pub target_temp: f32,
    #[serde(rename = "windowStart")]
    pub window_start: String,
    #[serde(rename = "windowEnd")]
    pub window_end: String,
    #[serde(rename = "windowActive")]
    pub window_active: bool,
    pub heating: bool,
    #[serde(rename = "heatingUntil")]
    pub heating_until: Option<String>,
    pub state: &'static str,
    #[serde(rename = "sensorValid")]
    pub sensor_valid: bool,
    #[serde(rename = "sensorFailures")]
    pub sensor_failures: u32,
    #[serde(rename = "lastSample")]
    pub last_sample: Option<String>,
    pub alarm: bool,
}
