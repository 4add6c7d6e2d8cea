use chrono::NaiveDateTime;

use crate::{
    error::{ClockError, SensorError},
    types::IndicatorColor,
};

pub trait Clock {
    fn now(&mut self) -> Result<NaiveDateTime, ClockError>;

    fn board_temperature_c(&mut self) -> Option<f32> {
        None
    }
}

pub trait TemperatureSensor {
    fn read_celsius(&mut self) -> Result<f32, SensorError>;
}

pub trait Actuator {
    fn set_energized(&mut self, on: bool);

    fn set_indicator(&mut self, color: IndicatorColor);
}
