use std::{cell::RefCell, rc::Rc, time::Instant};

use chrono::{NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use oven_common::{
    Actuator, Clock, ClockError, IndicatorColor, SensorError, SimulationConfig, TemperatureSensor,
};

const THERMOCOUPLE_STEP_C: f32 = 0.25;

#[derive(Debug, Clone)]
pub struct ThermalModel {
    temperature_c: f32,
    ambient_c: f32,
    thermal_capacity_j_per_c: f32,
    heater_power_w: f32,
    heat_loss_w_per_c: f32,
    heater_on: bool,
}

impl ThermalModel {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            temperature_c: config.initial_c,
            ambient_c: config.ambient_c,
            thermal_capacity_j_per_c: config.thermal_capacity_j_per_c,
            heater_power_w: config.heater_power_w,
            heat_loss_w_per_c: config.heat_loss_w_per_c,
            heater_on: false,
        }
    }

    pub fn temperature_c(&self) -> f32 {
        self.temperature_c
    }

    pub fn ambient_c(&self) -> f32 {
        self.ambient_c
    }

    pub fn set_heater(&mut self, on: bool) {
        self.heater_on = on;
    }

    pub fn advance(&mut self, dt_s: f32) {
        let duty = if self.heater_on { 1.0 } else { 0.0 };
        let heat_added = self.heater_power_w * duty * dt_s;
        let heat_lost = self.heat_loss_w_per_c * (self.temperature_c - self.ambient_c) * dt_s;
        self.temperature_c += (heat_added - heat_lost) / self.thermal_capacity_j_per_c;
    }
}

pub struct SimulatedOven {
    model: ThermalModel,
    last_update: Instant,
}

impl SimulatedOven {
    pub fn shared(config: &SimulationConfig) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            model: ThermalModel::new(config),
            last_update: Instant::now(),
        }))
    }

    fn settle(&mut self) -> &mut ThermalModel {
        let now = Instant::now();
        let dt_s = now.duration_since(self.last_update).as_secs_f32();
        self.last_update = now;
        self.model.advance(dt_s);
        &mut self.model
    }
}

pub struct SystemClock {
    tz: Tz,
    oven: Rc<RefCell<SimulatedOven>>,
}

impl SystemClock {
    pub fn new(tz: Tz, oven: Rc<RefCell<SimulatedOven>>) -> Self {
        Self { tz, oven }
    }
}

impl Clock for SystemClock {
    fn now(&mut self) -> Result<NaiveDateTime, ClockError> {
        Ok(Utc::now().with_timezone(&self.tz).naive_local())
    }

    fn board_temperature_c(&mut self) -> Option<f32> {
        Some(self.oven.borrow().model.ambient_c())
    }
}

pub struct SimulatedThermocouple {
    oven: Rc<RefCell<SimulatedOven>>,
}

impl SimulatedThermocouple {
    pub fn new(oven: Rc<RefCell<SimulatedOven>>) -> Self {
        Self { oven }
    }
}

impl TemperatureSensor for SimulatedThermocouple {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        let mut oven = self.oven.borrow_mut();
        Ok(quantize(oven.settle().temperature_c()))
    }
}

pub struct SimulatedRelay {
    oven: Rc<RefCell<SimulatedOven>>,
    energized: bool,
    indicator: IndicatorColor,
}

impl SimulatedRelay {
    pub fn new(oven: Rc<RefCell<SimulatedOven>>) -> Self {
        Self {
            oven,
            energized: false,
            indicator: IndicatorColor::Off,
        }
    }
}

impl Actuator for SimulatedRelay {
    fn set_energized(&mut self, on: bool) {
        self.oven.borrow_mut().settle().set_heater(on);
        if self.energized != on {
            info!(on, "relay");
            self.energized = on;
        }
    }

    fn set_indicator(&mut self, color: IndicatorColor) {
        if self.indicator != color {
            debug!(?color, rgb = ?color.rgb(), "indicator");
            self.indicator = color;
        }
    }
}

fn quantize(temp_c: f32) -> f32 {
    (temp_c / THERMOCOUPLE_STEP_C).round() * THERMOCOUPLE_STEP_C
}
