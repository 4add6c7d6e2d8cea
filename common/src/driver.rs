use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::{
    config::{ControlConfig, LoopConfig},
    engine::{EngineAction, OvenEngine},
    error::{ClockError, SensorError},
    ports::{Actuator, Clock, TemperatureSensor},
    types::{IndicatorColor, OvenState, OvenStatus, TemperatureReading},
    window::minute_of_day,
};

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub now: Option<NaiveDateTime>,
    pub sampled: bool,
    pub daily_reset: bool,
    pub heating: bool,
    pub state: OvenState,
}

pub struct ControlLoop<C, S, A> {
    clock: C,
    sensor: S,
    actuator: A,
    engine: OvenEngine,
    config: LoopConfig,
    air_temp_c: Option<f32>,
    last_sample_attempt: Option<NaiveDateTime>,
    consecutive_failures: u32,
    last_reset_date: Option<NaiveDate>,
    clock_faulted: bool,
    blink_color: Option<IndicatorColor>,
}

impl<C, S, A> ControlLoop<C, S, A>
where
    C: Clock,
    S: TemperatureSensor,
    A: Actuator,
{
    pub fn new(clock: C, sensor: S, actuator: A, control: ControlConfig, config: LoopConfig) -> Self {
        let engine = OvenEngine::new(control, config.sensor_failure_limit);
        Self {
            clock,
            sensor,
            actuator,
            engine,
            config,
            air_temp_c: None,
            last_sample_attempt: None,
            consecutive_failures: 0,
            last_reset_date: None,
            clock_faulted: false,
            blink_color: None,
        }
    }

    pub fn engine(&self) -> &OvenEngine {
        &self.engine
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn sensor_mut(&mut self) -> &mut S {
        &mut self.sensor
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    pub fn start(&mut self) {
        self.actuator.set_energized(false);
        self.actuator.set_indicator(self.engine.indicator());
    }

    pub fn shutdown(&mut self) {
        info!("control loop stopping, relay off");
        self.actuator.set_energized(false);
        self.actuator.set_indicator(IndicatorColor::Off);
    }

    pub fn apply_config(&mut self, control: ControlConfig) {
        info!(
            target_c = control.target_temperature_c,
            window_start = %control.window_start,
            window_end = %control.window_end,
            "applying control settings"
        );
        self.engine.apply_config(control);
    }

    pub fn status(&self) -> OvenStatus {
        self.engine.status(self.air_temp_c)
    }

    pub fn tick(&mut self, uptime_ms: u64) -> TickReport {
        if self.engine.is_alarmed() {
            self.blink(uptime_ms);
            return self.report(None, false, false);
        }

        let now = match self.read_clock() {
            Ok(now) => {
                if self.clock_faulted {
                    info!("clock readable again");
                    self.clock_faulted = false;
                }
                now
            }
            Err(ClockError::PowerLost) => {
                let actions = self.engine.enter_alarm();
                self.apply(actions);
                self.actuator.set_energized(false);
                self.blink(uptime_ms);
                return self.report(None, false, false);
            }
            Err(err) => {
                if !self.clock_faulted {
                    warn!(%err, "clock unavailable, skipping control decisions");
                    self.clock_faulted = true;
                }
                let actions = self.engine.force_off("clock unavailable");
                self.apply(actions);
                return self.report(None, false, false);
            }
        };

        let daily_reset = self.check_daily_reset(now);

        let sampled = self.sample_due(now);
        if sampled {
            self.refresh_sensor(now);
        }

        let actions = self.engine.tick(now);
        self.apply(actions);

        self.report(Some(now), sampled, daily_reset)
    }

    fn read_clock(&mut self) -> Result<NaiveDateTime, ClockError> {
        let mut last_err = ClockError::Unavailable("no read attempted".to_string());
        for attempt in 1..=self.config.clock_read_attempts.max(1) {
            match self.clock.now() {
                Ok(now) => return Ok(now),
                Err(ClockError::PowerLost) => return Err(ClockError::PowerLost),
                Err(err) => {
                    debug!(attempt, %err, "clock read failed");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn check_daily_reset(&mut self, now: NaiveDateTime) -> bool {
        let Some(reset_time) = self.engine.config().reset_time else {
            return false;
        };
        if minute_of_day(now) != reset_time.minutes() {
            return false;
        }

        let today = now.date();
        if self.last_reset_date == Some(today) {
            return false;
        }
        self.last_reset_date = Some(today);

        info!(at = %now, "daily reset");
        let actions = self.engine.reset();
        self.apply(actions);
        // Start the new day from a fresh reading.
        self.last_sample_attempt = None;
        true
    }

    fn sample_due(&self, now: NaiveDateTime) -> bool {
        let Some(last) = self.last_sample_attempt else {
            return true;
        };
        if now < last {
            return true;
        }

        let interval_ms = if self.consecutive_failures == 0 {
            self.config.sensor_refresh_ms
        } else {
            self.config.sensor_retry_ms
        };
        (now - last).num_milliseconds() >= i64::try_from(interval_ms).unwrap_or(i64::MAX)
    }

    fn refresh_sensor(&mut self, now: NaiveDateTime) {
        self.last_sample_attempt = Some(now);
        self.air_temp_c = self.clock.board_temperature_c();

        let reading = match self.read_thermocouple() {
            Ok(temp_c) => {
                if self.consecutive_failures > 0 {
                    info!(
                        failures = self.consecutive_failures,
                        temp_c, "thermocouple recovered"
                    );
                }
                self.consecutive_failures = 0;
                TemperatureReading::Celsius(temp_c)
            }
            Err(err) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                warn!(
                    %err,
                    consecutive = self.consecutive_failures,
                    "thermocouple read failed"
                );
                TemperatureReading::Failed {
                    consecutive: self.consecutive_failures,
                }
            }
        };

        self.engine.record_sample(reading, now);
    }

    fn read_thermocouple(&mut self) -> Result<f32, SensorError> {
        let mut last_err = SensorError::Bus("no read attempted".to_string());
        for attempt in 1..=self.config.sensor_read_attempts.max(1) {
            let result = match self.sensor.read_celsius() {
                Ok(value) => self.check_plausible(value),
                Err(err) => Err(err),
            };
            match result {
                Ok(value) => return Ok(value),
                Err(err) => {
                    debug!(attempt, %err, "thermocouple attempt failed");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    fn check_plausible(&self, value: f32) -> Result<f32, SensorError> {
        if value.is_finite()
            && (self.config.min_valid_temp_c..=self.config.max_valid_temp_c).contains(&value)
        {
            Ok(value)
        } else {
            Err(SensorError::OutOfRange(value))
        }
    }

    fn blink(&mut self, uptime_ms: u64) {
        let lit = (uptime_ms / self.config.alarm_blink_ms.max(1)) % 2 == 0;
        let color = if lit {
            IndicatorColor::Red
        } else {
            IndicatorColor::Off
        };
        if self.blink_color != Some(color) {
            self.actuator.set_indicator(color);
            self.blink_color = Some(color);
        }
    }

    fn apply(&mut self, actions: Vec<EngineAction>) {
        for action in actions {
            match action {
                EngineAction::RelayOn => self.actuator.set_energized(true),
                EngineAction::RelayOff => self.actuator.set_energized(false),
                EngineAction::Indicator(color) => self.actuator.set_indicator(color),
            }
        }
    }

    fn report(&self, now: Option<NaiveDateTime>, sampled: bool, daily_reset: bool) -> TickReport {
        TickReport {
            now,
            sampled,
            daily_reset,
            heating: self.engine.is_heating(),
            state: self.engine.state(),
        }
    }
}
