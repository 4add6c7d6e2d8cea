use chrono::{Duration, NaiveDateTime};
use tracing::{debug, error, info, warn};

use crate::{
    config::ControlConfig,
    pid::{PidController, OUTPUT_LIMITS},
    types::{IndicatorColor, OvenState, OvenStatus, TemperatureReading},
    window::minute_of_day,
};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineAction {
    RelayOn,
    RelayOff,
    Indicator(IndicatorColor),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlState {
    pub is_window_active: bool,
    pub is_heating: bool,
    pub heating_until: Option<NaiveDateTime>,
    pub last_reading: Option<TemperatureReading>,
    pub last_sample_time: Option<NaiveDateTime>,
}

impl ControlState {
    pub fn last_measured_temp(&self) -> Option<f32> {
        self.last_reading.and_then(TemperatureReading::celsius)
    }
}

#[derive(Debug, Clone)]
pub struct OvenEngine {
    config: ControlConfig,
    sensor_failure_limit: u32,
    state: ControlState,
    pid: PidController,
    phase: OvenState,
    indicator: IndicatorColor,
    alarm: bool,
}

impl OvenEngine {
    pub fn new(config: ControlConfig, sensor_failure_limit: u32) -> Self {
        let pid = PidController::new(config.gains, config.target_temperature_c);
        Self {
            config,
            sensor_failure_limit: sensor_failure_limit.max(1),
            state: ControlState::default(),
            pid,
            phase: OvenState::Idle,
            indicator: OvenState::Idle.indicator(),
            alarm: false,
        }
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn control_state(&self) -> &ControlState {
        &self.state
    }

    pub fn state(&self) -> OvenState {
        self.phase
    }

    pub fn indicator(&self) -> IndicatorColor {
        self.indicator
    }

    pub fn is_heating(&self) -> bool {
        self.state.is_heating
    }

    pub fn is_window_active(&self) -> bool {
        self.state.is_window_active
    }

    pub fn is_alarmed(&self) -> bool {
        self.alarm
    }

    pub fn apply_config(&mut self, config: ControlConfig) {
        self.pid.configure(config.gains, config.target_temperature_c);
        self.config = config;
    }

    pub fn record_sample(&mut self, reading: TemperatureReading, at: NaiveDateTime) {
        self.state.last_reading = Some(reading);
        self.state.last_sample_time = Some(at);
    }

    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        if self.alarm {
            return actions;
        }

        let minute = minute_of_day(now);
        if self
            .config
            .window()
            .should_close(self.state.is_window_active, minute)
        {
            info!(at = %now, "control window closed");
            self.close_window(&mut actions);
        }
        self.drop_stale_pulse(now);

        match self.state.last_reading {
            Some(TemperatureReading::Celsius(temp_c)) => {
                self.regulate(now, minute, temp_c, &mut actions)
            }
            Some(TemperatureReading::Failed { consecutive }) => {
                if consecutive >= self.sensor_failure_limit {
                    if self.state.is_heating {
                        warn!(consecutive, "no valid oven temperature, heating suppressed");
                    }
                    self.cancel_pulse(&mut actions);
                } else {
                    self.expire_pulse(now, &mut actions);
                }
                self.phase = OvenState::SensorFault;
            }
            None => {
                self.expire_pulse(now, &mut actions);
                self.phase = self.resting_phase();
            }
        }

        self.refresh_indicator(&mut actions);
        actions
    }

    pub fn enter_alarm(&mut self) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        if self.alarm {
            return actions;
        }

        error!("entering alarm state, heating disabled until restart");
        self.alarm = true;
        self.close_window(&mut actions);
        self.phase = OvenState::Alarm;
        self.refresh_indicator(&mut actions);
        actions
    }

    pub fn force_off(&mut self, reason: &str) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        if self.alarm {
            return actions;
        }

        if self.state.is_heating {
            warn!(reason, "heating forced off");
        }
        self.cancel_pulse(&mut actions);
        self.phase = self.resting_phase();
        self.refresh_indicator(&mut actions);
        actions
    }

    pub fn reset(&mut self) -> Vec<EngineAction> {
        let mut actions = Vec::new();
        if self.alarm {
            return actions;
        }

        self.close_window(&mut actions);
        self.phase = OvenState::Idle;
        self.refresh_indicator(&mut actions);
        actions
    }

    pub fn status(&self, air_temp_c: Option<f32>) -> OvenStatus {
        let (sensor_valid, sensor_failures) = match self.state.last_reading {
            Some(TemperatureReading::Celsius(_)) => (true, 0),
            Some(TemperatureReading::Failed { consecutive }) => (false, consecutive),
            None => (false, 0),
        };

        OvenStatus {
            oven_temp: self.state.last_measured_temp(),
            air_temp: air_temp_c,
            target_temp: self.config.target_temperature_c,
            window_start: self.config.window_start.to_string(),
            window_end: self.config.window_end.to_string(),
            window_active: self.state.is_window_active,
            heating: self.state.is_heating,
            heating_until: self
                .state
                .heating_until
                .filter(|_| self.state.is_heating)
                .map(|until| until.format("%H:%M:%S").to_string()),
            state: self.phase.as_str(),
            sensor_valid,
            sensor_failures,
            last_sample: self
                .state
                .last_sample_time
                .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string()),
            alarm: self.alarm,
        }
    }

    fn regulate(
        &mut self,
        now: NaiveDateTime,
        minute: u16,
        temp_c: f32,
        actions: &mut Vec<EngineAction>,
    ) {
        let target_c = self.config.target_temperature_c;

        if self
            .config
            .window()
            .should_open(self.state.is_window_active, temp_c, target_c, minute)
        {
            info!(at = %now, temp_c, target_c, "control window opened");
            self.state.is_window_active = true;
        }

        if !self.state.is_window_active {
            self.cancel_pulse(actions);
            self.phase = OvenState::Idle;
            return;
        }

        // At or above target: no PID pass, so overshoot cannot re-trigger it.
        if temp_c >= target_c {
            self.cancel_pulse(actions);
            self.phase = OvenState::Satisfied;
            return;
        }

        if self.pulse_running(now) {
            self.phase = OvenState::Heating;
            return;
        }

        let on_minutes = self.pid.compute(temp_c, now);
        let until = now + pulse_length(on_minutes);
        self.state.heating_until = Some(until);
        debug!(temp_c, on_minutes, until = %until, "heating pulse computed");

        if now < until {
            self.start_heating(actions);
            self.phase = OvenState::Heating;
        } else {
            self.stop_heating(actions);
            self.phase = OvenState::Armed;
        }
    }

    fn resting_phase(&self) -> OvenState {
        if self.state.is_heating {
            OvenState::Heating
        } else if self.state.is_window_active {
            OvenState::Armed
        } else {
            OvenState::Idle
        }
    }

    fn pulse_running(&self, now: NaiveDateTime) -> bool {
        self.state.is_heating
            && self
                .state
                .heating_until
                .is_some_and(|until| now < until)
    }

    // A deadline further out than the longest pulse means the clock stepped
    // back. The relay is left as is; the decision that follows reschedules.
    fn drop_stale_pulse(&mut self, now: NaiveDateTime) {
        let Some(until) = self.state.heating_until else {
            return;
        };
        if until - now > pulse_length(OUTPUT_LIMITS.1) {
            warn!(at = %now, until = %until, "clock moved backwards, pulse deadline dropped");
            self.state.heating_until = None;
        }
    }

    fn expire_pulse(&mut self, now: NaiveDateTime, actions: &mut Vec<EngineAction>) {
        if self.state.is_heating && !self.pulse_running(now) {
            self.stop_heating(actions);
        }
    }

    fn close_window(&mut self, actions: &mut Vec<EngineAction>) {
        self.state.is_window_active = false;
        self.cancel_pulse(actions);
        self.pid.reset();
    }

    fn cancel_pulse(&mut self, actions: &mut Vec<EngineAction>) {
        self.state.heating_until = None;
        self.stop_heating(actions);
    }

    fn start_heating(&mut self, actions: &mut Vec<EngineAction>) {
        if self.state.is_heating {
            return;
        }
        actions.push(EngineAction::RelayOn);
        self.state.is_heating = true;
    }

    fn stop_heating(&mut self, actions: &mut Vec<EngineAction>) {
        if !self.state.is_heating {
            return;
        }
        actions.push(EngineAction::RelayOff);
        self.state.is_heating = false;
    }

    fn refresh_indicator(&mut self, actions: &mut Vec<EngineAction>) {
        let color = self.phase.indicator();
        if color != self.indicator {
            self.indicator = color;
            actions.push(EngineAction::Indicator(color));
        }
    }
}

fn pulse_length(on_minutes: f32) -> Duration {
    Duration::milliseconds((on_minutes * 60_000.0).round() as i64)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::config::PidGains;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn engine_with(gains: PidGains) -> OvenEngine {
        let config = ControlConfig {
            gains,
            ..ControlConfig::default()
        };
        OvenEngine::new(config, 3)
    }

    fn sample(engine: &mut OvenEngine, temp_c: f32, now: NaiveDateTime) -> Vec<EngineAction> {
        engine.record_sample(TemperatureReading::Celsius(temp_c), now);
        engine.tick(now)
    }

    #[test]
    fn cold_oven_inside_window_starts_a_pulse() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        let now = at(11, 40, 0);

        let actions = sample(&mut engine, 40.0, now);

        assert!(engine.is_window_active());
        assert!(engine.is_heating());
        assert_eq!(
            actions,
            vec![
                EngineAction::RelayOn,
                EngineAction::Indicator(IndicatorColor::Red)
            ]
        );

        let until = engine.control_state().heating_until.unwrap();
        assert!(until > now);
        assert!(until <= now + Duration::minutes(10));
        assert_eq!(engine.state(), OvenState::Heating);
    }

    #[test]
    fn relay_stays_energized_until_pulse_ends() {
        let mut engine = engine_with(PidGains {
            kp: 0.2,
            ki: 0.0,
            kd: 0.0,
        });

        sample(&mut engine, 40.0, at(11, 40, 0));
        assert_eq!(
            engine.control_state().heating_until,
            Some(at(11, 42, 0))
        );

        assert!(engine.tick(at(11, 41, 59)).is_empty());
        assert!(engine.is_heating());

        // Pulse expired while still cold: the next pulse follows seamlessly.
        let actions = engine.tick(at(11, 42, 0));
        assert!(actions.is_empty());
        assert!(engine.is_heating());
        assert_eq!(
            engine.control_state().heating_until,
            Some(at(11, 44, 0))
        );
    }

    #[test]
    fn clock_stepping_back_reschedules_the_pulse() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(12, 0, 0));
        assert_eq!(
            engine.control_state().heating_until,
            Some(at(12, 10, 0))
        );

        let now = at(11, 30, 0);
        let actions = sample(&mut engine, 40.0, now);

        assert!(actions.is_empty());
        assert!(engine.is_heating());
        let until = engine.control_state().heating_until.unwrap();
        assert!(until > now);
        assert!(until - now <= Duration::minutes(10));
    }

    #[test]
    fn clock_stepping_back_ends_pulse_without_valid_reading() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(12, 0, 0));

        let now = at(11, 30, 0);
        engine.record_sample(TemperatureReading::Failed { consecutive: 1 }, now);
        let actions = engine.tick(now);

        assert!(actions.contains(&EngineAction::RelayOff));
        assert!(!engine.is_heating());
    }

    #[test]
    fn zero_output_leaves_relay_off() {
        let mut engine = engine_with(PidGains {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
        });

        let actions = sample(&mut engine, 40.0, at(12, 0, 0));

        assert!(engine.is_window_active());
        assert!(!engine.is_heating());
        assert_eq!(
            actions,
            vec![EngineAction::Indicator(IndicatorColor::Amber)]
        );
        assert_eq!(engine.state(), OvenState::Armed);
    }

    #[test]
    fn reaching_target_switches_off_within_one_tick() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(12, 0, 0));
        assert!(engine.is_heating());

        let actions = sample(&mut engine, 50.0, at(12, 1, 0));

        assert!(actions.contains(&EngineAction::RelayOff));
        assert!(!engine.is_heating());
        assert!(engine.is_window_active());
        assert_eq!(engine.control_state().heating_until, None);
        assert_eq!(engine.state(), OvenState::Satisfied);
    }

    #[test]
    fn window_end_forces_heating_off_regardless_of_temperature() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(16, 55, 0));
        assert!(engine.is_heating());

        let actions = sample(&mut engine, 30.0, at(17, 1, 0));

        assert!(actions.contains(&EngineAction::RelayOff));
        assert!(!engine.is_window_active());
        assert!(!engine.is_heating());
        assert_eq!(engine.state(), OvenState::Idle);
    }

    #[test]
    fn cold_oven_outside_window_stays_idle() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);

        for now in [at(6, 0, 0), at(11, 0, 0), at(17, 0, 0), at(23, 59, 0)] {
            assert!(sample(&mut engine, 10.0, now).is_empty());
            assert!(!engine.is_window_active());
            assert!(!engine.is_heating());
        }
    }

    #[test]
    fn repeated_tick_does_not_retrigger() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        let now = at(13, 0, 0);

        sample(&mut engine, 45.0, now);
        let until = engine.control_state().heating_until;

        assert!(engine.tick(now).is_empty());
        assert_eq!(engine.control_state().heating_until, until);
    }

    #[test]
    fn window_reopens_same_day_without_latch() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(16, 59, 0));
        sample(&mut engine, 40.0, at(17, 2, 0));
        assert!(!engine.is_window_active());

        // Clock corrected back into the window.
        sample(&mut engine, 40.0, at(16, 30, 0));
        assert!(engine.is_window_active());
        assert!(engine.is_heating());
    }

    #[test]
    fn failed_reading_blocks_new_decisions() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        engine.record_sample(TemperatureReading::Failed { consecutive: 1 }, at(12, 0, 0));

        assert_eq!(
            engine.tick(at(12, 0, 0)),
            vec![EngineAction::Indicator(IndicatorColor::Magenta)]
        );
        assert!(!engine.is_window_active());
        assert!(!engine.is_heating());
        assert_eq!(engine.state(), OvenState::SensorFault);
    }

    #[test]
    fn failed_reading_lets_running_pulse_finish_without_a_new_one() {
        let mut engine = engine_with(PidGains {
            kp: 0.5,
            ki: 0.0,
            kd: 0.0,
        });
        sample(&mut engine, 40.0, at(12, 0, 0));
        assert_eq!(engine.control_state().heating_until, Some(at(12, 5, 0)));

        engine.record_sample(TemperatureReading::Failed { consecutive: 1 }, at(12, 1, 0));
        engine.tick(at(12, 1, 0));
        assert!(engine.is_heating());

        let actions = engine.tick(at(12, 5, 0));
        assert!(actions.contains(&EngineAction::RelayOff));
        assert!(!engine.is_heating());

        assert!(!engine.tick(at(12, 6, 0)).contains(&EngineAction::RelayOn));
    }

    #[test]
    fn repeated_sensor_failures_force_heating_off() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(12, 0, 0));
        assert!(engine.is_heating());

        engine.record_sample(TemperatureReading::Failed { consecutive: 3 }, at(12, 3, 0));
        let actions = engine.tick(at(12, 3, 0));

        assert!(actions.contains(&EngineAction::RelayOff));
        assert_eq!(engine.control_state().heating_until, None);

        // A valid reading resumes regulation.
        sample(&mut engine, 40.0, at(12, 4, 0));
        assert!(engine.is_heating());
        assert_eq!(engine.state(), OvenState::Heating);
    }

    #[test]
    fn alarm_latches_and_suppresses_heating() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(12, 0, 0));

        let actions = engine.enter_alarm();
        assert_eq!(actions.first(), Some(&EngineAction::RelayOff));
        assert!(engine.is_alarmed());

        assert!(sample(&mut engine, 20.0, at(12, 30, 0)).is_empty());
        assert!(!engine.is_heating());
        assert!(engine.reset().is_empty());
        assert_eq!(engine.state(), OvenState::Alarm);
    }

    #[test]
    fn reset_closes_window_and_keeps_last_sample() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(12, 0, 0));

        let actions = engine.reset();

        assert_eq!(
            actions,
            vec![
                EngineAction::RelayOff,
                EngineAction::Indicator(IndicatorColor::Green)
            ]
        );
        assert!(!engine.is_window_active());
        assert_eq!(engine.control_state().last_measured_temp(), Some(40.0));
    }

    #[test]
    fn force_off_keeps_window() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(12, 0, 0));

        let actions = engine.force_off("clock unavailable");

        assert_eq!(
            actions,
            vec![
                EngineAction::RelayOff,
                EngineAction::Indicator(IndicatorColor::Amber)
            ]
        );
        assert!(engine.is_window_active());
    }

    #[test]
    fn applying_config_moves_the_window() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(12, 0, 0));

        let mut config = ControlConfig::default();
        config.window_end = crate::config::TimeOfDay::from_hm(11, 30).unwrap();
        engine.apply_config(config);

        let actions = engine.tick(at(12, 0, 30));
        assert!(actions.contains(&EngineAction::RelayOff));
        assert!(!engine.is_window_active());
    }

    #[test]
    fn status_reports_pulse() {
        let mut engine = OvenEngine::new(ControlConfig::default(), 3);
        sample(&mut engine, 40.0, at(12, 0, 0));

        let status = engine.status(Some(22.5));

        assert_eq!(status.oven_temp, Some(40.0));
        assert_eq!(status.air_temp, Some(22.5));
        assert_eq!(status.window_start, "11:00");
        assert_eq!(status.window_end, "17:00");
        assert_eq!(status.heating_until.as_deref(), Some("12:10:00"));
        assert_eq!(status.state, "HEATING");
        assert!(status.sensor_valid);
    }
}
