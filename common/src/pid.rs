use chrono::NaiveDateTime;

use crate::config::PidGains;

pub const OUTPUT_LIMITS: (f32, f32) = (0.0, 10.0);

#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    setpoint: f32,
    output_min: f32,
    output_max: f32,
    integral: f32,
    prev_error: Option<f32>,
    last_time: Option<NaiveDateTime>,
}

impl PidController {
    pub fn new(gains: PidGains, setpoint: f32) -> Self {
        Self {
            gains,
            setpoint,
            output_min: OUTPUT_LIMITS.0,
            output_max: OUTPUT_LIMITS.1,
            integral: 0.0,
            prev_error: None,
            last_time: None,
        }
    }

    pub fn integral(&self) -> f32 {
        self.integral
    }

    pub fn configure(&mut self, gains: PidGains, setpoint: f32) {
        self.gains = gains;
        self.setpoint = setpoint;
        self.reset();
    }

    pub fn compute(&mut self, measurement: f32, now: NaiveDateTime) -> f32 {
        let error = self.setpoint - measurement;

        let dt = self
            .last_time
            .map(|last| (now - last).num_milliseconds().max(0) as f32 / 1_000.0)
            .unwrap_or(0.0);

        let p = self.gains.kp * error;

        if dt > 0.0 {
            self.integral = (self.integral + self.gains.ki * error * dt)
                .clamp(self.output_min, self.output_max);
        }

        let d = match self.prev_error {
            Some(prev) if dt > 0.0 => self.gains.kd * (error - prev) / dt,
            _ => 0.0,
        };

        self.prev_error = Some(error);
        self.last_time = Some(now);

        let output = p + self.integral + d;
        if output.is_finite() {
            output.clamp(self.output_min, self.output_max)
        } else {
            self.output_min
        }
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = None;
        self.last_time = None;
    }
}
