use chrono::{NaiveDateTime, Timelike};

use crate::config::TimeOfDay;

pub fn minute_of_day(now: NaiveDateTime) -> u16 {
    (now.hour() * 60 + now.minute()) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWindow {
    start: TimeOfDay,
    end: TimeOfDay,
}

impl ControlWindow {
    pub fn new(start: TimeOfDay, end: TimeOfDay) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> TimeOfDay {
        self.start
    }

    pub fn end(&self) -> TimeOfDay {
        self.end
    }

    // The bounds themselves never open the window.
    pub fn contains(&self, minute: u16) -> bool {
        self.start.minutes() < minute && minute < self.end.minutes()
    }

    pub fn is_outside(&self, minute: u16) -> bool {
        minute < self.start.minutes() || minute > self.end.minutes()
    }

    pub fn should_open(&self, active: bool, temp_c: f32, target_c: f32, minute: u16) -> bool {
        !active && temp_c < target_c && self.contains(minute)
    }

    pub fn should_close(&self, active: bool, minute: u16) -> bool {
        active && self.is_outside(minute)
    }
}
