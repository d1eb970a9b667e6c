//! Slot grid and working-window arithmetic.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use super::SchedulingError;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A wall-clock time of day with minute precision, written as "HH:MM".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u32);

impl TimeOfDay {
    pub fn from_minutes(minutes: u32) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes))
    }

    /// Parse a strict two-digit "HH:MM" label.
    pub fn parse(value: &str) -> Result<Self, SchedulingError> {
        let invalid = || SchedulingError::InvalidTime(value.to_string());
        let bytes = value.as_bytes();
        if bytes.len() != 5 || bytes[2] != b':' {
            return Err(invalid());
        }
        let digits = [bytes[0], bytes[1], bytes[3], bytes[4]];
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(invalid());
        }
        let hours = u32::from(bytes[0] - b'0') * 10 + u32::from(bytes[1] - b'0');
        let minutes = u32::from(bytes[3] - b'0') * 10 + u32::from(bytes[4] - b'0');
        if hours >= 24 || minutes >= 60 {
            return Err(invalid());
        }
        Ok(Self(hours * 60 + minutes))
    }

    pub fn minutes(self) -> u32 {
        self.0
    }

    pub fn hour(self) -> u32 {
        self.0 / 60
    }

    pub fn minute(self) -> u32 {
        self.0 % 60
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for TimeOfDay {
    type Err = SchedulingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Opening and closing time of a working day. `open` is always before `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkingWindow {
    open: TimeOfDay,
    close: TimeOfDay,
}

impl WorkingWindow {
    pub fn new(open: TimeOfDay, close: TimeOfDay) -> Result<Self, SchedulingError> {
        if open >= close {
            return Err(SchedulingError::InvalidWorkingHours(format!(
                "start {} must be before end {}",
                open, close
            )));
        }
        Ok(Self { open, close })
    }

    pub fn parse(open: &str, close: &str) -> Result<Self, SchedulingError> {
        Self::new(TimeOfDay::parse(open)?, TimeOfDay::parse(close)?)
    }

    pub fn open(&self) -> TimeOfDay {
        self.open
    }

    pub fn close(&self) -> TimeOfDay {
        self.close
    }

    pub fn contains(&self, time: TimeOfDay, inclusive_end: bool) -> bool {
        is_within_working_window(time.minutes(), self.open, self.close, inclusive_end)
    }
}

impl Default for WorkingWindow {
    /// 09:00 to 19:00.
    fn default() -> Self {
        Self {
            open: TimeOfDay(9 * 60),
            close: TimeOfDay(19 * 60),
        }
    }
}

/// The single working-window predicate.
///
/// The slot generator asks with `inclusive_end = true`, so a slot starting at
/// closing time is listed. The point check used when booking asks with
/// `inclusive_end = false`, so that same slot is refused.
pub fn is_within_working_window(
    minute: u32,
    open: TimeOfDay,
    close: TimeOfDay,
    inclusive_end: bool,
) -> bool {
    if minute < open.minutes() {
        return false;
    }
    if inclusive_end {
        minute <= close.minutes()
    } else {
        minute < close.minutes()
    }
}

/// Slot start labels from `open` every `interval_minutes`, up to and including `close`.
pub fn generate_time_slots(
    window: &WorkingWindow,
    interval_minutes: u32,
) -> Result<Vec<TimeOfDay>, SchedulingError> {
    if interval_minutes == 0 || interval_minutes >= MINUTES_PER_DAY {
        return Err(SchedulingError::InvalidInterval(interval_minutes));
    }

    let mut slots = Vec::new();
    let mut minute = window.open.minutes();
    while is_within_working_window(minute, window.open, window.close, true) {
        slots.push(TimeOfDay(minute));
        minute += interval_minutes;
    }
    Ok(slots)
}
