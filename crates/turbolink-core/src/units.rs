//! Physical Units
//!
//! The wire carries plain integers. These newtypes keep the quantity attached
//! to the number; conversions are only done when a caller asks for them:
//! - Rotational speed: Hz ↔ rpm
//! - Temperature: °C ↔ °F
//! - Power: W (no conversion)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Rotational speed in hertz (revolutions per second)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Hertz(pub u32);

impl Hertz {
    /// Speed in revolutions per minute
    pub fn to_rpm(self) -> u64 {
        hertz_to_rpm(self.0)
    }
}

impl fmt::Display for Hertz {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} Hz", self.0)
    }
}

/// Electrical power in watts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Watts(pub u32);

impl fmt::Display for Watts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} W", self.0)
    }
}

/// Temperature in degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Celsius(pub i32);

impl Celsius {
    /// Temperature in degrees Fahrenheit
    pub fn to_fahrenheit(self) -> f64 {
        celsius_to_fahrenheit(self.0 as f64)
    }
}

impl fmt::Display for Celsius {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} °C", self.0)
    }
}

/// Convert Hz to rpm
pub fn hertz_to_rpm(hz: u32) -> u64 {
    hz as u64 * 60
}

/// Convert rpm to Hz, rounding to the nearest whole hertz and saturating at
/// `u32::MAX`
pub fn rpm_to_hertz(rpm: u64) -> u32 {
    u32::try_from(rpm.saturating_add(30) / 60).unwrap_or(u32::MAX)
}

/// Convert Celsius to Fahrenheit
pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 9.0 / 5.0 + 32.0
}

/// Convert Fahrenheit to Celsius
pub fn fahrenheit_to_celsius(f: f64) -> f64 {
    (f - 32.0) * 5.0 / 9.0
}
