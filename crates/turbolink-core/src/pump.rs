//! Pump domain values
//!
//! Typed views of what a controller reports. Nothing here is stored between
//! requests; every value is parsed fresh from one response.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::units::{Celsius, Hertz};

/// Identification reported by the pump info command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpInfo {
    /// Pump type string
    pub pump_type: String,
    /// DSP software version
    pub dsp_version: String,
    /// Full rotational speed
    pub max_speed: Hertz,
}

/// Status flags reported alongside the rotational speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PumpStatus(u32);

impl PumpStatus {
    /// Fail status condition active
    pub const FAIL: PumpStatus = PumpStatus(1 << 0);
    /// Below stopped speed
    pub const STOPPED_SPEED: PumpStatus = PumpStatus(1 << 1);
    /// Above normal speed
    pub const NORMAL_SPEED: PumpStatus = PumpStatus(1 << 2);
    /// Vent valve energised
    pub const VENT_VALVE: PumpStatus = PumpStatus(1 << 3);
    /// Start command active
    pub const START: PumpStatus = PumpStatus(1 << 4);
    /// Serial enable active
    pub const SERIAL_ENABLED: PumpStatus = PumpStatus(1 << 5);
    /// Standby active
    pub const STANDBY: PumpStatus = PumpStatus(1 << 6);
    /// Above 50% full rotational speed
    pub const HALF_SPEED: PumpStatus = PumpStatus(1 << 7);
    /// Exclusive parallel control mode active
    pub const PARALLEL_CONTROL: PumpStatus = PumpStatus(1 << 8);
    /// Exclusive serial control mode active
    pub const SERIAL_CONTROL: PumpStatus = PumpStatus(1 << 9);
    /// Controller internal software mismatch
    pub const INVALID_SOFTWARE: PumpStatus = PumpStatus(1 << 10);
    /// Controller failed its internal configuration and calibration
    pub const UPLOAD_INCOMPLETE: PumpStatus = PumpStatus(1 << 11);
    /// Half full speed not reached or held within the timer setting
    pub const TIMER_EXPIRED: PumpStatus = PumpStatus(1 << 12);
    /// Overspeed or overcurrent trip activated
    pub const HARDWARE_TRIP: PumpStatus = PumpStatus(1 << 13);
    /// Temperature measurement disconnected or damaged
    pub const THERMISTOR_ERROR: PumpStatus = PumpStatus(1 << 14);
    /// Serial enable went inactive after a serial start command
    pub const SERIAL_INTERLOCK: PumpStatus = PumpStatus(1 << 15);

    const NAMED: [(PumpStatus, &'static str); 16] = [
        (Self::FAIL, "fail"),
        (Self::STOPPED_SPEED, "stopped_speed"),
        (Self::NORMAL_SPEED, "normal_speed"),
        (Self::VENT_VALVE, "vent_valve"),
        (Self::START, "start"),
        (Self::SERIAL_ENABLED, "serial_enabled"),
        (Self::STANDBY, "standby"),
        (Self::HALF_SPEED, "half_speed"),
        (Self::PARALLEL_CONTROL, "parallel_control"),
        (Self::SERIAL_CONTROL, "serial_control"),
        (Self::INVALID_SOFTWARE, "invalid_software"),
        (Self::UPLOAD_INCOMPLETE, "upload_incomplete"),
        (Self::TIMER_EXPIRED, "timer_expired"),
        (Self::HARDWARE_TRIP, "hardware_trip"),
        (Self::THERMISTOR_ERROR, "thermistor_error"),
        (Self::SERIAL_INTERLOCK, "serial_interlock"),
    ];

    /// Flags from raw bits; bits above the 16 named ones are kept as-is
    pub fn from_bits(bits: u32) -> Self {
        PumpStatus(bits)
    }

    /// Raw bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// No flag set
    pub fn empty() -> Self {
        PumpStatus(0)
    }

    /// Whether every flag in `flag` is set
    pub fn contains(&self, flag: PumpStatus) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Set the flags in `flag`
    pub fn insert(&mut self, flag: PumpStatus) {
        self.0 |= flag.0;
    }

    /// Names of the set flags, lowest bit first
    pub fn flag_names(&self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for PumpStatus {
    type Output = PumpStatus;

    fn bitor(self, rhs: PumpStatus) -> PumpStatus {
        PumpStatus(self.0 | rhs.0)
    }
}

impl fmt::Display for PumpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X} [{}]", self.0, self.flag_names().join(", "))
    }
}

/// Service indications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ServiceStatus(u32);

impl ServiceStatus {
    /// Oil cartridge service due
    pub const OIL_DUE: ServiceStatus = ServiceStatus(1 << 0);
    /// Bearing service due
    pub const BEARING_DUE: ServiceStatus = ServiceStatus(1 << 1);
    /// Pump service due
    pub const PUMP_DUE: ServiceStatus = ServiceStatus(1 << 2);
    /// Controller service due
    pub const CONTROLLER_DUE: ServiceStatus = ServiceStatus(1 << 3);

    /// Flags from raw bits
    pub fn from_bits(bits: u32) -> Self {
        ServiceStatus(bits)
    }

    /// Raw bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every flag in `flag` is set
    pub fn contains(&self, flag: ServiceStatus) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Whether any service is due
    pub fn any_due(&self) -> bool {
        self.0 & 0xF != 0
    }
}

/// Vent behaviour on stop command and fail condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum VentMode {
    /// Hard vent below 50% full speed, for stop command or fail condition (factory default)
    Mode0,
    /// Controlled vent 100–50% full speed, hard vent below 50%
    Mode1,
    /// Hard vent immediately on stop; on fail once below 50% full speed
    Mode2,
    /// Hard vent immediately on stop; controlled vent 100–50% on fail, hard below 50%
    Mode3,
    /// Hard vent immediately on fail; on stop once below 50% full speed
    Mode4,
    /// Hard vent immediately on fail; controlled vent 100–50% on stop, hard below 50%
    Mode5,
    /// Hard vent immediately on stop command or fail condition
    Mode6,
    /// Same as mode 6
    Mode7,
}

impl VentMode {
    /// Mode the controller ships with
    pub const FACTORY_DEFAULT: VentMode = VentMode::Mode0;

    const ALL: [VentMode; 8] = [
        VentMode::Mode0,
        VentMode::Mode1,
        VentMode::Mode2,
        VentMode::Mode3,
        VentMode::Mode4,
        VentMode::Mode5,
        VentMode::Mode6,
        VentMode::Mode7,
    ];

    /// Mode for the digit carried on the wire
    pub fn from_digit(digit: u8) -> Option<Self> {
        Self::ALL.get(digit as usize).copied()
    }

    /// Digit carried on the wire
    pub fn digit(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for VentMode {
    type Error = String;

    fn try_from(digit: u8) -> Result<Self, Self::Error> {
        VentMode::from_digit(digit).ok_or_else(|| format!("vent mode {} is outside 0..=7", digit))
    }
}

impl From<VentMode> for u8 {
    fn from(mode: VentMode) -> Self {
        mode.digit()
    }
}

impl fmt::Display for VentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mode {}", self.digit())
    }
}

/// Temperatures reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpTemperature {
    /// Motor temperature
    pub motor: Celsius,
    /// Controller temperature
    pub controller: Celsius,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_flags() {
        let status = PumpStatus::from_bits(0x0000_0031);
        assert!(status.contains(PumpStatus::FAIL));
        assert!(status.contains(PumpStatus::START));
        assert!(status.contains(PumpStatus::SERIAL_ENABLED));
        assert!(!status.contains(PumpStatus::STANDBY));
        assert_eq!(status.flag_names(), vec!["fail", "start", "serial_enabled"]);
    }

    #[test]
    fn test_status_bitor() {
        let status = PumpStatus::START | PumpStatus::NORMAL_SPEED;
        assert_eq!(status.bits(), 0x14);
        assert!(status.contains(PumpStatus::START | PumpStatus::NORMAL_SPEED));
    }

    #[test]
    fn test_service_status() {
        let service = ServiceStatus::from_bits(0b0110);
        assert!(service.contains(ServiceStatus::BEARING_DUE));
        assert!(service.contains(ServiceStatus::PUMP_DUE));
        assert!(!service.contains(ServiceStatus::OIL_DUE));
        assert!(service.any_due());
        assert!(!ServiceStatus::default().any_due());
    }

    #[test]
    fn test_vent_mode_digits() {
        assert_eq!(VentMode::from_digit(0), Some(VentMode::FACTORY_DEFAULT));
        assert_eq!(VentMode::from_digit(7), Some(VentMode::Mode7));
        assert_eq!(VentMode::from_digit(8), None);
        assert_eq!(VentMode::Mode3.digit(), 3);
    }
}
