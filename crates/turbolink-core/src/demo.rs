//! Demo Mode - Simulated pump controllers for running without hardware
//!
//! A [`DemoPump`] answers encoded requests the way a controller on the line
//! would. The rotor spins up at a rate set by the power limit and coasts down
//! after a stop, so speed, status flags and temperatures change over time.
//!
//! A [`DemoBus`] puts any number of demo pumps behind one in-memory stream.

use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::protocol::frame::{FRAME_START, MARKER_OFFSET, TERMINATOR};
use crate::protocol::network::{
    FACTORY_POWER_LIMIT, FACTORY_TIMER, POWER_LIMIT_RANGE, TIMER_RANGE_MINUTES,
};
use crate::protocol::{Command, Endpoint, ErrorKind, Operation, MAX_MESSAGE_SIZE};
use crate::pump::{PumpStatus, VentMode};
use crate::units::{Celsius, Hertz, Watts};

/// Pump type reported by demo pumps
pub const DEMO_PUMP_TYPE: &str = "DEMO85";

/// DSP version reported by demo pumps
pub const DEMO_DSP_VERSION: &str = "D39700000";

/// Full rotational speed of demo pumps
pub const DEMO_MAX_SPEED: Hertz = Hertz(1500);

/// Spin-up rate at the factory power limit, in Hz per second
const SPIN_UP_RATE: f64 = 25.0;

/// Coast-down rate after a stop, in Hz per second
const SPIN_DOWN_RATE: f64 = 20.0;

/// Ambient temperature the pump starts at
const AMBIENT_C: f64 = 22.0;

/// One simulated pump controller
pub struct DemoPump {
    address: Endpoint,
    /// Last update time (ms)
    last_update_ms: Option<u64>,
    /// Time of the start command (ms)
    started_at_ms: Option<u64>,
    running: bool,
    /// Current rotational speed (smoothed)
    speed_hz: f64,
    vent_mode: VentMode,
    venting: bool,
    /// A stop asked for venting once below half speed
    vent_pending: bool,
    timer_minutes: u32,
    timer_expired: bool,
    power_limit: Watts,
    motor_c: f64,
    controller_c: f64,
    rng: StdRng,
}

impl DemoPump {
    /// Create a stopped pump with factory settings
    pub fn new(address: Endpoint) -> Self {
        Self {
            address,
            last_update_ms: None,
            started_at_ms: None,
            running: false,
            speed_hz: 0.0,
            vent_mode: VentMode::FACTORY_DEFAULT,
            venting: false,
            vent_pending: false,
            timer_minutes: (FACTORY_TIMER.as_secs() / 60) as u32,
            timer_expired: false,
            power_limit: FACTORY_POWER_LIMIT,
            motor_c: AMBIENT_C,
            controller_c: AMBIENT_C,
            rng: StdRng::seed_from_u64(address.get() as u64),
        }
    }

    /// Address the pump answers to
    pub fn address(&self) -> Endpoint {
        self.address
    }

    /// Current rotational speed
    pub fn speed(&self) -> Hertz {
        Hertz(self.speed_hz.round() as u32)
    }

    /// Current status flags
    pub fn status(&self) -> PumpStatus {
        let max = DEMO_MAX_SPEED.0 as f64;
        let mut status = PumpStatus::SERIAL_ENABLED | PumpStatus::SERIAL_CONTROL;
        if self.running {
            status.insert(PumpStatus::START);
        }
        if self.speed_hz < 2.0 {
            status.insert(PumpStatus::STOPPED_SPEED);
        }
        if self.speed_hz >= max * 0.8 {
            status.insert(PumpStatus::NORMAL_SPEED);
        }
        if self.speed_hz >= max * 0.5 {
            status.insert(PumpStatus::HALF_SPEED);
        }
        if self.venting {
            status.insert(PumpStatus::VENT_VALVE);
        }
        if self.timer_expired {
            status.insert(PumpStatus::FAIL | PumpStatus::TIMER_EXPIRED);
        }
        status
    }

    /// Advance the simulation to `elapsed_ms`
    pub fn update(&mut self, elapsed_ms: u64) {
        let delta_ms = match self.last_update_ms {
            Some(last) => elapsed_ms.saturating_sub(last),
            None => 0,
        };
        self.last_update_ms = Some(elapsed_ms);
        let dt = delta_ms as f64 / 1000.0;
        let max = DEMO_MAX_SPEED.0 as f64;

        if self.running {
            let rate = SPIN_UP_RATE * self.power_limit.0 as f64 / FACTORY_POWER_LIMIT.0 as f64;
            self.speed_hz = (self.speed_hz + rate * dt).min(max);

            // Half speed must be reached within the timer setting
            if let Some(started) = self.started_at_ms {
                let limit_ms = self.timer_minutes as u64 * 60_000;
                if self.speed_hz < max * 0.5 && elapsed_ms.saturating_sub(started) > limit_ms {
                    debug!("demo pump {} timer expired", self.address);
                    self.timer_expired = true;
                    self.stop();
                }
            }
        } else {
            self.speed_hz = (self.speed_hz - SPIN_DOWN_RATE * dt).max(0.0);
            if self.vent_pending && self.speed_hz < max * 0.5 {
                self.vent_pending = false;
                self.venting = true;
            }
        }

        // Temperatures follow load with a slow first-order lag
        let load = self.speed_hz / max;
        let motor_target = AMBIENT_C + 18.0 * load;
        let controller_target = AMBIENT_C + 10.0 * load * self.power_limit.0 as f64 / 200.0;
        let k = (dt / 30.0).min(1.0);
        self.motor_c += (motor_target - self.motor_c) * k;
        self.controller_c += (controller_target - self.controller_c) * k;
    }

    fn temperatures(&mut self) -> (Celsius, Celsius) {
        let jitter: f64 = self.rng.gen_range(-0.4..0.4);
        (
            Celsius((self.motor_c + jitter).round() as i32),
            Celsius(self.controller_c.round() as i32),
        )
    }

    fn stop(&mut self) {
        self.running = false;
        self.started_at_ms = None;
        let immediate = matches!(
            self.vent_mode,
            VentMode::Mode2 | VentMode::Mode3 | VentMode::Mode6 | VentMode::Mode7
        );
        if immediate {
            self.venting = true;
        } else {
            self.vent_pending = true;
        }
    }

    fn start(&mut self) {
        self.running = true;
        self.started_at_ms = self.last_update_ms;
        self.timer_expired = false;
        self.venting = false;
        self.vent_pending = false;
    }

    /// Answer one request frame at `elapsed_ms`.
    ///
    /// Returns `None` when the frame is not addressed to this pump (or is not
    /// a request at all); a controller stays silent in that case.
    pub fn respond(&mut self, request: &[u8], elapsed_ms: u64) -> Option<Vec<u8>> {
        let parsed = ParsedRequest::parse(request)?;
        if parsed.address != self.address && !parsed.address.is_wildcard() {
            return None;
        }
        self.update(elapsed_ms);

        let reply = match self.execute(&parsed) {
            Ok(Reply::Value(value)) => format!(
                "#{}:00*{} {}",
                self.address,
                parsed.command.code(),
                value
            ),
            Ok(Reply::Ack(echo)) => format!(
                "#{}:00!{} {}",
                self.address,
                parsed.command.code(),
                echo
            ),
            Err(kind) => format!(
                "#{}:00!{} {}",
                self.address,
                parsed.command.code(),
                kind.code()
            ),
        };
        trace!(pump = %self.address, reply = %reply, "demo reply");

        let mut bytes = reply.into_bytes();
        bytes.truncate(MAX_MESSAGE_SIZE - 1);
        bytes.push(TERMINATOR);
        Some(bytes)
    }

    fn execute(&mut self, request: &ParsedRequest) -> Result<Reply, ErrorKind> {
        let command = request.command;
        match (request.operation, command) {
            (Operation::Command, Command::PumpType) => {
                request.argument.ok_or(ErrorKind::MissingParameter)?;
                Ok(Reply::Ack(format!(
                    "1 {};{};{}",
                    DEMO_PUMP_TYPE, DEMO_DSP_VERSION, DEMO_MAX_SPEED.0
                )))
            }
            (Operation::Query, Command::PumpSpeed) => Ok(Reply::Value(format!(
                "{};{:08X}",
                self.speed().0,
                self.status().bits()
            ))),
            (Operation::Query, Command::VentOptions) => {
                Ok(Reply::Value(self.vent_mode.digit().to_string()))
            }
            (Operation::Query, Command::TimerSetting) => {
                Ok(Reply::Value(self.timer_minutes.to_string()))
            }
            (Operation::Query, Command::PowerLimit) => {
                Ok(Reply::Value(self.power_limit.0.to_string()))
            }
            (Operation::Query, Command::Temperatures) => {
                let (motor, controller) = self.temperatures();
                Ok(Reply::Value(format!("{};{}", motor.0, controller.0)))
            }
            (Operation::Command, _) => {
                let argument = request.argument.ok_or(ErrorKind::MissingParameter)?;
                self.apply(command, argument)?;
                Ok(Reply::Ack("0".to_string()))
            }
            (Operation::Query, _) => Err(ErrorKind::InvalidCommandForObject),
        }
    }

    fn apply(&mut self, command: Command, argument: u32) -> Result<(), ErrorKind> {
        match (command, argument) {
            (Command::PumpControl, 1) => self.start(),
            (Command::PumpControl, 0) => self.stop(),
            (Command::VentOptions, mode) => {
                let mode = u8::try_from(mode)
                    .ok()
                    .and_then(VentMode::from_digit)
                    .ok_or(ErrorKind::OutOfRange)?;
                self.vent_mode = mode;
            }
            (Command::TimerSetting, minutes) => {
                if !TIMER_RANGE_MINUTES.contains(&(minutes as u64)) {
                    return Err(ErrorKind::OutOfRange);
                }
                self.timer_minutes = minutes;
            }
            (Command::PowerLimit, watts) => {
                if !POWER_LIMIT_RANGE.contains(&watts) {
                    return Err(ErrorKind::OutOfRange);
                }
                self.power_limit = Watts(watts);
            }
            (Command::FactoryReset, 1) => {
                if self.running {
                    return Err(ErrorKind::InvalidCommandInCurrentState);
                }
                self.vent_mode = VentMode::FACTORY_DEFAULT;
                self.timer_minutes = (FACTORY_TIMER.as_secs() / 60) as u32;
                self.power_limit = FACTORY_POWER_LIMIT;
            }
            (Command::VentValve, 1) => {
                self.venting = false;
                self.vent_pending = false;
            }
            (Command::PumpControl | Command::FactoryReset | Command::VentValve, _) => {
                return Err(ErrorKind::OutOfRange)
            }
            (Command::PumpType | Command::PumpSpeed | Command::Temperatures, _) => {
                return Err(ErrorKind::InvalidCommandForObject)
            }
        }
        Ok(())
    }
}

enum Reply {
    /// Successful query: `*` marker and the value
    Value(String),
    /// Accepted command: `!` marker echoed with the trailing text
    Ack(String),
}

struct ParsedRequest {
    address: Endpoint,
    operation: Operation,
    command: Command,
    argument: Option<u32>,
}

impl ParsedRequest {
    /// `#AA:00<op><code>[ <arg>]\r`
    fn parse(frame: &[u8]) -> Option<Self> {
        let body = frame.strip_suffix(&[TERMINATOR])?;
        if body.len() < 11 || body[0] != FRAME_START || &body[3..6] != b":00" {
            return None;
        }
        let address = std::str::from_utf8(&body[1..3]).ok()?.parse::<u8>().ok()?;
        let address = Endpoint::checked(address)?;
        let operation = match body[MARKER_OFFSET] {
            b'?' => Operation::Query,
            b'!' => Operation::Command,
            _ => return None,
        };
        let command = Command::from_code(std::str::from_utf8(&body[7..11]).ok()?)?;
        let argument = match body.get(11) {
            Some(b' ') => std::str::from_utf8(&body[12..]).ok()?.trim().parse().ok(),
            _ => None,
        };
        Some(Self {
            address,
            operation,
            command,
            argument,
        })
    }
}

/// Simulated RS-485 line with demo pumps attached
pub struct DemoBus {
    pumps: Vec<DemoPump>,
    /// Foreign traffic injection: generator and probability per request
    foreign: Option<(StdRng, f64)>,
}

impl Default for DemoBus {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self {
            pumps: Vec::new(),
            foreign: None,
        }
    }

    /// Attach a pump
    pub fn with_pump(mut self, pump: DemoPump) -> Self {
        self.pumps.push(pump);
        self
    }

    /// Attach a factory-fresh pump at each address
    pub fn with_pumps(mut self, addresses: impl IntoIterator<Item = Endpoint>) -> Self {
        self.pumps.extend(addresses.into_iter().map(DemoPump::new));
        self
    }

    /// Before each answer, with the given probability, put a frame from a
    /// controller that is not on this bus on the line
    pub fn with_foreign_traffic(mut self, seed: u64, probability: f64) -> Self {
        self.foreign = Some((StdRng::seed_from_u64(seed), probability.clamp(0.0, 1.0)));
        self
    }

    /// Addresses of the attached pumps
    pub fn addresses(&self) -> Vec<Endpoint> {
        self.pumps.iter().map(DemoPump::address).collect()
    }

    /// Start serving requests on a background task.
    ///
    /// Returns the client end of the line. The task ends when that end is
    /// dropped. Must be called from within a tokio runtime.
    pub fn spawn(self) -> DuplexStream {
        let (client, device) = duplex(4 * MAX_MESSAGE_SIZE);
        tokio::spawn(self.serve(device));
        client
    }

    async fn serve(mut self, mut device: DuplexStream) {
        let start = Instant::now();
        let mut frame = Vec::with_capacity(MAX_MESSAGE_SIZE);
        let mut chunk = [0u8; MAX_MESSAGE_SIZE];

        loop {
            let n = match device.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            for &byte in &chunk[..n] {
                frame.push(byte);
                if byte != TERMINATOR && frame.len() < MAX_MESSAGE_SIZE {
                    continue;
                }
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let replies = self.answer(&frame, elapsed_ms);
                frame.clear();
                for reply in replies {
                    if device.write_all(&reply).await.is_err() {
                        return;
                    }
                }
            }
        }
        debug!("demo bus closed");
    }

    fn answer(&mut self, request: &[u8], elapsed_ms: u64) -> Vec<Vec<u8>> {
        let mut replies = Vec::new();
        if let Some(frame) = self.foreign_frame() {
            replies.push(frame);
        }

        // Only the first pump answers a wildcard so no stale frame is left behind
        for pump in &mut self.pumps {
            if let Some(reply) = pump.respond(request, elapsed_ms) {
                replies.push(reply);
                break;
            }
        }
        replies
    }

    fn foreign_frame(&mut self) -> Option<Vec<u8>> {
        let (rng, probability) = self.foreign.as_mut()?;
        if !rng.gen_bool(*probability) {
            return None;
        }
        let free: Vec<u8> = (1..Endpoint::WILDCARD.get())
            .filter(|a| !self.pumps.iter().any(|p| p.address.get() == *a))
            .collect();
        if free.is_empty() {
            return None;
        }
        let address = free[rng.gen_range(0..free.len())];
        let speed = rng.gen_range(0..=DEMO_MAX_SPEED.0);
        Some(format!("#{:02}:00*V852 {};{:08X}\r", address, speed, 0x20).into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ProtocolError, Request};

    fn pump() -> DemoPump {
        DemoPump::new(Endpoint::new(5))
    }

    #[test]
    fn test_pump_info_reply() {
        let mut pump = pump();
        let request = Request::command(Endpoint::new(5), Command::PumpType, 1).encode();
        let reply = pump.respond(&request, 0).unwrap();
        assert_eq!(reply, b"#05:00!S851 1 DEMO85;D39700000;1500\r".to_vec());
    }

    #[test]
    fn test_ignores_other_addresses() {
        let mut pump = pump();
        let request = Request::query(Endpoint::new(6), Command::PumpSpeed).encode();
        assert!(pump.respond(&request, 0).is_none());
        assert!(pump.respond(b"garbage\r", 0).is_none());
    }

    #[test]
    fn test_spin_up_and_coast_down() {
        let mut pump = pump();
        pump.update(0);
        pump.apply(Command::PumpControl, 1).unwrap();
        pump.update(30_000);
        assert_eq!(pump.speed(), Hertz(750));
        assert!(pump.status().contains(PumpStatus::HALF_SPEED));
        assert!(!pump.status().contains(PumpStatus::NORMAL_SPEED));

        pump.update(90_000);
        assert_eq!(pump.speed(), DEMO_MAX_SPEED);
        assert!(pump.status().contains(PumpStatus::NORMAL_SPEED));

        pump.apply(Command::PumpControl, 0).unwrap();
        pump.update(100_000);
        assert_eq!(pump.speed(), Hertz(1300));
        assert!(!pump.status().contains(PumpStatus::START));
        assert!(!pump.status().contains(PumpStatus::VENT_VALVE));

        // Factory vent mode vents once below half speed
        pump.update(150_000);
        assert!(pump.status().contains(PumpStatus::VENT_VALVE));
    }

    #[test]
    fn test_immediate_vent_mode() {
        let mut pump = pump();
        pump.apply(Command::VentOptions, 6).unwrap();
        pump.apply(Command::PumpControl, 1).unwrap();
        pump.apply(Command::PumpControl, 0).unwrap();
        assert!(pump.status().contains(PumpStatus::VENT_VALVE));

        pump.apply(Command::VentValve, 1).unwrap();
        assert!(!pump.status().contains(PumpStatus::VENT_VALVE));
    }

    #[test]
    fn test_timer_expires_at_low_power() {
        let mut pump = pump();
        pump.apply(Command::PowerLimit, 50).unwrap();
        pump.apply(Command::TimerSetting, 1).unwrap();
        pump.update(0);
        pump.apply(Command::PumpControl, 1).unwrap();
        pump.update(61_000);
        let status = pump.status();
        assert!(status.contains(PumpStatus::FAIL | PumpStatus::TIMER_EXPIRED));
        assert!(!status.contains(PumpStatus::START));
    }

    #[test]
    fn test_out_of_range_settings() {
        let mut pump = pump();
        assert_eq!(pump.apply(Command::TimerSetting, 45), Err(ErrorKind::OutOfRange));
        assert_eq!(pump.apply(Command::PowerLimit, 20), Err(ErrorKind::OutOfRange));
        assert_eq!(pump.apply(Command::VentOptions, 8), Err(ErrorKind::OutOfRange));
        assert_eq!(pump.apply(Command::PumpSpeed, 1), Err(ErrorKind::InvalidCommandForObject));

        let request = b"#05:00!S854 45\r";
        let reply = pump.respond(request, 0).unwrap();
        assert_eq!(reply, b"#05:00!S854 4\r".to_vec());
    }

    #[test]
    fn test_factory_reset_refused_while_running() {
        let mut pump = pump();
        pump.apply(Command::PowerLimit, 120).unwrap();
        pump.apply(Command::PumpControl, 1).unwrap();
        assert_eq!(
            pump.apply(Command::FactoryReset, 1),
            Err(ErrorKind::InvalidCommandInCurrentState)
        );

        pump.apply(Command::PumpControl, 0).unwrap();
        pump.apply(Command::FactoryReset, 1).unwrap();
        assert_eq!(pump.power_limit, FACTORY_POWER_LIMIT);
    }

    #[test]
    fn test_missing_argument() {
        let mut pump = pump();
        let reply = pump.respond(b"#05:00!C852\r", 0).unwrap();
        assert_eq!(reply, b"#05:00!C852 3\r".to_vec());
        let err = crate::protocol::codec::check_response(&reply).unwrap_err();
        assert!(matches!(err, ProtocolError::Device { code: 3 }));
    }

    #[test]
    fn test_foreign_frames_avoid_attached_addresses() {
        let mut bus = DemoBus::new()
            .with_pumps([Endpoint::new(5)])
            .with_foreign_traffic(7, 1.0);
        for _ in 0..50 {
            let frame = bus.foreign_frame().unwrap();
            assert_eq!(frame[0], FRAME_START);
            assert_ne!(&frame[1..3], b"05");
            assert_eq!(frame.last(), Some(&TERMINATOR));
        }
    }

    #[test]
    fn test_no_foreign_frame_when_every_address_is_attached() {
        let mut bus = DemoBus::new()
            .with_pumps((1..Endpoint::WILDCARD.get()).map(Endpoint::new))
            .with_foreign_traffic(7, 1.0);
        assert!(bus.foreign_frame().is_none());
        let request = Request::query(Endpoint::new(98), Command::VentOptions).encode();
        assert_eq!(bus.answer(&request, 0), vec![b"#98:00*S853 0\r".to_vec()]);
    }
}
