//! Command/response codec
//!
//! Runs one [`Dialog`] per request, classifies the answer and parses typed
//! values out of the payload.
//!
//! Status classification:
//! - a transport failure is passed on untouched, nothing is parsed
//! - `*` at the marker position means success
//! - otherwise the one or two digits right before the terminator are the
//!   status code; `0` (or no digits) means success
//!
//! A reply must echo the object code of its request. Anything else is a
//! stale frame from an earlier exchange and is rejected as malformed.

use std::time::Duration;

use tracing::debug;

use super::frame::{code_field, MARKER_OFFSET, TERMINATOR};
use super::{Dialog, MessageBuffer, ProtocolError, Request, SerialChannel};
use crate::pump::{PumpInfo, PumpStatus, PumpTemperature, VentMode};
use crate::units::{Celsius, Hertz};

/// Marker placed at [`MARKER_OFFSET`] by a successful reply
pub const SUCCESS_MARKER: u8 = b'*';

/// Separator between fields of a payload
pub const FIELD_SEPARATOR: u8 = b';';

/// Shortest frame that can carry a status
const MIN_RESPONSE_LEN: usize = 8;

/// Check the status carried by a complete message
pub fn check_response(message: &[u8]) -> Result<(), ProtocolError> {
    if message.len() < MIN_RESPONSE_LEN || message.last() != Some(&TERMINATOR) {
        return Err(ProtocolError::malformed(format!(
            "incomplete frame {:?}",
            String::from_utf8_lossy(message)
        )));
    }
    if message[MARKER_OFFSET] == SUCCESS_MARKER {
        return Ok(());
    }

    match status_code(&message[..message.len() - 1]) {
        0 => Ok(()),
        code => Err(ProtocolError::Device { code }),
    }
}

/// Decimal value of the (at most two) digits that end `body`
fn status_code(body: &[u8]) -> u8 {
    body.iter()
        .rev()
        .take(2)
        .take_while(|b| b.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .fold(0, |code, digit| code * 10 + (digit - b'0'))
}

/// Send a command and check the device accepted it
pub async fn send_message<C: SerialChannel>(
    channel: &mut C,
    request: &Request,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    send_query(channel, request, timeout).await.map(|_| ())
}

/// Send a request and return the response once its status checked out
pub async fn send_query<C: SerialChannel>(
    channel: &mut C,
    request: &Request,
    timeout: Duration,
) -> Result<MessageBuffer, ProtocolError> {
    let response = Dialog::new(channel, request)
        .timeout(timeout)
        .run()
        .await
        .into_response()?;

    let message = response
        .message()
        .ok_or_else(|| ProtocolError::malformed("response without terminator"))?;
    if let Err(e) = check_echo(message, request).and_then(|()| check_response(message)) {
        debug!("{} {:?} rejected: {}", request.endpoint, request.command, e);
        return Err(e);
    }
    Ok(response)
}

/// Check the reply carries the object code of `request`
pub fn check_echo(message: &[u8], request: &Request) -> Result<(), ProtocolError> {
    let expected = request.command.code();
    if code_field(message) == Some(expected.as_bytes()) {
        return Ok(());
    }
    Err(ProtocolError::malformed(format!(
        "reply {:?} does not answer {}",
        String::from_utf8_lossy(message).trim_end(),
        expected
    )))
}

fn as_text(payload: &[u8]) -> Result<&str, ProtocolError> {
    std::str::from_utf8(payload).map_err(|_| ProtocolError::malformed("payload is not ASCII"))
}

/// Parse the leading decimal digits of `payload`.
///
/// A payload that does not start with a digit is malformed; it is never read
/// as zero.
pub fn parse_unsigned(payload: &[u8]) -> Result<u32, ProtocolError> {
    let digits = payload.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return Err(ProtocolError::malformed(format!(
            "expected a number, got {:?}",
            String::from_utf8_lossy(payload)
        )));
    }
    as_text(&payload[..digits])?
        .parse()
        .map_err(|_| ProtocolError::malformed("number out of range"))
}

fn parse_signed(field: &str) -> Result<i32, ProtocolError> {
    field
        .trim()
        .parse()
        .map_err(|_| ProtocolError::malformed(format!("expected a number, got {:?}", field)))
}

/// Parse `[<echo> ]<type>;<version>;<full speed>`
pub fn parse_pump_info(payload: &[u8]) -> Result<PumpInfo, ProtocolError> {
    let text = as_text(payload)?;
    let fields: Vec<&str> = text.split(FIELD_SEPARATOR as char).collect();
    let [head, version, speed] = fields[..] else {
        return Err(ProtocolError::malformed(format!(
            "pump info needs 3 fields, got {:?}",
            text
        )));
    };

    // The controller echoes the command argument before the type
    let pump_type = head.split_whitespace().last().unwrap_or_default();
    if pump_type.is_empty() || version.is_empty() {
        return Err(ProtocolError::malformed(format!(
            "empty pump info field in {:?}",
            text
        )));
    }

    Ok(PumpInfo {
        pump_type: pump_type.to_string(),
        dsp_version: version.to_string(),
        max_speed: Hertz(parse_unsigned(speed.as_bytes())?),
    })
}

/// Parse the rotational speed from `<speed>;<status>`
pub fn parse_speed(payload: &[u8]) -> Result<Hertz, ProtocolError> {
    parse_unsigned(payload).map(Hertz)
}

/// Parse the hexadecimal status flags after the separator of `<speed>;<status>`
pub fn parse_status(payload: &[u8]) -> Result<PumpStatus, ProtocolError> {
    let text = as_text(payload)?;
    let (_, flags) = text
        .split_once(FIELD_SEPARATOR as char)
        .ok_or_else(|| ProtocolError::malformed(format!("no status separator in {:?}", text)))?;
    u32::from_str_radix(flags.trim(), 16)
        .map(PumpStatus::from_bits)
        .map_err(|_| ProtocolError::malformed(format!("bad status flags {:?}", flags)))
}

/// Parse a single-digit vent mode
pub fn parse_vent_mode(payload: &[u8]) -> Result<VentMode, ProtocolError> {
    match payload {
        [digit] if digit.is_ascii_digit() => VentMode::from_digit(digit - b'0')
            .ok_or_else(|| ProtocolError::malformed(format!("unknown vent mode {}", digit - b'0'))),
        _ => Err(ProtocolError::malformed(format!(
            "vent mode must be one digit, got {:?}",
            String::from_utf8_lossy(payload)
        ))),
    }
}

/// Parse `<motor>;<controller>` temperatures
pub fn parse_temperature(payload: &[u8]) -> Result<PumpTemperature, ProtocolError> {
    let text = as_text(payload)?;
    let (motor, controller) = text
        .split_once(FIELD_SEPARATOR as char)
        .ok_or_else(|| ProtocolError::malformed(format!("no temperature separator in {:?}", text)))?;
    Ok(PumpTemperature {
        motor: Celsius(parse_signed(motor)?),
        controller: Celsius(parse_signed(controller)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Command, Endpoint, ErrorKind};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_success_marker() {
        assert!(check_response(b"#05:00*S853 3\r").is_ok());
        // Trailing digits are data, not a status, after a success marker
        assert!(check_response(b"#05:00*S855 160\r").is_ok());
    }

    #[test]
    fn test_echo_must_match_request() {
        let timer = Request::query(Endpoint::new(5), Command::TimerSetting);
        assert!(check_echo(b"#05:00*S854 12\r", &timer).is_ok());
        let err = check_echo(b"#05:00*S855 160\r", &timer).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
        assert!(err == ErrorKind::InvalidQuery);
        assert!(check_echo(b"#05:00*S8", &timer).is_err());
    }

    #[test]
    fn test_zero_code() {
        assert!(check_response(b"#05:00!C852 0\r").is_ok());
        assert!(check_response(b"#05:00!S851 1 PUMPTYP;1234567890;040000\r").is_ok());
    }

    #[test]
    fn test_error_codes() {
        let err = check_response(b"#05:00!S854 12\r").unwrap_err();
        assert_eq!(err.code(), Some(12));

        let err = check_response(b"#05:00!C852 5\r").unwrap_err();
        assert!(err == ErrorKind::InvalidCommandInCurrentState);

        let err = check_response(b"#05:00!S855 04\r").unwrap_err();
        assert!(err == ErrorKind::OutOfRange);
    }

    #[test]
    fn test_incomplete_frame_is_malformed() {
        assert!(matches!(
            check_response(b"#05:0\r"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            check_response(b"#05:00!C852 0"),
            Err(ProtocolError::Malformed(_))
        ));
    }

    #[test]
    fn test_status_code_digits() {
        assert_eq!(status_code(b"#05:00!C852 0"), 0);
        assert_eq!(status_code(b"#05:00!C852 7"), 7);
        assert_eq!(status_code(b"#05:00!C852 12"), 12);
        assert_eq!(status_code(b"#05:00!C852 1A"), 0);
        assert_eq!(status_code(b""), 0);
    }

    #[test]
    fn test_pump_info() {
        let info = parse_pump_info(b"1 PUMPTYP;1234567890;040000").expect("valid info");
        assert_eq!(info.pump_type, "PUMPTYP");
        assert_eq!(info.dsp_version, "1234567890");
        assert_eq!(info.max_speed, Hertz(40000));

        let info = parse_pump_info(b"nEXT85H;D39700001;1500").expect("valid info");
        assert_eq!(info.pump_type, "nEXT85H");
        assert_eq!(info.max_speed, Hertz(1500));
    }

    #[test]
    fn test_pump_info_malformed() {
        assert!(parse_pump_info(b"PUMPTYP 1234567890 040000").is_err());
        assert!(parse_pump_info(b"PUMPTYP;1234567890").is_err());
        assert!(parse_pump_info(b";1234567890;040000").is_err());
        assert!(parse_pump_info(b"PUMPTYP;1234567890;fast").is_err());
        assert!(parse_pump_info(b"").is_err());
    }

    #[test]
    fn test_speed_and_status() {
        let payload = b"1500;0000001C";
        assert_eq!(parse_speed(payload).unwrap(), Hertz(1500));
        let status = parse_status(payload).unwrap();
        assert_eq!(status.bits(), 0x1C);
        assert!(status.contains(PumpStatus::NORMAL_SPEED));
        assert!(status.contains(PumpStatus::VENT_VALVE));
        assert!(status.contains(PumpStatus::START));
    }

    #[test]
    fn test_status_without_separator() {
        let err = parse_status(b"1500").unwrap_err();
        assert!(err == ErrorKind::InvalidQuery);
        assert!(parse_status(b"1500;XYZ").is_err());
    }

    #[test]
    fn test_vent_mode() {
        assert_eq!(parse_vent_mode(b"3").unwrap(), VentMode::Mode3);
        assert!(parse_vent_mode(b"8").is_err());
        assert!(parse_vent_mode(b"").is_err());
        assert!(parse_vent_mode(b"12").is_err());
        assert!(parse_vent_mode(b"x").is_err());
    }

    #[test]
    fn test_unsigned_is_strict() {
        assert_eq!(parse_unsigned(b"160").unwrap(), 160);
        assert_eq!(parse_unsigned(b"0").unwrap(), 0);
        assert_eq!(parse_unsigned(b"8 min").unwrap(), 8);
        assert!(parse_unsigned(b"abc").is_err());
        assert!(parse_unsigned(b"").is_err());
        assert!(parse_unsigned(b"-5").is_err());
        assert!(parse_unsigned(b"99999999999").is_err());
    }

    #[test]
    fn test_temperature() {
        let temp = parse_temperature(b"35;-2").unwrap();
        assert_eq!(temp.motor, Celsius(35));
        assert_eq!(temp.controller, Celsius(-2));
        assert!(parse_temperature(b"35").is_err());
        assert!(parse_temperature(b"hot;cold").is_err());
    }
}
