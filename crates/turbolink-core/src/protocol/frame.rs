//! Frame primitives
//!
//! A frame is a run of ASCII bytes ending in a carriage return:
//!
//! ```text
//! # A A : 0 0 op T c c c ␠ data... \r
//! 0 1 2 3 4 5 6  7 8 9 10 11 12
//! ```
//!
//! - bytes 1–2: two-digit endpoint address
//! - byte 6: operation or status marker (`?`, `!`, `*`, ...)
//! - bytes 7–10: command object code (e.g. `S851`)
//! - from byte 12: payload, up to the terminator
//!
//! These functions hold no state and do no I/O.

use std::fmt;

use super::MAX_MESSAGE_SIZE;

/// Marks the end of a frame
pub const TERMINATOR: u8 = b'\r';

/// First byte of every frame
pub const FRAME_START: u8 = b'#';

/// Byte offset at which the payload begins
pub const PAYLOAD_OFFSET: usize = 12;

/// Position of the operation/status marker
pub const MARKER_OFFSET: usize = 6;

/// Bytes holding the two-digit address
pub const ADDRESS_RANGE: std::ops::Range<usize> = 1..3;

/// Bytes holding the command object code
pub const CODE_RANGE: std::ops::Range<usize> = 7..11;

/// Return the first complete message in `buffer`, terminator included.
///
/// A buffer without a terminator holds no complete message; that is not an
/// error, it just means more bytes are needed.
pub fn locate_message(buffer: &[u8]) -> Option<&[u8]> {
    buffer
        .iter()
        .position(|&b| b == TERMINATOR)
        .map(|end| &buffer[..=end])
}

/// Return the payload of the message in `buffer`.
///
/// Empty when there is no complete message or when the message ends before
/// [`PAYLOAD_OFFSET`]. Callers must treat an empty payload where data was
/// expected as a malformed response.
pub fn extract_payload(buffer: &[u8]) -> &[u8] {
    match locate_message(buffer) {
        Some(message) if message.len() > PAYLOAD_OFFSET => {
            &message[PAYLOAD_OFFSET..message.len() - 1]
        }
        _ => &[],
    }
}

/// Index of the next frame start marker after offset 0
pub fn next_frame_start(buffer: &[u8]) -> Option<usize> {
    buffer
        .iter()
        .skip(1)
        .position(|&b| b == FRAME_START)
        .map(|i| i + 1)
}

/// Address bytes of a frame, if it is long enough to carry them
pub fn address_field(buffer: &[u8]) -> Option<&[u8]> {
    buffer.get(ADDRESS_RANGE)
}

/// Object code bytes of a frame, if it is long enough to carry them
pub fn code_field(buffer: &[u8]) -> Option<&[u8]> {
    buffer.get(CODE_RANGE)
}

/// Fixed-capacity buffer holding at most one frame
#[derive(Clone, PartialEq, Eq)]
pub struct MessageBuffer {
    bytes: [u8; MAX_MESSAGE_SIZE],
}

impl MessageBuffer {
    /// Create an empty (all zero) buffer
    pub fn new() -> Self {
        Self {
            bytes: [0; MAX_MESSAGE_SIZE],
        }
    }

    /// Copy `data` into a fresh buffer; anything beyond the capacity is dropped
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut buffer = Self::new();
        let len = data.len().min(MAX_MESSAGE_SIZE);
        buffer.bytes[..len].copy_from_slice(&data[..len]);
        buffer
    }

    /// The complete message held, if any
    pub fn message(&self) -> Option<&[u8]> {
        locate_message(&self.bytes)
    }

    /// The payload of the held message (empty when there is none)
    pub fn payload(&self) -> &[u8] {
        extract_payload(&self.bytes)
    }

    /// Zero the whole buffer
    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    /// Raw bytes, including any unused tail
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MessageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "MessageBuffer({:?})", String::from_utf8_lossy(message)),
            None => f.write_str("MessageBuffer(<incomplete>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Command;

    #[test]
    fn test_locate_message() {
        let buffer = MessageBuffer::from_bytes(b"#05:00*S853 3\r");
        assert_eq!(buffer.message(), Some(&b"#05:00*S853 3\r"[..]));
    }

    #[test]
    fn test_locate_message_without_terminator() {
        assert_eq!(locate_message(b"#05:00*S853 3"), None);
        assert_eq!(locate_message(&[0u8; MAX_MESSAGE_SIZE]), None);
        assert_eq!(locate_message(&[b'#'; MAX_MESSAGE_SIZE]), None);
        assert!(MessageBuffer::new().message().is_none());
    }

    #[test]
    fn test_locate_message_stops_at_first_terminator() {
        let buffer = b"#07:00*S853 1\r#05:00*S853 3\r";
        assert_eq!(locate_message(buffer), Some(&b"#07:00*S853 1\r"[..]));
    }

    #[test]
    fn test_extract_payload() {
        let buffer = MessageBuffer::from_bytes(b"#05:00*V852 1500;0000001C\r");
        assert_eq!(buffer.payload(), b"1500;0000001C");
    }

    #[test]
    fn test_extract_payload_short_message() {
        assert_eq!(extract_payload(b"#05:00\r"), b"");
        assert_eq!(extract_payload(b"\r"), b"");
        // Exactly the header and terminator: nothing after the offset
        assert_eq!(extract_payload(b"#05:00*S853 \r"), b"");
        assert_eq!(extract_payload(b""), b"");
    }

    #[test]
    fn test_extract_payload_incomplete() {
        assert_eq!(extract_payload(b"#05:00*V852 1500;000"), b"");
    }

    #[test]
    fn test_next_frame_start() {
        assert_eq!(next_frame_start(b"#07:00*S853 1\r#05"), Some(14));
        assert_eq!(next_frame_start(b"#07:00*S853 1\r"), None);
        assert_eq!(next_frame_start(b"noise#05:00"), Some(5));
        assert_eq!(next_frame_start(b""), None);
    }

    #[test]
    fn test_address_field() {
        assert_eq!(address_field(b"#05:00?S853\r"), Some(&b"05"[..]));
        assert_eq!(address_field(b"#0"), None);
    }

    #[test]
    fn test_code_field() {
        assert_eq!(code_field(b"#05:00*S855 160\r"), Some(&b"S855"[..]));
        assert_eq!(code_field(b"#05:00*S8"), None);
    }

    #[test]
    fn test_payload_recovered_for_every_command() {
        for command in Command::ALL {
            let code = command.code();
            for marker in ['*', '!'] {
                for address in 1..=98u8 {
                    let response = format!("#{:02}:00{}{} 35;-2\r", address, marker, code);
                    let buffer = MessageBuffer::from_bytes(response.as_bytes());
                    assert_eq!(buffer.payload(), b"35;-2", "{}", response.trim_end());
                    let expected = format!("{:02}", address);
                    assert_eq!(address_field(buffer.as_bytes()), Some(expected.as_bytes()));
                    assert_eq!(code_field(buffer.as_bytes()), Some(code.as_bytes()));
                }
            }
        }
    }

    #[test]
    fn test_from_bytes_truncates() {
        let long = [b'x'; MAX_MESSAGE_SIZE + 10];
        let buffer = MessageBuffer::from_bytes(&long);
        assert_eq!(buffer.as_bytes().len(), MAX_MESSAGE_SIZE);
    }
}
