//! Protocol errors

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes reported by pump controllers in a response frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The object does not accept this command (code 1)
    InvalidCommandForObject,
    /// Invalid query or command (code 2)
    InvalidQuery,
    /// A required parameter was not sent (code 3)
    MissingParameter,
    /// Parameter out of range (code 4)
    OutOfRange,
    /// The command is not accepted in the controller's current state (code 5)
    InvalidCommandInCurrentState,
    /// Checksum error (code 6)
    ChecksumError,
    /// EEPROM read or write error (code 7)
    IoError,
    /// Operation took too long (code 8)
    TimedOut,
    /// Invalid config ID (code 9)
    InvalidConfigId,
}

impl ErrorKind {
    /// Every kind, in code order
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::InvalidCommandForObject,
        ErrorKind::InvalidQuery,
        ErrorKind::MissingParameter,
        ErrorKind::OutOfRange,
        ErrorKind::InvalidCommandInCurrentState,
        ErrorKind::ChecksumError,
        ErrorKind::IoError,
        ErrorKind::TimedOut,
        ErrorKind::InvalidConfigId,
    ];

    /// Numeric code as carried on the wire
    pub fn code(&self) -> u8 {
        match self {
            ErrorKind::InvalidCommandForObject => 1,
            ErrorKind::InvalidQuery => 2,
            ErrorKind::MissingParameter => 3,
            ErrorKind::OutOfRange => 4,
            ErrorKind::InvalidCommandInCurrentState => 5,
            ErrorKind::ChecksumError => 6,
            ErrorKind::IoError => 7,
            ErrorKind::TimedOut => 8,
            ErrorKind::InvalidConfigId => 9,
        }
    }

    /// Look up the kind for a wire code, if the code is a known one
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.code() == code)
    }

    /// Conditions that a correct client never provokes.
    ///
    /// Seeing one of these means the request was built wrongly, not that
    /// the line or the pump misbehaved.
    pub fn is_internal_logic_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingParameter | ErrorKind::ChecksumError | ErrorKind::InvalidConfigId
        )
    }

    /// Category this kind belongs to when reported by a device
    pub fn category(&self) -> ErrorCategory {
        if self.is_internal_logic_error() {
            ErrorCategory::InternalLogic
        } else {
            ErrorCategory::Protocol
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            ErrorKind::InvalidCommandForObject => "Invalid command for object",
            ErrorKind::InvalidQuery => "Invalid query or command",
            ErrorKind::MissingParameter => "Missing parameter",
            ErrorKind::OutOfRange => "Parameter out of range",
            ErrorKind::InvalidCommandInCurrentState => "Invalid command in current state",
            ErrorKind::ChecksumError => "Checksum error",
            ErrorKind::IoError => "EEPROM read or write error",
            ErrorKind::TimedOut => "Operation took too long",
            ErrorKind::InvalidConfigId => "Invalid config ID",
        };
        f.write_str(message)
    }
}

/// Broad classification of a [`ProtocolError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// The line itself failed: I/O error, closed port or timeout
    Transport,
    /// The device answered with an error code, or the answer was malformed
    Protocol,
    /// The device rejected a request that a correct client never sends
    InternalLogic,
}

/// Errors that can occur during protocol communication
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The line failed while writing or reading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No frame for us arrived before the deadline
    #[error("Operation took too long")]
    TimedOut,

    /// The controller answered with a non-zero status code
    #[error("Pump reported error code {code}: {}", describe_code(.code))]
    Device {
        /// Status code as sent
        code: u8,
    },

    /// The answer did not have the expected structure
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// The serial port could not be set up
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// The named port does not exist
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Settings were missing or unreadable
    #[error("Configuration error: {0}")]
    Config(String),
}

fn describe_code(code: &u8) -> String {
    ErrorKind::from_code(*code)
        .map(|kind| kind.to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}

impl ProtocolError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ProtocolError::Malformed(reason.into())
    }

    /// The abstract kind this error is equivalent to, if any
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ProtocolError::Io(_) => Some(ErrorKind::IoError),
            ProtocolError::TimedOut => Some(ErrorKind::TimedOut),
            ProtocolError::Device { code } => ErrorKind::from_code(*code),
            ProtocolError::Malformed(_) => Some(ErrorKind::InvalidQuery),
            ProtocolError::SerialError(_)
            | ProtocolError::PortNotFound(_)
            | ProtocolError::Config(_) => None,
        }
    }

    /// Raw code reported by the device
    pub fn code(&self) -> Option<u8> {
        match self {
            ProtocolError::Device { code } => Some(*code),
            _ => None,
        }
    }

    /// Whether the failure came from the line or from the device
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProtocolError::Io(_)
            | ProtocolError::TimedOut
            | ProtocolError::SerialError(_)
            | ProtocolError::PortNotFound(_)
            | ProtocolError::Config(_) => ErrorCategory::Transport,
            ProtocolError::Device { code } => ErrorKind::from_code(*code)
                .map(|kind| kind.category())
                .unwrap_or(ErrorCategory::Protocol),
            ProtocolError::Malformed(_) => ErrorCategory::Protocol,
        }
    }

    /// Shorthand for `category() == ErrorCategory::InternalLogic`
    pub fn is_internal_logic_error(&self) -> bool {
        self.category() == ErrorCategory::InternalLogic
    }
}

impl PartialEq<ErrorKind> for ProtocolError {
    fn eq(&self, other: &ErrorKind) -> bool {
        self.kind() == Some(*other)
    }
}

impl From<tokio_serial::Error> for ProtocolError {
    fn from(e: tokio_serial::Error) -> Self {
        match e.kind {
            tokio_serial::ErrorKind::NoDevice => ProtocolError::PortNotFound(e.description),
            _ => ProtocolError::SerialError(e.to_string()),
        }
    }
}
