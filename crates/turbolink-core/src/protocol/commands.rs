//! Protocol commands
//!
//! Defines the command groups understood by the pump controllers and renders
//! requests into the wire grammar:
//!
//! ```text
//! #AA:00<op><code>[ <arg>]\r
//! ```

use serde::{Deserialize, Serialize};

use super::{frame::TERMINATOR, Endpoint, MAX_MESSAGE_SIZE};

/// Whether a request reads a value or changes something
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Read a value ('?')
    Query,
    /// Change a value or trigger an action ('!')
    Command,
}

impl Operation {
    /// Marker byte on the wire
    pub fn marker(&self) -> u8 {
        match self {
            Operation::Query => b'?',
            Operation::Command => b'!',
        }
    }
}

/// Protocol commands for pump communication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Pump type, DSP version and full speed (S851)
    PumpType,

    /// Start/stop the pump (C852)
    PumpControl,

    /// Rotational speed and status flags (V852)
    PumpSpeed,

    /// Vent options (S853)
    VentOptions,

    /// Timer setting in minutes (S854)
    TimerSetting,

    /// Power limit in watts (S855)
    PowerLimit,

    /// Motor and controller temperatures (V859)
    Temperatures,

    /// Restore factory settings (S867)
    FactoryReset,

    /// Vent valve control (C875)
    VentValve,
}

impl Command {
    /// Every command group, in wire order
    pub const ALL: [Command; 9] = [
        Command::PumpType,
        Command::PumpControl,
        Command::PumpSpeed,
        Command::VentOptions,
        Command::TimerSetting,
        Command::PowerLimit,
        Command::Temperatures,
        Command::FactoryReset,
        Command::VentValve,
    ];
    /// Object type letter: C(ommand), S(etup) or V(alue)
    pub fn object_type(&self) -> char {
        match self {
            Command::PumpControl | Command::VentValve => 'C',
            Command::PumpSpeed | Command::Temperatures => 'V',
            Command::PumpType
            | Command::VentOptions
            | Command::TimerSetting
            | Command::PowerLimit
            | Command::FactoryReset => 'S',
        }
    }

    /// Three-digit command group
    pub fn group(&self) -> u16 {
        match self {
            Command::PumpType => 851,
            Command::PumpControl | Command::PumpSpeed => 852,
            Command::VentOptions => 853,
            Command::TimerSetting => 854,
            Command::PowerLimit => 855,
            Command::Temperatures => 859,
            Command::FactoryReset => 867,
            Command::VentValve => 875,
        }
    }

    /// Object code as written on the wire, e.g. `S851`
    pub fn code(&self) -> String {
        format!("{}{}", self.object_type(), self.group())
    }

    /// Find the command for an object code such as `V852`
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code)
    }
}

/// One request ready to be encoded and sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Controller the request is for
    pub endpoint: Endpoint,
    /// Query or command
    pub operation: Operation,
    /// Command group
    pub command: Command,
    /// Argument for commands that take one
    pub argument: Option<u32>,
}

impl Request {
    /// A query without argument
    pub fn query(endpoint: Endpoint, command: Command) -> Self {
        Self {
            endpoint,
            operation: Operation::Query,
            command,
            argument: None,
        }
    }

    /// A command carrying `argument`
    pub fn command(endpoint: Endpoint, command: Command, argument: u32) -> Self {
        Self {
            endpoint,
            operation: Operation::Command,
            command,
            argument: Some(argument),
        }
    }

    /// Render the request into wire bytes, terminator included
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = format!(
            "#{}:00{}{}",
            self.endpoint,
            self.operation.marker() as char,
            self.command.code()
        )
        .into_bytes();
        if let Some(argument) = self.argument {
            bytes.extend_from_slice(format!(" {}", argument).as_bytes());
        }
        bytes.push(TERMINATOR);
        debug_assert!(bytes.len() <= MAX_MESSAGE_SIZE);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes() {
        assert_eq!(Command::PumpType.code(), "S851");
        assert_eq!(Command::PumpControl.code(), "C852");
        assert_eq!(Command::PumpSpeed.code(), "V852");
        assert_eq!(Command::Temperatures.code(), "V859");
        assert_eq!(Command::VentValve.code(), "C875");
    }

    #[test]
    fn test_command_from_code() {
        assert_eq!(Command::from_code("S854"), Some(Command::TimerSetting));
        assert_eq!(Command::from_code("V852"), Some(Command::PumpSpeed));
        assert_eq!(Command::from_code("S999"), None);
    }

    #[test]
    fn test_encode_query() {
        let request = Request::query(Endpoint::new(5), Command::VentOptions);
        assert_eq!(request.encode(), b"#05:00?S853\r".to_vec());
    }

    #[test]
    fn test_encode_command_with_argument() {
        let request = Request::command(Endpoint::new(12), Command::TimerSetting, 8);
        assert_eq!(request.encode(), b"#12:00!S854 8\r".to_vec());
    }

    #[test]
    fn test_encode_wildcard() {
        let request = Request::command(Endpoint::WILDCARD, Command::PumpControl, 0);
        assert_eq!(request.encode(), b"#99:00!C852 0\r".to_vec());
    }
}
