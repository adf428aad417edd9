//! Multidrop Protocol Communication
//!
//! Implements the fixed-format ASCII request/response protocol spoken by
//! turbomolecular pump controllers on a shared RS-485 line.
//!
//! Every exchange is one [`Dialog`]: write a request, read frames until one
//! carries our address, or give up when the response timeout elapses.

pub mod codec;
pub mod commands;
mod config;
pub mod dialog;
mod endpoint;
mod error;
pub mod frame;
pub mod network;
pub mod serial;
mod stream;

pub use commands::{Command, Operation, Request};
pub use config::NetworkConfig;
pub use dialog::{Dialog, DialogResult, DialogState};
pub use endpoint::Endpoint;
pub use error::{ErrorCategory, ErrorKind, ProtocolError};
pub use frame::{extract_payload, locate_message, MessageBuffer};
pub use network::MultidropNetwork;
pub use serial::{list_ports, open_port, PortInfo};
pub use stream::SerialChannel;

/// Default baud rate of the RS-485 line
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Default time to wait for a response after the request was written
pub const DEFAULT_TIMEOUT_MS: u64 = 500;

/// Maximum length in bytes of any frame, sent or received
pub const MAX_MESSAGE_SIZE: usize = 80;
