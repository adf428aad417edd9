//! # Turbolink Core Library
//!
//! Core functionality for controlling turbomolecular pump controllers that
//! share one RS-485 half-duplex multidrop line.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Frame primitives for the fixed-format ASCII command protocol
//! - A per-request transaction engine that tolerates foreign traffic on the bus
//! - A command/response codec for the 851–875 command groups
//! - An endpoint-addressed network façade (start/stop, speed, status, vent, ...)
//! - A simulated multidrop bus for running without hardware
//!
//! ## Example
//!
//! ```rust,ignore
//! use turbolink_core::protocol::{Endpoint, MultidropNetwork, NetworkConfig};
//!
//! let config = NetworkConfig::new("/dev/ttyUSB0");
//! let mut network = MultidropNetwork::open(&config)?;
//!
//! let pump = Endpoint::new(5);
//! network.start_pump(pump).await?;
//! println!("speed: {}", network.pump_current_speed(pump).await?);
//! ```

pub mod demo;
pub mod protocol;
pub mod pump;
pub mod units;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::demo::{DemoBus, DemoPump};
    pub use crate::protocol::{
        Endpoint, ErrorCategory, ErrorKind, MultidropNetwork, NetworkConfig, ProtocolError,
    };
    pub use crate::pump::{PumpInfo, PumpStatus, PumpTemperature, ServiceStatus, VentMode};
    pub use crate::units::{Celsius, Hertz, Watts};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
