//! Endpoint addressing

use std::fmt;

use serde::{Deserialize, Serialize};

/// Address of one controller on the multidrop line.
///
/// Always in `1..=99`. Address 99 is the wildcard: it reaches whatever
/// controller is listening and is never the address a controller answers with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Endpoint(u8);

impl Endpoint {
    /// The broadcast/wildcard address
    pub const WILDCARD: Endpoint = Endpoint(99);

    /// Create an endpoint.
    ///
    /// # Panics
    /// Panics if `address` is outside `1..=99`. Addresses come from
    /// configuration or code, so an invalid one is a bug in the caller.
    pub fn new(address: u8) -> Self {
        Self::checked(address).expect("endpoint address must be in 1..=99")
    }

    /// Create an endpoint, returning `None` if `address` is outside `1..=99`
    pub fn checked(address: u8) -> Option<Self> {
        if (1..=99).contains(&address) {
            Some(Endpoint(address))
        } else {
            None
        }
    }

    /// Numeric address
    pub fn get(&self) -> u8 {
        self.0
    }

    /// Whether this is the wildcard address
    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.0)
    }
}

impl TryFrom<u8> for Endpoint {
    type Error = String;

    fn try_from(address: u8) -> Result<Self, Self::Error> {
        Endpoint::checked(address)
            .ok_or_else(|| format!("endpoint address {} is outside 1..=99", address))
    }
}

impl From<Endpoint> for u8 {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.0
    }
}
