//! Endpoint-addressed pump operations
//!
//! [`MultidropNetwork`] owns the line and exposes one method per command
//! group. Each call is a single dialog with the addressed controller.

use std::time::Duration;

use tokio_serial::SerialStream;
use tracing::info;

use super::codec::{self, send_message, send_query};
use super::{
    open_port, Command, Endpoint, MessageBuffer, NetworkConfig, ProtocolError, Request,
    SerialChannel, DEFAULT_TIMEOUT_MS,
};
use crate::pump::{PumpInfo, PumpStatus, PumpTemperature, VentMode};
use crate::units::{Hertz, Watts};

/// Timer setting range in whole minutes
pub const TIMER_RANGE_MINUTES: std::ops::RangeInclusive<u64> = 1..=30;

/// Power limit range in watts
pub const POWER_LIMIT_RANGE: std::ops::RangeInclusive<u32> = 50..=200;

/// Timer setting the controller ships with
pub const FACTORY_TIMER: Duration = Duration::from_secs(8 * 60);

/// Power limit the controller ships with
pub const FACTORY_POWER_LIMIT: Watts = Watts(160);

/// Pump controllers sharing one RS-485 line
pub struct MultidropNetwork<C: SerialChannel> {
    channel: C,
    timeout: Duration,
}

impl MultidropNetwork<SerialStream> {
    /// Open the serial port named in `config`
    pub fn open(config: &NetworkConfig) -> Result<Self, ProtocolError> {
        let port = open_port(config)?;
        info!("Opened {} at {} baud", config.port_name, config.baud_rate);
        Ok(Self::new(port).with_timeout(config.timeout()))
    }
}

impl<C: SerialChannel> MultidropNetwork<C> {
    /// Use an already open channel with the default response timeout
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Set the response timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the response timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Give the channel back
    pub fn into_inner(self) -> C {
        self.channel
    }

    async fn query(
        &mut self,
        endpoint: Endpoint,
        command: Command,
    ) -> Result<MessageBuffer, ProtocolError> {
        let request = Request::query(endpoint, command);
        send_query(&mut self.channel, &request, self.timeout).await
    }

    async fn command(
        &mut self,
        endpoint: Endpoint,
        command: Command,
        argument: u32,
    ) -> Result<(), ProtocolError> {
        send_message(
            &mut self.channel,
            &Request::command(endpoint, command, argument),
            self.timeout,
        )
        .await
    }

    /// Get pump type, DSP version and full rotational speed
    pub async fn pump_info(&mut self, endpoint: Endpoint) -> Result<PumpInfo, ProtocolError> {
        let request = Request::command(endpoint, Command::PumpType, 1);
        let response = send_query(&mut self.channel, &request, self.timeout).await?;
        codec::parse_pump_info(response.payload())
    }

    /// Start the pump
    pub async fn start_pump(&mut self, endpoint: Endpoint) -> Result<(), ProtocolError> {
        self.command(endpoint, Command::PumpControl, 1).await
    }

    /// Stop the pump
    pub async fn stop_pump(&mut self, endpoint: Endpoint) -> Result<(), ProtocolError> {
        self.command(endpoint, Command::PumpControl, 0).await
    }

    /// Get the current rotational speed
    pub async fn pump_current_speed(&mut self, endpoint: Endpoint) -> Result<Hertz, ProtocolError> {
        let response = self.query(endpoint, Command::PumpSpeed).await?;
        codec::parse_speed(response.payload())
    }

    /// Get the status flags
    pub async fn pump_status(&mut self, endpoint: Endpoint) -> Result<PumpStatus, ProtocolError> {
        let response = self.query(endpoint, Command::PumpSpeed).await?;
        codec::parse_status(response.payload())
    }

    /// Get the vent mode
    pub async fn pump_vent_mode(&mut self, endpoint: Endpoint) -> Result<VentMode, ProtocolError> {
        let response = self.query(endpoint, Command::VentOptions).await?;
        codec::parse_vent_mode(response.payload())
    }

    /// Set the vent mode
    pub async fn set_pump_vent_mode(
        &mut self,
        endpoint: Endpoint,
        mode: VentMode,
    ) -> Result<(), ProtocolError> {
        self.command(endpoint, Command::VentOptions, mode.digit() as u32)
            .await
    }

    /// Restore the factory vent mode
    pub async fn reset_pump_vent_mode(&mut self, endpoint: Endpoint) -> Result<(), ProtocolError> {
        self.set_pump_vent_mode(endpoint, VentMode::FACTORY_DEFAULT)
            .await
    }

    /// Get the timer setting
    pub async fn pump_timer(&mut self, endpoint: Endpoint) -> Result<Duration, ProtocolError> {
        let response = self.query(endpoint, Command::TimerSetting).await?;
        let minutes = codec::parse_unsigned(response.payload())?;
        Ok(Duration::from_secs(minutes as u64 * 60))
    }

    /// Set the timer.
    ///
    /// # Panics
    ///
    /// If `timer` is not a whole number of minutes within 1..=30. Nothing is
    /// sent in that case.
    pub async fn set_pump_timer(
        &mut self,
        endpoint: Endpoint,
        timer: Duration,
    ) -> Result<(), ProtocolError> {
        let minutes = timer.as_secs() / 60;
        assert!(
            timer.subsec_nanos() == 0 && timer.as_secs() % 60 == 0,
            "pump timer must be whole minutes, got {:?}",
            timer
        );
        assert!(
            TIMER_RANGE_MINUTES.contains(&minutes),
            "pump timer must be 1..=30 minutes, got {}",
            minutes
        );
        self.command(endpoint, Command::TimerSetting, minutes as u32)
            .await
    }

    /// Restore the factory timer setting
    pub async fn reset_pump_timer(&mut self, endpoint: Endpoint) -> Result<(), ProtocolError> {
        self.set_pump_timer(endpoint, FACTORY_TIMER).await
    }

    /// Get the power limit
    pub async fn pump_power_limit(&mut self, endpoint: Endpoint) -> Result<Watts, ProtocolError> {
        let response = self.query(endpoint, Command::PowerLimit).await?;
        codec::parse_unsigned(response.payload()).map(Watts)
    }

    /// Set the power limit.
    ///
    /// # Panics
    ///
    /// If `limit` is outside 50..=200 W. Nothing is sent in that case.
    pub async fn set_pump_power_limit(
        &mut self,
        endpoint: Endpoint,
        limit: Watts,
    ) -> Result<(), ProtocolError> {
        assert!(
            POWER_LIMIT_RANGE.contains(&limit.0),
            "pump power limit must be 50..=200 W, got {}",
            limit
        );
        self.command(endpoint, Command::PowerLimit, limit.0).await
    }

    /// Restore the factory power limit
    pub async fn reset_pump_power_limit(&mut self, endpoint: Endpoint) -> Result<(), ProtocolError> {
        self.set_pump_power_limit(endpoint, FACTORY_POWER_LIMIT)
            .await
    }

    /// Get motor and controller temperatures
    pub async fn pump_temperature(
        &mut self,
        endpoint: Endpoint,
    ) -> Result<PumpTemperature, ProtocolError> {
        let response = self.query(endpoint, Command::Temperatures).await?;
        codec::parse_temperature(response.payload())
    }

    /// Restore every factory setting
    pub async fn factory_reset_pump(&mut self, endpoint: Endpoint) -> Result<(), ProtocolError> {
        info!("Factory reset of pump {}", endpoint);
        self.command(endpoint, Command::FactoryReset, 1).await
    }

    /// Close the vent valve
    pub async fn close_vent_valve(&mut self, endpoint: Endpoint) -> Result<(), ProtocolError> {
        self.command(endpoint, Command::VentValve, 1).await
    }
}
