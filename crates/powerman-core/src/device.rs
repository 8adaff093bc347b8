//! Modbus TCP access to phase meters.
//!
//! Each read opens a fresh connection to the gateway, reads the ten input
//! registers starting at address 0 from the meter's unit id, and closes the
//! connection again. Connect and read are each bounded by their own timeout.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tokio_modbus::client::tcp;
use tokio_modbus::prelude::*;
use tracing::debug;

use powerman_types::{Phase, PhaseReading, REGISTER_COUNT, REGISTER_START};

use crate::error::{Error, Result};
use crate::traits::RegisterSource;

/// Default Modbus TCP port.
pub const DEFAULT_MODBUS_PORT: u16 = 502;

/// Address of one phase meter on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterTarget {
    /// Phase this meter measures.
    pub phase: Phase,
    /// Gateway host name or IP address.
    pub host: String,
    /// Modbus unit (slave) identifier of the meter.
    pub unit_id: u8,
}

impl MeterTarget {
    /// Create a new target.
    pub fn new(phase: Phase, host: impl Into<String>, unit_id: u8) -> Self {
        Self {
            phase,
            host: host.into(),
            unit_id,
        }
    }
}

impl fmt::Display for MeterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} unit {})", self.phase, self.host, self.unit_id)
    }
}

/// Register source talking Modbus TCP.
#[derive(Debug, Clone)]
pub struct ModbusSource {
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl Default for ModbusSource {
    fn default() -> Self {
        Self {
            port: DEFAULT_MODBUS_PORT,
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(3),
        }
    }
}

impl ModbusSource {
    /// Create a source with default port and timeouts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a non-standard TCP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Bound the time spent establishing the TCP connection.
    pub fn connect_timeout(mut self, duration: Duration) -> Self {
        self.connect_timeout = duration;
        self
    }

    /// Bound the time spent waiting for the register response.
    pub fn read_timeout(mut self, duration: Duration) -> Self {
        self.read_timeout = duration;
        self
    }

    async fn resolve(&self, host: &str) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((host, self.port))
            .await
            .map_err(|source| Error::Resolve {
                host: host.to_string(),
                source,
            })?;
        addrs.next().ok_or_else(|| Error::NoAddress(host.to_string()))
    }

    async fn read_registers(&self, target: &MeterTarget) -> Result<Vec<u16>> {
        let addr = self.resolve(&target.host).await?;

        let mut ctx = timeout(
            self.connect_timeout,
            tcp::connect_slave(addr, Slave(target.unit_id)),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: "connect",
            duration: self.connect_timeout,
        })?
        .map_err(|source| Error::Connect { addr, source })?;

        let result = timeout(
            self.read_timeout,
            ctx.read_input_registers(REGISTER_START, REGISTER_COUNT),
        )
        .await;

        // The connection is per-read; a failed close changes nothing for the caller.
        let _ = ctx.disconnect().await;

        result
            .map_err(|_| Error::Timeout {
                operation: "read_input_registers",
                duration: self.read_timeout,
            })?
            .map_err(Error::Modbus)
    }
}

#[async_trait]
impl RegisterSource for ModbusSource {
    async fn read_phase(&self, target: &MeterTarget) -> Result<PhaseReading> {
        let registers = self.read_registers(target).await?;
        let reading = PhaseReading::from_registers(&registers)?;
        debug!("Decoded reading from {}: {:?}", target, reading);
        Ok(reading)
    }
}
