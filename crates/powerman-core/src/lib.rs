//! Register access for three-phase energy meters.
//!
//! This crate reads the measurement block of Modbus TCP energy meters and
//! decodes it into [`PhaseReading`]s.
//!
//! # Features
//!
//! - [`ModbusSource`]: per-read Modbus TCP connection with bounded connect and
//!   read timeouts
//! - [`RegisterSource`]: trait seam shared by real and mock sources
//! - [`MockSource`]: scriptable source for tests (per-phase readings, failure
//!   injection, latency)
//!
//! # Example
//!
//! ```no_run
//! use powerman_core::{MeterTarget, ModbusSource, RegisterSource};
//! use powerman_types::Phase;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = ModbusSource::new();
//!     let target = MeterTarget::new(Phase::L1, "10.0.6.84", 1);
//!     let reading = source.read_phase(&target).await?;
//!     println!("{} V, counter {}", reading.voltage, reading.energy_low);
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod mock;
pub mod traits;

pub use device::{DEFAULT_MODBUS_PORT, MeterTarget, ModbusSource};
pub use error::{Error, Result};
pub use mock::MockSource;
pub use traits::RegisterSource;

pub use powerman_types as types;
pub use powerman_types::{Phase, PhaseReading, PhaseSet};
