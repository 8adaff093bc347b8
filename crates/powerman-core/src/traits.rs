//! Trait abstraction for meter register access.
//!
//! [`RegisterSource`] abstracts over the Modbus TCP transport and the mock
//! used in tests, so the poll loop can be driven without hardware.

use async_trait::async_trait;

use powerman_types::PhaseReading;

use crate::device::MeterTarget;
use crate::error::Result;

/// Anything that can produce a decoded reading for a meter.
///
/// Implementations must bound their own connect and read time; callers do not
/// wrap these calls in timeouts.
///
/// # Example
///
/// ```ignore
/// use powerman_core::{MeterTarget, RegisterSource};
///
/// async fn print_voltage<S: RegisterSource>(source: &S, target: &MeterTarget) {
///     if let Ok(reading) = source.read_phase(target).await {
///         println!("{}: {} V", target.phase, reading.voltage);
///     }
/// }
/// ```
#[async_trait]
pub trait RegisterSource: Send + Sync {
    /// Read and decode the measurement block of one meter.
    async fn read_phase(&self, target: &MeterTarget) -> Result<PhaseReading>;
}
