//! Mock register source for testing.
//!
//! [`MockSource`] implements [`RegisterSource`] with per-phase readings that
//! tests can change between poll cycles, plus failure injection per phase.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use powerman_types::{Phase, PhaseReading, PhaseSet};

use crate::device::MeterTarget;
use crate::error::{Error, Result};
use crate::traits::RegisterSource;

/// A scriptable register source.
///
/// # Example
///
/// ```
/// use powerman_core::{MeterTarget, MockSource, RegisterSource};
/// use powerman_types::Phase;
///
/// #[tokio::main]
/// async fn main() {
///     let source = MockSource::new();
///     source.set_energy(Phase::L1, 1200).await;
///
///     let target = MeterTarget::new(Phase::L1, "mock", 1);
///     let reading = source.read_phase(&target).await.unwrap();
///     assert_eq!(reading.energy_low, 1200);
/// }
/// ```
pub struct MockSource {
    readings: RwLock<PhaseSet<PhaseReading>>,
    failing: RwLock<HashSet<Phase>>,
    read_count: AtomicU32,
    /// Simulated read latency in milliseconds (0 = no delay).
    read_latency_ms: AtomicU64,
}

impl std::fmt::Debug for MockSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSource")
            .field("read_count", &self.read_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSource {
    /// Create a mock with a plausible idle reading on every phase.
    pub fn new() -> Self {
        Self {
            readings: RwLock::new(PhaseSet::splat(Self::default_reading())),
            failing: RwLock::new(HashSet::new()),
            read_count: AtomicU32::new(0),
            read_latency_ms: AtomicU64::new(0),
        }
    }

    fn default_reading() -> PhaseReading {
        PhaseReading {
            voltage: 230.0,
            current: 1.2,
            power: 0.28,
            energy_low: 0,
            energy_high: 0,
            energy_full: 0.0,
            frequency: 50.0,
            power_factor: 0.98,
            alarm_status: 0,
        }
    }

    /// Replace the full reading served for a phase.
    pub async fn set_reading(&self, phase: Phase, reading: PhaseReading) {
        self.readings.write().await[phase] = reading;
    }

    /// Set the raw energy counter served for a phase.
    pub async fn set_energy(&self, phase: Phase, energy_low: u16) {
        let mut readings = self.readings.write().await;
        let reading = &mut readings[phase];
        reading.energy_low = energy_low;
        let wide = (u32::from(reading.energy_high) << 16) + u32::from(energy_low);
        reading.energy_full = powerman_types::round_to(f64::from(wide) * 0.001, 1);
    }

    /// Set the instantaneous power served for a phase.
    pub async fn set_power(&self, phase: Phase, power: f64) {
        self.readings.write().await[phase].power = power;
    }

    /// Make reads for `phase` fail (or succeed again).
    pub async fn set_failing(&self, phase: Phase, failing: bool) {
        let mut set = self.failing.write().await;
        if failing {
            set.insert(phase);
        } else {
            set.remove(&phase);
        }
    }

    /// Add artificial latency to every read.
    pub fn set_read_latency(&self, latency: Duration) {
        self.read_latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Number of read attempts so far, failed ones included.
    pub fn read_count(&self) -> u32 {
        self.read_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RegisterSource for MockSource {
    async fn read_phase(&self, target: &MeterTarget) -> Result<PhaseReading> {
        self.read_count.fetch_add(1, Ordering::Relaxed);

        let latency = self.read_latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.failing.read().await.contains(&target.phase) {
            return Err(Error::Unavailable(format!("mock failure for {}", target)));
        }

        Ok(self.readings.read().await[target.phase])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(phase: Phase) -> MeterTarget {
        MeterTarget::new(phase, "mock", 1)
    }

    #[tokio::test]
    async fn test_default_reading() {
        let source = MockSource::new();
        let reading = source.read_phase(&target(Phase::L3)).await.unwrap();
        assert_eq!(reading.voltage, 230.0);
        assert_eq!(reading.energy_low, 0);
    }

    #[tokio::test]
    async fn test_set_energy_per_phase() {
        let source = MockSource::new();
        source.set_energy(Phase::L2, 65535).await;

        let l2 = source.read_phase(&target(Phase::L2)).await.unwrap();
        let l1 = source.read_phase(&target(Phase::L1)).await.unwrap();
        assert_eq!(l2.energy_low, 65535);
        assert_eq!(l2.energy_full, 65.5);
        assert_eq!(l1.energy_low, 0);
    }

    #[tokio::test]
    async fn test_set_reading_from_registers() {
        let source = MockSource::new();
        let reading =
            PhaseReading::from_registers(&[2391, 4200, 0, 9876, 0, 777, 0, 499, 950, 0]).unwrap();
        source.set_reading(Phase::L1, reading).await;

        let served = source.read_phase(&target(Phase::L1)).await.unwrap();
        assert_eq!(served, reading);
        assert_eq!(served.power, 0.99);
        assert_eq!(served.frequency, 49.9);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let source = MockSource::new();
        source.set_failing(Phase::L2, true).await;

        let err = source.read_phase(&target(Phase::L2)).await.unwrap_err();
        assert!(err.is_transport());
        assert!(source.read_phase(&target(Phase::L1)).await.is_ok());

        source.set_failing(Phase::L2, false).await;
        assert!(source.read_phase(&target(Phase::L2)).await.is_ok());
        assert_eq!(source.read_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_latency() {
        let source = MockSource::new();
        source.set_read_latency(Duration::from_millis(500));

        let start = tokio::time::Instant::now();
        source.read_phase(&target(Phase::L1)).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(500));
    }
}
