//! Core types for three-phase meter data.

use core::fmt;
use core::ops::{Index, IndexMut};
use core::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Number of input registers read per meter, starting at address 0.
pub const REGISTER_COUNT: u16 = 10;

/// First input register of the measurement block.
pub const REGISTER_START: u16 = 0;

/// One of the three monitored electrical lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Phase {
    L1,
    L2,
    L3,
}

impl Phase {
    /// All phases in polling order.
    pub const ALL: [Phase; 3] = [Phase::L1, Phase::L2, Phase::L3];

    /// Short label used in topics and payload keys ("L1", "L2", "L3").
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Phase::L1 => "L1",
            Phase::L2 => "L2",
            Phase::L3 => "L3",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Phase {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "L1" => Ok(Phase::L1),
            "L2" => Ok(Phase::L2),
            "L3" => Ok(Phase::L3),
            _ => Err(ParseError::UnknownPhase(s.to_string())),
        }
    }
}

/// One value per phase.
///
/// # Examples
///
/// ```
/// use powerman_types::{Phase, PhaseSet};
///
/// let raw = PhaseSet::new(100u16, 200, 150);
/// assert_eq!(raw[Phase::L2], 200);
/// assert_eq!(raw.map(|v| u32::from(v) * 2)[Phase::L3], 300);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseSet<T> {
    pub l1: T,
    pub l2: T,
    pub l3: T,
}

impl<T> PhaseSet<T> {
    /// Create a set from explicit per-phase values.
    pub const fn new(l1: T, l2: T, l3: T) -> Self {
        Self { l1, l2, l3 }
    }

    /// Build a set by evaluating `f` for each phase.
    pub fn from_fn(mut f: impl FnMut(Phase) -> T) -> Self {
        Self {
            l1: f(Phase::L1),
            l2: f(Phase::L2),
            l3: f(Phase::L3),
        }
    }

    /// Transform every value.
    pub fn map<U>(self, mut f: impl FnMut(T) -> U) -> PhaseSet<U> {
        PhaseSet {
            l1: f(self.l1),
            l2: f(self.l2),
            l3: f(self.l3),
        }
    }

    /// Iterate over `(phase, &value)` pairs in phase order.
    pub fn iter(&self) -> impl Iterator<Item = (Phase, &T)> {
        [
            (Phase::L1, &self.l1),
            (Phase::L2, &self.l2),
            (Phase::L3, &self.l3),
        ]
        .into_iter()
    }
}

impl<T: Clone> PhaseSet<T> {
    /// A set holding the same value for every phase.
    pub fn splat(value: T) -> Self {
        Self {
            l1: value.clone(),
            l2: value.clone(),
            l3: value,
        }
    }
}

impl<T> Index<Phase> for PhaseSet<T> {
    type Output = T;

    fn index(&self, phase: Phase) -> &T {
        match phase {
            Phase::L1 => &self.l1,
            Phase::L2 => &self.l2,
            Phase::L3 => &self.l3,
        }
    }
}

impl<T> IndexMut<Phase> for PhaseSet<T> {
    fn index_mut(&mut self, phase: Phase) -> &mut T {
        match phase {
            Phase::L1 => &mut self.l1,
            Phase::L2 => &mut self.l2,
            Phase::L3 => &mut self.l3,
        }
    }
}

/// Decoded measurement block from a single phase meter.
///
/// Produced once per poll; all derived fields are computed at decode time.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseReading {
    /// Line voltage in volts.
    pub voltage: f64,
    /// Current in amperes.
    pub current: f64,
    /// Active power as reported by the meter.
    pub power: f64,
    /// Low 16 bits of the energy counter (Wh). This is the wrapping counter.
    pub energy_low: u16,
    /// High 16 bits of the energy counter.
    pub energy_high: u16,
    /// Full 32-bit energy counter scaled to kWh.
    pub energy_full: f64,
    /// Line frequency in hertz.
    pub frequency: f64,
    /// Power factor.
    pub power_factor: f64,
    /// Alarm status word (signed).
    pub alarm_status: i16,
}

impl PhaseReading {
    /// Decode a reading from the input register block starting at address 0.
    ///
    /// Register layout:
    /// - 0: voltage (x0.1)
    /// - 1: current (x0.001)
    /// - 3: power (x0.0001)
    /// - 5: energy, low word
    /// - 6: energy, high word
    /// - 7: frequency (x0.1)
    /// - 8: power factor (x0.001)
    /// - 9: alarm status (two's complement)
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientRegisters`] if fewer than
    /// [`REGISTER_COUNT`] registers are supplied.
    ///
    /// # Examples
    ///
    /// ```
    /// use powerman_types::PhaseReading;
    ///
    /// let regs = [2301, 5230, 0, 11500, 0, 1200, 1, 500, 950, 0xFFFF];
    /// let reading = PhaseReading::from_registers(&regs).unwrap();
    /// assert_eq!(reading.voltage, 230.1);
    /// assert_eq!(reading.energy_low, 1200);
    /// assert_eq!(reading.alarm_status, -1);
    /// ```
    pub fn from_registers(registers: &[u16]) -> Result<Self, ParseError> {
        let expected = usize::from(REGISTER_COUNT);
        if registers.len() < expected {
            return Err(ParseError::InsufficientRegisters {
                expected,
                actual: registers.len(),
            });
        }

        let energy_low = registers[5];
        let energy_high = registers[6];
        let energy_wide = (u32::from(energy_high) << 16) + u32::from(energy_low);

        Ok(Self {
            voltage: round_to(f64::from(registers[0]) * 0.1, 1),
            current: round_to(f64::from(registers[1]) * 0.001, 1),
            power: round_to(f64::from(registers[3]) * 0.0001, 2),
            energy_low,
            energy_high,
            energy_full: round_to(f64::from(energy_wide) * 0.001, 1),
            frequency: round_to(f64::from(registers[7]) * 0.1, 1),
            power_factor: round_to(f64::from(registers[8]) * 0.001, 2),
            alarm_status: registers[9] as i16,
        })
    }
}

/// Round `value` to `places` decimal places (half away from zero).
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_from_str() {
        assert_eq!("L1".parse::<Phase>().unwrap(), Phase::L1);
        assert_eq!("l3".parse::<Phase>().unwrap(), Phase::L3);
        assert!("L4".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_set_index_mut() {
        let mut set = PhaseSet::splat(0u16);
        set[Phase::L2] = 7;
        assert_eq!(set, PhaseSet::new(0, 7, 0));
    }

    #[test]
    fn test_phase_set_iter_order() {
        let set = PhaseSet::from_fn(|p| p.label());
        let labels: Vec<_> = set.iter().map(|(_, v)| *v).collect();
        assert_eq!(labels, ["L1", "L2", "L3"]);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.005_1, 2), 1.01);
        assert_eq!(round_to(230.14, 1), 230.1);
        assert_eq!(round_to(-0.456, 2), -0.46);
    }
}
