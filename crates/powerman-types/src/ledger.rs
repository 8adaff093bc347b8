//! Lifetime energy ledger arithmetic.
//!
//! The ledger keeps, per phase, the last raw counter value it has seen and the
//! lifetime total accumulated from counter deltas. [`LedgerState::apply`] is
//! pure; persisting the result atomically is the store's job.
//!
//! Rules:
//! - If every stored raw value is zero the ledger is treated as a cold start:
//!   observed values become the new baseline and nothing is added to totals.
//! - A phase with no new observation keeps both its raw value and its total.
//! - Otherwise `total += delta(new, old)`.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::counter::delta;
use crate::types::{Phase, PhaseSet, round_to};

/// Stored ledger contents before an update.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LedgerState {
    /// Last observed raw counter per phase.
    pub raw: PhaseSet<u16>,
    /// Lifetime total per phase in Wh.
    pub total: PhaseSet<f64>,
}

impl LedgerState {
    /// Whether no raw baseline has been recorded yet.
    #[must_use]
    pub fn is_cold(&self) -> bool {
        self.raw.iter().all(|(_, v)| *v == 0)
    }

    /// Fold a cycle's observations into the ledger.
    ///
    /// `observed` holds `None` for phases whose meter could not be read.
    #[must_use]
    pub fn apply(&self, observed: &PhaseSet<Option<u16>>) -> LedgerUpdate {
        let cold_start = self.is_cold();
        let mut raw = self.raw;
        let mut total = self.total;
        let mut deltas = PhaseSet::splat(0u32);

        for phase in Phase::ALL {
            let Some(new_raw) = observed[phase] else {
                continue;
            };
            if !cold_start {
                let d = delta(new_raw, self.raw[phase]);
                deltas[phase] = d;
                total[phase] += f64::from(d);
            }
            raw[phase] = new_raw;
        }

        LedgerUpdate {
            previous_raw: self.raw,
            raw,
            deltas,
            total,
            cold_start,
        }
    }
}

/// Result of applying one cycle to the ledger.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LedgerUpdate {
    /// Raw values stored before this update.
    pub previous_raw: PhaseSet<u16>,
    /// Raw values after this update.
    pub raw: PhaseSet<u16>,
    /// Delta added to each phase total (zero on cold start).
    pub deltas: PhaseSet<u32>,
    /// Lifetime totals after this update (Wh).
    pub total: PhaseSet<f64>,
    /// Whether this update only recorded a baseline.
    pub cold_start: bool,
}

impl LedgerUpdate {
    /// Ledger contents after the update.
    #[must_use]
    pub fn state(&self) -> LedgerState {
        LedgerState {
            raw: self.raw,
            total: self.total,
        }
    }

    /// Sum of the three totals in kWh, rounded to two decimals.
    #[must_use]
    pub fn combined_kwh(&self) -> f64 {
        combined_kwh(&self.total)
    }

    /// Per-phase delta between the raw row before and after the write.
    #[must_use]
    pub fn raw_movement(&self) -> PhaseSet<u32> {
        PhaseSet::from_fn(|p| delta(self.raw[p], self.previous_raw[p]))
    }
}

/// Sum of per-phase totals (Wh) expressed in kWh with two decimals.
#[must_use]
pub fn combined_kwh(total: &PhaseSet<f64>) -> f64 {
    round_to((total.l1 + total.l2 + total.l3) / 1000.0, 2)
}
