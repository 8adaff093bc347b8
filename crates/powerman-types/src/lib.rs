//! Platform-agnostic types for three-phase energy meters.
//!
//! This crate holds the pieces that do not touch I/O:
//!
//! - [`Phase`] and [`PhaseSet`] for per-line values
//! - [`PhaseReading`] and its decoding from a Modbus input register block
//! - [`counter`]: wraparound-aware deltas over 16-bit energy counters
//! - [`ledger`]: folding counter deltas into lifetime totals
//!
//! # Example
//!
//! ```
//! use powerman_types::{LedgerState, PhaseSet};
//!
//! let baseline = LedgerState::default().apply(&PhaseSet::new(Some(100), Some(200), Some(150)));
//! assert!(baseline.cold_start);
//!
//! let next = baseline.state().apply(&PhaseSet::new(Some(150), Some(50), Some(150)));
//! assert_eq!(next.total, PhaseSet::new(50.0, 65386.0, 0.0));
//! ```

pub mod counter;
pub mod error;
pub mod ledger;
pub mod types;

pub use counter::{COUNTER_MODULUS, checked_counter, checked_delta, delta};
pub use error::{CounterError, ParseError, ParseResult};
pub use ledger::{LedgerState, LedgerUpdate, combined_kwh};
pub use types::{Phase, PhaseReading, PhaseSet, REGISTER_COUNT, REGISTER_START, round_to};
