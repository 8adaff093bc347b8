//! Error types for data parsing and counter validation in powerman-types.

use thiserror::Error;

/// Errors that can occur when decoding meter register blocks.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The register block is shorter than the decoder needs.
    #[error("Insufficient registers: expected {expected}, got {actual}")]
    InsufficientRegisters { expected: usize, actual: usize },

    /// Unknown phase label.
    #[error("Unknown phase: {0}")]
    UnknownPhase(String),
}

/// Errors raised while interpreting raw energy counters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum CounterError {
    /// A counter value outside the 16-bit register range was observed.
    ///
    /// Genuine hardware counters never leave `[0, 65535]`, so this indicates
    /// corrupted stored data. The reading is rejected.
    #[error("Counter value {0} is outside the 16-bit range [0, 65535]")]
    OutOfRange(i64),
}

/// Result type alias using powerman-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
