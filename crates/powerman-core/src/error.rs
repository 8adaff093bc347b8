//! Error types for powerman-core.
//!
//! Errors fall into two groups that the poll loop reports differently:
//!
//! | Error | Group | Typical cause |
//! |-------|-------|---------------|
//! | [`Error::Resolve`] | transport | DNS failure for the meter host |
//! | [`Error::Connect`] | transport | Gateway down, connection refused |
//! | [`Error::Timeout`] | transport | Meter not answering on the bus |
//! | [`Error::Modbus`] | transport | Exception response, broken frame |
//! | [`Error::InvalidData`] | decode | Short or malformed register block |
//! | [`Error::Unavailable`] | transport | Source refused the request (mock) |
//!
//! None of these are fatal to a poll cycle; the affected phase is skipped.

use std::net::SocketAddr;
use std::time::Duration;

use powerman_types::ParseError;

/// Result type for powerman-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while reading a meter.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Host name could not be resolved.
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        source: std::io::Error,
    },

    /// Host resolved to no usable address.
    #[error("No address found for {0}")]
    NoAddress(String),

    /// TCP connection to the gateway failed.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// An operation did not finish in time.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    /// Modbus request failed.
    #[error("Modbus error: {0}")]
    Modbus(#[source] std::io::Error),

    /// Register block could not be decoded.
    #[error("Invalid register data: {0}")]
    InvalidData(#[from] ParseError),

    /// The source refused to serve the request.
    #[error("Source unavailable: {0}")]
    Unavailable(String),
}

impl Error {
    /// Whether the failure happened while talking to the meter, as opposed to
    /// interpreting its answer.
    pub fn is_transport(&self) -> bool {
        !matches!(self, Error::InvalidData(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let timeout = Error::Timeout {
            operation: "read_input_registers",
            duration: Duration::from_secs(3),
        };
        assert!(timeout.is_transport());
        assert!(timeout.to_string().contains("timed out after 3s"));

        let decode = Error::from(ParseError::InsufficientRegisters {
            expected: 10,
            actual: 4,
        });
        assert!(!decode.is_transport());
        assert!(decode.to_string().contains("expected 10, got 4"));
    }
}
