//! SQLite persistence for three-phase energy metering.
//!
//! The store keeps four kinds of data:
//!
//! - the ledger: last raw counter and lifetime total per phase, updated in
//!   one transaction per poll cycle
//! - history: one raw snapshot per poll cycle
//! - logs: diagnostic messages, written only while logging is enabled
//! - settings: the persisted logging flag
//!
//! Retention is applied by the caller through [`Store::prune_history`] and
//! [`Store::prune_logs`].
//!
//! # Example
//!
//! ```
//! use powerman_store::Store;
//! use powerman_types::PhaseSet;
//! use time::OffsetDateTime;
//!
//! let store = Store::open_in_memory()?;
//! let now = OffsetDateTime::now_utc();
//! let update = store.apply_reading(&PhaseSet::new(Some(100), Some(200), Some(150)), now)?;
//! assert!(update.cold_start);
//! store.append_history(&update.raw, now)?;
//! # Ok::<(), powerman_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{HistorySummary, LogRecord, RawCounterRow, StoredHistoryRecord, TotalsRow};
pub use queries::HistoryQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/powerman/data.db`
/// - macOS: `~/Library/Application Support/powerman/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\powerman\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("powerman")
        .join("data.db")
}
