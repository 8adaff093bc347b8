//! Persisted diagnostic trail.
//!
//! Poll-loop diagnostics go to `tracing` unconditionally and to the `logs`
//! table only while the persisted logging flag is on. Announcements about the
//! log itself (toggling, clearing) are always persisted.

use powerman_store::Store;
use time::OffsetDateTime;

/// Announcement written when logging is switched on.
pub const LOGGING_ENABLED_MESSAGE: &str = "Logging enabled";
/// Announcement written when logging is switched off.
pub const LOGGING_DISABLED_MESSAGE: &str = "Logging disabled";
/// Announcement written after the log table is cleared.
pub const LOGS_CLEARED_MESSAGE: &str = "Logs cleared";

/// Persist `message` if logging is enabled. Returns whether it was written.
pub fn record(store: &Store, message: &str, at: OffsetDateTime) -> powerman_store::Result<bool> {
    if !store.logging_enabled()? {
        return Ok(false);
    }
    store.insert_log(message, at)?;
    Ok(true)
}

/// Persist `message` regardless of the logging flag.
pub fn announce(store: &Store, message: &str, at: OffsetDateTime) -> powerman_store::Result<()> {
    store.insert_log(message, at)?;
    Ok(())
}

/// Flip the logging flag and persist the matching announcement.
pub fn toggle(store: &Store, at: OffsetDateTime) -> powerman_store::Result<bool> {
    let enabled = store.toggle_logging()?;
    let message = if enabled {
        LOGGING_ENABLED_MESSAGE
    } else {
        LOGGING_DISABLED_MESSAGE
    };
    announce(store, message, at)?;
    Ok(enabled)
}

/// Delete every log entry, then persist the clear announcement.
pub fn clear(store: &Store, at: OffsetDateTime) -> powerman_store::Result<usize> {
    let deleted = store.clear_logs()?;
    announce(store, LOGS_CLEARED_MESSAGE, at)?;
    Ok(deleted)
}
