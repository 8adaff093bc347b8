//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use time::OffsetDateTime;
use tracing::{debug, info};

use powerman_types::{LedgerState, LedgerUpdate, Phase, PhaseSet, checked_counter};

use crate::error::{Error, Result};
use crate::models::{HistorySummary, LogRecord, RawCounterRow, StoredHistoryRecord, TotalsRow};
use crate::queries::HistoryQuery;
use crate::schema::{self, LOGGING_ENABLED_KEY};

/// SQLite-based store for the energy ledger, history snapshots, diagnostic
/// logs and settings.
pub struct Store {
    conn: Connection,
}

fn to_datetime(value: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(value).map_err(|_| Error::InvalidTimestamp(value))
}

/// Ledger contents plus the most recent write time.
fn read_ledger(conn: &Connection) -> Result<(LedgerState, i64)> {
    let mut stmt = conn.prepare("SELECT phase, raw, total, updated_at FROM ledger")?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut state = LedgerState::default();
    let mut updated_at = 0;
    for (label, raw, total, at) in rows {
        // The table CHECK constraint only admits L1..L3.
        let Ok(phase) = label.parse::<Phase>() else {
            continue;
        };
        state.raw[phase] = checked_counter(raw).map_err(|source| Error::CorruptCounter {
            table: "ledger",
            source,
        })?;
        state.total[phase] = total;
        updated_at = updated_at.max(at);
    }

    Ok((state, updated_at))
}

type HistoryRow = (i64, i64, i64, i64, i64);

fn history_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn history_record((id, l1, l2, l3, recorded_at): HistoryRow) -> Result<StoredHistoryRecord> {
    Ok(StoredHistoryRecord {
        id,
        l1,
        l2,
        l3,
        timestamp: to_datetime(recorded_at)?,
    })
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }
}

// Ledger operations
impl Store {
    /// Current ledger contents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptCounter`] if a stored raw value is outside the
    /// 16-bit range.
    pub fn ledger_state(&self) -> Result<LedgerState> {
        Ok(read_ledger(&self.conn)?.0)
    }

    /// Last observed raw counters.
    pub fn raw_counters(&self) -> Result<RawCounterRow> {
        let (state, updated_at) = read_ledger(&self.conn)?;
        Ok(RawCounterRow {
            l1: state.raw.l1,
            l2: state.raw.l2,
            l3: state.raw.l3,
            timestamp: to_datetime(updated_at)?,
        })
    }

    /// Lifetime totals in Wh.
    pub fn totals(&self) -> Result<TotalsRow> {
        let (state, updated_at) = read_ledger(&self.conn)?;
        Ok(TotalsRow {
            l1: state.total.l1,
            l2: state.total.l2,
            l3: state.total.l3,
            timestamp: to_datetime(updated_at)?,
        })
    }

    /// Fold one cycle's observed counters into the ledger.
    ///
    /// Reading the stored state, applying the deltas and writing raw values
    /// and totals for all three phases happen in a single transaction.
    /// Phases with no observation keep their stored values.
    ///
    /// # Errors
    ///
    /// If the stored ledger holds a corrupt counter nothing is written and
    /// [`Error::CorruptCounter`] is returned.
    pub fn apply_reading(
        &self,
        observed: &PhaseSet<Option<u16>>,
        at: OffsetDateTime,
    ) -> Result<LedgerUpdate> {
        let tx = self.conn.unchecked_transaction()?;
        let (state, _) = read_ledger(&tx)?;
        let update = state.apply(observed);

        {
            let mut stmt = tx.prepare(
                "UPDATE ledger SET raw = ?1, total = ?2, updated_at = ?3 WHERE phase = ?4",
            )?;
            for phase in Phase::ALL {
                stmt.execute(params![
                    update.raw[phase],
                    update.total[phase],
                    at.unix_timestamp(),
                    phase.label()
                ])?;
            }
        }
        tx.commit()?;

        if update.cold_start {
            info!(
                "Recorded ledger baseline L1={} L2={} L3={}",
                update.raw.l1, update.raw.l2, update.raw.l3
            );
        } else {
            debug!(
                "Ledger deltas L1={} L2={} L3={}",
                update.deltas.l1, update.deltas.l2, update.deltas.l3
            );
        }

        Ok(update)
    }
}

// History operations
impl Store {
    /// Append a raw snapshot.
    pub fn append_history(
        &self,
        raw: &PhaseSet<u16>,
        at: OffsetDateTime,
    ) -> Result<StoredHistoryRecord> {
        self.conn.execute(
            "INSERT INTO history (l1, l2, l3, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![raw.l1, raw.l2, raw.l3, at.unix_timestamp()],
        )?;

        Ok(StoredHistoryRecord {
            id: self.conn.last_insert_rowid(),
            l1: i64::from(raw.l1),
            l2: i64::from(raw.l2),
            l3: i64::from(raw.l3),
            timestamp: to_datetime(at.unix_timestamp())?,
        })
    }

    /// Query history records with filters.
    pub fn query_history(&self, query: &HistoryQuery) -> Result<Vec<StoredHistoryRecord>> {
        let (_, params) = query.build_where();
        let sql = query.build_sql();

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), history_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(history_record).collect()
    }

    /// Fetch one snapshot by id.
    pub fn get_history(&self, id: i64) -> Result<Option<StoredHistoryRecord>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, l1, l2, l3, recorded_at FROM history WHERE id = ?",
                [id],
                history_row,
            )
            .optional()?;

        row.map(history_record).transpose()
    }

    /// Count stored snapshots.
    pub fn count_history(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Number of snapshots plus the oldest and newest one.
    pub fn history_summary(&self) -> Result<HistorySummary> {
        let first = self.query_history(&HistoryQuery::new().limit(1))?;
        let last = self.query_history(&HistoryQuery::new().newest_first().limit(1))?;

        Ok(HistorySummary {
            count: self.count_history()?,
            first: first.into_iter().next(),
            last: last.into_iter().next(),
        })
    }

    /// Delete snapshots recorded strictly before `cutoff`.
    pub fn prune_history(&self, cutoff: OffsetDateTime) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM history WHERE recorded_at < ?",
            [cutoff.unix_timestamp()],
        )?;
        if deleted > 0 {
            debug!("Pruned {} history records", deleted);
        }
        Ok(deleted)
    }
}

// Log operations
impl Store {
    /// Persist a diagnostic message.
    pub fn insert_log(&self, message: &str, at: OffsetDateTime) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO logs (logged_at, message) VALUES (?1, ?2)",
            params![at.unix_timestamp(), message],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent log entries, newest first.
    pub fn recent_logs(&self, limit: u32) -> Result<Vec<LogRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, logged_at, message FROM logs
             ORDER BY logged_at DESC, id DESC LIMIT ?",
        )?;
        let rows = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, logged_at, message)| {
                Ok(LogRecord {
                    id,
                    timestamp: to_datetime(logged_at)?,
                    message,
                })
            })
            .collect()
    }

    /// Count stored log entries.
    pub fn count_logs(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    /// Delete every log entry.
    pub fn clear_logs(&self) -> Result<usize> {
        let deleted = self.conn.execute("DELETE FROM logs", [])?;
        info!("Cleared {} log entries", deleted);
        Ok(deleted)
    }

    /// Delete log entries written strictly before `cutoff`.
    pub fn prune_logs(&self, cutoff: OffsetDateTime) -> Result<usize> {
        let deleted = self.conn.execute(
            "DELETE FROM logs WHERE logged_at < ?",
            [cutoff.unix_timestamp()],
        )?;
        if deleted > 0 {
            debug!("Pruned {} log entries", deleted);
        }
        Ok(deleted)
    }
}

// Settings
impl Store {
    /// Whether diagnostic messages are persisted.
    pub fn logging_enabled(&self) -> Result<bool> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                [LOGGING_ENABLED_KEY],
                |row| row.get(0),
            )
            .optional()?;

        Ok(matches!(value.as_deref(), Some("1") | Some("true")))
    }

    /// Persist the logging flag.
    pub fn set_logging_enabled(&self, enabled: bool) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![LOGGING_ENABLED_KEY, if enabled { "1" } else { "0" }],
        )?;
        Ok(())
    }

    /// Flip the logging flag and return the new value.
    pub fn toggle_logging(&self) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let enabled = !self.logging_enabled()?;
        self.set_logging_enabled(enabled)?;
        tx.commit()?;
        info!("Logging {}", if enabled { "enabled" } else { "disabled" });
        Ok(enabled)
    }
}
