//! Data models for stored data.
//!
//! Field names on the wire follow the per-phase key scheme used by existing
//! dashboards (`L1raw`, `L2total`, `L3history`, ...).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use powerman_types::{Phase, PhaseSet};

/// Last observed raw counter per phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawCounterRow {
    #[serde(rename = "L1raw")]
    pub l1: u16,
    #[serde(rename = "L2raw")]
    pub l2: u16,
    #[serde(rename = "L3raw")]
    pub l3: u16,
    /// When the row was last written.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl RawCounterRow {
    /// Per-phase view of the counters.
    pub fn values(&self) -> PhaseSet<u16> {
        PhaseSet::new(self.l1, self.l2, self.l3)
    }
}

/// Lifetime energy total per phase, in Wh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TotalsRow {
    #[serde(rename = "L1total")]
    pub l1: f64,
    #[serde(rename = "L2total")]
    pub l2: f64,
    #[serde(rename = "L3total")]
    pub l3: f64,
    /// When the row was last written.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl TotalsRow {
    /// Per-phase view of the totals.
    pub fn values(&self) -> PhaseSet<f64> {
        PhaseSet::new(self.l1, self.l2, self.l3)
    }
}

/// One raw snapshot appended per poll cycle.
///
/// Counters are kept as read from the database so that a corrupted value can
/// be reported instead of silently truncated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredHistoryRecord {
    /// Database row ID. Increases with `timestamp`.
    pub id: i64,
    #[serde(rename = "L1history")]
    pub l1: i64,
    #[serde(rename = "L2history")]
    pub l2: i64,
    #[serde(rename = "L3history")]
    pub l3: i64,
    /// When the snapshot was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl StoredHistoryRecord {
    /// Stored counter for one phase.
    pub fn raw(&self, phase: Phase) -> i64 {
        match phase {
            Phase::L1 => self.l1,
            Phase::L2 => self.l2,
            Phase::L3 => self.l3,
        }
    }
}

/// A persisted diagnostic message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(skip_serializing)]
    #[serde(default)]
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub message: String,
}

/// Overview of the history table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    /// Number of stored snapshots.
    pub count: u64,
    /// Oldest snapshot still retained.
    pub first: Option<StoredHistoryRecord>,
    /// Most recent snapshot.
    pub last: Option<StoredHistoryRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_raw_row_serializes_phase_keys() {
        let row = RawCounterRow {
            l1: 100,
            l2: 200,
            l3: 150,
            timestamp: datetime!(2024-05-01 12:00:00 UTC),
        };
        let json = serde_json::to_value(row).unwrap();
        assert_eq!(json["L1raw"], 100);
        assert_eq!(json["L3raw"], 150);
        assert_eq!(json["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_history_record_keys() {
        let record = StoredHistoryRecord {
            id: 7,
            l1: 1,
            l2: 2,
            l3: 3,
            timestamp: datetime!(2024-05-01 12:00:10 UTC),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["L2history"], 2);
        assert_eq!(record.raw(Phase::L3), 3);
    }

    #[test]
    fn test_log_record_hides_id() {
        let record = LogRecord {
            id: 12,
            timestamp: datetime!(2024-05-01 12:00:00 UTC),
            message: "Logging enabled".into(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["message"], "Logging enabled");
    }
}
