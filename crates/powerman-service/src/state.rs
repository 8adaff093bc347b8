//! Application state shared across handlers and the poll loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use powerman_core::{Phase, PhaseSet, RegisterSource};
use powerman_store::Store;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, watch};

use crate::config::Config;
use crate::sink::MetricsSink;

/// Shared application state.
pub struct AppState {
    /// The data store. The poll loop is its only writer apart from the
    /// logging toggle and log clear endpoints.
    pub store: Mutex<Store>,
    /// Configuration.
    pub config: RwLock<Config>,
    /// Where meter readings come from.
    pub source: Arc<dyn RegisterSource>,
    /// Where metrics go.
    pub sink: Arc<dyn MetricsSink>,
    /// Poll loop control and statistics.
    pub collector: CollectorState,
}

impl AppState {
    /// Create new application state.
    pub fn new(
        store: Store,
        config: Config,
        source: Arc<dyn RegisterSource>,
        sink: Arc<dyn MetricsSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store: Mutex::new(store),
            config: RwLock::new(config),
            source,
            sink,
            collector: CollectorState::new(),
        })
    }
}

/// State for tracking and controlling the poll loop.
pub struct CollectorState {
    running: AtomicBool,
    /// Unix timestamp of the last start, 0 if never started.
    started_at: AtomicU64,
    cycles: AtomicU64,
    stop_tx: watch::Sender<bool>,
    stop_rx: watch::Receiver<bool>,
    /// Outcome of the most recent cycle.
    pub last_cycle: RwLock<Option<CycleSummary>>,
    /// Per-phase read statistics.
    pub phase_stats: RwLock<PhaseSet<PhaseStats>>,
}

impl CollectorState {
    /// Create a new collector state.
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            started_at: AtomicU64::new(0),
            cycles: AtomicU64::new(0),
            stop_tx,
            stop_rx,
            last_cycle: RwLock::new(None),
            phase_stats: RwLock::new(PhaseSet::default()),
        }
    }

    /// Check if the poll loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the poll loop as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    /// When the poll loop was last started.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    /// Number of completed cycles.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Get a receiver for the stop signal.
    pub fn subscribe_stop(&self) -> watch::Receiver<bool> {
        self.stop_rx.clone()
    }

    /// Signal the poll loop to stop after the current cycle.
    pub fn signal_stop(&self) {
        let _ = self.stop_tx.send(true);
        self.running.store(false, Ordering::SeqCst);
    }

    /// Reset the stop signal (for restarting).
    pub fn reset_stop(&self) {
        let _ = self.stop_tx.send(false);
    }

    /// Record a successful read of `phase`.
    pub async fn record_success(&self, phase: Phase, at: OffsetDateTime) {
        let mut stats = self.phase_stats.write().await;
        let entry = &mut stats[phase];
        entry.success_count += 1;
        entry.last_success_at = Some(at);
    }

    /// Record a failed read of `phase`.
    pub async fn record_failure(&self, phase: Phase, at: OffsetDateTime, error: String) {
        let mut stats = self.phase_stats.write().await;
        let entry = &mut stats[phase];
        entry.failure_count += 1;
        entry.last_error_at = Some(at);
        entry.last_error = Some(error);
    }

    /// Record the end of a cycle.
    pub async fn record_cycle(&self, summary: CycleSummary) {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        *self.last_cycle.write().await = Some(summary);
    }
}

impl Default for CollectorState {
    fn default() -> Self {
        Self::new()
    }
}

/// Read statistics for one phase meter.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PhaseStats {
    /// Time of last successful read.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success_at: Option<OffsetDateTime>,
    /// Time of last failed read.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
    /// Total successful reads.
    pub success_count: u64,
    /// Total failed reads.
    pub failure_count: u64,
}

/// Short description of a finished cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    /// When the cycle ran.
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
    /// Phases read successfully.
    pub phases_read: usize,
    /// Combined lifetime total published (kWh), if the ledger was updated.
    pub total_kwh: Option<f64>,
    /// Summed instantaneous power published.
    pub total_power: f64,
    /// Storage problems hit during the cycle.
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerman_core::MockSource;
    use time::macros::datetime;

    use crate::sink::RecordingSink;

    fn create_test_state() -> Arc<AppState> {
        AppState::new(
            Store::open_in_memory().unwrap(),
            Config::default(),
            Arc::new(MockSource::new()),
            Arc::new(RecordingSink::new()),
        )
    }

    #[tokio::test]
    async fn test_app_state_new() {
        let state = create_test_state();
        assert!(!state.collector.is_running());
        assert_eq!(state.collector.cycles(), 0);
        assert!(state.store.lock().await.ledger_state().unwrap().is_cold());
    }

    #[test]
    fn test_running_and_started_at() {
        let collector = CollectorState::new();
        assert!(collector.started_at().is_none());

        collector.set_running(true);
        assert!(collector.is_running());
        assert!(collector.started_at().is_some());

        collector.signal_stop();
        assert!(!collector.is_running());
        assert!(*collector.subscribe_stop().borrow());

        collector.reset_stop();
        assert!(!*collector.subscribe_stop().borrow());
    }

    #[tokio::test]
    async fn test_phase_stats() {
        let collector = CollectorState::new();
        let at = datetime!(2024-05-01 12:00:00 UTC);

        collector.record_success(Phase::L1, at).await;
        collector
            .record_failure(Phase::L2, at, "timed out".to_string())
            .await;

        let stats = collector.phase_stats.read().await;
        assert_eq!(stats[Phase::L1].success_count, 1);
        assert_eq!(stats[Phase::L2].failure_count, 1);
        assert_eq!(stats[Phase::L2].last_error.as_deref(), Some("timed out"));
        assert_eq!(stats[Phase::L3].success_count, 0);
    }

    #[tokio::test]
    async fn test_record_cycle() {
        let collector = CollectorState::new();
        collector
            .record_cycle(CycleSummary {
                at: datetime!(2024-05-01 12:00:00 UTC),
                phases_read: 3,
                total_kwh: Some(0.0),
                total_power: 0.84,
                errors: Vec::new(),
            })
            .await;

        assert_eq!(collector.cycles(), 1);
        let last = collector.last_cycle.read().await;
        assert_eq!(last.as_ref().unwrap().phases_read, 3);
    }
}
