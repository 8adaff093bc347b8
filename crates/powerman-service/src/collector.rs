//! Background poll loop.
//!
//! One cycle reads every configured phase meter, publishes each reading,
//! folds the observed counters into the ledger, appends a history snapshot,
//! applies retention and finally publishes the summed power. Nothing that
//! goes wrong inside a cycle stops the loop.

use std::sync::Arc;

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use powerman_core::{Phase, PhaseReading, PhaseSet};
use powerman_types::{LedgerUpdate, delta, round_to};

use crate::journal;
use crate::sink::{Topics, format_metric, overflow_payload, phase_payload};
use crate::state::{AppState, CycleSummary};

/// Background collector that runs poll cycles at the configured interval.
pub struct Collector {
    state: Arc<AppState>,
}

impl Collector {
    /// Create a new collector.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Spawn the poll loop.
    ///
    /// Returns immediately; the first cycle starts right away. The loop ends
    /// after [`CollectorState::signal_stop`](crate::state::CollectorState::signal_stop).
    pub fn start(&self) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        state.collector.reset_stop();
        state.collector.set_running(true);
        tokio::spawn(run(state))
    }
}

async fn run(state: Arc<AppState>) {
    let interval = state.config.read().await.collector.interval();
    let mut stop_rx = state.collector.subscribe_stop();
    let mut cycle = PollCycle::new();

    info!("Starting collector (interval: {}s)", interval.as_secs());

    loop {
        if *stop_rx.borrow() {
            break;
        }

        cycle.run(&state, OffsetDateTime::now_utc()).await;

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    state.collector.set_running(false);
    info!("Collector stopped");
}

/// Collector errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to read {phase}: {source}")]
    Read {
        phase: Phase,
        source: powerman_core::Error,
    },
    #[error("Failed to update ledger: {0}")]
    Ledger(powerman_store::Error),
    #[error("Failed to append history: {0}")]
    History(powerman_store::Error),
    #[error("Failed to apply retention: {0}")]
    Retention(powerman_store::Error),
}

/// What one cycle did.
#[derive(Debug, Default)]
pub struct CycleReport {
    /// Decoded readings, `None` for phases that could not be read.
    pub readings: PhaseSet<Option<PhaseReading>>,
    /// Counter movement since the previous successful read of each phase.
    pub energy_deltas: PhaseSet<Option<u32>>,
    /// Ledger outcome, if the ledger could be updated.
    pub ledger: Option<LedgerUpdate>,
    /// Id of the history snapshot appended this cycle.
    pub history_id: Option<i64>,
    /// Summed instantaneous power of the phases that were read.
    pub total_power: f64,
    /// Everything that went wrong.
    pub errors: Vec<CollectorError>,
}

impl CycleReport {
    /// Number of phases read successfully.
    pub fn phases_read(&self) -> usize {
        self.readings.iter().filter(|(_, r)| r.is_some()).count()
    }
}

/// Poll cycle state carried from one cycle to the next.
///
/// Only the last energy counter seen per phase lives here; everything else
/// is re-read from the store every cycle, so a restart resumes cleanly.
#[derive(Debug, Default)]
pub struct PollCycle {
    previous_energy: PhaseSet<u16>,
}

impl PollCycle {
    /// Create a cycle runner with no previous readings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last energy counter seen per phase.
    pub fn previous_energy(&self) -> PhaseSet<u16> {
        self.previous_energy
    }

    /// Run one full cycle stamped with `at`.
    pub async fn run(&mut self, state: &AppState, at: OffsetDateTime) -> CycleReport {
        let (targets, topics, retention) = {
            let config = state.config.read().await;
            (
                config.targets(),
                Topics::new(&config.mqtt.topic_prefix),
                config.retention.clone(),
            )
        };

        let mut report = CycleReport::default();
        let mut observed: PhaseSet<Option<u16>> = PhaseSet::splat(None);
        let mut journal_entries = Vec::new();

        for target in &targets {
            let phase = target.phase;
            match state.source.read_phase(target).await {
                Ok(reading) => {
                    state.sink.publish(
                        &topics.full_data(phase),
                        phase_payload(phase, &reading).to_string(),
                    );

                    journal_entries.push(format!(
                        "Processed {}: {}",
                        target,
                        phase_payload(phase, &reading)
                    ));

                    let moved = delta(reading.energy_low, self.previous_energy[phase]);
                    debug!(
                        "{} counter {} ({} Wh since previous read)",
                        phase, reading.energy_low, moved
                    );
                    self.previous_energy[phase] = reading.energy_low;

                    report.energy_deltas[phase] = Some(moved);
                    report.total_power += round_to(reading.power, 2);
                    observed[phase] = Some(reading.energy_low);
                    report.readings[phase] = Some(reading);
                    state.collector.record_success(phase, at).await;
                }
                Err(e) => {
                    warn!("Failed to read {}: {}", target, e);
                    journal_entries.push(format!("Failed to read {}: {}", target, e));
                    state.collector.record_failure(phase, at, e.to_string()).await;
                    report.errors.push(CollectorError::Read { phase, source: e });
                }
            }
        }

        {
            let store = state.store.lock().await;

            for message in &journal_entries {
                if let Err(e) = journal::record(&store, message, at) {
                    warn!("Failed to persist log entry: {}", e);
                }
            }

            match store.apply_reading(&observed, at) {
                Ok(update) => {
                    state
                        .sink
                        .publish(&topics.total_kwh(), format_metric(update.combined_kwh()));

                    match store.append_history(&update.raw, at) {
                        Ok(record) => report.history_id = Some(record.id),
                        Err(e) => {
                            error!("Failed to append history: {}", e);
                            report.errors.push(CollectorError::History(e));
                        }
                    }

                    state.sink.publish(
                        &topics.overflow_error(),
                        overflow_payload(&update.raw_movement(), at).to_string(),
                    );
                    report.ledger = Some(update);
                }
                Err(e) => {
                    error!("Failed to update ledger: {}", e);
                    report.errors.push(CollectorError::Ledger(e));
                }
            }

            let swept = store
                .prune_history(at - retention.history_window())
                .and_then(|_| store.prune_logs(at - retention.log_window()));
            if let Err(e) = swept {
                error!("Failed to apply retention: {}", e);
                report.errors.push(CollectorError::Retention(e));
            }
        }

        report.total_power = round_to(report.total_power, 2);
        state
            .sink
            .publish(&topics.general_power(), format_metric(report.total_power));

        state
            .collector
            .record_cycle(CycleSummary {
                at,
                phases_read: report.phases_read(),
                total_kwh: report.ledger.as_ref().map(LedgerUpdate::combined_kwh),
                total_power: report.total_power,
                errors: report.errors.iter().map(ToString::to_string).collect(),
            })
            .await;

        report
    }
}
