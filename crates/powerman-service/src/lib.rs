//! Poll loop, MQTT publisher and HTTP API for three-phase energy meters.
//!
//! This crate provides a service that:
//! - Polls the L1/L2/L3 meters over Modbus TCP on a fixed interval
//! - Folds wrapping 16-bit energy counters into lifetime totals
//! - Publishes readings and totals to MQTT
//! - Keeps a short history of raw counters and an optional diagnostic log
//! - Exposes a REST API for querying both
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Poll loop state and per-phase read statistics
//! - `GET /raw_data` - Last raw counters
//! - `GET /total_data` - Lifetime totals (Wh)
//! - `GET /data` - Live read of every meter
//! - `GET /logs?limit=N` - Recent diagnostic log entries
//! - `POST /toggle_logging` - Flip the diagnostic log on or off
//! - `GET /get_logging_state` - Current diagnostic log flag
//! - `POST /clear_logs` - Delete the diagnostic log
//! - `GET /data_page` - History overview
//! - `POST /data_page` - Compare two snapshots or list a time range
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/powerman/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:5000"
//!
//! [collector]
//! poll_interval = 10
//!
//! [[phases]]
//! phase = "L1"
//! host = "10.0.6.84"
//! unit_id = 1
//!
//! [mqtt]
//! enabled = true
//! broker = "mqtt://10.0.6.122:1883"
//! topic_prefix = "home/PM"
//!
//! [retention]
//! history_hours = 72
//! log_hours = 24
//! ```

pub mod api;
pub mod collector;
pub mod config;
pub mod journal;
pub mod mqtt;
pub mod sink;
pub mod state;

pub use collector::{Collector, CollectorError, CycleReport, PollCycle};
pub use config::{
    CollectorConfig, Config, ConfigError, ModbusConfig, MqttConfig, PhaseConfig, RetentionConfig,
    ServerConfig, StorageConfig,
};
pub use mqtt::MqttSink;
pub use sink::{MetricsSink, NullSink, RecordingSink, Topics};
pub use state::AppState;
