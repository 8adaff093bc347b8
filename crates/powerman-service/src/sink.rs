//! Metrics sink seam and payload builders.
//!
//! The poll loop publishes through [`MetricsSink`], a fire-and-forget
//! `publish(topic, payload)` call. Delivery failures are the sink's concern
//! and never reach the poll loop.
//!
//! # Topics
//!
//! Relative to the configured prefix (default `home/PM`):
//!
//! - `Full_data_L1`, `Full_data_L2`, `Full_data_L3` - decoded reading as JSON
//! - `total_kWh` - combined lifetime total in kWh
//! - `General-W` - summed instantaneous power
//! - `overflow_error` - per-phase raw counter movement of the last cycle

use std::sync::Mutex;

use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use powerman_core::{Phase, PhaseReading, PhaseSet};

/// Destination for published metrics.
pub trait MetricsSink: Send + Sync {
    /// Publish `payload` on `topic` without waiting for delivery.
    fn publish(&self, topic: &str, payload: String);
}

/// Topic names derived from a prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    /// Topics under `prefix`. A trailing slash is ignored.
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Per-phase reading topic.
    pub fn full_data(&self, phase: Phase) -> String {
        format!("{}/Full_data_{}", self.prefix, phase.label())
    }

    /// Combined lifetime total topic.
    pub fn total_kwh(&self) -> String {
        format!("{}/total_kWh", self.prefix)
    }

    /// Summed instantaneous power topic.
    pub fn general_power(&self) -> String {
        format!("{}/General-W", self.prefix)
    }

    /// Counter movement diagnostic topic.
    pub fn overflow_error(&self) -> String {
        format!("{}/overflow_error", self.prefix)
    }
}

/// JSON payload for one phase reading, keyed `{P}U`, `{P}A`, ... `{P}Alarm`.
pub fn phase_payload(phase: Phase, reading: &PhaseReading) -> Value {
    let p = phase.label();
    let mut map = Map::new();
    map.insert(format!("{p}U"), json!(reading.voltage));
    map.insert(format!("{p}A"), json!(reading.current));
    map.insert(format!("{p}W"), json!(reading.power));
    map.insert(format!("{p}Wh"), json!(reading.energy_low));
    map.insert(format!("{p}F_Wh"), json!(reading.energy_full));
    map.insert(format!("{p}Hz"), json!(reading.frequency));
    map.insert(format!("{p}Pf"), json!(reading.power_factor));
    map.insert(format!("{p}Alarm"), json!(reading.alarm_status));
    Value::Object(map)
}

/// JSON payload for the per-phase counter movement diagnostic.
pub fn overflow_payload(movement: &PhaseSet<u32>, at: OffsetDateTime) -> Value {
    json!({
        "L1_overflow_error": movement.l1,
        "L2_overflow_error": movement.l2,
        "L3_overflow_error": movement.l3,
        "timestamp": at.format(&Rfc3339).unwrap_or_default(),
    })
}

/// Plain-text rendering of a scalar metric.
///
/// Whole numbers keep one decimal place (`65386.0`, `0.0`) so consumers always
/// see a float.
pub fn format_metric(value: f64) -> String {
    format!("{:?}", value)
}

/// Sink used when publishing is disabled.
#[derive(Debug, Default)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn publish(&self, topic: &str, payload: String) {
        debug!("Dropping metric for {}: {}", topic, payload);
    }
}

/// A message captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: String,
}

/// Sink that keeps every message in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<Published>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, in order.
    pub fn published(&self) -> Vec<Published> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Payloads published on `topic`, in order.
    pub fn payloads(&self, topic: &str) -> Vec<String> {
        self.published()
            .into_iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload)
            .collect()
    }

    /// Most recent payload on `topic`.
    pub fn last(&self, topic: &str) -> Option<String> {
        self.payloads(topic).pop()
    }

    /// Forget captured messages.
    pub fn clear(&self) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.clear();
        }
    }
}

impl MetricsSink for RecordingSink {
    fn publish(&self, topic: &str, payload: String) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(Published {
                topic: topic.to_string(),
                payload,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading() -> PhaseReading {
        PhaseReading {
            voltage: 230.4,
            current: 12.3,
            power: 1.15,
            energy_low: 1200,
            energy_high: 1,
            energy_full: 66.7,
            frequency: 50.0,
            power_factor: 0.95,
            alarm_status: -1,
        }
    }

    #[test]
    fn test_topics() {
        let topics = Topics::new("home/PM/");
        assert_eq!(topics.full_data(Phase::L2), "home/PM/Full_data_L2");
        assert_eq!(topics.total_kwh(), "home/PM/total_kWh");
        assert_eq!(topics.general_power(), "home/PM/General-W");
        assert_eq!(topics.overflow_error(), "home/PM/overflow_error");
    }

    #[test]
    fn test_phase_payload_keys() {
        let payload = phase_payload(Phase::L3, &reading());
        let object = payload.as_object().unwrap();
        assert_eq!(object.len(), 8);
        assert_eq!(payload["L3U"], 230.4);
        assert_eq!(payload["L3Wh"], 1200);
        assert_eq!(payload["L3F_Wh"], 66.7);
        assert_eq!(payload["L3Pf"], 0.95);
        assert_eq!(payload["L3Alarm"], -1);
    }

    #[test]
    fn test_overflow_payload() {
        let payload = overflow_payload(
            &PhaseSet::new(11, 0, 4),
            datetime!(2024-05-01 12:00:00 UTC),
        );
        assert_eq!(payload["L1_overflow_error"], 11);
        assert_eq!(payload["L2_overflow_error"], 0);
        assert_eq!(payload["timestamp"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn test_format_metric() {
        assert_eq!(format_metric(0.0), "0.0");
        assert_eq!(format_metric(65.44), "65.44");
        assert_eq!(format_metric(1.2), "1.2");
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.publish("a", "1".into());
        sink.publish("b", "2".into());
        sink.publish("a", "3".into());

        assert_eq!(sink.published().len(), 3);
        assert_eq!(sink.payloads("a"), vec!["1", "3"]);
        assert_eq!(sink.last("b").as_deref(), Some("2"));

        sink.clear();
        assert!(sink.published().is_empty());
    }
}
