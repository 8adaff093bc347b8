//! MQTT implementation of [`MetricsSink`].
//!
//! Messages are queued with `try_publish`, so a slow or unreachable broker
//! never blocks the poll loop; when the request queue is full the message is
//! dropped with a warning. A background task drives the rumqttc event loop
//! and keeps reconnecting while the connection is down.
//!
//! # Example Configuration
//!
//! ```toml
//! [mqtt]
//! enabled = true
//! broker = "mqtt://10.0.6.122:1883"
//! username = "home"
//! password = "home"
//! topic_prefix = "home/PM"
//! ```

use std::time::Duration;

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, TlsConfiguration, Transport};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::MqttConfig;
use crate::sink::MetricsSink;

/// Requests buffered between the client handle and the event loop.
const REQUEST_CAPACITY: usize = 100;

/// MQTT errors.
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Invalid broker URL: {0}")]
    InvalidBroker(String),
}

/// Publishes metrics to an MQTT broker.
pub struct MqttSink {
    client: AsyncClient,
    qos: QoS,
    retain: bool,
}

impl MqttSink {
    /// Create the client and spawn its event loop.
    ///
    /// Returns immediately; the connection is established in the background.
    pub fn connect(config: &MqttConfig) -> Result<(Self, JoinHandle<()>), MqttError> {
        let (host, port, use_tls) = parse_broker_url(&config.broker)?;

        let mut options = MqttOptions::new(&config.client_id, host, port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            options.set_credentials(username, password);
        }

        if use_tls {
            options.set_transport(Transport::tls_with_config(TlsConfiguration::Native));
        }

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        info!(
            "Publishing metrics to {} under '{}'",
            config.broker, config.topic_prefix
        );

        let handle = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        info!("MQTT connected: {:?}", ack.code);
                    }
                    Ok(Event::Incoming(Packet::PingResp)) => {
                        debug!("MQTT ping response received");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("MQTT connection error: {}. Reconnecting...", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Ok((
            Self {
                client,
                qos: qos_from_level(config.qos),
                retain: config.retain,
            },
            handle,
        ))
    }
}

impl MetricsSink for MqttSink {
    fn publish(&self, topic: &str, payload: String) {
        match self
            .client
            .try_publish(topic, self.qos, self.retain, payload.into_bytes())
        {
            Ok(()) => debug!("Queued MQTT message for {}", topic),
            Err(e) => warn!("Failed to publish to {}: {}", topic, e),
        }
    }
}

fn qos_from_level(level: u8) -> QoS {
    match level {
        0 => QoS::AtMostOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::ExactlyOnce,
    }
}

/// Parse an MQTT broker URL into (host, port, use_tls).
pub fn parse_broker_url(url: &str) -> Result<(String, u16, bool), MqttError> {
    let (use_tls, rest) = if let Some(stripped) = url.strip_prefix("mqtt://") {
        (false, stripped)
    } else if let Some(stripped) = url.strip_prefix("mqtts://") {
        (true, stripped)
    } else {
        return Err(MqttError::InvalidBroker(format!(
            "'{}' must start with mqtt:// or mqtts://",
            url
        )));
    };

    let default_port = if use_tls { 8883 } else { 1883 };

    let (host, port) = match rest.rsplit_once(':') {
        Some((h, p)) => {
            let port = p
                .parse::<u16>()
                .map_err(|_| MqttError::InvalidBroker(format!("invalid port '{}'", p)))?;
            (h.to_string(), port)
        }
        None => (rest.to_string(), default_port),
    };

    if host.is_empty() {
        return Err(MqttError::InvalidBroker("host cannot be empty".to_string()));
    }

    Ok((host, port, use_tls))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_broker_url_mqtt() {
        let (host, port, tls) = parse_broker_url("mqtt://10.0.6.122:1883").unwrap();
        assert_eq!(host, "10.0.6.122");
        assert_eq!(port, 1883);
        assert!(!tls);
    }

    #[test]
    fn test_parse_broker_url_default_ports() {
        assert_eq!(
            parse_broker_url("mqtt://localhost").unwrap(),
            ("localhost".to_string(), 1883, false)
        );
        assert_eq!(
            parse_broker_url("mqtts://broker.example.com").unwrap(),
            ("broker.example.com".to_string(), 8883, true)
        );
    }

    #[test]
    fn test_parse_broker_url_errors() {
        assert!(parse_broker_url("http://localhost:1883").is_err());
        assert!(parse_broker_url("localhost:1883").is_err());
        assert!(parse_broker_url("mqtt://:1883").is_err());
        assert!(parse_broker_url("mqtt://host:port").is_err());
    }

    #[test]
    fn test_qos_from_level() {
        assert_eq!(qos_from_level(0), QoS::AtMostOnce);
        assert_eq!(qos_from_level(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_level(2), QoS::ExactlyOnce);
    }

    #[tokio::test]
    async fn test_connect_with_tls_broker() {
        let config = MqttConfig {
            enabled: true,
            broker: "mqtts://127.0.0.1:1".to_string(),
            ..MqttConfig::default()
        };
        let (sink, handle) = MqttSink::connect(&config).unwrap();
        sink.publish("home/PM/total_kWh", "0.0".to_string());
        handle.abort();
    }

    #[tokio::test]
    async fn test_publish_without_broker_does_not_block() {
        let config = MqttConfig {
            enabled: true,
            broker: "mqtt://127.0.0.1:1".to_string(),
            ..MqttConfig::default()
        };
        let (sink, handle) = MqttSink::connect(&config).unwrap();

        for i in 0..(REQUEST_CAPACITY + 10) {
            sink.publish("home/PM/General-W", format!("{i}.0"));
        }
        handle.abort();
    }
}
