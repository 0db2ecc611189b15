use serde::Deserialize;

/// Top-level configuration for the hubsub server.
///
/// Aggregates network settings for the two listeners and operational
/// parameters for the broker core.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// WebSocket/HTTP listener configuration.
    pub server: ServerSettings,
    /// Broker core limits and policies.
    pub broker: BrokerSettings,
}

/// Network parameters for the server processes.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    /// The host address (e.g. "127.0.0.1" or "0.0.0.0") both listeners bind to.
    pub host: String,
    /// The WebSocket listener port.
    pub port: u16,
    /// The control-plane REST listener port.
    pub http_port: u16,
    /// Log level used to bootstrap tracing ("error", "warn", "info", "debug", "trace").
    pub log_level: String,
}

/// Behavior of a subscriber queue when a new frame arrives and the queue is
/// already full.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the oldest queued frame and keep the connection alive.
    DropOldest,
    /// Emit one `slow_consumer` error and close the transport.
    Disconnect,
}

/// Operational parameters for the broker core.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    /// Per-subscriber delivery queue capacity; overflow triggers the
    /// configured policy.
    pub max_subscriber_queue_size: usize,
    /// Per-topic history ring capacity available for `last_n` replay.
    pub topic_history_size: usize,
    /// Deployment-wide overflow policy. Modes are never mixed per subscriber.
    pub overflow_policy: OverflowPolicy,
    /// Seconds granted to delivery pumps to empty their queues during
    /// graceful shutdown.
    pub shutdown_drain_secs: u64,
}

/// Partial configuration loaded from files or the environment.
///
/// Allows partial specification; missing values fall back to defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub http_port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_subscriber_queue_size: Option<usize>,
    pub topic_history_size: Option<usize>,
    pub overflow_policy: Option<OverflowPolicy>,
    pub shutdown_drain_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            broker: BrokerSettings::default(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            http_port: 8081,
            log_level: "info".to_string(),
        }
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            max_subscriber_queue_size: 100,
            topic_history_size: 100,
            overflow_policy: OverflowPolicy::DropOldest,
            shutdown_drain_secs: 2,
        }
    }
}
