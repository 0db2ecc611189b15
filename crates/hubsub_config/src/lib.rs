pub mod settings;

use crate::settings::PartialSettings;
use config::{Config, ConfigError, Environment, File};

pub use settings::{BrokerSettings, OverflowPolicy, ServerSettings, Settings};

/// Load settings from `config/default.toml` (if present) and the
/// environment, filling anything left unspecified from [`Settings::default`].
///
/// Environment overrides use `__` as the nesting separator, e.g.
/// `SERVER__PORT=9000` or `BROKER__TOPIC_HISTORY_SIZE=50`.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(Environment::default().separator("__"));

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let default = Settings::default();

    Ok(Settings {
        server: ServerSettings {
            host: partial
                .server
                .as_ref()
                .and_then(|s| s.host.clone())
                .unwrap_or(default.server.host),
            port: partial
                .server
                .as_ref()
                .and_then(|s| s.port)
                .unwrap_or(default.server.port),
            http_port: partial
                .server
                .as_ref()
                .and_then(|s| s.http_port)
                .unwrap_or(default.server.http_port),
            log_level: partial
                .server
                .as_ref()
                .and_then(|s| s.log_level.clone())
                .unwrap_or(default.server.log_level),
        },
        broker: BrokerSettings {
            max_subscriber_queue_size: partial
                .broker
                .as_ref()
                .and_then(|b| b.max_subscriber_queue_size)
                .unwrap_or(default.broker.max_subscriber_queue_size),
            topic_history_size: partial
                .broker
                .as_ref()
                .and_then(|b| b.topic_history_size)
                .unwrap_or(default.broker.topic_history_size),
            overflow_policy: partial
                .broker
                .as_ref()
                .and_then(|b| b.overflow_policy)
                .unwrap_or(default.broker.overflow_policy),
            shutdown_drain_secs: partial
                .broker
                .as_ref()
                .and_then(|b| b.shutdown_drain_secs)
                .unwrap_or(default.broker.shutdown_drain_secs),
        },
    })
}
