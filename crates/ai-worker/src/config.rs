//! Worker configuration

use config::{Config, ConfigError, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// MQTT broker connection
    pub broker: BrokerSettings,
    /// Reasoning service
    pub reasoning: ReasoningSettings,
    /// Task processing timings
    pub processing: ProcessingSettings,
    /// Local logging
    pub logging: LoggingSettings,
}

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// MQTT keep-alive in seconds
    pub keep_alive_secs: u64,
    /// Outbound request buffer of the MQTT client
    pub request_capacity: usize,
}

/// Reasoning service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningSettings {
    /// Base URL of the Gemini REST API
    pub api_base: String,
    /// Model name used in `generateContent`
    pub model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

/// Task processing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Fixed simulated workload per task, in milliseconds
    pub simulated_work_ms: u64,
    /// Deadline for delivering a result to the coordinator
    pub delivery_timeout_secs: u64,
    /// Pause before the first broker connection attempt
    pub startup_delay_secs: u64,
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "mosquitto".to_string(),
            port: 1883,
            keep_alive_secs: 60,
            request_capacity: 64,
        }
    }
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            api_base: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-pro".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ReasoningSettings {
    /// Bound on one reasoning request
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            simulated_work_ms: 10_000,
            delivery_timeout_secs: 10,
            startup_delay_secs: 5,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from defaults, an optional file and the process
    /// environment
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Same as [`WorkerConfig::load`] with an explicit environment.
    ///
    /// `AI_WORKER__<SECTION>__<KEY>` variables override file values;
    /// `MQTT_BROKER` and `MQTT_PORT` override the broker address last.
    pub fn load_with_env(path: Option<&str>, env: Map<String, String>) -> Result<Self, ConfigError> {
        let mqtt_host = env.get("MQTT_BROKER").cloned();
        let mqtt_port = env.get("MQTT_PORT").cloned();

        let mut builder = Config::builder().add_source(Config::try_from(&WorkerConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("AI_WORKER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .set_override_option("broker.host", mqtt_host)?
            .set_override_option("broker.port", mqtt_port)?
            .build()?;

        config.try_deserialize()
    }

    /// Broker address as `host:port`
    pub fn broker_address(&self) -> String {
        format!("{}:{}", self.broker.host, self.broker.port)
    }

    pub fn simulated_work(&self) -> Duration {
        Duration::from_millis(self.processing.simulated_work_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.processing.delivery_timeout_secs)
    }
}
