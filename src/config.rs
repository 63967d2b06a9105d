use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, error};

use crate::presence::{PresenceConfig, SimulationConfig};

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Shared store URL. Without it presence lives in process memory.
    pub redis_url: Option<String>,

    /// TTL of a room's presence set, refreshed on every join
    #[serde(default = "default_presence_ttl")]
    pub presence_ttl_seconds: u64,

    /// Length of an analytics window
    #[serde(default = "default_rollup_period")]
    pub rollup_period_seconds: u64,

    /// How long peak and unique-visitor windows are kept
    #[serde(default = "default_analytics_retention")]
    pub analytics_retention_seconds: u64,

    // Presence simulation
    #[serde(default = "default_sim_enabled")]
    pub sim_presence_enabled: bool,
    #[serde(default = "default_sim_min")]
    pub sim_presence_min: u64,
    #[serde(default = "default_sim_max")]
    pub sim_presence_max: u64,
    #[serde(default = "default_sim_step_ms")]
    pub sim_presence_step_ms: u64,
    #[serde(default = "default_sim_decay_after_ms")]
    pub sim_presence_decay_after_ms: u64,
    #[serde(default = "default_sim_max_duration_ms")]
    pub sim_presence_max_duration_ms: u64,
    #[serde(default = "default_presence_ttl")]
    pub sim_presence_ttl_seconds: u64,

    /// Poll interval of the WebSocket count push
    #[serde(default = "default_push_interval_ms")]
    pub presence_push_interval_ms: u64,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        // Load from environment variables using envy
        let config = match envy::from_env::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("❌ Failed to load configuration: {}", e);
                return Err(ConfigError::EnvError(e));
            }
        };

        config.validate()?;
        info!("✅ Configuration loaded successfully");
        Ok(config)
    }

    /// Reject settings the tracker and simulator cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rollup_period_seconds == 0 {
            return Err(ConfigError::Invalid("ROLLUP_PERIOD_SECONDS must be positive".to_string()));
        }
        if self.presence_ttl_seconds == 0 || self.sim_presence_ttl_seconds == 0 {
            return Err(ConfigError::Invalid("presence TTLs must be positive".to_string()));
        }
        if self.sim_presence_min > self.sim_presence_max {
            return Err(ConfigError::Invalid(format!(
                "SIM_PRESENCE_MIN ({}) exceeds SIM_PRESENCE_MAX ({})",
                self.sim_presence_min, self.sim_presence_max
            )));
        }
        if self.sim_presence_step_ms == 0 || self.presence_push_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick intervals must be positive".to_string()));
        }
        if self.analytics_retention_seconds == 0 {
            return Err(ConfigError::Invalid("ANALYTICS_RETENTION_SECONDS must be positive".to_string()));
        }
        if self.sim_presence_max_duration_ms == 0 {
            return Err(ConfigError::Invalid("SIM_PRESENCE_MAX_DURATION_MS must be positive".to_string()));
        }
        Ok(())
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn presence(&self) -> PresenceConfig {
        PresenceConfig {
            presence_ttl: Duration::from_secs(self.presence_ttl_seconds),
            window_period: Duration::from_secs(self.rollup_period_seconds),
            analytics_retention: Duration::from_secs(self.analytics_retention_seconds),
        }
    }

    pub fn simulation(&self) -> SimulationConfig {
        SimulationConfig {
            enabled: self.sim_presence_enabled,
            min: self.sim_presence_min,
            max: self.sim_presence_max,
            tick: Duration::from_millis(self.sim_presence_step_ms),
            decay_after: Duration::from_millis(self.sim_presence_decay_after_ms),
            max_duration: Duration::from_millis(self.sim_presence_max_duration_ms),
            presence_ttl: Duration::from_secs(self.sim_presence_ttl_seconds),
        }
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_millis(self.presence_push_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            redis_url: None,
            presence_ttl_seconds: default_presence_ttl(),
            rollup_period_seconds: default_rollup_period(),
            analytics_retention_seconds: default_analytics_retention(),
            sim_presence_enabled: default_sim_enabled(),
            sim_presence_min: default_sim_min(),
            sim_presence_max: default_sim_max(),
            sim_presence_step_ms: default_sim_step_ms(),
            sim_presence_decay_after_ms: default_sim_decay_after_ms(),
            sim_presence_max_duration_ms: default_sim_max_duration_ms(),
            sim_presence_ttl_seconds: default_presence_ttl(),
            presence_push_interval_ms: default_push_interval_ms(),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    EnvError(envy::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::EnvError(e) => write!(f, "Environment variable error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_presence_ttl() -> u64 {
    75
}

fn default_rollup_period() -> u64 {
    60
}

fn default_analytics_retention() -> u64 {
    24 * 60 * 60
}

fn default_sim_enabled() -> bool {
    true
}

fn default_sim_min() -> u64 {
    3
}

fn default_sim_max() -> u64 {
    19
}

fn default_sim_step_ms() -> u64 {
    4_000
}

fn default_sim_decay_after_ms() -> u64 {
    180_000
}

fn default_sim_max_duration_ms() -> u64 {
    600_000
}

fn default_push_interval_ms() -> u64 {
    2_000
}
