// src/config.rs

//! Configuration for the glue, the demo engine and logging.
//!
//! All structs deserialize from JSON with `#[serde(default)]`, so a config
//! file only needs the fields it changes. [`CONFIG`] is loaded once from the
//! file named by the `NATIVE_GLUE_CONFIG` environment variable, falling
//! back to defaults.

use anyhow::{Context, Result};
use log::warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable naming a JSON config file.
pub const CONFIG_PATH_ENV: &str = "NATIVE_GLUE_CONFIG";

pub static CONFIG: Lazy<Config> = Lazy::new(|| match std::env::var_os(CONFIG_PATH_ENV) {
    Some(path) => Config::load(Path::new(&path)).unwrap_or_else(|e| {
        warn!("Ignoring config file: {:#}", e);
        Config::default()
    }),
    None => Config::default(),
});

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub glue: GlueConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

// --- Glue ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GlueConfig {
    /// Name given to the application thread.
    pub thread_name: String,
    /// Upper bound on the wait for the application thread after DESTROY.
    /// `None` waits forever.
    pub destroy_timeout_ms: Option<u64>,
}

impl GlueConfig {
    pub fn destroy_timeout(&self) -> Option<Duration> {
        self.destroy_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for GlueConfig {
    fn default() -> Self {
        GlueConfig {
            thread_name: "native-app".to_string(),
            destroy_timeout_ms: None,
        }
    }
}

// --- Engine ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Angle advance per animation frame. The angle wraps to 0 above 1.0.
    pub angle_step: f32,
    /// Accelerometer event rate requested while focused.
    pub sensor_rate_hz: u32,
    /// Presentation interval of the host graphics backend.
    pub frame_interval_ms: u64,
}

impl EngineConfig {
    pub fn sensor_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.sensor_rate_hz.max(1)))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            angle_step: 0.01,
            sensor_rate_hz: 60,
            frame_interval_ms: 16,
        }
    }
}

// --- Logging ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `env_logger` filter used when `RUST_LOG` is unset.
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
        }
    }
}
