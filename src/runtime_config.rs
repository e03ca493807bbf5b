//! # Runtime Configuration Module
//!
//! Tunables for the dispatcher, loaded from environment variables or a YAML
//! file. Every field has a default, so an empty source is valid.
//!
//! ## Environment Variables
//!
//! ### `BRRTMED_SLOW_DISPATCH_MS`
//!
//! Dispatches taking longer than this many milliseconds log a warning.
//! Accepts decimal (`250`) or hexadecimal (`0xfa`). `0` disables the check.
//!
//! Default: `500`
//!
//! ### `BRRTMED_WARM_PIPELINES`
//!
//! When `true`, [`Dispatcher::with_config`](crate::Dispatcher::with_config)
//! compiles every invoker and builds every pipeline before returning.
//!
//! Default: `false`
//!
//! ## Usage
//!
//! ```rust
//! use brrtmediator::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_yaml_str("slow_dispatch_ms: 0x64\n").unwrap();
//! assert_eq!(config.slow_dispatch_ms, 100);
//! assert!(!config.warm_pipelines);
//! ```
//!
//! ## Example Configuration
//!
//! ```yaml
//! slow_dispatch_ms: 250
//! warm_pipelines: true
//! ```

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use tracing::warn;

const DEFAULT_SLOW_DISPATCH_MS: u64 = 500;

/// Runtime configuration for a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Slow dispatch warning threshold in milliseconds (default: 500, 0 disables)
    #[serde(deserialize_with = "deserialize_millis")]
    pub slow_dispatch_ms: u64,
    /// Build every pipeline when the dispatcher is created (default: false)
    pub warm_pipelines: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            slow_dispatch_ms: DEFAULT_SLOW_DISPATCH_MS,
            warm_pipelines: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    ///
    /// Unparseable values fall back to the default with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let slow_dispatch_ms = match lookup("BRRTMED_SLOW_DISPATCH_MS") {
            Some(val) => parse_u64(&val).unwrap_or_else(|| {
                warn!(
                    variable = "BRRTMED_SLOW_DISPATCH_MS",
                    value = %val,
                    "Invalid value, using default"
                );
                defaults.slow_dispatch_ms
            }),
            None => defaults.slow_dispatch_ms,
        };

        let warm_pipelines = match lookup("BRRTMED_WARM_PIPELINES") {
            Some(val) => parse_bool(&val).unwrap_or_else(|| {
                warn!(
                    variable = "BRRTMED_WARM_PIPELINES",
                    value = %val,
                    "Invalid value, using default"
                );
                defaults.warm_pipelines
            }),
            None => defaults.warm_pipelines,
        };

        RuntimeConfig {
            slow_dispatch_ms,
            warm_pipelines,
        }
    }

    /// Parse configuration from a YAML document.
    ///
    /// # Errors
    ///
    /// Malformed YAML, unknown keys, or values of the wrong type.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("Failed to parse runtime configuration")
    }

    /// Read configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// The file cannot be read or does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read runtime configuration {}", path.display()))?;
        Self::from_yaml_str(&yaml).with_context(|| format!("Invalid runtime configuration {}", path.display()))
    }

    /// Threshold above which a dispatch is logged as slow, `None` when disabled.
    #[must_use]
    pub fn slow_dispatch_threshold(&self) -> Option<Duration> {
        (self.slow_dispatch_ms > 0).then(|| Duration::from_millis(self.slow_dispatch_ms))
    }
}

fn parse_u64(val: &str) -> Option<u64> {
    let val = val.trim();
    if let Some(hex) = val.strip_prefix("0x").or_else(|| val.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    }
}

fn parse_bool(val: &str) -> Option<bool> {
    match val.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Accept a plain integer or a decimal/hex string.
fn deserialize_millis<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Number(u64),
        Text(String),
    }

    match Millis::deserialize(deserializer)? {
        Millis::Number(n) => Ok(n),
        Millis::Text(s) => parse_u64(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid millisecond value: {s}"))),
    }
}
