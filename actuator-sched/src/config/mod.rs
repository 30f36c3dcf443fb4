/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Actuator configuration loading.
//!
//! The expected YAML structure is:
//! ```yaml
//! actuator:
//!   preempt_grace_time: 60          # seconds
//!   schedule_publish_interval: 60   # seconds
//!   log_level: info
//! ```
//!
//! Every field is optional; absent values fall back to the defaults below.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use serde::Deserialize;
use tracing::{debug, info, warn};

const DEFAULT_PREEMPT_GRACE_SECS: u64 = 60;
const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 60;
const DEFAULT_LOG_LEVEL: &str = "info";

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConfigFile {
    actuator: Option<ActuatorEntry>,
}

#[derive(Debug, Deserialize)]
struct ActuatorEntry {
    #[serde(default = "default_grace")]
    preempt_grace_time: u64,
    #[serde(default = "default_publish_interval")]
    schedule_publish_interval: u64,
    #[serde(default = "default_log_level")]
    log_level: String,
}

fn default_grace() -> u64 {
    DEFAULT_PREEMPT_GRACE_SECS
}

fn default_publish_interval() -> u64 {
    DEFAULT_PUBLISH_INTERVAL_SECS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

// ── Public data structures ────────────────────────────────────────────────────

/// Scheduler and host settings for one actuator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorConfig {
    /// Seconds a preempted `LOW_PREEMPT` task keeps its device.
    pub preempt_grace_time: u64,
    /// Upper bound, in seconds, between device-state publications.
    pub schedule_publish_interval: u64,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            preempt_grace_time: DEFAULT_PREEMPT_GRACE_SECS,
            schedule_publish_interval: DEFAULT_PUBLISH_INTERVAL_SECS,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ActuatorConfig {
    pub fn grace_period(&self) -> TimeDelta {
        seconds(self.preempt_grace_time)
    }

    pub fn publish_interval(&self) -> TimeDelta {
        seconds(self.schedule_publish_interval)
    }
}

/// `u64` seconds as a `TimeDelta`, saturating at the largest representable
/// whole-second span.
fn seconds(secs: u64) -> TimeDelta {
    let secs = i64::try_from(secs).unwrap_or(i64::MAX);
    TimeDelta::try_seconds(secs).unwrap_or(TimeDelta::MAX)
}

// ── ConfigManager ─────────────────────────────────────────────────────────────

/// Loads and holds the actuator configuration.
#[derive(Debug, Default)]
pub struct ConfigManager {
    config: ActuatorConfig,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and replaces the current configuration.
    ///
    /// A file without an `actuator` section loads the defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or if the YAML is
    /// structurally invalid.  The previous configuration is discarded either
    /// way.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading actuator configuration from: {}", path.display());

        self.config = ActuatorConfig::default();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        match file.actuator {
            Some(entry) => {
                self.config = ActuatorConfig {
                    preempt_grace_time: entry.preempt_grace_time,
                    schedule_publish_interval: entry.schedule_publish_interval,
                    log_level: entry.log_level,
                };
                debug!(config = ?self.config, "actuator section parsed");
            }
            None => warn!("No actuator section in configuration file, using defaults"),
        }

        self.loaded = true;

        info!(
            grace_secs = self.config.preempt_grace_time,
            publish_secs = self.config.schedule_publish_interval,
            log_level = %self.config.log_level,
            "Actuator configuration loaded"
        );
        Ok(())
    }

    pub fn config(&self) -> &ActuatorConfig {
        &self.config
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
