/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Scripted agent traffic for the replay host.
//!
//! ```yaml
//! start: "2013-11-27T11:30:00Z"
//! requests:
//!   - at: "2013-11-27T11:30:00Z"
//!     agent_id: Agent1
//!     task_id: Task1
//!     priority: HIGH
//!     slots:
//!       - ["campus/building/rtu1", "2013-11-27 12:00:00", "2013-11-27 13:00:00"]
//! cancels:
//!   - at: "2013-11-27T12:10:00Z"
//!     agent_id: Agent1
//!     task_id: Task1
//! until: "2013-11-27T14:00:00Z"
//! ```
//!
//! Slot entries are kept as [`RawValue`]s so malformed requests reach the
//! scheduler's validator exactly as an agent would send them.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::priority::Priority;
use crate::scheduler::RawValue;
use crate::task::Timestamp;

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedRequest {
    pub at: Timestamp,
    pub agent_id: String,
    pub task_id: String,
    pub priority: Priority,
    #[serde(default)]
    pub slots: Vec<Vec<RawValue>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptedCancel {
    pub at: Timestamp,
    pub agent_id: String,
    pub task_id: String,
}

/// One agent action in time order.
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    Request(&'a ScriptedRequest),
    Cancel(&'a ScriptedCancel),
}

impl Action<'_> {
    pub fn at(&self) -> Timestamp {
        match self {
            Action::Request(r) => r.at,
            Action::Cancel(c) => c.at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub start: Timestamp,
    #[serde(default)]
    pub requests: Vec<ScriptedRequest>,
    #[serde(default)]
    pub cancels: Vec<ScriptedCancel>,
    pub until: Timestamp,
}

impl Scenario {
    /// Read and check a scenario file.
    ///
    /// # Errors
    /// Unreadable file, invalid YAML, `until` not after `start`, or an action
    /// timed outside `[start, until]`.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open scenario file: {}", path.display()))?;

        let scenario: Scenario = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse scenario file: {}", path.display()))?;

        scenario
            .check()
            .with_context(|| format!("Invalid scenario: {}", path.display()))?;

        info!(
            requests = scenario.requests.len(),
            cancels = scenario.cancels.len(),
            start = %scenario.start,
            until = %scenario.until,
            "Scenario loaded"
        );
        Ok(scenario)
    }

    fn check(&self) -> Result<()> {
        if self.until <= self.start {
            bail!("until ({}) must be after start ({})", self.until, self.start);
        }
        for action in self.actions() {
            let at = action.at();
            if at < self.start || at > self.until {
                bail!("action at {at} lies outside [{}, {}]", self.start, self.until);
            }
        }
        Ok(())
    }

    /// Requests and cancels merged by time.  At equal times requests come
    /// first, each group in file order.
    pub fn actions(&self) -> Vec<Action<'_>> {
        let mut actions: Vec<Action<'_>> = self
            .requests
            .iter()
            .map(Action::Request)
            .chain(self.cancels.iter().map(Action::Cancel))
            .collect();
        actions.sort_by_key(|a| a.at());
        actions
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
