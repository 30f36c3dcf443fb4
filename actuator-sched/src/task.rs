/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Core reservation data structures.
//!
//! ```text
//! agent ──(raw request)──► validator ──► Vec<Slot> ──(resolver)──► Task + timeline copies
//!                                                                    ↑ identity   ↑ queries
//! ```
//!
//! # Ownership model
//! A [`Task`] owns its [`Slot`]s.  Each device timeline keeps its own copy of
//! the slot tagged with the owner's [`TaskKey`] and [`Priority`]; the
//! [`ScheduleManager`](crate::scheduler::ScheduleManager) applies every
//! truncation and removal to both copies so they never drift.

use std::fmt;

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use serde::Serialize;

use crate::priority::Priority;

/// Every time value inside the scheduler.  Inputs are normalised to this at
/// the validator boundary.
pub type Timestamp = DateTime<Utc>;

/// Renders a timestamp the way conflict reports carry it.
pub fn format_timestamp(t: Timestamp) -> String {
    t.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Round up to the next whole second; whole-second values are unchanged.
/// Past the last representable second `t` is returned as is.
pub fn ceil_to_second(t: Timestamp) -> Timestamp {
    match t.timestamp_subsec_nanos() {
        0 => t,
        nanos => t
            .checked_add_signed(TimeDelta::seconds(1) - TimeDelta::nanoseconds(i64::from(nanos)))
            .unwrap_or(t),
    }
}

// ── TaskKey ───────────────────────────────────────────────────────────────────

/// Unique identity of a reservation request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TaskKey {
    pub agent_id: String,
    pub task_id: String,
}

impl TaskKey {
    pub fn new(agent_id: impl Into<String>, task_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
        }
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent_id, self.task_id)
    }
}

// ── Slot ──────────────────────────────────────────────────────────────────────

/// A single device + time-interval claim.
///
/// `start < end` always holds.  `effective_end` equals `end` until the slot is
/// preempted, after which it is the cutover time (`effective_end <= end`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub device: String,
    pub start: Timestamp,
    pub end: Timestamp,
    pub effective_end: Timestamp,
}

impl Slot {
    /// Create an un-preempted slot.
    pub fn new(device: impl Into<String>, start: Timestamp, end: Timestamp) -> Self {
        Self {
            device: device.into(),
            start,
            end,
            effective_end: end,
        }
    }

    /// `start <= now < effective_end`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        self.start <= now && now < self.effective_end
    }

    /// `effective_end <= now`: eligible for pruning.
    pub fn has_ended(&self, now: Timestamp) -> bool {
        self.effective_end <= now
    }

    /// Half-open overlap of `[start, effective_end)` with `[start, end)`.
    /// Slots that merely touch do not overlap.
    pub fn overlaps(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start < end && start < self.effective_end
    }

    /// Clip the effective end.  Never extends it.
    pub fn truncate(&mut self, cutover: Timestamp) {
        self.effective_end = self.effective_end.min(cutover);
    }

    pub fn remaining(&self, now: Timestamp) -> TimeDelta {
        self.effective_end - now
    }

    pub fn interval(&self) -> Interval {
        Interval {
            device: self.device.clone(),
            start: self.start,
            end: self.effective_end,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} <-> {})",
            self.device,
            format_timestamp(self.start),
            format_timestamp(self.effective_end)
        )
    }
}

// ── Interval ──────────────────────────────────────────────────────────────────

/// A reported reservation window: `[device, start, end]`.
///
/// Used in conflict reports; `end` is the reservation's effective end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Interval {
    pub device: String,
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Interval {
    /// `[device, start_iso, end_iso]` for transport envelopes.
    pub fn to_triple(&self) -> [String; 3] {
        [
            self.device.clone(),
            format_timestamp(self.start),
            format_timestamp(self.end),
        ]
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// A granted reservation request: one or more slots sharing a priority.
///
/// # Lifecycle
/// Created by a successful `request_slots`, trimmed as its slots are pruned,
/// truncated or cancelled, and dropped from the live-task map once `slots` is
/// empty.
#[derive(Debug, Clone)]
pub struct Task {
    pub key: TaskKey,
    pub priority: Priority,
    pub slots: Vec<Slot>,
    pub submitted_at: Timestamp,
}

impl Task {
    /// Any slot active at `now`.
    pub fn is_running(&self, now: Timestamp) -> bool {
        self.slots.iter().any(|s| s.is_active(now))
    }

    /// Drop slots whose effective end has passed.
    pub fn prune(&mut self, now: Timestamp) {
        self.slots.retain(|s| !s.has_ended(now));
    }

    pub fn is_finished(&self) -> bool {
        self.slots.is_empty()
    }

    /// Truncate the slot identified by `(device, start)`.
    pub fn truncate_slot(&mut self, device: &str, start: Timestamp, cutover: Timestamp) {
        if let Some(slot) = self
            .slots
            .iter_mut()
            .find(|s| s.device == device && s.start == start)
        {
            slot.truncate(cutover);
        }
    }

    /// Remove the slot identified by `(device, start)`.
    pub fn remove_slot(&mut self, device: &str, start: Timestamp) {
        self.slots.retain(|s| !(s.device == device && s.start == start));
    }
}

// ── DeviceState ───────────────────────────────────────────────────────────────

/// Who currently drives a device and for how much longer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceState {
    pub agent_id: String,
    pub task_id: String,
    pub remaining_seconds: f64,
}

impl DeviceState {
    pub fn new(
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        remaining_seconds: f64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            remaining_seconds,
        }
    }
}

/// Whole-duration seconds as `f64`, millisecond resolution.
pub fn as_seconds(d: TimeDelta) -> f64 {
    d.num_milliseconds() as f64 / 1_000.0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
