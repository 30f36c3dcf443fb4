/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the schedule manager.
//!
//! Two layers, like the failure paths they describe:
//!
//! * [`MalformedReason`]: why the validator refused a raw request (carries
//!   the offending entry index and value).
//! * [`RequestError`]: everything that turns a `request_slots` call into
//!   [`RequestOutcome::Invalid`](super::RequestOutcome::Invalid).
//!
//! Blocking conflicts against existing reservations are **not** errors here;
//! they are a normal [`RequestOutcome::Rejected`](super::RequestOutcome::Rejected)
//! carrying the full conflict map.
//!
//! The `Display` output of every variant starts with the status code agents
//! match on (`MALFORMED_REQUEST`, `REQUEST_CONFLICTS_WITH_SELF`, ...).

use thiserror::Error;

use crate::task::{format_timestamp, Interval, TaskKey};

// ── Malformed input ───────────────────────────────────────────────────────────

/// Detailed reason why a raw request failed validation.
///
/// `index` is the zero-based position of the entry inside the request list.
#[derive(Debug, Clone, PartialEq)]
pub enum MalformedReason {
    /// `agent_id` was empty.
    EmptyAgentId,

    /// `task_id` was empty.
    EmptyTaskId,

    /// The request list had no entries.
    EmptyRequest,

    /// An entry was not a `[device, start, end]` triple.
    WrongArity { index: usize, len: usize },

    /// The device field was not text.
    DeviceNotString { index: usize, found: &'static str },

    /// The device field was empty once surrounding `/` were stripped.
    EmptyDevice { index: usize },

    /// A start or end value could not be turned into a timestamp.
    BadTimestamp {
        index: usize,
        field: &'static str,
        value: String,
    },

    /// `start >= end`.
    StartNotBeforeEnd {
        index: usize,
        start: String,
        end: String,
    },
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedReason::EmptyAgentId => {
                write!(f, "TypeError: agentid must be a nonempty string")
            }
            MalformedReason::EmptyTaskId => {
                write!(f, "TypeError: taskid must be a nonempty string")
            }
            MalformedReason::EmptyRequest => write!(f, "request list is empty"),
            MalformedReason::WrongArity { index, len } => write!(
                f,
                "entry {} has {} element(s), expected [device, start, end]",
                index, len
            ),
            MalformedReason::DeviceNotString { index, found } => write!(
                f,
                "ValueError: entry {} device is {}, not a string",
                index, found
            ),
            MalformedReason::EmptyDevice { index } => {
                write!(f, "ValueError: entry {} device path is empty", index)
            }
            MalformedReason::BadTimestamp {
                index,
                field,
                value,
            } => write!(
                f,
                "ValueError: entry {} {} '{}' is not a valid timestamp",
                index, field, value
            ),
            MalformedReason::StartNotBeforeEnd { index, start, end } => write!(
                f,
                "ValueError: entry {} start {} is not before end {}",
                index, start, end
            ),
        }
    }
}

// ── Request errors ────────────────────────────────────────────────────────────

/// Why a `request_slots` call was refused before touching any timeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// Structurally invalid input.
    #[error("MALFORMED_REQUEST: {0}")]
    Malformed(MalformedReason),

    /// Two slots of the same request overlap on one device.
    #[error("REQUEST_CONFLICTS_WITH_SELF: {}", self_conflict_detail(.first, .second))]
    SelfConflict { first: Interval, second: Interval },

    /// A live task already uses this `(agent_id, task_id)`.
    #[error("TASK_ID_ALREADY_EXISTS: {key}")]
    TaskIdAlreadyExists { key: TaskKey },
}

fn self_conflict_detail(first: &Interval, second: &Interval) -> String {
    format!(
        "{} [{} <-> {}] overlaps [{} <-> {}]",
        first.device,
        format_timestamp(first.start),
        format_timestamp(first.end),
        format_timestamp(second.start),
        format_timestamp(second.end)
    )
}

impl From<MalformedReason> for RequestError {
    fn from(reason: MalformedReason) -> Self {
        RequestError::Malformed(reason)
    }
}

// ── Cancellation errors ───────────────────────────────────────────────────────

/// Why a `cancel_task` call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    /// No live task has this id.  Also returned for tasks that already ended.
    #[error("TASK_ID_DOES_NOT_EXIST")]
    TaskIdDoesNotExist,

    /// The task exists but belongs to another agent.
    #[error("AGENT_ID_TASK_ID_MISMATCH")]
    AgentIdTaskIdMismatch,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn malformed_display_carries_status_prefix() {
        let err = RequestError::from(MalformedReason::EmptyRequest);
        assert_eq!(err.to_string(), "MALFORMED_REQUEST: request list is empty");
    }

    #[test]
    fn self_conflict_display_names_both_windows() {
        let t = |h, m| Utc.with_ymd_and_hms(2013, 11, 27, h, m, 0).unwrap();
        let err = RequestError::SelfConflict {
            first: Interval {
                device: "rtu1".into(),
                start: t(12, 0),
                end: t(12, 45),
            },
            second: Interval {
                device: "rtu1".into(),
                start: t(12, 30),
                end: t(13, 0),
            },
        };
        let msg = err.to_string();
        assert!(msg.starts_with("REQUEST_CONFLICTS_WITH_SELF: rtu1"));
        assert!(msg.contains("2013-11-27T12:30:00Z"));
    }

    #[test]
    fn cancel_errors_are_bare_codes() {
        assert_eq!(CancelError::TaskIdDoesNotExist.to_string(), "TASK_ID_DOES_NOT_EXIST");
        assert_eq!(
            CancelError::AgentIdTaskIdMismatch.to_string(),
            "AGENT_ID_TASK_ID_MISMATCH"
        );
    }
}
