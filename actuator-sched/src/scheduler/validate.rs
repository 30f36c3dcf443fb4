/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Request validation: raw agent input → typed [`Slot`]s.
//!
//! Agents send each reservation as a loosely typed `[device, start, end]`
//! triple where the times may already be timestamps or may be strings.  This
//! module is the only place that looks at those raw shapes; everything after
//! it works with [`Timestamp`] alone.
//!
//! Validation never consults a device timeline and has no side effects.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{MalformedReason, RequestError};
use crate::task::{Slot, Timestamp};

// ── Raw input ─────────────────────────────────────────────────────────────────

/// One loosely typed field of a raw request entry.
///
/// Deserialises untagged, so a YAML or JSON request list maps straight onto
/// `Vec<Vec<RawValue>>`.  Strings carrying an explicit offset become
/// [`RawValue::Timestamp`]; everything else stays as it arrived and is judged
/// by [`validate_request`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Timestamp(Timestamp),
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl RawValue {
    fn kind(&self) -> &'static str {
        match self {
            RawValue::Timestamp(_) => "a timestamp",
            RawValue::Text(_) => "a string",
            RawValue::Integer(_) => "an integer",
            RawValue::Float(_) => "a float",
            RawValue::Bool(_) => "a boolean",
            RawValue::Null => "null",
        }
    }

    fn describe(&self) -> String {
        match self {
            RawValue::Timestamp(t) => t.to_rfc3339(),
            RawValue::Text(s) => s.clone(),
            RawValue::Integer(i) => i.to_string(),
            RawValue::Float(x) => x.to_string(),
            RawValue::Bool(b) => b.to_string(),
            RawValue::Null => "null".to_string(),
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<String> for RawValue {
    fn from(s: String) -> Self {
        RawValue::Text(s)
    }
}

impl From<Timestamp> for RawValue {
    fn from(t: Timestamp) -> Self {
        RawValue::Timestamp(t)
    }
}

impl From<i64> for RawValue {
    fn from(i: i64) -> Self {
        RawValue::Integer(i)
    }
}

/// Build one `[device, start, end]` entry from anything convertible.
pub fn entry(
    device: impl Into<RawValue>,
    start: impl Into<RawValue>,
    end: impl Into<RawValue>,
) -> Vec<RawValue> {
    vec![device.into(), start.into(), end.into()]
}

// ── Timestamp parsing ─────────────────────────────────────────────────────────

/// Formats tried after RFC 3339, for strings that carry an offset.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Formats for offset-less strings; these are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Parse an ISO-8601 style timestamp string.
///
/// Strings without an offset are taken to be UTC.  Returns `None` for
/// anything unparseable.
pub fn parse_timestamp(s: &str) -> Option<Timestamp> {
    let s = s.trim();

    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(t) = DateTime::parse_from_str(s, fmt) {
            return Some(t.with_timezone(&Utc));
        }
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn to_timestamp(
    value: &RawValue,
    index: usize,
    field: &'static str,
) -> Result<Timestamp, MalformedReason> {
    let parsed = match value {
        RawValue::Timestamp(t) => Some(*t),
        RawValue::Text(s) => parse_timestamp(s),
        _ => None,
    };
    parsed.ok_or_else(|| MalformedReason::BadTimestamp {
        index,
        field,
        value: value.describe(),
    })
}

/// Device paths are compared without surrounding slashes.
pub fn normalize_device(device: &str) -> &str {
    device.trim_matches('/')
}

// ── Validation ────────────────────────────────────────────────────────────────

/// Validate a raw request and return its slots in request order.
///
/// # Errors
/// * [`RequestError::Malformed`]: empty ids, empty list, wrong entry shape,
///   non-string device, unparseable time, or `start >= end`.
/// * [`RequestError::SelfConflict`]: two entries overlap on one device.
pub fn validate_request(
    agent_id: &str,
    task_id: &str,
    requests: &[Vec<RawValue>],
) -> Result<Vec<Slot>, RequestError> {
    if agent_id.is_empty() {
        return Err(MalformedReason::EmptyAgentId.into());
    }
    if task_id.is_empty() {
        return Err(MalformedReason::EmptyTaskId.into());
    }
    if requests.is_empty() {
        return Err(MalformedReason::EmptyRequest.into());
    }

    let slots = requests
        .iter()
        .enumerate()
        .map(|(index, raw)| parse_entry(index, raw))
        .collect::<Result<Vec<_>, _>>()?;

    check_self_conflict(&slots)?;

    Ok(slots)
}

fn parse_entry(index: usize, raw: &[RawValue]) -> Result<Slot, MalformedReason> {
    let [device, start, end] = raw else {
        return Err(MalformedReason::WrongArity {
            index,
            len: raw.len(),
        });
    };

    let device = match device {
        RawValue::Text(d) => normalize_device(d),
        other => {
            return Err(MalformedReason::DeviceNotString {
                index,
                found: other.kind(),
            })
        }
    };
    if device.is_empty() {
        return Err(MalformedReason::EmptyDevice { index });
    }

    let start = to_timestamp(start, index, "start")?;
    let end = to_timestamp(end, index, "end")?;
    if start >= end {
        return Err(MalformedReason::StartNotBeforeEnd {
            index,
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
        });
    }

    Ok(Slot::new(device, start, end))
}

/// Reject a request whose own slots overlap on any device.
fn check_self_conflict(slots: &[Slot]) -> Result<(), RequestError> {
    let mut by_device: BTreeMap<&str, Vec<&Slot>> = BTreeMap::new();
    for slot in slots {
        by_device.entry(slot.device.as_str()).or_default().push(slot);
    }

    for device_slots in by_device.values_mut() {
        device_slots.sort_by_key(|s| s.start);
        // With starts sorted, any overlap shows up against the slot reaching
        // furthest so far.
        let mut furthest: Option<&Slot> = None;
        for slot in device_slots.iter() {
            if let Some(prev) = furthest {
                if slot.start < prev.end {
                    return Err(RequestError::SelfConflict {
                        first: prev.interval(),
                        second: slot.interval(),
                    });
                }
            }
            if furthest.map_or(true, |prev| slot.end > prev.end) {
                furthest = Some(slot);
            }
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
