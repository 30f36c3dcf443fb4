/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Reservation priority levels.
//!
//! The derived `Ord` gives the rank used everywhere in the resolver:
//!
//! ```text
//! LOW  <  LOW_PREEMPT  <  HIGH
//! ```
//!
//! Two rules ride on top of the rank and live in the resolver, not here:
//!
//! | Rule | Effect |
//! |---|---|
//! | Active `LOW` | blocks every requester while it runs |
//! | Not yet started | displaced outright by any strictly higher rank |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Priority ──────────────────────────────────────────────────────────────────

/// Priority of a reservation request.
///
/// Variant order matters: `#[derive(PartialOrd, Ord)]` ranks them by
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Preemptable before it starts, immune once running.
    Low,
    /// Preemptable at any time; an active slot gets the grace window.
    LowPreempt,
    /// Never preempted.
    High,
}

impl Priority {
    /// Every priority, lowest rank first.
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::LowPreempt, Priority::High];

    /// Wire name used by agents in schedule requests.
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::LowPreempt => "LOW_PREEMPT",
            Priority::High => "HIGH",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a priority string is not one of the three wire names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("INVALID_PRIORITY: '{0}' (valid: HIGH, LOW, LOW_PREEMPT)")]
pub struct ParsePriorityError(pub String);

impl FromStr for Priority {
    type Err = ParsePriorityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ParsePriorityError(s.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
