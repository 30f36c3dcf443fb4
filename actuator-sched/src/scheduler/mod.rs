/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Device-reservation scheduler for the actuator agent.
//!
//! [`ScheduleManager`] arbitrates which agent's [`Task`] may drive which
//! device at which moment.  It owns every live task and one
//! [`DeviceTimeline`] per device, and is a pure function of the calls made on
//! it: it never reads a clock, so every operation takes the caller's `now`.
//!
//! # Operations
//!
//! | Operation | Mutates | Result |
//! |---|---|---|
//! | [`request_slots`](ScheduleManager::request_slots) | on grant | [`RequestOutcome`] |
//! | [`cancel_task`](ScheduleManager::cancel_task) | on success | `Result<(), CancelError>` |
//! | [`get_schedule_state`](ScheduleManager::get_schedule_state) | prune only | device → [`DeviceState`] |
//! | [`get_next_event_time`](ScheduleManager::get_next_event_time) | prune only | next boundary |
//! | [`holds_lock`](ScheduleManager::holds_lock) | prune only | `bool` |
//!
//! "Prune only" means finished reservations are dropped lazily; calling a
//! query twice with the same `now` yields the same answer.
//!
//! # Example
//! ```rust
//! use actuator_sched::priority::Priority;
//! use actuator_sched::scheduler::{validate::entry, ScheduleManager};
//! use chrono::{TimeDelta, TimeZone, Utc};
//!
//! let now = Utc.with_ymd_and_hms(2013, 11, 27, 11, 30, 0).unwrap();
//! let mut mgr = ScheduleManager::new(TimeDelta::seconds(60), now);
//!
//! let outcome = mgr.request_slots(
//!     "Agent1",
//!     "Task1",
//!     &[entry("campus/building/rtu1", "2013-11-27 12:00:00", "2013-11-27 13:00:00")],
//!     Priority::High,
//!     now,
//! );
//! assert!(outcome.is_granted());
//! ```

pub mod error;
pub mod resolver;
pub mod timeline;
pub mod validate;

pub use error::{CancelError, MalformedReason, RequestError};
pub use resolver::{CommitPlan, ConflictMap, PreemptionEdit};
pub use timeline::{DeviceTimeline, Reservation};
pub use validate::RawValue;

use std::collections::{BTreeMap, BTreeSet};

use chrono::TimeDelta;
use tracing::{debug, info, warn};

use crate::priority::Priority;
use crate::task::{as_seconds, ceil_to_second, DeviceState, Task, TaskKey, Timestamp};

use resolver::Resolver;
use validate::{normalize_device, validate_request};

// ── RequestOutcome ────────────────────────────────────────────────────────────

/// Result of a [`ScheduleManager::request_slots`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestOutcome {
    /// The task was committed.  `preempted` lists every task that lost a slot
    /// to it (cancelled or cut over); empty when nothing was displaced.
    Granted { preempted: BTreeSet<TaskKey> },

    /// Blocked by reservations this request may not displace.
    Rejected { conflicts: ConflictMap },

    /// Refused before any timeline was consulted.
    Invalid { reason: RequestError },
}

impl RequestOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, RequestOutcome::Granted { .. })
    }

    /// Status string for transport envelopes; empty unless the request was
    /// invalid.
    pub fn info(&self) -> String {
        match self {
            RequestOutcome::Invalid { reason } => reason.to_string(),
            _ => String::new(),
        }
    }

    /// Conflicts rendered as `agent → task → [[device, start, end]]`; empty
    /// unless the request was rejected.
    pub fn conflict_triples(&self) -> BTreeMap<String, BTreeMap<String, Vec<[String; 3]>>> {
        let RequestOutcome::Rejected { conflicts } = self else {
            return BTreeMap::new();
        };
        conflicts
            .iter()
            .map(|(agent, tasks)| {
                let tasks = tasks
                    .iter()
                    .map(|(task, intervals)| {
                        (task.clone(), intervals.iter().map(|i| i.to_triple()).collect())
                    })
                    .collect();
                (agent.clone(), tasks)
            })
            .collect()
    }
}

// ── ScheduleManager ───────────────────────────────────────────────────────────

/// Owns all live tasks and device timelines.
///
/// Single-threaded and synchronous.  A concurrent host must serialise access
/// (see [`crate::host::ScheduleHandle`]) because `request_slots` reads and
/// then writes several timelines.
#[derive(Debug)]
pub struct ScheduleManager {
    grace_period: TimeDelta,
    tasks: BTreeMap<TaskKey, Task>,
    /// `BTreeMap` so state reports come out sorted by device path.
    timelines: BTreeMap<String, DeviceTimeline>,
    /// Latest `now` seen, to flag callers whose clock runs backwards.
    last_now: Timestamp,
}

impl ScheduleManager {
    /// Create an empty manager.  `grace_period` is fixed for its lifetime;
    /// a negative value is treated as zero.
    pub fn new(grace_period: TimeDelta, now: Timestamp) -> Self {
        if grace_period < TimeDelta::zero() {
            warn!(
                grace_secs = grace_period.num_seconds(),
                "negative grace period, using zero"
            );
        }
        let grace_period = grace_period.max(TimeDelta::zero());
        info!(
            grace_secs = grace_period.num_seconds(),
            now = %now,
            "schedule manager created"
        );
        Self {
            grace_period,
            tasks: BTreeMap::new(),
            timelines: BTreeMap::new(),
            last_now: now,
        }
    }

    pub fn grace_period(&self) -> TimeDelta {
        self.grace_period
    }

    pub fn task(&self, key: &TaskKey) -> Option<&Task> {
        self.tasks.get(key)
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    // ── request_slots ─────────────────────────────────────────────────────────

    /// Reserve the requested device windows for `(agent_id, task_id)`.
    ///
    /// Steps: validate → prune at `now` → duplicate-key check → resolve all
    /// slots jointly → commit or reject.  A rejected or invalid request leaves
    /// every timeline untouched.
    pub fn request_slots(
        &mut self,
        agent_id: &str,
        task_id: &str,
        requests: &[Vec<RawValue>],
        priority: Priority,
        now: Timestamp,
    ) -> RequestOutcome {
        let slots = match validate_request(agent_id, task_id, requests) {
            Ok(slots) => slots,
            Err(reason) => {
                warn!(agent_id, task_id, %reason, "invalid schedule request");
                return RequestOutcome::Invalid { reason };
            }
        };

        self.prune(now);

        let key = TaskKey::new(agent_id, task_id);
        if self.tasks.contains_key(&key) {
            let reason = RequestError::TaskIdAlreadyExists { key };
            warn!(%reason, "invalid schedule request");
            return RequestOutcome::Invalid { reason };
        }

        let resolved = Resolver::new(&self.timelines, &self.tasks, self.grace_period)
            .resolve(priority, slots, now);

        match resolved {
            Err(conflicts) => {
                info!(
                    task = %key,
                    priority = %priority,
                    blocking_agents = conflicts.len(),
                    "✗ request conflicts with existing schedules"
                );
                RequestOutcome::Rejected { conflicts }
            }
            Ok(plan) => {
                let preempted = plan.preempted.clone();
                self.apply(key.clone(), priority, plan, now);
                info!(
                    task = %key,
                    priority = %priority,
                    preempted = preempted.len(),
                    "✓ schedule granted"
                );
                RequestOutcome::Granted { preempted }
            }
        }
    }

    /// Apply a commit plan: edits first, then the new slots.
    fn apply(&mut self, key: TaskKey, priority: Priority, plan: CommitPlan, now: Timestamp) {
        for edit in plan.edits {
            match edit {
                PreemptionEdit::Cancel {
                    owner,
                    device,
                    start,
                } => {
                    if let Some(timeline) = self.timelines.get_mut(&device) {
                        timeline.remove(&owner, start);
                    }
                    if let Some(task) = self.tasks.get_mut(&owner) {
                        task.remove_slot(&device, start);
                    }
                    debug!(owner = %owner, device = %device, "future slot cancelled");
                }
                PreemptionEdit::Truncate {
                    owner,
                    device,
                    start,
                    cutover,
                } => {
                    if let Some(timeline) = self.timelines.get_mut(&device) {
                        timeline.truncate(&owner, start, cutover);
                    }
                    if let Some(task) = self.tasks.get_mut(&owner) {
                        task.truncate_slot(&device, start, cutover);
                    }
                    debug!(
                        owner = %owner,
                        device = %device,
                        cutover = %cutover,
                        "active slot preempted"
                    );
                }
                PreemptionEdit::Mark { owner, device, at } => {
                    self.timelines.entry(device).or_default().mark(at, owner);
                }
            }
        }
        self.tasks.retain(|_, task| !task.is_finished());

        if plan.slots.is_empty() {
            warn!(task = %key, "granted task has no reservable time left");
            return;
        }

        for slot in &plan.slots {
            self.timelines
                .entry(slot.device.clone())
                .or_default()
                .insert(Reservation::new(key.clone(), priority, slot.clone()));
        }
        self.tasks.insert(
            key.clone(),
            Task {
                key,
                priority,
                slots: plan.slots,
                submitted_at: now,
            },
        );
    }

    // ── cancel_task ───────────────────────────────────────────────────────────

    /// Withdraw a live task and free all of its slots immediately.
    ///
    /// # Errors
    /// * [`CancelError::TaskIdDoesNotExist`]: no live task with `task_id`
    ///   (including tasks that already finished).
    /// * [`CancelError::AgentIdTaskIdMismatch`]: `task_id` belongs to a
    ///   different agent.
    pub fn cancel_task(
        &mut self,
        agent_id: &str,
        task_id: &str,
        now: Timestamp,
    ) -> Result<(), CancelError> {
        self.prune(now);

        let key = TaskKey::new(agent_id, task_id);
        if self.tasks.remove(&key).is_none() {
            return Err(if self.tasks.keys().any(|k| k.task_id == task_id) {
                CancelError::AgentIdTaskIdMismatch
            } else {
                CancelError::TaskIdDoesNotExist
            });
        }

        let freed: usize = self
            .timelines
            .values_mut()
            .map(|timeline| timeline.remove_owner(&key))
            .sum();
        self.timelines.retain(|_, timeline| !timeline.is_empty());

        info!(task = %key, freed, "task cancelled");
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    /// Current occupant of every busy device.
    ///
    /// Devices with no active slot at `now` are absent from the map.
    pub fn get_schedule_state(&mut self, now: Timestamp) -> BTreeMap<String, DeviceState> {
        self.prune(now);

        self.timelines
            .iter()
            .filter_map(|(device, timeline)| {
                let active = timeline.active_at(now)?;
                Some((
                    device.clone(),
                    DeviceState::new(
                        active.owner.agent_id.clone(),
                        active.owner.task_id.clone(),
                        as_seconds(active.slot.remaining(now)),
                    ),
                ))
            })
            .collect()
    }

    /// Smallest boundary strictly after `now`, rounded up to a whole second.
    ///
    /// `None` when nothing is scheduled to change.
    pub fn get_next_event_time(&mut self, now: Timestamp) -> Option<Timestamp> {
        self.prune(now);

        self.timelines
            .values()
            .flat_map(|timeline| timeline.boundaries())
            .filter(|t| *t > now)
            .min()
            .map(ceil_to_second)
    }

    /// `true` if `agent_id` currently occupies `device`.
    pub fn holds_lock(&mut self, device: &str, agent_id: &str, now: Timestamp) -> bool {
        self.prune(now);

        self.timelines
            .get(normalize_device(device))
            .and_then(|timeline| timeline.active_at(now))
            .is_some_and(|active| active.owner.agent_id == agent_id)
    }

    // ── Housekeeping ──────────────────────────────────────────────────────────

    /// Drop everything that ended at or before `now`.
    fn prune(&mut self, now: Timestamp) {
        if now < self.last_now {
            warn!(now = %now, last = %self.last_now, "caller clock moved backwards");
        }
        self.last_now = self.last_now.max(now);

        for timeline in self.timelines.values_mut() {
            timeline.prune(now);
        }
        self.timelines.retain(|_, timeline| !timeline.is_empty());

        let before = self.tasks.len();
        for task in self.tasks.values_mut() {
            task.prune(now);
        }
        self.tasks.retain(|_, task| !task.is_finished());
        if self.tasks.len() < before {
            debug!(finished = before - self.tasks.len(), "finished tasks removed");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
