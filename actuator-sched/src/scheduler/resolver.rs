/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Conflict detection and preemption planning.
//!
//! For every requested slot the resolver walks the overlapping reservations
//! on that device and classifies each one:
//!
//! | Existing reservation | Outcome |
//! |---|---|
//! | rank ≥ requester | blocking |
//! | `LOW`, active | blocking (immune while running) |
//! | lower rank, not started | cancelled outright, no grace |
//! | `LOW_PREEMPT`, active, lower rank | truncated to `now + grace` |
//!
//! One blocking overlap anywhere rejects the whole request.  Otherwise the
//! result is a [`CommitPlan`] the manager applies in one step.  The resolver
//! only reads state; nothing is mutated until the plan is applied.

use std::collections::{BTreeMap, BTreeSet};

use chrono::TimeDelta;
use tracing::{debug, warn};

use super::timeline::{DeviceTimeline, Reservation};
use crate::priority::Priority;
use crate::task::{Interval, Slot, Task, TaskKey, Timestamp};

/// Blocking reservations grouped as `agent_id → task_id → [intervals]`.
pub type ConflictMap = BTreeMap<String, BTreeMap<String, Vec<Interval>>>;

// ── Commit plan ───────────────────────────────────────────────────────────────

/// A change to an existing reservation, applied before the new slots go in.
#[derive(Debug, Clone, PartialEq)]
pub enum PreemptionEdit {
    /// Remove a not-yet-started slot.
    Cancel {
        owner: TaskKey,
        device: String,
        start: Timestamp,
    },
    /// Clip an active slot's effective end to `cutover`.
    Truncate {
        owner: TaskKey,
        device: String,
        start: Timestamp,
        cutover: Timestamp,
    },
    /// Add a boundary at `at` for `owner` without touching occupancy.
    Mark {
        owner: TaskKey,
        device: String,
        at: Timestamp,
    },
}

/// Everything needed to commit a granted request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommitPlan {
    /// New slots with their effective starts.
    pub slots: Vec<Slot>,
    pub edits: Vec<PreemptionEdit>,
    pub preempted: BTreeSet<TaskKey>,
}

impl CommitPlan {
    fn edit(&mut self, edit: PreemptionEdit) {
        if !self.edits.contains(&edit) {
            self.edits.push(edit);
        }
    }
}

// ── Classification ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overlap {
    Blocking,
    Cancel,
    Preempt,
    /// Already over at `now`; only seen when the caller skipped pruning.
    Ended,
}

fn classify(existing: &Reservation, requester: Priority, now: Timestamp) -> Overlap {
    let active = existing.slot.is_active(now);
    if existing.priority >= requester || (existing.priority == Priority::Low && active) {
        Overlap::Blocking
    } else if now < existing.slot.start {
        Overlap::Cancel
    } else if active {
        Overlap::Preempt
    } else {
        Overlap::Ended
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Read-only view over the manager's state for one resolution.
pub struct Resolver<'a> {
    timelines: &'a BTreeMap<String, DeviceTimeline>,
    tasks: &'a BTreeMap<TaskKey, Task>,
    grace_period: TimeDelta,
}

impl<'a> Resolver<'a> {
    pub fn new(
        timelines: &'a BTreeMap<String, DeviceTimeline>,
        tasks: &'a BTreeMap<TaskKey, Task>,
        grace_period: TimeDelta,
    ) -> Self {
        Self {
            timelines,
            tasks,
            grace_period,
        }
    }

    /// Resolve `requested` slots at `priority` as one atomic unit.
    ///
    /// # Errors
    /// Returns the full [`ConflictMap`] if any requested slot is blocked on
    /// any device.
    pub fn resolve(
        &self,
        priority: Priority,
        requested: Vec<Slot>,
        now: Timestamp,
    ) -> Result<CommitPlan, ConflictMap> {
        let mut conflicts = ConflictMap::new();
        let mut plan = CommitPlan::default();
        let grace_end = grace_deadline(now, self.grace_period);

        for slot in requested {
            let mut effective_start = slot.start;

            if let Some(timeline) = self.timelines.get(&slot.device) {
                for existing in timeline.overlapping(slot.start, slot.end) {
                    match classify(existing, priority, now) {
                        Overlap::Blocking => record_conflict(&mut conflicts, existing),
                        Overlap::Cancel => {
                            plan.edit(PreemptionEdit::Cancel {
                                owner: existing.owner.clone(),
                                device: slot.device.clone(),
                                start: existing.slot.start,
                            });
                            if self.is_running(&existing.owner, now) {
                                plan.edit(PreemptionEdit::Mark {
                                    owner: existing.owner.clone(),
                                    device: slot.device.clone(),
                                    at: grace_end,
                                });
                            }
                            plan.preempted.insert(existing.owner.clone());
                        }
                        Overlap::Preempt => {
                            let cutover = grace_end.min(existing.slot.effective_end);
                            plan.edit(PreemptionEdit::Truncate {
                                owner: existing.owner.clone(),
                                device: slot.device.clone(),
                                start: existing.slot.start,
                                cutover,
                            });
                            plan.preempted.insert(existing.owner.clone());
                            effective_start = effective_start.max(cutover);
                        }
                        Overlap::Ended => {}
                    }
                }
            }

            if effective_start >= slot.end {
                warn!(
                    device = %slot.device,
                    end = %slot.end,
                    "requested slot ends inside the grace window, nothing left to reserve"
                );
                continue;
            }
            plan.slots.push(Slot::new(slot.device, effective_start, slot.end));
        }

        if !conflicts.is_empty() {
            debug!(
                agents = conflicts.len(),
                "request blocked by existing reservations"
            );
            return Err(conflicts);
        }

        debug!(
            slots = plan.slots.len(),
            edits = plan.edits.len(),
            preempted = plan.preempted.len(),
            "commit plan ready"
        );
        Ok(plan)
    }

    fn is_running(&self, owner: &TaskKey, now: Timestamp) -> bool {
        self.tasks.get(owner).is_some_and(|t| t.is_running(now))
    }
}

/// `now + grace`, saturating at the last representable instant.  A negative
/// grace counts as zero.
fn grace_deadline(now: Timestamp, grace: TimeDelta) -> Timestamp {
    now.checked_add_signed(grace.max(TimeDelta::zero()))
        .unwrap_or(Timestamp::MAX_UTC)
}

fn record_conflict(conflicts: &mut ConflictMap, existing: &Reservation) {
    let intervals = conflicts
        .entry(existing.owner.agent_id.clone())
        .or_default()
        .entry(existing.owner.task_id.clone())
        .or_default();
    let interval = existing.slot.interval();
    if !intervals.contains(&interval) {
        intervals.push(interval);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2013, 11, 27, h, m, 0).unwrap()
    }

    /// Timelines + task map holding one task with the given slots.
    fn state(
        agent: &str,
        priority: Priority,
        slots: &[(&str, Timestamp, Timestamp)],
    ) -> (BTreeMap<String, DeviceTimeline>, BTreeMap<TaskKey, Task>) {
        let key = TaskKey::new(agent, "Task1");
        let slots: Vec<Slot> = slots.iter().map(|(d, s, e)| Slot::new(*d, *s, *e)).collect();
        let mut timelines: BTreeMap<String, DeviceTimeline> = BTreeMap::new();
        for slot in &slots {
            timelines
                .entry(slot.device.clone())
                .or_default()
                .insert(Reservation::new(key.clone(), priority, slot.clone()));
        }
        let mut tasks = BTreeMap::new();
        tasks.insert(
            key.clone(),
            Task {
                key,
                priority,
                slots,
                submitted_at: at(11, 30),
            },
        );
        (timelines, tasks)
    }

    fn resolve(
        existing: Priority,
        slots: &[(&str, Timestamp, Timestamp)],
        requester: Priority,
        request: Slot,
        now: Timestamp,
    ) -> Result<CommitPlan, ConflictMap> {
        let (timelines, tasks) = state("Agent1", existing, slots);
        Resolver::new(&timelines, &tasks, TimeDelta::seconds(60))
            .resolve(requester, vec![request], now)
    }

    #[test]
    fn equal_priority_blocks_even_before_start() {
        for p in Priority::ALL {
            let err = resolve(
                p,
                &[("rtu1", at(12, 0), at(12, 35))],
                p,
                Slot::new("rtu1", at(12, 30), at(13, 0)),
                at(11, 30),
            )
            .unwrap_err();
            assert_eq!(
                err["Agent1"]["Task1"],
                vec![Interval {
                    device: "rtu1".into(),
                    start: at(12, 0),
                    end: at(12, 35)
                }]
            );
        }
    }

    #[test]
    fn lower_priority_requester_is_blocked() {
        let err = resolve(
            Priority::LowPreempt,
            &[("rtu1", at(12, 0), at(12, 35))],
            Priority::Low,
            Slot::new("rtu1", at(12, 30), at(13, 0)),
            at(11, 30),
        );
        assert!(err.is_err());
    }

    #[test]
    fn future_lower_slot_is_cancelled_without_grace() {
        let plan = resolve(
            Priority::Low,
            &[("rtu1", at(12, 0), at(12, 35))],
            Priority::High,
            Slot::new("rtu1", at(12, 30), at(13, 0)),
            at(11, 30),
        )
        .unwrap();
        assert_eq!(
            plan.edits,
            vec![PreemptionEdit::Cancel {
                owner: TaskKey::new("Agent1", "Task1"),
                device: "rtu1".into(),
                start: at(12, 0),
            }]
        );
        assert_eq!(plan.slots, vec![Slot::new("rtu1", at(12, 30), at(13, 0))]);
        assert!(plan.preempted.contains(&TaskKey::new("Agent1", "Task1")));
    }

    #[test]
    fn low_preempt_requester_cancels_future_low_slot() {
        let plan = resolve(
            Priority::Low,
            &[("rtu1", at(12, 0), at(12, 35))],
            Priority::LowPreempt,
            Slot::new("rtu1", at(12, 30), at(13, 0)),
            at(11, 30),
        )
        .unwrap();
        assert_eq!(plan.preempted.len(), 1);
    }

    #[test]
    fn active_low_blocks_high() {
        let err = resolve(
            Priority::Low,
            &[("rtu1", at(12, 0), at(12, 35))],
            Priority::High,
            Slot::new("rtu1", at(12, 30), at(13, 0)),
            at(12, 15),
        )
        .unwrap_err();
        assert!(err.contains_key("Agent1"));
    }

    #[test]
    fn active_low_blocks_low_preempt() {
        let err = resolve(
            Priority::Low,
            &[("rtu1", at(12, 0), at(12, 35))],
            Priority::LowPreempt,
            Slot::new("rtu1", at(12, 30), at(13, 0)),
            at(12, 15),
        )
        .unwrap_err();
        assert!(err.contains_key("Agent1"));
    }

    #[test]
    fn active_low_preempt_is_truncated_and_new_start_deferred() {
        let plan = resolve(
            Priority::LowPreempt,
            &[("rtu1", at(12, 0), at(12, 35))],
            Priority::High,
            Slot::new("rtu1", at(12, 5), at(13, 0)),
            at(12, 15),
        )
        .unwrap();
        assert_eq!(
            plan.edits,
            vec![PreemptionEdit::Truncate {
                owner: TaskKey::new("Agent1", "Task1"),
                device: "rtu1".into(),
                start: at(12, 0),
                cutover: at(12, 16),
            }]
        );
        assert_eq!(plan.slots, vec![Slot::new("rtu1", at(12, 16), at(13, 0))]);
    }

    #[test]
    fn cutover_is_clipped_to_existing_end() {
        let plan = resolve(
            Priority::LowPreempt,
            &[("rtu1", at(12, 0), at(12, 15))],
            Priority::High,
            Slot::new("rtu1", at(12, 10), at(13, 0)),
            at(12, 14),
        )
        .unwrap();
        match &plan.edits[0] {
            PreemptionEdit::Truncate { cutover, .. } => assert_eq!(*cutover, at(12, 15)),
            other => panic!("unexpected edit {other:?}"),
        }
        assert_eq!(plan.slots[0].start, at(12, 15));
    }

    #[test]
    fn unbounded_grace_keeps_existing_slot_to_its_end() {
        let (timelines, tasks) = state(
            "Agent1",
            Priority::LowPreempt,
            &[("rtu1", at(12, 0), at(12, 35))],
        );
        let plan = Resolver::new(&timelines, &tasks, TimeDelta::MAX)
            .resolve(
                Priority::High,
                vec![Slot::new("rtu1", at(12, 5), at(13, 0))],
                at(12, 15),
            )
            .unwrap();
        assert_eq!(plan.slots, vec![Slot::new("rtu1", at(12, 35), at(13, 0))]);
    }

    #[test]
    fn negative_grace_cuts_over_at_now() {
        let (timelines, tasks) = state(
            "Agent1",
            Priority::LowPreempt,
            &[("rtu1", at(12, 0), at(12, 35))],
        );
        let plan = Resolver::new(&timelines, &tasks, TimeDelta::minutes(-30))
            .resolve(
                Priority::High,
                vec![Slot::new("rtu1", at(12, 5), at(13, 0))],
                at(12, 15),
            )
            .unwrap();
        match &plan.edits[0] {
            PreemptionEdit::Truncate { cutover, .. } => assert_eq!(*cutover, at(12, 15)),
            other => panic!("unexpected edit {other:?}"),
        }
    }

    #[test]
    fn request_inside_grace_window_leaves_no_slot() {
        let plan = resolve(
            Priority::LowPreempt,
            &[("rtu1", at(12, 0), at(12, 35))],
            Priority::High,
            Slot::new("rtu1", at(12, 15), at(12, 16)),
            at(12, 15),
        )
        .unwrap();
        assert!(plan.slots.is_empty());
        assert_eq!(plan.preempted.len(), 1);
    }

    #[test]
    fn cancelling_future_slot_of_running_task_marks_grace_boundary() {
        let (timelines, tasks) = state(
            "Agent1",
            Priority::LowPreempt,
            &[("rtu2", at(12, 0), at(13, 0)), ("rtu3", at(12, 45), at(13, 0))],
        );
        let plan = Resolver::new(&timelines, &tasks, TimeDelta::seconds(60))
            .resolve(
                Priority::High,
                vec![Slot::new("rtu3", at(12, 30), at(13, 0))],
                at(12, 25),
            )
            .unwrap();
        assert!(plan.edits.contains(&PreemptionEdit::Mark {
            owner: TaskKey::new("Agent1", "Task1"),
            device: "rtu3".into(),
            at: at(12, 26),
        }));
    }

    #[test]
    fn blocked_multi_device_request_reports_every_device() {
        let (timelines, tasks) = state(
            "Agent1",
            Priority::High,
            &[("rtu1", at(12, 0), at(13, 0)), ("rtu2", at(12, 0), at(13, 0))],
        );
        let err = Resolver::new(&timelines, &tasks, TimeDelta::seconds(60))
            .resolve(
                Priority::High,
                vec![
                    Slot::new("rtu1", at(12, 30), at(13, 30)),
                    Slot::new("rtu2", at(12, 30), at(13, 30)),
                    Slot::new("rtu9", at(12, 30), at(13, 30)),
                ],
                at(11, 30),
            )
            .unwrap_err();
        assert_eq!(err["Agent1"]["Task1"].len(), 2);
    }

    #[test]
    fn one_existing_slot_is_reported_once() {
        let (timelines, tasks) = state("Agent1", Priority::High, &[("rtu1", at(12, 0), at(14, 0))]);
        let err = Resolver::new(&timelines, &tasks, TimeDelta::seconds(60))
            .resolve(
                Priority::High,
                vec![
                    Slot::new("rtu1", at(12, 0), at(12, 30)),
                    Slot::new("rtu1", at(13, 0), at(13, 30)),
                ],
                at(11, 30),
            )
            .unwrap_err();
        assert_eq!(err["Agent1"]["Task1"].len(), 1);
    }
}
