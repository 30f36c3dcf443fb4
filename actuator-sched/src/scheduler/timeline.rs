/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-device reservation timeline.
//!
//! # Invariant
//! No two reservations on one timeline overlap in `[start, effective_end)`.
//! Because of that, ordering by `start` also orders by `effective_end`, which
//! lets [`DeviceTimeline::overlapping`] binary-search its first candidate.
//!
//! The resolver proves the invariant before the manager calls
//! [`DeviceTimeline::insert`]; `insert` only re-checks it in debug builds.

use std::collections::BTreeSet;

use tracing::debug;

use crate::priority::Priority;
use crate::task::{Slot, TaskKey, Timestamp};

// ── Reservation ───────────────────────────────────────────────────────────────

/// A slot as seen by its timeline: the slot plus who owns it at what rank.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub owner: TaskKey,
    pub priority: Priority,
    pub slot: Slot,
}

impl Reservation {
    pub fn new(owner: TaskKey, priority: Priority, slot: Slot) -> Self {
        Self {
            owner,
            priority,
            slot,
        }
    }

    fn is(&self, owner: &TaskKey, start: Timestamp) -> bool {
        &self.owner == owner && self.slot.start == start
    }
}

// ── DeviceTimeline ────────────────────────────────────────────────────────────

/// Ordered-by-start reservations on one device.
///
/// `markers` are extra boundaries left behind when a running task loses a
/// future slot to preemption, tagged with that task.  They are reported by
/// [`boundaries`] but never occupy the device.
///
/// [`boundaries`]: DeviceTimeline::boundaries
#[derive(Debug, Clone, Default)]
pub struct DeviceTimeline {
    reservations: Vec<Reservation>,
    markers: BTreeSet<(Timestamp, TaskKey)>,
}

impl DeviceTimeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reservations whose `[start, effective_end)` intersects `[start, end)`.
    pub fn overlapping(&self, start: Timestamp, end: Timestamp) -> Vec<&Reservation> {
        let first = self
            .reservations
            .partition_point(|r| r.slot.effective_end <= start);
        self.reservations[first..]
            .iter()
            .take_while(|r| r.slot.start < end)
            .filter(|r| r.slot.overlaps(start, end))
            .collect()
    }

    /// Insert keeping start order.  The caller guarantees no overlap.
    pub fn insert(&mut self, reservation: Reservation) {
        debug_assert!(
            self.overlapping(reservation.slot.start, reservation.slot.effective_end)
                .is_empty(),
            "insert of {} would overlap an existing reservation",
            reservation.slot
        );
        let idx = self
            .reservations
            .partition_point(|r| r.slot.start <= reservation.slot.start);
        self.reservations.insert(idx, reservation);
    }

    /// Clip the effective end of `owner`'s slot starting at `start`.
    ///
    /// Returns the new effective end, or `None` if no such slot exists.
    pub fn truncate(
        &mut self,
        owner: &TaskKey,
        start: Timestamp,
        cutover: Timestamp,
    ) -> Option<Timestamp> {
        let reservation = self.reservations.iter_mut().find(|r| r.is(owner, start))?;
        reservation.slot.truncate(cutover);
        Some(reservation.slot.effective_end)
    }

    /// Remove `owner`'s slot starting at `start`.
    pub fn remove(&mut self, owner: &TaskKey, start: Timestamp) -> Option<Reservation> {
        let idx = self.reservations.iter().position(|r| r.is(owner, start))?;
        Some(self.reservations.remove(idx))
    }

    /// Remove every slot and marker owned by `owner`; returns how many slots
    /// were dropped.
    pub fn remove_owner(&mut self, owner: &TaskKey) -> usize {
        let before = self.reservations.len();
        self.reservations.retain(|r| &r.owner != owner);
        self.markers.retain(|(_, o)| o != owner);
        before - self.reservations.len()
    }

    /// Record a boundary on behalf of `owner` that does not change occupancy.
    pub fn mark(&mut self, at: Timestamp, owner: TaskKey) {
        self.markers.insert((at, owner));
    }

    /// Drop reservations with `effective_end <= now` and markers `<= now`.
    pub fn prune(&mut self, now: Timestamp) -> usize {
        let before = self.reservations.len();
        self.reservations.retain(|r| !r.slot.has_ended(now));
        self.markers.retain(|(at, _)| *at > now);

        let pruned = before - self.reservations.len();
        if pruned > 0 {
            debug!(pruned, now = %now, "pruned finished reservations");
        }
        pruned
    }

    /// Every start, effective end and marker currently on the timeline.
    pub fn boundaries(&self) -> BTreeSet<Timestamp> {
        self.reservations
            .iter()
            .flat_map(|r| [r.slot.start, r.slot.effective_end])
            .chain(self.markers.iter().map(|(at, _)| *at))
            .collect()
    }

    /// The reservation with `start <= now < effective_end`, if any.
    pub fn active_at(&self, now: Timestamp) -> Option<&Reservation> {
        let idx = self
            .reservations
            .partition_point(|r| r.slot.effective_end <= now);
        self.reservations.get(idx).filter(|r| r.slot.is_active(now))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reservation> {
        self.reservations.iter()
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    /// No reservations and no markers left.
    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty() && self.markers.is_empty()
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

    fn res(task: &str, start: Timestamp, end: Timestamp) -> Reservation {
        Reservation::new(
            TaskKey::new("Agent", task),
            Priority::High,
            Slot::new("rtu1", start, end),
        )
    }

    /// 12:00-12:30 (t1), 12:30-13:00 (t2), 14:00-15:00 (t3), inserted out of order.
    fn three() -> DeviceTimeline {
        let mut tl = DeviceTimeline::new();
        tl.insert(res("t3", at(14, 0), at(15, 0)));
        tl.insert(res("t1", at(12, 0), at(12, 30)));
        tl.insert(res("t2", at(12, 30), at(13, 0)));
        tl
    }

    fn owners(rs: Vec<&Reservation>) -> Vec<String> {
        rs.into_iter().map(|r| r.owner.task_id.clone()).collect()
    }

    #[test]
    fn insert_keeps_start_order() {
        let tl = three();
        let starts: Vec<_> = tl.iter().map(|r| r.slot.start).collect();
        assert_eq!(starts, vec![at(12, 0), at(12, 30), at(14, 0)]);
    }

    #[test]
    fn overlapping_is_half_open() {
        let tl = three();
        assert_eq!(owners(tl.overlapping(at(12, 15), at(12, 45))), vec!["t1", "t2"]);
        assert!(tl.overlapping(at(13, 0), at(14, 0)).is_empty());
        assert_eq!(owners(tl.overlapping(at(11, 0), at(12, 1))), vec!["t1"]);
        assert_eq!(owners(tl.overlapping(at(10, 0), at(16, 0))), vec!["t1", "t2", "t3"]);
    }

    #[test]
    fn truncation_shrinks_overlap_window() {
        let mut tl = three();
        let owner = TaskKey::new("Agent", "t3");
        assert_eq!(tl.truncate(&owner, at(14, 0), at(14, 10)), Some(at(14, 10)));
        assert!(tl.overlapping(at(14, 10), at(15, 0)).is_empty());
        assert_eq!(tl.truncate(&TaskKey::new("x", "y"), at(14, 0), at(14, 5)), None);
    }

    #[test]
    fn prune_removes_by_effective_end() {
        let mut tl = three();
        tl.truncate(&TaskKey::new("Agent", "t2"), at(12, 30), at(12, 40));
        assert_eq!(tl.prune(at(12, 40)), 2);
        assert_eq!(tl.len(), 1);
        assert_eq!(tl.prune(at(12, 40)), 0);
    }

    #[test]
    fn boundaries_include_markers_until_pruned() {
        let mut tl = DeviceTimeline::new();
        tl.insert(res("t1", at(12, 0), at(12, 30)));
        tl.mark(at(11, 31), TaskKey::new("Agent", "t9"));
        let b: Vec<_> = tl.boundaries().into_iter().collect();
        assert_eq!(b, vec![at(11, 31), at(12, 0), at(12, 30)]);

        tl.prune(at(11, 31));
        assert!(!tl.boundaries().contains(&at(11, 31)));
    }

    #[test]
    fn active_at_respects_start_inclusive_end_exclusive() {
        let tl = three();
        assert!(tl.active_at(at(11, 59)).is_none());
        assert_eq!(tl.active_at(at(12, 30)).unwrap().owner.task_id, "t2");
        assert!(tl.active_at(at(13, 30)).is_none());
    }

    #[test]
    fn remove_owner_drops_its_markers_only() {
        let mut tl = DeviceTimeline::new();
        tl.insert(res("t1", at(12, 0), at(12, 30)));
        tl.mark(at(11, 31), TaskKey::new("Agent", "t9"));
        tl.mark(at(11, 32), TaskKey::new("Agent", "t1"));

        assert_eq!(tl.remove_owner(&TaskKey::new("Agent", "t9")), 0);
        let b: Vec<_> = tl.boundaries().into_iter().collect();
        assert_eq!(b, vec![at(11, 32), at(12, 0), at(12, 30)]);

        assert_eq!(tl.remove_owner(&TaskKey::new("Agent", "t1")), 1);
        assert!(tl.is_empty());
    }

    #[test]
    fn remove_and_remove_owner() {
        let mut tl = three();
        let removed = tl.remove(&TaskKey::new("Agent", "t1"), at(12, 0)).unwrap();
        assert_eq!(removed.slot.end, at(12, 30));
        assert_eq!(tl.remove_owner(&TaskKey::new("Agent", "t3")), 1);
        assert_eq!(tl.len(), 1);
        assert!(!tl.is_empty());
    }
}
