/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Serialised async host for a [`ScheduleManager`].
//!
//! One tokio task owns the manager and drains [`ScheduleCommand`]s from an
//! `mpsc` channel; every command carries a `oneshot` sender for its reply.
//! Callers hold a cloneable [`ScheduleHandle`], so concurrent agents never
//! see a half-applied `request_slots`.
//!
//! ```text
//!  ScheduleHandle ──┐
//!  ScheduleHandle ──┼──► mpsc ──► actor loop (owns ScheduleManager)
//!  ScheduleHandle ──┘                 │
//!                     oneshot ◄───────┘
//! ```

use std::collections::BTreeMap;

use chrono::TimeDelta;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::priority::Priority;
use crate::scheduler::{CancelError, RawValue, RequestOutcome, ScheduleManager};
use crate::task::{ceil_to_second, DeviceState, Timestamp};

/// Commands waiting in the actor queue before back-pressure kicks in.
const COMMAND_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("schedule host has stopped")]
    Closed,
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Messages understood by the actor loop.
#[derive(Debug)]
pub enum ScheduleCommand {
    RequestSlots {
        agent_id: String,
        task_id: String,
        requests: Vec<Vec<RawValue>>,
        priority: Priority,
        now: Timestamp,
        reply_to: oneshot::Sender<RequestOutcome>,
    },
    CancelTask {
        agent_id: String,
        task_id: String,
        now: Timestamp,
        reply_to: oneshot::Sender<Result<(), CancelError>>,
    },
    GetScheduleState {
        now: Timestamp,
        reply_to: oneshot::Sender<BTreeMap<String, DeviceState>>,
    },
    GetNextEventTime {
        now: Timestamp,
        reply_to: oneshot::Sender<Option<Timestamp>>,
    },
    HoldsLock {
        device: String,
        agent_id: String,
        now: Timestamp,
        reply_to: oneshot::Sender<bool>,
    },
    Shutdown,
}

// ── ScheduleHandle ────────────────────────────────────────────────────────────

/// Cloneable client for the actor that owns the manager.
#[derive(Debug, Clone)]
pub struct ScheduleHandle {
    tx: mpsc::Sender<ScheduleCommand>,
}

impl ScheduleHandle {
    /// Move `manager` into a new actor task.
    ///
    /// The returned `JoinHandle` completes once the actor stops, either on
    /// [`shutdown`](Self::shutdown) or when every handle has been dropped.
    pub fn spawn(manager: ScheduleManager) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let join = tokio::spawn(run_actor_loop(manager, rx));
        (Self { tx }, join)
    }

    pub async fn request_slots(
        &self,
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        requests: Vec<Vec<RawValue>>,
        priority: Priority,
        now: Timestamp,
    ) -> Result<RequestOutcome, HostError> {
        self.call(|reply_to| ScheduleCommand::RequestSlots {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            requests,
            priority,
            now,
            reply_to,
        })
        .await
    }

    pub async fn cancel_task(
        &self,
        agent_id: impl Into<String>,
        task_id: impl Into<String>,
        now: Timestamp,
    ) -> Result<Result<(), CancelError>, HostError> {
        self.call(|reply_to| ScheduleCommand::CancelTask {
            agent_id: agent_id.into(),
            task_id: task_id.into(),
            now,
            reply_to,
        })
        .await
    }

    pub async fn get_schedule_state(
        &self,
        now: Timestamp,
    ) -> Result<BTreeMap<String, DeviceState>, HostError> {
        self.call(|reply_to| ScheduleCommand::GetScheduleState { now, reply_to })
            .await
    }

    pub async fn get_next_event_time(
        &self,
        now: Timestamp,
    ) -> Result<Option<Timestamp>, HostError> {
        self.call(|reply_to| ScheduleCommand::GetNextEventTime { now, reply_to })
            .await
    }

    pub async fn holds_lock(
        &self,
        device: impl Into<String>,
        agent_id: impl Into<String>,
        now: Timestamp,
    ) -> Result<bool, HostError> {
        self.call(|reply_to| ScheduleCommand::HoldsLock {
            device: device.into(),
            agent_id: agent_id.into(),
            now,
            reply_to,
        })
        .await
    }

    /// Ask the actor to stop.  Commands already queued are still answered.
    pub async fn shutdown(&self) -> Result<(), HostError> {
        self.tx
            .send(ScheduleCommand::Shutdown)
            .await
            .map_err(|_| HostError::Closed)
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ScheduleCommand,
    ) -> Result<T, HostError> {
        let (reply_to, reply) = oneshot::channel();
        self.tx
            .send(build(reply_to))
            .await
            .map_err(|_| HostError::Closed)?;
        reply.await.map_err(|_| HostError::Closed)
    }
}

async fn run_actor_loop(mut manager: ScheduleManager, mut rx: mpsc::Receiver<ScheduleCommand>) {
    info!(grace_secs = manager.grace_period().num_seconds(), "schedule host started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            ScheduleCommand::RequestSlots {
                agent_id,
                task_id,
                requests,
                priority,
                now,
                reply_to,
            } => {
                let outcome = manager.request_slots(&agent_id, &task_id, &requests, priority, now);
                let _ = reply_to.send(outcome);
            }
            ScheduleCommand::CancelTask {
                agent_id,
                task_id,
                now,
                reply_to,
            } => {
                let _ = reply_to.send(manager.cancel_task(&agent_id, &task_id, now));
            }
            ScheduleCommand::GetScheduleState { now, reply_to } => {
                let _ = reply_to.send(manager.get_schedule_state(now));
            }
            ScheduleCommand::GetNextEventTime { now, reply_to } => {
                let _ = reply_to.send(manager.get_next_event_time(now));
            }
            ScheduleCommand::HoldsLock {
                device,
                agent_id,
                now,
                reply_to,
            } => {
                let _ = reply_to.send(manager.holds_lock(&device, &agent_id, now));
            }
            ScheduleCommand::Shutdown => {
                debug!("shutdown requested");
                break;
            }
        }
    }

    info!(live_tasks = manager.task_count(), "schedule host stopped");
}

// ── Poll timing ───────────────────────────────────────────────────────────────

/// When the host should next wake to publish device state.
///
/// The next schedule event, but never later than one publish interval from
/// `now` (rounded up to a whole second).  Intervals under one second count as
/// one second, so the result is always after `now`.
pub fn next_poll_time(
    now: Timestamp,
    next_event: Option<Timestamp>,
    publish_interval: TimeDelta,
) -> Timestamp {
    let capped = now
        .checked_add_signed(publish_interval.max(TimeDelta::seconds(1)))
        .map_or(Timestamp::MAX_UTC, ceil_to_second);
    next_event.map_or(capped, |event| event.min(capped))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::validate::entry;
    use chrono::{TimeZone, Utc};

    fn at(h: u32, m: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2013, 11, 27, h, m, 0).unwrap()
    }

    fn spawn() -> (ScheduleHandle, JoinHandle<()>) {
        ScheduleHandle::spawn(ScheduleManager::new(TimeDelta::seconds(60), at(11, 30)))
    }

    fn rtu1(start: &str, end: &str) -> Vec<Vec<RawValue>> {
        vec![entry(
            "campus/building/rtu1",
            format!("2013-11-27 {start}:00"),
            format!("2013-11-27 {end}:00"),
        )]
    }

    // ── Actor round trip ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn request_and_query_through_handle() {
        let (handle, _join) = spawn();
        let outcome = handle
            .request_slots("Agent1", "Task1", rtu1("12:00", "13:00"), Priority::High, at(11, 30))
            .await
            .unwrap();
        assert!(outcome.is_granted());

        assert_eq!(handle.get_next_event_time(at(11, 30)).await.unwrap(), Some(at(12, 0)));

        let state = handle.get_schedule_state(at(12, 30)).await.unwrap();
        assert_eq!(
            state["campus/building/rtu1"],
            DeviceState::new("Agent1", "Task1", 1800.0)
        );
        assert!(handle
            .holds_lock("campus/building/rtu1", "Agent1", at(12, 30))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn cancel_through_handle() {
        let (handle, _join) = spawn();
        handle
            .request_slots("Agent1", "Task1", rtu1("12:00", "13:00"), Priority::High, at(11, 30))
            .await
            .unwrap();

        assert_eq!(
            handle.cancel_task("Agent2", "Task1", at(11, 40)).await.unwrap(),
            Err(CancelError::AgentIdTaskIdMismatch)
        );
        assert_eq!(handle.cancel_task("Agent1", "Task1", at(11, 40)).await.unwrap(), Ok(()));
        assert_eq!(handle.get_next_event_time(at(11, 40)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn concurrent_requests_are_serialised() {
        let (handle, _join) = spawn();

        let mut joins = Vec::new();
        for i in 0..8 {
            let h = handle.clone();
            joins.push(tokio::spawn(async move {
                h.request_slots(
                    format!("Agent{i}"),
                    "Task",
                    rtu1("12:00", "13:00"),
                    Priority::High,
                    at(11, 30),
                )
                .await
                .unwrap()
            }));
        }

        let mut granted = 0;
        for join in joins {
            if join.await.unwrap().is_granted() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1, "exactly one HIGH request may win the window");
    }

    #[tokio::test]
    async fn calls_after_shutdown_fail_closed() {
        let (handle, join) = spawn();
        handle.shutdown().await.unwrap();
        join.await.unwrap();

        assert_eq!(
            handle.get_next_event_time(at(11, 30)).await,
            Err(HostError::Closed)
        );
        assert_eq!(handle.shutdown().await, Err(HostError::Closed));
    }

    // ── next_poll_time ────────────────────────────────────────────────────────

    #[test]
    fn poll_uses_next_event_when_sooner() {
        let now = at(12, 0);
        assert_eq!(
            next_poll_time(now, Some(at(12, 0) + TimeDelta::seconds(30)), TimeDelta::seconds(60)),
            at(12, 0) + TimeDelta::seconds(30)
        );
    }

    #[test]
    fn poll_is_capped_by_publish_interval() {
        let now = at(12, 0) + TimeDelta::milliseconds(400);
        assert_eq!(
            next_poll_time(now, Some(at(13, 0)), TimeDelta::seconds(60)),
            at(12, 1) + TimeDelta::seconds(1)
        );
        assert_eq!(next_poll_time(at(12, 0), None, TimeDelta::seconds(60)), at(12, 1));
    }

    #[test]
    fn unbounded_interval_saturates() {
        assert_eq!(
            next_poll_time(at(12, 0), None, TimeDelta::MAX),
            Timestamp::MAX_UTC
        );
    }

    #[test]
    fn zero_interval_still_advances() {
        let now = at(12, 0);
        assert_eq!(
            next_poll_time(now, None, TimeDelta::zero()),
            now + TimeDelta::seconds(1)
        );
    }
}
