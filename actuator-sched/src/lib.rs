/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Actuator schedule manager – device reservations for building-automation
//! agents.
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── priority        – LOW < LOW_PREEMPT < HIGH
//! ├── task            – TaskKey, Slot, Task, DeviceState
//! ├── scheduler/      – ScheduleManager and its parts
//! │   ├── validate    – raw request → slots
//! │   ├── timeline    – per-device ordered reservations
//! │   ├── resolver    – conflict / preemption plan
//! │   └── error       – request and cancel error codes
//! ├── host/           – tokio actor wrapping the manager, poll timing
//! ├── config/         – YAML actuator configuration
//! └── scenario/       – YAML scripted traffic for the replay binary
//! ```

pub mod config;
pub mod host;
pub mod priority;
pub mod scenario;
pub mod scheduler;
pub mod task;
