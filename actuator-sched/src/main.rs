/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use actuator_sched::config::{ActuatorConfig, ConfigManager};
use actuator_sched::host::{next_poll_time, ScheduleHandle};
use actuator_sched::scenario::{Action, Scenario};
use actuator_sched::scheduler::{RequestOutcome, ScheduleManager};
use actuator_sched::task::{format_timestamp, Timestamp};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Actuator device-reservation scheduler, driven by a scripted scenario.
///
/// Example:
///   actuator-sched --config actuator.yaml --scenario demos/preempt.yaml
#[derive(Debug, Parser)]
#[command(
    name = "actuator-sched",
    about = "Actuator schedule manager – scenario replay host",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML actuator configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to the YAML scenario to replay.
    #[arg(short = 's', long = "scenario")]
    scenario: PathBuf,

    /// Log filter used when RUST_LOG is unset (overrides the config file).
    #[arg(short = 'l', long = "log-level")]
    log_level: Option<String>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Config is read before logging is up so its log_level can seed the
    // filter; load errors are reported once the subscriber exists.
    let mut config_manager = ConfigManager::new();
    let config_result = cli
        .config
        .as_deref()
        .map(|path| config_manager.load_from_file(path));
    let config = config_manager.config().clone();

    let default_level = cli.log_level.as_deref().unwrap_or(&config.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!("actuator-sched starting up...");

    match config_result {
        Some(Err(e)) => {
            error!("Failed to load actuator configuration: {:#}", e);
            process::exit(1);
        }
        Some(Ok(())) => {}
        None => warn!("No configuration file provided, using default actuator settings"),
    }

    info!(
        grace_secs   = config.preempt_grace_time,
        publish_secs = config.schedule_publish_interval,
        scenario     = %cli.scenario.display(),
        "Configuration"
    );

    if let Err(e) = replay(&cli.scenario, &config).await {
        error!("Scenario replay failed: {:#}", e);
        process::exit(1);
    }
}

// ── Replay ────────────────────────────────────────────────────────────────────

/// Drive a fresh manager through `path` on a simulated clock.
///
/// The clock jumps straight to the next action or poll time, so a day-long
/// scenario replays instantly.
async fn replay(path: &Path, config: &ActuatorConfig) -> Result<()> {
    let scenario = Scenario::load_from_file(path)?;
    let actions = scenario.actions();
    let publish_interval = config.publish_interval();

    let manager = ScheduleManager::new(config.grace_period(), scenario.start);
    let (handle, join) = ScheduleHandle::spawn(manager);

    let mut pending = actions.iter().peekable();
    let mut now = scenario.start;

    loop {
        while let Some(action) = pending.next_if(|a| a.at() <= now) {
            apply(&handle, action, now).await?;
        }

        let state = handle.get_schedule_state(now).await?;
        if state.is_empty() {
            info!(now = %format_timestamp(now), "all devices idle");
        }
        for (device, s) in &state {
            info!(
                now = %format_timestamp(now),
                device = %device,
                agent_id = %s.agent_id,
                task_id = %s.task_id,
                remaining = s.remaining_seconds,
                "device state"
            );
        }

        let next_event = handle.get_next_event_time(now).await?;
        let mut wake = next_poll_time(now, next_event, publish_interval);
        if let Some(action) = pending.peek() {
            wake = wake.min(action.at());
        }
        if wake > scenario.until {
            break;
        }
        now = wake;
    }

    handle.shutdown().await?;
    join.await.context("schedule host task panicked")?;
    info!(until = %format_timestamp(scenario.until), "scenario complete");
    Ok(())
}

async fn apply(handle: &ScheduleHandle, action: &Action<'_>, now: Timestamp) -> Result<()> {
    match action {
        Action::Request(r) => {
            let outcome = handle
                .request_slots(&r.agent_id, &r.task_id, r.slots.clone(), r.priority, now)
                .await?;
            match &outcome {
                RequestOutcome::Granted { preempted } => {
                    for key in preempted {
                        info!(agent_id = %key.agent_id, task_id = %key.task_id, "preempted");
                    }
                    info!(agent_id = %r.agent_id, task_id = %r.task_id, "request SUCCESS");
                }
                RequestOutcome::Rejected { .. } => {
                    info!(
                        agent_id = %r.agent_id,
                        task_id = %r.task_id,
                        conflicts = ?outcome.conflict_triples(),
                        "request FAILURE: CONFLICTS_WITH_EXISTING_SCHEDULES"
                    );
                }
                RequestOutcome::Invalid { .. } => {
                    info!(
                        agent_id = %r.agent_id,
                        task_id = %r.task_id,
                        info = %outcome.info(),
                        "request FAILURE"
                    );
                }
            }
        }
        Action::Cancel(c) => match handle.cancel_task(&c.agent_id, &c.task_id, now).await? {
            Ok(()) => info!(agent_id = %c.agent_id, task_id = %c.task_id, "cancel SUCCESS"),
            Err(e) => {
                info!(agent_id = %c.agent_id, task_id = %c.task_id, info = %e, "cancel FAILURE")
            }
        },
    }
    Ok(())
}
