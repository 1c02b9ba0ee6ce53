//! # Lifecycle subcommands
//!
//! Each subcommand drives one engine operation and keeps the state file in
//! step with the result:
//!
//! ```bash
//! oncall apply schedule.yaml --state primary.json
//! oncall plan schedule.yaml --state primary.json
//! oncall refresh --state primary.json
//! oncall destroy --state primary.json
//! oncall import 6f1c... --state primary.json
//! ```
//!
//! The state file is only written after the engine call succeeds. A failed
//! `apply` leaves the previous state in place; the next `apply` refreshes
//! first and picks up whatever the failed pass created.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use oncall_client::{Schedule, ScheduleApi, ScheduleId};
use oncall_engine::{plan, Plan, ScheduleEngine};

use crate::state::{load_desired, load_state, remove_state, save_state};

#[derive(Args, Debug)]
pub struct ApplyArgs {
    /// Desired schedule (YAML).
    pub schedule: PathBuf,

    /// State file holding the persisted tree (JSON).
    #[arg(long)]
    pub state: PathBuf,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Desired schedule (YAML).
    pub schedule: PathBuf,

    /// State file holding the persisted tree (JSON).
    #[arg(long)]
    pub state: PathBuf,

    /// Print the plan as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct StateArgs {
    /// State file holding the persisted tree (JSON).
    #[arg(long)]
    pub state: PathBuf,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Server id of the schedule to adopt.
    pub id: String,

    /// State file to write (must not exist yet).
    #[arg(long)]
    pub state: PathBuf,
}

fn state_id(state: &Schedule) -> Result<ScheduleId> {
    state
        .id
        .clone()
        .context("state file has no schedule id; remove it and apply again")
}

fn summary(schedule: &Schedule) -> String {
    format!(
        "{} rotations, {} events",
        schedule.rotations.len(),
        schedule.event_count()
    )
}

/// Converge the remote schedule onto the desired file.
pub async fn apply<C: ScheduleApi>(engine: &ScheduleEngine<C>, args: &ApplyArgs) -> Result<Schedule> {
    let desired = load_desired(&args.schedule)?;
    let persisted = match load_state(&args.state)? {
        None => engine.create(desired).await.context("create failed")?,
        Some(prior) => {
            let id = state_id(&prior)?;
            match engine.read(&id, Some(&prior)).await.context("refresh failed")? {
                Some(current) => engine
                    .update(desired, &current)
                    .await
                    .context("update failed")?,
                None => {
                    tracing::warn!(schedule_id = %id, "schedule no longer exists, re-creating");
                    engine.create(desired).await.context("create failed")?
                }
            }
        }
    };
    save_state(&args.state, &persisted)?;
    Ok(persisted)
}

pub async fn run_apply<C: ScheduleApi>(engine: &ScheduleEngine<C>, args: &ApplyArgs) -> Result<u8> {
    let persisted = apply(engine, args).await?;
    if let Some(id) = &persisted.id {
        println!("applied schedule {id}: {}", summary(&persisted));
    }
    Ok(0)
}

/// Predict the operations `apply` would issue. Reads, never writes.
pub async fn compute_plan<C: ScheduleApi>(
    engine: &ScheduleEngine<C>,
    args: &PlanArgs,
) -> Result<Plan> {
    let desired = load_desired(&args.schedule)?;
    let current = match load_state(&args.state)? {
        None => None,
        Some(prior) => {
            let id = state_id(&prior)?;
            engine
                .read(&id, Some(&prior))
                .await
                .context("refresh failed")?
        }
    };
    Ok(plan(&desired, current.as_ref(), &engine.config().drift))
}

pub async fn run_plan<C: ScheduleApi>(engine: &ScheduleEngine<C>, args: &PlanArgs) -> Result<u8> {
    let plan = compute_plan(engine, args).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{plan}");
    }
    Ok(0)
}

/// Re-read the persisted tree from the server.
///
/// Returns `None` (and removes the state file) when the schedule is gone.
pub async fn refresh<C: ScheduleApi>(
    engine: &ScheduleEngine<C>,
    args: &StateArgs,
) -> Result<Option<Schedule>> {
    let Some(prior) = load_state(&args.state)? else {
        bail!("no state file at {}", args.state.display());
    };
    let id = state_id(&prior)?;
    match engine.read(&id, Some(&prior)).await.context("refresh failed")? {
        Some(current) => {
            save_state(&args.state, &current)?;
            Ok(Some(current))
        }
        None => {
            remove_state(&args.state)?;
            Ok(None)
        }
    }
}

pub async fn run_refresh<C: ScheduleApi>(engine: &ScheduleEngine<C>, args: &StateArgs) -> Result<u8> {
    match refresh(engine, args).await? {
        Some(current) => println!("refreshed: {}", summary(&current)),
        None => println!("schedule no longer exists; state removed"),
    }
    Ok(0)
}

pub async fn run_destroy<C: ScheduleApi>(engine: &ScheduleEngine<C>, args: &StateArgs) -> Result<u8> {
    let Some(prior) = load_state(&args.state)? else {
        println!("nothing to destroy");
        return Ok(0);
    };
    let id = state_id(&prior)?;
    engine.delete(&id).await.context("delete failed")?;
    remove_state(&args.state)?;
    println!("destroyed schedule {id}");
    Ok(0)
}

pub async fn import<C: ScheduleApi>(engine: &ScheduleEngine<C>, args: &ImportArgs) -> Result<Schedule> {
    if args.state.exists() {
        bail!(
            "state file {} already exists; destroy or remove it first",
            args.state.display()
        );
    }
    let id = ScheduleId::new(args.id.as_str())?;
    let imported = engine.import(&id).await.context("import failed")?;
    save_state(&args.state, &imported)?;
    Ok(imported)
}

pub async fn run_import<C: ScheduleApi>(engine: &ScheduleEngine<C>, args: &ImportArgs) -> Result<u8> {
    let imported = import(engine, args).await?;
    println!("imported schedule {}: {}", args.id, summary(&imported));
    Ok(0)
}
