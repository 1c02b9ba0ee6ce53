//! # oncall-engine -- Declarative reconciliation of on-call schedules
//!
//! Takes a desired schedule tree (schedule → rotations → events) and the
//! tree persisted from the previous pass, and converges the remote service
//! onto the desired tree using per-item calls only.
//!
//! - [`engine::ScheduleEngine`]: create (with rollback), read, update,
//!   delete and import.
//! - [`positional`]: index-based matching of children to their remote
//!   counterparts.
//! - [`drift`]: suppression of server-side rewrites that do not change
//!   meaning.
//! - [`plan`]: the same diff, without I/O.
//!
//! Running [`ScheduleEngine::update`] with a tree it produced itself issues
//! no remote mutation.

pub mod drift;
pub mod engine;
pub mod error;
pub mod plan;
pub mod positional;

pub use drift::{AliasTable, DriftPolicy};
pub use engine::{EngineConfig, ScheduleEngine};
pub use error::ReconcileError;
pub use plan::{plan, Action, Change, Plan};
pub use positional::{reconcile_children, ChildOps, Positioned};
