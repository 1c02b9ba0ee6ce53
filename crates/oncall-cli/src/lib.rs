//! # oncall-cli -- Lifecycle driver for declarative on-call schedules
//!
//! Provides the `oncall` command-line interface over `oncall-engine`:
//!
//! - `oncall apply` creates the schedule, or refreshes and updates it.
//! - `oncall plan` prints what `apply` would do.
//! - `oncall refresh` re-reads the persisted tree from the server.
//! - `oncall destroy` deletes the schedule.
//! - `oncall import` adopts an existing schedule by id.
//!
//! The persisted tree lives in a JSON state file between runs.

pub mod commands;
pub mod settings;
pub mod state;
