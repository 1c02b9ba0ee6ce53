//! # oncall-client -- Typed client for the on-call schedule API
//!
//! Provides the pieces the reconciliation engine consumes from the remote
//! service:
//!
//! - **Data model** ([`model`]): schedule → rotations → events, with the
//!   structural invariants checked by [`Schedule::validate`].
//! - **Client seam** ([`api::ScheduleApi`]): per-item create/read/update/delete
//!   for schedules, rotations and events.
//! - **Error classification** ([`error`]): every failure is permanent,
//!   transient or not-found ([`ErrorClass`]).
//! - **Retry** ([`retry`]): budgeted exponential backoff over transient
//!   failures.
//! - **HTTP transport** ([`schedules::HttpScheduleClient`]): the reqwest
//!   implementation of the seam.
//!
//! ## API Path Convention
//!
//! All endpoints live below `{base_url}/api/v2/`, for example
//! `https://api.oncall.example.com/api/v2/schedules/{id}/rotations`.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod retry;
pub mod schedules;
pub mod serial;
pub mod types;

pub use api::{RotationState, ScheduleApi, ScheduleState};
pub use config::{ApiConfig, ConfigError};
pub use error::{ApiError, Classify, ErrorClass};
pub use model::{
    AssignmentStrategy, Event, EventSpec, Member, MemberType, Rotation, Schedule, ScheduleSpec,
    StrategyType, ValidationError,
};
pub use retry::{retry_unapplied, retry_until, RetryPolicy};
pub use schedules::HttpScheduleClient;
pub use types::{EventId, RotationId, ScheduleId};
