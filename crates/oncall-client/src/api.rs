//! # Remote Resource Client Interface
//!
//! [`ScheduleApi`] is the seam between the reconciliation engine and the
//! remote service. The engine only ever talks to this trait; the HTTP
//! implementation lives in [`crate::schedules`], and tests substitute
//! in-memory fakes.
//!
//! The service exposes per-item endpoints only: there is no bulk replace,
//! no transaction and no server-side diff.

use async_trait::async_trait;

use crate::error::ApiError;
use crate::model::{Event, EventSpec, ScheduleSpec};
use crate::types::{EventId, RotationId, ScheduleId};

/// Schedule as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleState {
    pub id: ScheduleId,
    pub spec: ScheduleSpec,
    /// Rotation ids in the order the server lists them.
    pub rotation_ids: Vec<RotationId>,
}

/// Rotation as reported by the server, with its events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationState {
    pub id: RotationId,
    pub events: Vec<Event>,
}

/// Per-item operations of the remote schedule service.
///
/// Every error is an [`ApiError`] and therefore classifiable as
/// permanent, transient or not-found.
#[async_trait]
pub trait ScheduleApi: Send + Sync {
    async fn create_schedule(&self, spec: &ScheduleSpec) -> Result<ScheduleId, ApiError>;

    async fn read_schedule(&self, id: &ScheduleId) -> Result<ScheduleState, ApiError>;

    async fn update_schedule(
        &self,
        id: &ScheduleId,
        spec: &ScheduleSpec,
    ) -> Result<ScheduleState, ApiError>;

    /// Deleting a schedule releases its rotations and events server-side.
    async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), ApiError>;

    async fn create_rotation(&self, schedule_id: &ScheduleId) -> Result<RotationId, ApiError>;

    async fn read_rotation(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
    ) -> Result<RotationState, ApiError>;

    async fn delete_rotation(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
    ) -> Result<(), ApiError>;

    async fn create_event(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
        spec: &EventSpec,
    ) -> Result<Event, ApiError>;

    async fn update_event(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
        event_id: &EventId,
        spec: &EventSpec,
    ) -> Result<Event, ApiError>;

    async fn delete_event(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
        event_id: &EventId,
    ) -> Result<(), ApiError>;
}
