//! # Schedule Lifecycle
//!
//! [`ScheduleEngine`] drives the full lifecycle of one schedule tree
//! against a [`ScheduleApi`]:
//!
//! - **create**: create the schedule, then every rotation and event. If any
//!   nested step fails, the schedule is deleted again (best effort) so no
//!   half-built tree is left behind.
//! - **read**: rebuild the tree from the server, normalized against the
//!   previously persisted tree. Absence is `Ok(None)`.
//! - **update**: update the schedule fields if they changed, then reconcile
//!   rotations and events positionally. No compensation on failure.
//! - **delete**: delete the schedule; already gone is success.
//! - **import**: read with no prior state; absence is an error.
//!
//! Every remote call goes through [`retry_until`] with the engine's
//! [`RetryPolicy`], except schedule creation: a schedule created by a
//! request whose response was lost has no trace in the returned tree and
//! would never be cleaned up, so that call only retries failures that
//! prove nothing was written ([`retry_unapplied`]).

use std::future::Future;

use async_trait::async_trait;
use chrono::Utc;
use oncall_client::{
    retry_unapplied, retry_until, ApiError, Event, RetryPolicy, Rotation, RotationId, Schedule,
    ScheduleApi, ScheduleId,
};

use crate::drift::DriftPolicy;
use crate::error::ReconcileError;
use crate::positional::{reconcile_children, ChildOps};

/// Retry and drift behavior of the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub drift: DriftPolicy,
}

impl EngineConfig {
    /// Retry policy from the environment, built-in drift rules.
    pub fn from_env() -> Self {
        Self {
            retry: RetryPolicy::from_env(),
            drift: DriftPolicy::default(),
        }
    }
}

/// Reconciles schedule trees against a remote [`ScheduleApi`].
#[derive(Debug)]
pub struct ScheduleEngine<C> {
    client: C,
    config: EngineConfig,
}

impl<C: ScheduleApi> ScheduleEngine<C> {
    pub fn new(client: C, config: EngineConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    async fn retrying<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        retry_until(&self.config.retry, operation, op).await
    }

    /// Create the whole tree.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::Invalid`] before any remote call, or the first
    /// remote failure. On a failure after the schedule itself was created,
    /// the schedule is deleted before the error is returned.
    pub async fn create(&self, desired: Schedule) -> Result<Schedule, ReconcileError> {
        desired.validate()?;
        tracing::info!(
            schedule = %desired.name,
            rotations = desired.rotations.len(),
            events = desired.event_count(),
            "creating schedule"
        );

        let spec = desired.spec();
        let id = retry_unapplied(&self.config.retry, "create schedule", || {
            self.client.create_schedule(&spec)
        })
        .await
        .map_err(|e| ReconcileError::remote("create schedule", e))?;

        let ops = RotationOps {
            engine: self,
            schedule_id: &id,
        };
        let rotations = match reconcile_children(desired.rotations, &[], &ops).await {
            Ok(rotations) => rotations,
            Err(err) => {
                self.roll_back(&id, &err).await;
                return Err(err);
            }
        };

        tracing::info!(schedule_id = %id, "schedule created");
        Ok(Schedule {
            id: Some(id),
            name: spec.name,
            time_zone: spec.time_zone,
            description: spec.description,
            rotations,
        })
    }

    /// Best-effort removal of a partially created schedule. A failure here
    /// is logged and otherwise ignored; the caller reports the original
    /// error.
    async fn roll_back(&self, id: &ScheduleId, cause: &ReconcileError) {
        tracing::warn!(schedule_id = %id, "nested create failed, rolling back: {cause}");
        match self
            .retrying("delete schedule", || self.client.delete_schedule(id))
            .await
        {
            Ok(()) => tracing::info!(schedule_id = %id, "rolled back partially created schedule"),
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!(
                schedule_id = %id,
                "rollback failed, schedule may be orphaned: {e}"
            ),
        }
    }

    /// Rebuild the persisted tree from the server.
    ///
    /// With a `prior` tree, server values equivalent to prior ones are
    /// replaced by the prior text, and children keep their prior order.
    /// Children the prior tree does not know are appended in server order.
    /// Children listed by the parent but gone by the time they are read
    /// are skipped.
    ///
    /// Returns `Ok(None)` when the schedule no longer exists.
    pub async fn read(
        &self,
        id: &ScheduleId,
        prior: Option<&Schedule>,
    ) -> Result<Option<Schedule>, ReconcileError> {
        let state = match self
            .retrying("read schedule", || self.client.read_schedule(id))
            .await
        {
            Ok(state) => state,
            Err(e) if e.is_not_found() => {
                tracing::info!(schedule_id = %id, "schedule no longer exists");
                return Ok(None);
            }
            Err(e) => return Err(ReconcileError::remote("read schedule", e)),
        };

        let drift = &self.config.drift;
        let spec = match prior {
            Some(p) => drift.normalize_schedule_spec(state.spec, &p.spec()),
            None => state.spec,
        };
        let prior_rotations = prior.map(|p| p.rotations.as_slice()).unwrap_or_default();
        let rotation_ids = order_by_prior(
            state.rotation_ids,
            |rid: &RotationId| Some(rid),
            |r: &Rotation| r.id.as_ref(),
            prior_rotations,
        );

        let now = Utc::now();
        let mut rotations = Vec::with_capacity(rotation_ids.len());
        for rotation_id in rotation_ids {
            let index = rotations.len();
            let rotation = match self
                .retrying("read rotation", || self.client.read_rotation(id, &rotation_id))
                .await
            {
                Ok(rotation) => rotation,
                Err(e) if e.is_not_found() => {
                    tracing::debug!(%rotation_id, "rotation vanished during read");
                    continue;
                }
                Err(e) => {
                    return Err(ReconcileError::remote("read rotation", e).at("rotation", index))
                }
            };

            let prior_events = prior_rotations
                .iter()
                .find(|r| r.id.as_ref() == Some(&rotation.id))
                .map(|r| r.events.as_slice())
                .unwrap_or_default();
            let events = order_by_prior(
                rotation.events,
                |e: &Event| e.id.as_ref(),
                |e: &Event| e.id.as_ref(),
                prior_events,
            )
            .into_iter()
            .map(|event| {
                match prior_events
                    .iter()
                    .find(|p| p.id.is_some() && p.id == event.id)
                {
                    Some(p) => drift.normalize_event(event, &p.spec, now),
                    None => event,
                }
            })
            .collect();

            rotations.push(Rotation {
                id: Some(rotation.id),
                events,
            });
        }

        Ok(Some(Schedule {
            id: Some(state.id),
            name: spec.name,
            time_zone: spec.time_zone,
            description: spec.description,
            rotations,
        }))
    }

    /// Reconcile `current` (the persisted tree) into `desired`.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::NotCreated`] when `current` has no identity,
    /// [`ReconcileError::Invalid`] before any remote call, or the first
    /// remote failure. Operations applied before a failure stay applied.
    pub async fn update(
        &self,
        desired: Schedule,
        current: &Schedule,
    ) -> Result<Schedule, ReconcileError> {
        desired.validate()?;
        let id = current.id.clone().ok_or(ReconcileError::NotCreated)?;

        let wanted = desired.spec();
        let spec = if self
            .config
            .drift
            .schedule_equivalent(&wanted, &current.spec())
        {
            wanted
        } else {
            tracing::info!(schedule_id = %id, "updating schedule fields");
            let state = self
                .retrying("update schedule", || self.client.update_schedule(&id, &wanted))
                .await
                .map_err(|e| ReconcileError::remote("update schedule", e))?;
            self.config.drift.normalize_schedule_spec(state.spec, &wanted)
        };

        let ops = RotationOps {
            engine: self,
            schedule_id: &id,
        };
        let rotations = reconcile_children(desired.rotations, &current.rotations, &ops).await?;

        Ok(Schedule {
            id: Some(id),
            name: spec.name,
            time_zone: spec.time_zone,
            description: spec.description,
            rotations,
        })
    }

    /// Delete the schedule. A schedule that is already gone counts as deleted.
    pub async fn delete(&self, id: &ScheduleId) -> Result<(), ReconcileError> {
        match self
            .retrying("delete schedule", || self.client.delete_schedule(id))
            .await
        {
            Ok(()) => {
                tracing::info!(schedule_id = %id, "schedule deleted");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                tracing::info!(schedule_id = %id, "schedule already gone");
                Ok(())
            }
            Err(e) => Err(ReconcileError::remote("delete schedule", e)),
        }
    }

    /// Adopt an existing schedule by id.
    ///
    /// # Errors
    ///
    /// [`ReconcileError::ScheduleNotFound`] when the id is unknown.
    pub async fn import(&self, id: &ScheduleId) -> Result<Schedule, ReconcileError> {
        self.read(id, None)
            .await?
            .ok_or_else(|| ReconcileError::ScheduleNotFound { id: id.clone() })
    }
}

/// Order server items so that those known to `prior` come first, in prior
/// order, followed by the rest in server order.
fn order_by_prior<T, P, K>(
    items: Vec<T>,
    item_key: impl Fn(&T) -> Option<&K>,
    prior_key: impl Fn(&P) -> Option<&K>,
    prior: &[P],
) -> Vec<T>
where
    K: PartialEq + ?Sized,
{
    let mut remaining: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(remaining.len());
    for p in prior {
        let Some(key) = prior_key(p) else { continue };
        let slot = remaining
            .iter_mut()
            .find(|slot| slot.as_ref().and_then(|item| item_key(item)) == Some(key));
        if let Some(item) = slot.and_then(Option::take) {
            ordered.push(item);
        }
    }
    ordered.extend(remaining.into_iter().flatten());
    ordered
}

struct RotationOps<'a, C> {
    engine: &'a ScheduleEngine<C>,
    schedule_id: &'a ScheduleId,
}

impl<'a, C: ScheduleApi> RotationOps<'a, C> {
    fn events<'b>(&'b self, rotation_id: &'b RotationId) -> EventOps<'b, C> {
        EventOps {
            engine: self.engine,
            schedule_id: self.schedule_id,
            rotation_id,
        }
    }
}

#[async_trait]
impl<'a, C: ScheduleApi> ChildOps<Rotation> for RotationOps<'a, C> {
    fn kind(&self) -> &'static str {
        "rotation"
    }

    // Rotations have no fields of their own; only their events change.
    async fn update(&self, desired: Rotation, current: &Rotation) -> Result<Rotation, ReconcileError> {
        let Some(rotation_id) = desired.id.clone() else {
            return self.create(desired).await;
        };
        let events = reconcile_children(desired.events, &current.events, &self.events(&rotation_id))
            .await?;
        Ok(Rotation {
            id: Some(rotation_id),
            events,
        })
    }

    // A retried create whose first attempt did land leaves an extra rotation
    // under the schedule. The next refresh lists it after the known ones and
    // the following update deletes it as surplus.
    async fn create(&self, desired: Rotation) -> Result<Rotation, ReconcileError> {
        let engine = self.engine;
        let rotation_id = engine
            .retrying("create rotation", || {
                engine.client.create_rotation(self.schedule_id)
            })
            .await
            .map_err(|e| ReconcileError::remote("create rotation", e))?;
        tracing::debug!(%rotation_id, "rotation created");
        let events = reconcile_children(desired.events, &[], &self.events(&rotation_id)).await?;
        Ok(Rotation {
            id: Some(rotation_id),
            events,
        })
    }

    async fn delete(&self, current: &Rotation) -> Result<(), ReconcileError> {
        let Some(rotation_id) = &current.id else {
            return Ok(());
        };
        let engine = self.engine;
        match engine
            .retrying("delete rotation", || {
                engine.client.delete_rotation(self.schedule_id, rotation_id)
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(%rotation_id, "rotation already gone");
                Ok(())
            }
            Err(e) => Err(ReconcileError::remote("delete rotation", e)),
        }
    }
}

struct EventOps<'a, C> {
    engine: &'a ScheduleEngine<C>,
    schedule_id: &'a ScheduleId,
    rotation_id: &'a RotationId,
}

#[async_trait]
impl<'a, C: ScheduleApi> ChildOps<Event> for EventOps<'a, C> {
    fn kind(&self) -> &'static str {
        "event"
    }

    async fn update(&self, desired: Event, current: &Event) -> Result<Event, ReconcileError> {
        let Some(event_id) = desired.id.clone() else {
            return self.create(desired).await;
        };
        let engine = self.engine;
        let drift = &engine.config.drift;
        if drift.event_equivalent(&desired.spec, &current.spec) {
            return Ok(desired);
        }

        let result = engine
            .retrying("update event", || {
                engine.client.update_event(
                    self.schedule_id,
                    self.rotation_id,
                    &event_id,
                    &desired.spec,
                )
            })
            .await;
        match result {
            Ok(server) => Ok(drift.normalize_event(server, &desired.spec, Utc::now())),
            Err(e) if e.is_not_found() => {
                tracing::warn!(%event_id, "event vanished remotely, re-creating");
                self.create(Event {
                    id: None,
                    spec: desired.spec,
                })
                .await
            }
            Err(e) => Err(ReconcileError::remote("update event", e)),
        }
    }

    // Same as rotations: a duplicate from a retried create is appended on
    // the next refresh and deleted as surplus.
    async fn create(&self, desired: Event) -> Result<Event, ReconcileError> {
        let engine = self.engine;
        let server = engine
            .retrying("create event", || {
                engine
                    .client
                    .create_event(self.schedule_id, self.rotation_id, &desired.spec)
            })
            .await
            .map_err(|e| ReconcileError::remote("create event", e))?;
        Ok(engine
            .config
            .drift
            .normalize_event(server, &desired.spec, Utc::now()))
    }

    async fn delete(&self, current: &Event) -> Result<(), ReconcileError> {
        let Some(event_id) = &current.id else {
            return Ok(());
        };
        let engine = self.engine;
        match engine
            .retrying("delete event", || {
                engine
                    .client
                    .delete_event(self.schedule_id, self.rotation_id, event_id)
            })
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                tracing::debug!(%event_id, "event already gone");
                Ok(())
            }
            Err(e) => Err(ReconcileError::remote("delete event", e)),
        }
    }
}
