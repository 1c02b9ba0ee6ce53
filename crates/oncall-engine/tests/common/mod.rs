//! In-memory schedule service that records every call.
//!
//! Behaves like the remote API: server-assigned ids, cascade delete, 404 for
//! unknown ids. Failures are scripted per operation, and the optional
//! rewrites mimic the server's drift (timezone aliases, UTC timestamps).

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use oncall_client::{
    ApiError, AssignmentStrategy, Event, EventId, EventSpec, Member, RetryPolicy, Rotation,
    RotationId, RotationState, Schedule, ScheduleApi, ScheduleId, ScheduleSpec, ScheduleState,
    StrategyType,
};
use oncall_engine::{EngineConfig, ScheduleEngine};
use parking_lot::Mutex;

#[derive(Default)]
struct Server {
    next_id: u64,
    schedules: BTreeMap<String, (ScheduleSpec, Vec<String>)>,
    rotations: HashMap<String, Vec<Event>>,
    calls: Vec<String>,
    script: HashMap<&'static str, VecDeque<Option<u16>>>,
    lost_responses: HashMap<&'static str, VecDeque<u16>>,
    time_zone_rewrites: HashMap<String, String>,
    utc_timestamps: bool,
}

impl Server {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Record the call and return the scripted failure for it, if any.
    fn enter(&mut self, op: &'static str, target: Option<&str>) -> Result<(), ApiError> {
        self.calls.push(match target {
            Some(t) => format!("{op}:{t}"),
            None => op.to_string(),
        });
        match self.script.get_mut(op).and_then(VecDeque::pop_front) {
            Some(Some(status)) => Err(ApiError::status(op, status, "scripted failure")),
            _ => Ok(()),
        }
    }

    /// Fail a call that has already been applied, as when the response is
    /// lost on the way back.
    fn leave(&mut self, op: &'static str) -> Result<(), ApiError> {
        match self.lost_responses.get_mut(op).and_then(VecDeque::pop_front) {
            Some(status) => Err(ApiError::status(op, status, "response lost")),
            None => Ok(()),
        }
    }

    fn store_spec(&self, spec: &ScheduleSpec) -> ScheduleSpec {
        let mut stored = spec.clone();
        if let Some(alias) = self.time_zone_rewrites.get(&spec.time_zone) {
            stored.time_zone = alias.clone();
        }
        stored
    }

    fn store_event(&self, id: EventId, spec: &EventSpec) -> Event {
        let mut stored = spec.clone();
        if self.utc_timestamps {
            stored.start_time = to_utc(&stored.start_time);
            stored.end_time = to_utc(&stored.end_time);
            stored.effective_since = to_utc(&stored.effective_since);
            stored.effective_until = stored.effective_until.as_deref().map(to_utc);
        }
        Event {
            id: Some(id),
            spec: stored,
        }
    }
}

fn to_utc(s: &str) -> String {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc).to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|_| s.to_string())
}

fn not_found(op: &str) -> ApiError {
    ApiError::status(op, 404, "not found")
}

#[derive(Default)]
pub struct RecordingApi {
    server: Mutex<Server>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `from` as `to`, the way the server swaps in legacy aliases.
    pub fn rewrite_time_zone(self, from: &str, to: &str) -> Self {
        self.server
            .lock()
            .time_zone_rewrites
            .insert(from.to_string(), to.to_string());
        self
    }

    /// Re-encode every stored timestamp in UTC.
    pub fn utc_timestamps(self) -> Self {
        self.server.lock().utc_timestamps = true;
        self
    }

    /// Script the outcome of the next calls to `op`: `None` passes through,
    /// `Some(status)` fails with that HTTP status.
    pub fn script(&self, op: &'static str, outcomes: &[Option<u16>]) {
        self.server
            .lock()
            .script
            .entry(op)
            .or_default()
            .extend(outcomes.iter().copied());
    }

    /// Apply the next calls to `op`, then fail them with `statuses`.
    pub fn lose_responses(&self, op: &'static str, statuses: &[u16]) {
        self.server
            .lock()
            .lost_responses
            .entry(op)
            .or_default()
            .extend(statuses.iter().copied());
    }

    pub fn calls(&self) -> Vec<String> {
        self.server.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.server.lock().calls.clear();
    }

    /// Calls other than reads.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("read_"))
            .collect()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(':').next() == Some(op))
            .count()
    }

    pub fn schedule_exists(&self, id: &ScheduleId) -> bool {
        self.server.lock().schedules.contains_key(id.as_str())
    }

    pub fn schedule_count(&self) -> usize {
        self.server.lock().schedules.len()
    }

    pub fn event_count(&self) -> usize {
        self.server.lock().rotations.values().map(Vec::len).sum()
    }

    /// Delete an event behind the engine's back.
    pub fn remove_event(&self, rotation_id: &RotationId, event_id: &EventId) {
        if let Some(events) = self.server.lock().rotations.get_mut(rotation_id.as_str()) {
            events.retain(|e| e.id.as_ref() != Some(event_id));
        }
    }
}

#[async_trait]
impl ScheduleApi for RecordingApi {
    async fn create_schedule(&self, spec: &ScheduleSpec) -> Result<ScheduleId, ApiError> {
        let mut s = self.server.lock();
        s.enter("create_schedule", None)?;
        let id = s.id("sch");
        let stored = s.store_spec(spec);
        s.schedules.insert(id.clone(), (stored, Vec::new()));
        s.leave("create_schedule")?;
        Ok(ScheduleId::new(id).unwrap())
    }

    async fn read_schedule(&self, id: &ScheduleId) -> Result<ScheduleState, ApiError> {
        let mut s = self.server.lock();
        s.enter("read_schedule", Some(id.as_str()))?;
        let (spec, rotation_ids) = s
            .schedules
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| not_found("read_schedule"))?;
        Ok(ScheduleState {
            id: id.clone(),
            spec,
            rotation_ids: rotation_ids
                .into_iter()
                .map(|r| RotationId::new(r).unwrap())
                .collect(),
        })
    }

    async fn update_schedule(
        &self,
        id: &ScheduleId,
        spec: &ScheduleSpec,
    ) -> Result<ScheduleState, ApiError> {
        let mut s = self.server.lock();
        s.enter("update_schedule", Some(id.as_str()))?;
        let stored = s.store_spec(spec);
        let entry = s
            .schedules
            .get_mut(id.as_str())
            .ok_or_else(|| not_found("update_schedule"))?;
        entry.0 = stored.clone();
        let rotation_ids = entry
            .1
            .iter()
            .map(|r| RotationId::new(r.clone()).unwrap())
            .collect();
        Ok(ScheduleState {
            id: id.clone(),
            spec: stored,
            rotation_ids,
        })
    }

    async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), ApiError> {
        let mut s = self.server.lock();
        s.enter("delete_schedule", Some(id.as_str()))?;
        let (_, rotation_ids) = s
            .schedules
            .remove(id.as_str())
            .ok_or_else(|| not_found("delete_schedule"))?;
        for rid in rotation_ids {
            s.rotations.remove(&rid);
        }
        Ok(())
    }

    async fn create_rotation(&self, schedule_id: &ScheduleId) -> Result<RotationId, ApiError> {
        let mut s = self.server.lock();
        s.enter("create_rotation", None)?;
        if !s.schedules.contains_key(schedule_id.as_str()) {
            return Err(not_found("create_rotation"));
        }
        let id = s.id("rot");
        s.rotations.insert(id.clone(), Vec::new());
        if let Some(entry) = s.schedules.get_mut(schedule_id.as_str()) {
            entry.1.push(id.clone());
        }
        s.leave("create_rotation")?;
        Ok(RotationId::new(id).unwrap())
    }

    async fn read_rotation(
        &self,
        _schedule_id: &ScheduleId,
        rotation_id: &RotationId,
    ) -> Result<RotationState, ApiError> {
        let mut s = self.server.lock();
        s.enter("read_rotation", Some(rotation_id.as_str()))?;
        let events = s
            .rotations
            .get(rotation_id.as_str())
            .cloned()
            .ok_or_else(|| not_found("read_rotation"))?;
        Ok(RotationState {
            id: rotation_id.clone(),
            events,
        })
    }

    async fn delete_rotation(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
    ) -> Result<(), ApiError> {
        let mut s = self.server.lock();
        s.enter("delete_rotation", Some(rotation_id.as_str()))?;
        s.rotations
            .remove(rotation_id.as_str())
            .ok_or_else(|| not_found("delete_rotation"))?;
        if let Some(entry) = s.schedules.get_mut(schedule_id.as_str()) {
            entry.1.retain(|r| r != rotation_id.as_str());
        }
        Ok(())
    }

    async fn create_event(
        &self,
        _schedule_id: &ScheduleId,
        rotation_id: &RotationId,
        spec: &EventSpec,
    ) -> Result<Event, ApiError> {
        let mut s = self.server.lock();
        s.enter("create_event", None)?;
        if !s.rotations.contains_key(rotation_id.as_str()) {
            return Err(not_found("create_event"));
        }
        let id = EventId::new(s.id("ev")).unwrap();
        let stored = s.store_event(id, spec);
        if let Some(events) = s.rotations.get_mut(rotation_id.as_str()) {
            events.push(stored.clone());
        }
        s.leave("create_event")?;
        Ok(stored)
    }

    async fn update_event(
        &self,
        _schedule_id: &ScheduleId,
        rotation_id: &RotationId,
        event_id: &EventId,
        spec: &EventSpec,
    ) -> Result<Event, ApiError> {
        let mut s = self.server.lock();
        s.enter("update_event", Some(event_id.as_str()))?;
        let stored = s.store_event(event_id.clone(), spec);
        let slot = s
            .rotations
            .get_mut(rotation_id.as_str())
            .and_then(|events| events.iter_mut().find(|e| e.id.as_ref() == Some(event_id)))
            .ok_or_else(|| not_found("update_event"))?;
        *slot = stored.clone();
        Ok(stored)
    }

    async fn delete_event(
        &self,
        _schedule_id: &ScheduleId,
        rotation_id: &RotationId,
        event_id: &EventId,
    ) -> Result<(), ApiError> {
        let mut s = self.server.lock();
        s.enter("delete_event", Some(event_id.as_str()))?;
        let events = s
            .rotations
            .get_mut(rotation_id.as_str())
            .ok_or_else(|| not_found("delete_event"))?;
        let before = events.len();
        events.retain(|e| e.id.as_ref() != Some(event_id));
        if events.len() == before {
            return Err(not_found("delete_event"));
        }
        Ok(())
    }
}

/// Engine over `api` with millisecond backoff.
pub fn engine(api: RecordingApi) -> ScheduleEngine<RecordingApi> {
    let config = EngineConfig {
        retry: RetryPolicy {
            budget: Duration::from_secs(5),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        ..EngineConfig::default()
    };
    ScheduleEngine::new(api, config)
}

pub fn event(name: &str, user: &str) -> Event {
    Event {
        id: None,
        spec: EventSpec {
            name: name.to_string(),
            start_time: "2026-01-05T09:00:00+05:30".into(),
            end_time: "2026-01-05T17:00:00+05:30".into(),
            effective_since: "2026-01-01T00:00:00+05:30".into(),
            effective_until: None,
            recurrence: vec!["FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR".into()],
            assignment_strategy: Some(AssignmentStrategy {
                strategy_type: StrategyType::RotateMembers,
                members: vec![Member::user(user), Member::empty()],
            }),
        },
    }
}

pub fn rotation(events: Vec<Event>) -> Rotation {
    Rotation { id: None, events }
}

/// Two rotations: `[weekday, weekend]` and `[holiday]`.
pub fn desired() -> Schedule {
    Schedule {
        id: None,
        name: "payments-primary".into(),
        time_zone: "Asia/Kolkata".into(),
        description: Some("primary cover for payments".into()),
        rotations: vec![
            rotation(vec![event("weekday", "u-1"), event("weekend", "u-2")]),
            rotation(vec![event("holiday", "u-3")]),
        ],
    }
}
