//! In-memory storage backend using DashMap.
//!
//! Schedules and rotations are kept as the JSON documents the API returns.
//! A schedule document lists its rotation ids under `rotationIds`; a
//! rotation document holds its events inline under `events`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

struct Inner {
    schedules: DashMap<String, Value>,
    rotations: DashMap<String, Value>,
    /// Per-operation queue of HTTP statuses to answer with instead of
    /// serving the request.
    faults: DashMap<String, VecDeque<u16>>,
    mutations: AtomicU64,
}

/// Shared application state holding all in-memory stores.
///
/// Cheaply cloneable via `Arc`; all clones share the same data.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Inner>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                schedules: DashMap::new(),
                rotations: DashMap::new(),
                faults: DashMap::new(),
                mutations: AtomicU64::new(0),
            }),
        }
    }

    pub fn schedules(&self) -> &DashMap<String, Value> {
        &self.inner.schedules
    }

    pub fn rotations(&self) -> &DashMap<String, Value> {
        &self.inner.rotations
    }

    /// Answer the next calls to `operation` (e.g. `create_event`) with the
    /// given statuses, in order.
    pub fn inject_faults(&self, operation: &str, statuses: &[u16]) {
        self.inner
            .faults
            .entry(operation.to_string())
            .or_default()
            .extend(statuses.iter().copied());
    }

    /// Pop the next injected status for `operation`.
    pub fn take_fault(&self, operation: &str) -> Option<u16> {
        self.inner
            .faults
            .get_mut(operation)
            .and_then(|mut queue| queue.pop_front())
    }

    pub fn record_mutation(&self) {
        self.inner.mutations.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of successful create, update and delete requests served.
    pub fn mutation_count(&self) -> u64 {
        self.inner.mutations.load(Ordering::Relaxed)
    }

    pub fn event_count(&self) -> usize {
        self.inner
            .rotations
            .iter()
            .map(|r| r.value()["events"].as_array().map_or(0, Vec::len))
            .sum()
    }
}
