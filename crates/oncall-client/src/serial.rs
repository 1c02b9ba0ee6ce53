//! Per-endpoint critical sections.
//!
//! Some endpoints are not safe under concurrent calls even for different
//! resources (rotation creation appends to the schedule's rotation list on
//! the server). Calls to such endpoints go through [`EndpointLocks::serialize`],
//! which holds one async mutex per endpoint name for the duration of the call.
//! Other endpoints are unaffected.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;

/// Lazily-created async mutexes keyed by endpoint name.
///
/// Cheaply cloneable; all clones share the same locks.
#[derive(Debug, Clone, Default)]
pub struct EndpointLocks {
    locks: Arc<DashMap<&'static str, Arc<Mutex<()>>>>,
}

impl EndpointLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fut` while holding the lock for `endpoint`.
    pub async fn serialize<T>(&self, endpoint: &'static str, fut: impl Future<Output = T>) -> T {
        let lock = self
            .locks
            .entry(endpoint)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;
        fut.await
    }
}
