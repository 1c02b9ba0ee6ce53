//! # Positional Child Reconciliation
//!
//! Children have no stable client-side key, so a desired child is matched
//! to the current child at the same index:
//!
//! | index                               | action                    |
//! |-------------------------------------|---------------------------|
//! | `i < min(desired, current)`         | update in place           |
//! | `i >= desired.len()` (current tail) | delete                    |
//! | `i >= current.len()` (desired tail) | create                    |
//!
//! Updates run first, then deletes in ascending order, then creates. The
//! first failure aborts the pass; operations already applied are not
//! undone.
//!
//! Reordering children therefore updates every shifted position instead of
//! moving anything.

use async_trait::async_trait;
use oncall_client::{Event, Rotation};

use crate::error::ReconcileError;

/// Children that carry an optional server identity.
pub trait Positioned {
    /// Take over the server identity of the child at the same position.
    fn adopt_identity(&mut self, current: &Self);
}

impl Positioned for Rotation {
    fn adopt_identity(&mut self, current: &Self) {
        self.id = current.id.clone();
    }
}

impl Positioned for Event {
    fn adopt_identity(&mut self, current: &Self) {
        self.id = current.id.clone();
    }
}

/// Remote operations for one level of children.
#[async_trait]
pub trait ChildOps<T: Send + Sync>: Send + Sync {
    /// Child kind used in error positions and logs.
    fn kind(&self) -> &'static str;

    /// Bring `current` in line with `desired`, which already carries
    /// `current`'s identity. Returns the persisted child.
    async fn update(&self, desired: T, current: &T) -> Result<T, ReconcileError>;

    /// Create `desired` remotely. Returns the persisted child.
    async fn create(&self, desired: T) -> Result<T, ReconcileError>;

    /// Delete `current` remotely. An already absent child counts as deleted.
    async fn delete(&self, current: &T) -> Result<(), ReconcileError>;
}

/// Reconcile `current` into `desired` position by position.
///
/// Returns the persisted children in desired order.
///
/// # Errors
///
/// The first failing child operation, wrapped with its kind and index.
pub async fn reconcile_children<T, O>(
    desired: Vec<T>,
    current: &[T],
    ops: &O,
) -> Result<Vec<T>, ReconcileError>
where
    T: Positioned + Send + Sync,
    O: ChildOps<T> + ?Sized,
{
    let kind = ops.kind();
    let shared = desired.len().min(current.len());
    let mut persisted = Vec::with_capacity(desired.len());
    let mut desired = desired.into_iter();

    for (index, existing) in current.iter().take(shared).enumerate() {
        let Some(mut wanted) = desired.next() else {
            break;
        };
        wanted.adopt_identity(existing);
        tracing::trace!(kind, index, "reconciling in place");
        let updated = ops
            .update(wanted, existing)
            .await
            .map_err(|e| e.at(kind, index))?;
        persisted.push(updated);
    }

    for (index, stale) in current.iter().enumerate().skip(shared) {
        tracing::debug!(kind, index, "deleting surplus child");
        ops.delete(stale).await.map_err(|e| e.at(kind, index))?;
    }

    for (offset, wanted) in desired.enumerate() {
        let index = shared + offset;
        tracing::debug!(kind, index, "creating child");
        let created = ops.create(wanted).await.map_err(|e| e.at(kind, index))?;
        persisted.push(created);
    }

    Ok(persisted)
}
