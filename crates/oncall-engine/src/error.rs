//! Reconciliation error types.
//!
//! Failures below the schedule are wrapped in [`ReconcileError::At`] once per
//! level on the way up, so the message names the position that failed:
//!
//! ```text
//! rotation[1]: event[0]: create event failed: schedule API ... returned 400: ...
//! ```

use oncall_client::{ApiError, Classify, ErrorClass, ScheduleId, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// The desired tree breaks a structural invariant. Nothing was sent.
    #[error("invalid desired state: {0}")]
    Invalid(#[from] ValidationError),
    /// A remote call failed after retries.
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        source: ApiError,
    },
    /// Update was asked for a schedule that has no server identity.
    #[error("schedule has not been created yet")]
    NotCreated,
    /// Import was asked for a schedule the server does not know.
    #[error("schedule {id} not found")]
    ScheduleNotFound { id: ScheduleId },
    /// A failure at a child position.
    #[error("{kind}[{index}]: {source}")]
    At {
        kind: &'static str,
        index: usize,
        source: Box<ReconcileError>,
    },
}

impl ReconcileError {
    pub fn remote(operation: &'static str, source: ApiError) -> Self {
        Self::Remote { operation, source }
    }

    /// Wrap this error with the child position it occurred at.
    pub fn at(self, kind: &'static str, index: usize) -> Self {
        Self::At {
            kind,
            index,
            source: Box::new(self),
        }
    }

    /// Dotted position of the failure, e.g. `rotation[1].event[0]`.
    /// Empty for failures at the schedule itself.
    pub fn path(&self) -> String {
        let mut segments = Vec::new();
        let mut current = self;
        while let Self::At {
            kind,
            index,
            source,
        } = current
        {
            segments.push(format!("{kind}[{index}]"));
            current = source;
        }
        segments.join(".")
    }

    /// The innermost error, without positional wrapping.
    pub fn root(&self) -> &ReconcileError {
        let mut current = self;
        while let Self::At { source, .. } = current {
            current = source;
        }
        current
    }
}

impl Classify for ReconcileError {
    fn class(&self) -> ErrorClass {
        match self.root() {
            Self::Remote { source, .. } => source.class(),
            Self::ScheduleNotFound { .. } => ErrorClass::NotFound,
            _ => ErrorClass::Permanent,
        }
    }
}
