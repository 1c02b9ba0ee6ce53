//! # Identifier Newtypes
//!
//! Server-assigned identifiers for the three resource levels of the
//! schedule API. Each identifier is a distinct type, so a [`RotationId`]
//! cannot be passed where an [`EventId`] is expected.
//!
//! Identifiers are opaque strings chosen by the remote service. The only
//! invariant enforced locally is that they are non-empty: an entity that
//! has not been created yet carries `None`, never an empty id.

use serde::{Deserialize, Serialize};

/// Error returned when an identifier string is empty or blank.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} identifier must not be empty")]
pub struct EmptyIdError {
    /// Which identifier type was being constructed.
    pub kind: &'static str,
}

/// Deserializes as a plain `String`, then routes through `new()` so an
/// empty id in a state file or a server response is rejected.
macro_rules! impl_validating_deserialize {
    ($ty:ident) => {
        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let raw = String::deserialize(deserializer)?;
                Self::new(raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

/// Identifier of a schedule (the top-level container).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ScheduleId(String);

impl_validating_deserialize!(ScheduleId);

impl ScheduleId {
    /// Wrap a server-assigned schedule id.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyIdError`] if the id is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyIdError> {
        let s = value.into();
        if s.trim().is_empty() {
            return Err(EmptyIdError { kind: "schedule" });
        }
        Ok(Self(s))
    }

    /// Access the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a rotation within a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RotationId(String);

impl_validating_deserialize!(RotationId);

impl RotationId {
    /// Wrap a server-assigned rotation id.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyIdError`] if the id is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyIdError> {
        let s = value.into();
        if s.trim().is_empty() {
            return Err(EmptyIdError { kind: "rotation" });
        }
        Ok(Self(s))
    }

    /// Access the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RotationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an event within a rotation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct EventId(String);

impl_validating_deserialize!(EventId);

impl EventId {
    /// Wrap a server-assigned event id.
    ///
    /// # Errors
    ///
    /// Returns [`EmptyIdError`] if the id is blank.
    pub fn new(value: impl Into<String>) -> Result<Self, EmptyIdError> {
        let s = value.into();
        if s.trim().is_empty() {
            return Err(EmptyIdError { kind: "event" });
        }
        Ok(Self(s))
    }

    /// Access the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
