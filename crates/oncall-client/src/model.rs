//! # Schedule Data Model
//!
//! The desired/current tree reconciled by the engine:
//!
//! ```text
//! Schedule ─┬─ Rotation ─┬─ Event ── AssignmentStrategy ── Member*
//!           │            └─ Event ...
//!           └─ Rotation ...
//! ```
//!
//! Each level owns its children as an ordered `Vec`. Order carries no
//! meaning for the remote service; it is the only identity the engine has
//! for matching a desired child against a current one.
//!
//! Time fields are kept as the exact RFC 3339 text the client supplied.
//! The server re-encodes timestamps, and the drift normalizer needs the
//! original text to hand back an unchanged value.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::types::{EventId, RotationId, ScheduleId};

/// Top-level container resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Server identity; `None` until the schedule has been created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ScheduleId>,
    pub name: String,
    /// IANA timezone name the schedule's events are interpreted in.
    pub time_zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub rotations: Vec<Rotation>,
}

/// Mutable fields of a schedule, as sent to create/update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub name: String,
    pub time_zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Schedule {
    /// The schedule's own fields, without identity or children.
    pub fn spec(&self) -> ScheduleSpec {
        ScheduleSpec {
            name: self.name.clone(),
            time_zone: self.time_zone.clone(),
            description: self.description.clone(),
        }
    }

    /// Total number of events across all rotations.
    pub fn event_count(&self) -> usize {
        self.rotations.iter().map(|r| r.events.len()).sum()
    }

    /// Check the structural invariants of the tree.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found, walking rotations and
    /// events in order. The error path names the offending position.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                path: "schedule".into(),
                field: "name",
            });
        }
        if self.time_zone.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                path: "schedule".into(),
                field: "time_zone",
            });
        }
        for (r, rotation) in self.rotations.iter().enumerate() {
            for (e, event) in rotation.events.iter().enumerate() {
                event
                    .spec
                    .validate(&format!("rotation[{r}].event[{e}]"))?;
            }
        }
        Ok(())
    }
}

/// Mid-level resource: an ordered list of events.
///
/// Rotations have no mutable fields of their own on the remote side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rotation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RotationId>,
    #[serde(default)]
    pub events: Vec<Event>,
}

/// Leaf resource: a recurring on-call event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    #[serde(flatten)]
    pub spec: EventSpec,
}

/// Mutable fields of an event, as sent to create/update calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSpec {
    pub name: String,
    pub start_time: String,
    pub end_time: String,
    pub effective_since: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_until: Option<String>,
    /// RRULE strings; at least one is required.
    pub recurrence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_strategy: Option<AssignmentStrategy>,
}

impl EventSpec {
    fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyField {
                path: path.to_string(),
                field: "name",
            });
        }
        let timestamps = [
            ("start_time", Some(&self.start_time)),
            ("end_time", Some(&self.end_time)),
            ("effective_since", Some(&self.effective_since)),
            ("effective_until", self.effective_until.as_ref()),
        ];
        for (field, value) in timestamps {
            let Some(value) = value else { continue };
            if DateTime::parse_from_rfc3339(value).is_err() {
                return Err(ValidationError::InvalidTimestamp {
                    path: path.to_string(),
                    field,
                    value: value.clone(),
                });
            }
        }
        if self.recurrence.iter().all(|r| r.trim().is_empty()) {
            return Err(ValidationError::MissingRecurrence {
                path: path.to_string(),
            });
        }
        if let Some(strategy) = &self.assignment_strategy {
            for (m, member) in strategy.members.iter().enumerate() {
                member.validate(&format!("{path}.member[{m}]"))?;
            }
        }
        Ok(())
    }
}

/// How members are assigned to an event's occurrences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentStrategy {
    #[serde(rename = "type")]
    pub strategy_type: StrategyType,
    #[serde(default)]
    pub members: Vec<Member>,
}

/// Assignment strategy kinds.
///
/// The remote service answers with its own synonyms for some values; the
/// `alias` attributes are the explicit table of those rewrites, so a value
/// read back from the server decodes to the variant the client sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    #[serde(alias = "round_robin", alias = "ROTATE_MEMBERS")]
    RotateMembers,
    #[serde(alias = "all", alias = "ASSIGN_TO_ALL")]
    AssignToAll,
}

impl StrategyType {
    /// Canonical wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RotateMembers => "rotate_members",
            Self::AssignToAll => "assign_to_all",
        }
    }
}

/// A slot in an assignment strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "type")]
    pub member_type: MemberType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Member {
    /// A member backed by a user.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            member_type: MemberType::User,
            user_id: Some(user_id.into()),
        }
    }

    /// An unassigned slot.
    pub fn empty() -> Self {
        Self {
            member_type: MemberType::Empty,
            user_id: None,
        }
    }

    fn validate(&self, path: &str) -> Result<(), ValidationError> {
        let has_user = self
            .user_id
            .as_deref()
            .is_some_and(|id| !id.trim().is_empty());
        match (self.member_type, has_user) {
            (MemberType::User, false) => Err(ValidationError::UserIdRequired {
                path: path.to_string(),
            }),
            (MemberType::Empty, true) => Err(ValidationError::UserIdForbidden {
                path: path.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Member kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberType {
    #[serde(alias = "user_reference", alias = "USER")]
    User,
    #[serde(alias = "EMPTY")]
    Empty,
}

/// Structural invariant violations in a desired tree.
///
/// These are permanent: no remote call is attempted for a tree that fails
/// validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{path}: {field} must not be empty")]
    EmptyField { path: String, field: &'static str },

    #[error("{path}: {field} is not an RFC 3339 timestamp: {value:?}")]
    InvalidTimestamp {
        path: String,
        field: &'static str,
        value: String,
    },

    #[error("{path}: at least one recurrence rule is required")]
    MissingRecurrence { path: String },

    #[error("{path}: user member requires a user_id")]
    UserIdRequired { path: String },

    #[error("{path}: empty member must not carry a user_id")]
    UserIdForbidden { path: String },
}
