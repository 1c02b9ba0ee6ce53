//! Dry-run diff between a desired tree and the persisted one.
//!
//! [`plan`] predicts the remote operations [`crate::ScheduleEngine`] would
//! issue for the same inputs, using the same positional matching and drift
//! equivalence. It performs no I/O.

use std::fmt;

use oncall_client::{Rotation, Schedule};
use serde::Serialize;

use crate::drift::DriftPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    fn symbol(self) -> char {
        match self {
            Self::Create => '+',
            Self::Update => '~',
            Self::Delete => '-',
        }
    }
}

/// One predicted operation. `path` is `schedule`, `rotation[i]` or
/// `rotation[i].event[j]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Change {
    pub path: String,
    pub action: Action,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub changes: Vec<Change>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn count(&self, action: Action) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }

    fn push(&mut self, path: impl Into<String>, action: Action) {
        self.changes.push(Change {
            path: path.into(),
            action,
        });
    }

    fn create_rotation(&mut self, index: usize, rotation: &Rotation) {
        self.push(format!("rotation[{index}]"), Action::Create);
        for e in 0..rotation.events.len() {
            self.push(format!("rotation[{index}].event[{e}]"), Action::Create);
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return writeln!(f, "no changes");
        }
        for change in &self.changes {
            writeln!(f, "{} {}", change.action.symbol(), change.path)?;
        }
        writeln!(
            f,
            "{} to create, {} to update, {} to delete",
            self.count(Action::Create),
            self.count(Action::Update),
            self.count(Action::Delete)
        )
    }
}

/// Predict the operations that would bring `current` to `desired`.
///
/// A `current` without identity (or no `current` at all) plans a full
/// create.
pub fn plan(desired: &Schedule, current: Option<&Schedule>, policy: &DriftPolicy) -> Plan {
    let mut out = Plan::default();
    let Some(current) = current.filter(|c| c.id.is_some()) else {
        out.push("schedule", Action::Create);
        for (r, rotation) in desired.rotations.iter().enumerate() {
            out.create_rotation(r, rotation);
        }
        return out;
    };

    if !policy.schedule_equivalent(&desired.spec(), &current.spec()) {
        out.push("schedule", Action::Update);
    }

    let shared = desired.rotations.len().min(current.rotations.len());
    for r in 0..shared {
        let want = &desired.rotations[r].events;
        let have = &current.rotations[r].events;
        if current.rotations[r].id.is_none() {
            out.create_rotation(r, &desired.rotations[r]);
            continue;
        }
        let common = want.len().min(have.len());
        for e in 0..common {
            if have[e].id.is_none() {
                out.push(format!("rotation[{r}].event[{e}]"), Action::Create);
            } else if !policy.event_equivalent(&want[e].spec, &have[e].spec) {
                out.push(format!("rotation[{r}].event[{e}]"), Action::Update);
            }
        }
        for e in common..have.len() {
            out.push(format!("rotation[{r}].event[{e}]"), Action::Delete);
        }
        for e in common..want.len() {
            out.push(format!("rotation[{r}].event[{e}]"), Action::Create);
        }
    }
    for r in shared..current.rotations.len() {
        out.push(format!("rotation[{r}]"), Action::Delete);
    }
    for (r, rotation) in desired.rotations.iter().enumerate().skip(shared) {
        out.create_rotation(r, rotation);
    }
    out
}
