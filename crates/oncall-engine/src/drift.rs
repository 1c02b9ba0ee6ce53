//! # Drift Normalizer
//!
//! The schedule service rewrites some of the values it receives: timezone
//! names come back as legacy aliases, timestamps are re-encoded in UTC,
//! recurrence rules are reordered, and an `effective_since` in the past is
//! advanced to the moment of the write. Stored verbatim, each of those
//! rewrites would show up as a difference against the configuration on the
//! next pass, forever.
//!
//! [`DriftPolicy`] decides, field by field, whether a server value and the
//! previously accepted value mean the same thing. When they do, the prior
//! value is kept. When they do not, or when either side cannot be parsed,
//! the server value wins, so a real difference is never hidden.
//!
//! The same predicates drive diffing: a desired entity equivalent to the
//! current one issues no update.
//!
//! Enumerated values (strategy and member types) are handled one layer
//! down: their server synonyms decode to the client's variant, see
//! [`oncall_client::model::StrategyType`].

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, FixedOffset, Utc};
use oncall_client::{Event, EventSpec, ScheduleSpec};

/// Timezone names the service is known to rewrite, as `(alias, canonical)`.
///
/// Sourced from the tzdata `backward` links observed in server responses.
/// Extend through [`AliasTable::insert`] or the CLI configuration rather
/// than by guessing equivalences.
const TIME_ZONE_ALIASES: &[(&str, &str)] = &[
    ("Asia/Calcutta", "Asia/Kolkata"),
    ("Asia/Saigon", "Asia/Ho_Chi_Minh"),
    ("Asia/Katmandu", "Asia/Kathmandu"),
    ("Asia/Rangoon", "Asia/Yangon"),
    ("Asia/Dacca", "Asia/Dhaka"),
    ("Asia/Ulan_Bator", "Asia/Ulaanbaatar"),
    ("Europe/Kiev", "Europe/Kyiv"),
    ("Atlantic/Faeroe", "Atlantic/Faroe"),
    ("Pacific/Truk", "Pacific/Chuuk"),
    ("America/Buenos_Aires", "America/Argentina/Buenos_Aires"),
    ("America/Indianapolis", "America/Indiana/Indianapolis"),
    ("US/Eastern", "America/New_York"),
    ("US/Central", "America/Chicago"),
    ("US/Mountain", "America/Denver"),
    ("US/Pacific", "America/Los_Angeles"),
    ("US/Alaska", "America/Anchorage"),
    ("US/Hawaii", "Pacific/Honolulu"),
    ("GB", "Europe/London"),
    ("Japan", "Asia/Tokyo"),
    ("Singapore", "Asia/Singapore"),
    ("UTC", "Etc/UTC"),
    ("UCT", "Etc/UTC"),
    ("Etc/UCT", "Etc/UTC"),
    ("Universal", "Etc/UTC"),
    ("Etc/Universal", "Etc/UTC"),
    ("Zulu", "Etc/UTC"),
    ("Etc/Zulu", "Etc/UTC"),
];

/// How far ahead of the local clock a server-advanced `effective_since`
/// may be and still count as "the moment of the write".
///
/// The server does not report when it advanced the value, so any later
/// instant up to `now` plus this tolerance is taken as that adjustment.
/// An out-of-band edit that moves `effective_since` forward to another
/// moment in that range is hidden as well. Edits to a future moment, or
/// backwards from the prior value, still show as drift.
const CLOCK_SKEW_TOLERANCE_MINUTES: i64 = 5;

/// Explicit alias → canonical mapping for identifier-like values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    canonical: HashMap<String, String>,
}

impl AliasTable {
    /// An empty table: values are equivalent only when identical.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in timezone alias table.
    pub fn time_zones() -> Self {
        let mut table = Self::new();
        for (alias, canonical) in TIME_ZONE_ALIASES {
            table.insert(*alias, *canonical);
        }
        table
    }

    /// Record that `alias` denotes the same thing as `canonical`.
    pub fn insert(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.canonical.insert(alias.into(), canonical.into());
    }

    /// Resolve `value` to its canonical name; unknown values map to themselves.
    pub fn canonical<'a>(&'a self, value: &'a str) -> &'a str {
        self.canonical.get(value).map_or(value, String::as_str)
    }

    /// True when both values resolve to the same canonical name.
    pub fn equivalent(&self, a: &str, b: &str) -> bool {
        a == b || self.canonical(a) == self.canonical(b)
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }
}

impl<A: Into<String>, C: Into<String>> Extend<(A, C)> for AliasTable {
    fn extend<I: IntoIterator<Item = (A, C)>>(&mut self, iter: I) {
        for (alias, canonical) in iter {
            self.insert(alias, canonical);
        }
    }
}

fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(s.trim()).ok()
}

/// Two timestamps are equal when they parse to the same instant,
/// whatever offset each was written with. Unparseable text is only equal
/// to identical text.
pub fn same_instant(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (parse_instant(a), parse_instant(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn rrule_parts(rule: &str) -> Option<BTreeSet<(String, String)>> {
    let body = rule.trim();
    let body = body
        .strip_prefix("RRULE:")
        .or_else(|| body.strip_prefix("rrule:"))
        .unwrap_or(body);
    let mut parts = BTreeSet::new();
    for part in body.split(';').filter(|p| !p.trim().is_empty()) {
        let (key, value) = part.split_once('=')?;
        parts.insert((key.trim().to_ascii_uppercase(), value.trim().to_string()));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts)
    }
}

/// Two RRULE strings are equal when they hold the same `KEY=VALUE` parts,
/// regardless of part order, key case or an `RRULE:` prefix.
pub fn same_rrule(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    match (rrule_parts(a), rrule_parts(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn same_rules(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_rrule(x, y))
}

fn same_optional_instant(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => same_instant(x, y),
        _ => false,
    }
}

fn blank_to_none(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Keep `prior` when `equal` says the server value means the same thing.
fn prefer_prior(server: String, prior: &str, equal: impl Fn(&str, &str) -> bool) -> String {
    if equal(&server, prior) {
        prior.to_string()
    } else {
        server
    }
}

/// Field-by-field normalization and equivalence rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftPolicy {
    pub time_zones: AliasTable,
}

impl Default for DriftPolicy {
    fn default() -> Self {
        Self {
            time_zones: AliasTable::time_zones(),
        }
    }
}

impl DriftPolicy {
    /// Canonical schedule fields after a read or write.
    pub fn normalize_schedule_spec(&self, server: ScheduleSpec, prior: &ScheduleSpec) -> ScheduleSpec {
        let description = if blank_to_none(server.description.as_deref())
            == blank_to_none(prior.description.as_deref())
        {
            prior.description.clone()
        } else {
            server.description
        };
        ScheduleSpec {
            name: server.name,
            time_zone: prefer_prior(server.time_zone, &prior.time_zone, |a, b| {
                self.time_zones.equivalent(a, b)
            }),
            description,
        }
    }

    /// True when updating `current` to `desired` would change nothing remotely.
    pub fn schedule_equivalent(&self, desired: &ScheduleSpec, current: &ScheduleSpec) -> bool {
        desired.name == current.name
            && self.time_zones.equivalent(&desired.time_zone, &current.time_zone)
            && blank_to_none(desired.description.as_deref())
                == blank_to_none(current.description.as_deref())
    }

    /// Canonical event after a read or write. The server's identity is kept.
    ///
    /// `now` anchors the `effective_since` rule: a server value that moved
    /// forward from a past prior value, to a moment not in the future, is a
    /// server-side adjustment and the prior value is kept.
    pub fn normalize_event(&self, server: Event, prior: &EventSpec, now: DateTime<Utc>) -> Event {
        let s = server.spec;
        let effective_until = match (s.effective_until, prior.effective_until.as_deref()) {
            (Some(server_until), Some(prior_until)) if same_instant(&server_until, prior_until) => {
                Some(prior_until.to_string())
            }
            (server_until, _) => server_until,
        };
        let recurrence = if same_rules(&s.recurrence, &prior.recurrence) {
            prior.recurrence.clone()
        } else {
            s.recurrence
        };
        Event {
            id: server.id,
            spec: EventSpec {
                name: s.name,
                start_time: prefer_prior(s.start_time, &prior.start_time, same_instant),
                end_time: prefer_prior(s.end_time, &prior.end_time, same_instant),
                effective_since: normalize_effective_since(
                    s.effective_since,
                    &prior.effective_since,
                    now,
                ),
                effective_until,
                recurrence,
                assignment_strategy: s.assignment_strategy,
            },
        }
    }

    /// True when updating `current` to `desired` would change nothing remotely.
    pub fn event_equivalent(&self, desired: &EventSpec, current: &EventSpec) -> bool {
        desired.name == current.name
            && same_instant(&desired.start_time, &current.start_time)
            && same_instant(&desired.end_time, &current.end_time)
            && same_instant(&desired.effective_since, &current.effective_since)
            && same_optional_instant(
                desired.effective_until.as_deref(),
                current.effective_until.as_deref(),
            )
            && same_rules(&desired.recurrence, &current.recurrence)
            && desired.assignment_strategy == current.assignment_strategy
    }
}

/// `effective_since` rule; see [`DriftPolicy::normalize_event`].
pub fn normalize_effective_since(server: String, prior: &str, now: DateTime<Utc>) -> String {
    if same_instant(&server, prior) {
        return prior.to_string();
    }
    let (Some(server_at), Some(prior_at)) = (parse_instant(&server), parse_instant(prior)) else {
        return server;
    };
    let latest_write = now + Duration::minutes(CLOCK_SKEW_TOLERANCE_MINUTES);
    if prior_at < server_at && server_at.with_timezone(&Utc) <= latest_write {
        prior.to_string()
    } else {
        server
    }
}
