//! Route definitions for the schedule API stub.
//!
//! Implements the endpoints `oncall-client` calls, with camelCase JSON
//! responses. Stored values are rewritten the way the real service does:
//!
//! - timezone names become their legacy aliases (`Asia/Kolkata` →
//!   `Asia/Calcutta`),
//! - timestamps are re-encoded in UTC (`...Z`),
//! - an `effectiveSince` in the past is advanced to the time of the write,
//! - strategy and member types come back as server synonyms
//!   (`rotate_members` → `round_robin`, `user` → `user_reference`).

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::store::AppState;

/// Build the complete router with all stub routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v2/schedules", post(schedule_create))
        .route(
            "/api/v2/schedules/:id",
            get(schedule_get).put(schedule_update).delete(schedule_delete),
        )
        .route("/api/v2/schedules/:id/rotations", post(rotation_create))
        .route(
            "/api/v2/schedules/:id/rotations/:rotation_id",
            get(rotation_get).delete(rotation_delete),
        )
        .route(
            "/api/v2/schedules/:id/rotations/:rotation_id/events",
            post(event_create),
        )
        .route(
            "/api/v2/schedules/:id/rotations/:rotation_id/events/:event_id",
            put(event_update).delete(event_delete),
        )
        // Fallback: 501 Not Implemented
        .fallback(not_implemented)
        .with_state(state)
}

// ── Rewrites ────────────────────────────────────────────────────────

/// Canonical names the service swaps for a legacy alias on write.
const LEGACY_TIME_ZONES: &[(&str, &str)] = &[
    ("Asia/Kolkata", "Asia/Calcutta"),
    ("Asia/Ho_Chi_Minh", "Asia/Saigon"),
    ("Asia/Kathmandu", "Asia/Katmandu"),
    ("Europe/Kyiv", "Europe/Kiev"),
    ("Etc/UTC", "UTC"),
];

fn legacy_time_zone(tz: &str) -> &str {
    LEGACY_TIME_ZONES
        .iter()
        .find(|(canonical, _)| *canonical == tz)
        .map_or(tz, |(_, legacy)| *legacy)
}

fn utc(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

fn utc_text(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn strategy_synonym(strategy_type: &str) -> &str {
    match strategy_type {
        "rotate_members" => "round_robin",
        "assign_to_all" => "all",
        other => other,
    }
}

fn member_synonym(member_type: &str) -> &str {
    match member_type {
        "user" => "user_reference",
        other => other,
    }
}

fn bad_request(reason: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": reason }))).into_response()
}

fn str_field<'a>(body: &'a Value, field: &str) -> &'a str {
    body.get(field).and_then(Value::as_str).unwrap_or("")
}

/// Return the injected response for `operation`, if one is queued.
fn fault(state: &AppState, operation: &str) -> Option<Response> {
    let status = state.take_fault(operation)?;
    tracing::debug!(operation, status, "serving injected fault");
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Some((status, Json(json!({ "error": "injected fault" }))).into_response())
}

/// Validate and rewrite an event body into its stored form.
fn stored_event(id: &str, body: &Value) -> Result<Value, Response> {
    let name = str_field(body, "name");
    if name.trim().is_empty() {
        return Err(bad_request("name is required"));
    }
    let recurrence = body
        .get("recurrence")
        .and_then(Value::as_array)
        .filter(|r| !r.is_empty())
        .ok_or_else(|| bad_request("recurrence is required"))?;

    let mut instants = Map::new();
    for field in ["startTime", "endTime", "effectiveSince"] {
        let at = utc(str_field(body, field))
            .ok_or_else(|| bad_request(&format!("{field} must be an RFC 3339 timestamp")))?;
        instants.insert(field.to_string(), json!(utc_text(at)));
    }
    let now = Utc::now();
    if utc(str_field(body, "effectiveSince")).is_some_and(|since| since < now) {
        instants.insert("effectiveSince".into(), json!(utc_text(now)));
    }

    let mut event = json!({
        "id": id,
        "name": name,
        "recurrence": recurrence,
    });
    if let Some(obj) = event.as_object_mut() {
        obj.extend(instants);
        if let Some(until) = body.get("effectiveUntil").and_then(Value::as_str) {
            let at = utc(until)
                .ok_or_else(|| bad_request("effectiveUntil must be an RFC 3339 timestamp"))?;
            obj.insert("effectiveUntil".into(), json!(utc_text(at)));
        }
        if let Some(strategy) = body.get("assignmentStrategy") {
            let members: Vec<Value> = strategy
                .get("members")
                .and_then(Value::as_array)
                .map(|members| {
                    members
                        .iter()
                        .map(|m| {
                            let mut member = json!({
                                "type": member_synonym(str_field(m, "type")),
                            });
                            if let (Some(obj), Some(user)) = (member.as_object_mut(), m.get("userId")) {
                                obj.insert("userId".into(), user.clone());
                            }
                            member
                        })
                        .collect()
                })
                .unwrap_or_default();
            obj.insert(
                "assignmentStrategy".into(),
                json!({
                    "type": strategy_synonym(str_field(strategy, "type")),
                    "members": members,
                }),
            );
        }
    }
    Ok(event)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> StatusCode {
    StatusCode::OK
}

// ── Schedules ───────────────────────────────────────────────────────

async fn schedule_create(State(state): State<AppState>, Json(body): Json<Value>) -> Response {
    if let Some(resp) = fault(&state, "create_schedule") {
        return resp;
    }
    let name = str_field(&body, "name");
    let time_zone = str_field(&body, "timeZone");
    if name.trim().is_empty() || time_zone.trim().is_empty() {
        return bad_request("name and timeZone are required");
    }
    let id = Uuid::new_v4().to_string();
    let schedule = json!({
        "id": id,
        "name": name,
        "timeZone": legacy_time_zone(time_zone),
        "description": str_field(&body, "description"),
        "rotationIds": [],
    });
    state.schedules().insert(id, schedule.clone());
    state.record_mutation();
    (StatusCode::CREATED, Json(schedule)).into_response()
}

async fn schedule_get(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if let Some(resp) = fault(&state, "read_schedule") {
        return resp;
    }
    match state.schedules().get(&id) {
        Some(entry) => Json(entry.value().clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn schedule_update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = fault(&state, "update_schedule") {
        return resp;
    }
    let name = str_field(&body, "name");
    let time_zone = str_field(&body, "timeZone");
    if name.trim().is_empty() || time_zone.trim().is_empty() {
        return bad_request("name and timeZone are required");
    }
    match state.schedules().get_mut(&id) {
        Some(mut entry) => {
            let schedule = entry.value_mut();
            schedule["name"] = json!(name);
            schedule["timeZone"] = json!(legacy_time_zone(time_zone));
            schedule["description"] = json!(str_field(&body, "description"));
            let out = schedule.clone();
            drop(entry);
            state.record_mutation();
            Json(out).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn schedule_delete(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if let Some(resp) = fault(&state, "delete_schedule") {
        return resp;
    }
    match state.schedules().remove(&id) {
        Some((_, schedule)) => {
            // Rotations and their events go with the schedule.
            for rotation_id in schedule["rotationIds"].as_array().into_iter().flatten() {
                if let Some(rotation_id) = rotation_id.as_str() {
                    state.rotations().remove(rotation_id);
                }
            }
            state.record_mutation();
            StatusCode::NO_CONTENT.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

// ── Rotations ───────────────────────────────────────────────────────

async fn rotation_create(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if let Some(resp) = fault(&state, "create_rotation") {
        return resp;
    }
    let Some(mut schedule) = state.schedules().get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let rotation_id = Uuid::new_v4().to_string();
    if let Some(ids) = schedule.value_mut()["rotationIds"].as_array_mut() {
        ids.push(json!(rotation_id));
    }
    drop(schedule);

    let rotation = json!({ "id": rotation_id, "scheduleId": id, "events": [] });
    state.rotations().insert(rotation_id, rotation.clone());
    state.record_mutation();
    (StatusCode::CREATED, Json(rotation)).into_response()
}

/// Look up a rotation, checking it belongs to the schedule in the path.
fn owned_rotation(state: &AppState, id: &str, rotation_id: &str) -> Option<Value> {
    state
        .rotations()
        .get(rotation_id)
        .filter(|r| r.value()["scheduleId"] == id)
        .map(|r| r.value().clone())
}

async fn rotation_get(
    State(state): State<AppState>,
    Path((id, rotation_id)): Path<(String, String)>,
) -> Response {
    if let Some(resp) = fault(&state, "read_rotation") {
        return resp;
    }
    match owned_rotation(&state, &id, &rotation_id) {
        Some(rotation) => Json(rotation).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn rotation_delete(
    State(state): State<AppState>,
    Path((id, rotation_id)): Path<(String, String)>,
) -> Response {
    if let Some(resp) = fault(&state, "delete_rotation") {
        return resp;
    }
    if owned_rotation(&state, &id, &rotation_id).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    state.rotations().remove(&rotation_id);
    if let Some(mut schedule) = state.schedules().get_mut(&id) {
        if let Some(ids) = schedule.value_mut()["rotationIds"].as_array_mut() {
            ids.retain(|r| r != rotation_id.as_str());
        }
    }
    state.record_mutation();
    StatusCode::NO_CONTENT.into_response()
}

// ── Events ──────────────────────────────────────────────────────────

async fn event_create(
    State(state): State<AppState>,
    Path((id, rotation_id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = fault(&state, "create_event") {
        return resp;
    }
    if owned_rotation(&state, &id, &rotation_id).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let event = match stored_event(&Uuid::new_v4().to_string(), &body) {
        Ok(event) => event,
        Err(resp) => return resp,
    };
    let Some(mut rotation) = state.rotations().get_mut(&rotation_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Some(events) = rotation.value_mut()["events"].as_array_mut() {
        events.push(event.clone());
    }
    drop(rotation);
    state.record_mutation();
    (StatusCode::CREATED, Json(event)).into_response()
}

async fn event_update(
    State(state): State<AppState>,
    Path((id, rotation_id, event_id)): Path<(String, String, String)>,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = fault(&state, "update_event") {
        return resp;
    }
    if owned_rotation(&state, &id, &rotation_id).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let event = match stored_event(&event_id, &body) {
        Ok(event) => event,
        Err(resp) => return resp,
    };
    let Some(mut rotation) = state.rotations().get_mut(&rotation_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let slot = rotation.value_mut()["events"]
        .as_array_mut()
        .and_then(|events| events.iter_mut().find(|e| e["id"] == event_id.as_str()));
    match slot {
        Some(slot) => {
            *slot = event.clone();
            drop(rotation);
            state.record_mutation();
            Json(event).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn event_delete(
    State(state): State<AppState>,
    Path((id, rotation_id, event_id)): Path<(String, String, String)>,
) -> Response {
    if let Some(resp) = fault(&state, "delete_event") {
        return resp;
    }
    if owned_rotation(&state, &id, &rotation_id).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(mut rotation) = state.rotations().get_mut(&rotation_id) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let removed = match rotation.value_mut()["events"].as_array_mut() {
        Some(events) => {
            let before = events.len();
            events.retain(|e| e["id"] != event_id.as_str());
            events.len() < before
        }
        None => false,
    };
    drop(rotation);
    if removed {
        state.record_mutation();
        StatusCode::NO_CONTENT.into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

// ── Fallback ────────────────────────────────────────────────────────

async fn not_implemented() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(json!({ "error": "not implemented by the stub" })),
    )
        .into_response()
}
