//! HTTP implementation of [`ScheduleApi`].
//!
//! ## API Paths
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | POST   | `/api/v2/schedules` | Create schedule |
//! | GET    | `/api/v2/schedules/{scheduleId}` | Read schedule |
//! | PUT    | `/api/v2/schedules/{scheduleId}` | Update schedule |
//! | DELETE | `/api/v2/schedules/{scheduleId}` | Delete schedule (cascades) |
//! | POST   | `/api/v2/schedules/{scheduleId}/rotations` | Create rotation |
//! | GET    | `/api/v2/schedules/{scheduleId}/rotations/{rotationId}` | Read rotation with events |
//! | DELETE | `/api/v2/schedules/{scheduleId}/rotations/{rotationId}` | Delete rotation |
//! | POST   | `/api/v2/schedules/{scheduleId}/rotations/{rotationId}/events` | Create event |
//! | PUT    | `/api/v2/schedules/{scheduleId}/rotations/{rotationId}/events/{eventId}` | Update event |
//! | DELETE | `/api/v2/schedules/{scheduleId}/rotations/{rotationId}/events/{eventId}` | Delete event |
//!
//! Bodies are camelCase JSON. Retries are NOT built into this client:
//! the engine wraps each call in [`crate::retry::retry_until`].

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::api::{RotationState, ScheduleApi, ScheduleState};
use crate::config::{ApiConfig, ConfigError};
use crate::error::ApiError;
use crate::model::{AssignmentStrategy, Event, EventSpec, Member, MemberType, ScheduleSpec, StrategyType};
use crate::serial::EndpointLocks;
use crate::types::{EventId, RotationId, ScheduleId};

/// Endpoint serialized through [`EndpointLocks`].
const CREATE_ROTATION: &str = "POST /schedules/{id}/rotations";

// -- Wire types ---------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleBody<'a> {
    name: &'a str,
    time_zone: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireSchedule {
    id: ScheduleId,
    name: String,
    time_zone: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    rotation_ids: Vec<RotationId>,
}

impl From<WireSchedule> for ScheduleState {
    fn from(w: WireSchedule) -> Self {
        Self {
            id: w.id,
            spec: ScheduleSpec {
                name: w.name,
                time_zone: w.time_zone,
                description: w.description.filter(|d| !d.is_empty()),
            },
            rotation_ids: w.rotation_ids,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRotation {
    id: RotationId,
    #[serde(default)]
    events: Vec<WireEvent>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMember {
    #[serde(rename = "type")]
    member_type: MemberType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireStrategy {
    #[serde(rename = "type")]
    strategy_type: StrategyType,
    #[serde(default)]
    members: Vec<WireMember>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEventSpec {
    name: String,
    start_time: String,
    end_time: String,
    effective_since: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    effective_until: Option<String>,
    recurrence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assignment_strategy: Option<WireStrategy>,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    id: EventId,
    #[serde(flatten)]
    spec: WireEventSpec,
}

impl From<&EventSpec> for WireEventSpec {
    fn from(spec: &EventSpec) -> Self {
        Self {
            name: spec.name.clone(),
            start_time: spec.start_time.clone(),
            end_time: spec.end_time.clone(),
            effective_since: spec.effective_since.clone(),
            effective_until: spec.effective_until.clone(),
            recurrence: spec.recurrence.clone(),
            assignment_strategy: spec.assignment_strategy.as_ref().map(|s| WireStrategy {
                strategy_type: s.strategy_type,
                members: s
                    .members
                    .iter()
                    .map(|m| WireMember {
                        member_type: m.member_type,
                        user_id: m.user_id.clone(),
                    })
                    .collect(),
            }),
        }
    }
}

impl From<WireEvent> for Event {
    fn from(w: WireEvent) -> Self {
        let spec = w.spec;
        Self {
            id: Some(w.id),
            spec: EventSpec {
                name: spec.name,
                start_time: spec.start_time,
                end_time: spec.end_time,
                effective_since: spec.effective_since,
                effective_until: spec.effective_until,
                recurrence: spec.recurrence,
                assignment_strategy: spec.assignment_strategy.map(|s| AssignmentStrategy {
                    strategy_type: s.strategy_type,
                    members: s
                        .members
                        .into_iter()
                        .map(|m| Member {
                            member_type: m.member_type,
                            user_id: m.user_id,
                        })
                        .collect(),
                }),
            },
        }
    }
}

// -- Client -------------------------------------------------------------------

/// reqwest-backed schedule API client.
#[derive(Debug, Clone)]
pub struct HttpScheduleClient {
    http: reqwest::Client,
    base_url: Url,
    locks: EndpointLocks,
}

impl HttpScheduleClient {
    /// Create a new client from configuration.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    reqwest::header::HeaderValue::from_str(&format!(
                        "Bearer {}",
                        config.api_token.as_str()
                    ))
                    .map_err(|_| ApiError::Config(ConfigError::MissingToken))?,
                );
                headers
            })
            .build()
            .map_err(|e| ApiError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;

        Ok(Self {
            http,
            base_url: config.base_url,
            locks: EndpointLocks::new(),
        })
    }

    /// `{base_url}/api/v2/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ApiError::Config(ConfigError::InvalidUrl(
                    self.base_url.to_string(),
                    "URL cannot be a base".into(),
                ))
            })?
            .pop_if_empty()
            .extend(["api", "v2"])
            .extend(segments);
        Ok(url)
    }

    /// Send a request and map transport failures and non-2xx statuses.
    async fn send(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ApiError> {
        let resp = request.send().await.map_err(|e| ApiError::Http {
            endpoint: endpoint.to_string(),
            source: e,
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status,
                body,
            });
        }
        Ok(resp)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ApiError> {
        let resp = self.send(endpoint, request).await?;
        resp.json().await.map_err(|e| ApiError::Deserialization {
            endpoint: endpoint.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ScheduleApi for HttpScheduleClient {
    async fn create_schedule(&self, spec: &ScheduleSpec) -> Result<ScheduleId, ApiError> {
        let endpoint = "POST /schedules";
        let url = self.url(&["schedules"])?;
        let body = ScheduleBody {
            name: &spec.name,
            time_zone: &spec.time_zone,
            description: spec.description.as_deref(),
        };
        let created: WireSchedule = self
            .send_json(endpoint, self.http.post(url).json(&body))
            .await?;
        Ok(created.id)
    }

    async fn read_schedule(&self, id: &ScheduleId) -> Result<ScheduleState, ApiError> {
        let endpoint = format!("GET /schedules/{id}");
        let url = self.url(&["schedules", id.as_str()])?;
        let wire: WireSchedule = self.send_json(&endpoint, self.http.get(url)).await?;
        Ok(wire.into())
    }

    async fn update_schedule(
        &self,
        id: &ScheduleId,
        spec: &ScheduleSpec,
    ) -> Result<ScheduleState, ApiError> {
        let endpoint = format!("PUT /schedules/{id}");
        let url = self.url(&["schedules", id.as_str()])?;
        let body = ScheduleBody {
            name: &spec.name,
            time_zone: &spec.time_zone,
            description: spec.description.as_deref(),
        };
        let wire: WireSchedule = self
            .send_json(&endpoint, self.http.put(url).json(&body))
            .await?;
        Ok(wire.into())
    }

    async fn delete_schedule(&self, id: &ScheduleId) -> Result<(), ApiError> {
        let endpoint = format!("DELETE /schedules/{id}");
        let url = self.url(&["schedules", id.as_str()])?;
        self.send(&endpoint, self.http.delete(url)).await?;
        Ok(())
    }

    async fn create_rotation(&self, schedule_id: &ScheduleId) -> Result<RotationId, ApiError> {
        let endpoint = format!("POST /schedules/{schedule_id}/rotations");
        let url = self.url(&["schedules", schedule_id.as_str(), "rotations"])?;
        let created: WireRotation = self
            .locks
            .serialize(
                CREATE_ROTATION,
                self.send_json::<WireRotation>(
                    &endpoint,
                    self.http.post(url).json(&serde_json::json!({})),
                ),
            )
            .await?;
        Ok(created.id)
    }

    async fn read_rotation(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
    ) -> Result<RotationState, ApiError> {
        let endpoint = format!("GET /schedules/{schedule_id}/rotations/{rotation_id}");
        let url = self.url(&[
            "schedules",
            schedule_id.as_str(),
            "rotations",
            rotation_id.as_str(),
        ])?;
        let wire: WireRotation = self.send_json(&endpoint, self.http.get(url)).await?;
        Ok(RotationState {
            id: wire.id,
            events: wire.events.into_iter().map(Event::from).collect(),
        })
    }

    async fn delete_rotation(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
    ) -> Result<(), ApiError> {
        let endpoint = format!("DELETE /schedules/{schedule_id}/rotations/{rotation_id}");
        let url = self.url(&[
            "schedules",
            schedule_id.as_str(),
            "rotations",
            rotation_id.as_str(),
        ])?;
        self.send(&endpoint, self.http.delete(url)).await?;
        Ok(())
    }

    async fn create_event(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
        spec: &EventSpec,
    ) -> Result<Event, ApiError> {
        let endpoint = format!("POST /schedules/{schedule_id}/rotations/{rotation_id}/events");
        let url = self.url(&[
            "schedules",
            schedule_id.as_str(),
            "rotations",
            rotation_id.as_str(),
            "events",
        ])?;
        let wire: WireEvent = self
            .send_json(&endpoint, self.http.post(url).json(&WireEventSpec::from(spec)))
            .await?;
        Ok(wire.into())
    }

    async fn update_event(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
        event_id: &EventId,
        spec: &EventSpec,
    ) -> Result<Event, ApiError> {
        let endpoint =
            format!("PUT /schedules/{schedule_id}/rotations/{rotation_id}/events/{event_id}");
        let url = self.url(&[
            "schedules",
            schedule_id.as_str(),
            "rotations",
            rotation_id.as_str(),
            "events",
            event_id.as_str(),
        ])?;
        let wire: WireEvent = self
            .send_json(&endpoint, self.http.put(url).json(&WireEventSpec::from(spec)))
            .await?;
        Ok(wire.into())
    }

    async fn delete_event(
        &self,
        schedule_id: &ScheduleId,
        rotation_id: &RotationId,
        event_id: &EventId,
    ) -> Result<(), ApiError> {
        let endpoint =
            format!("DELETE /schedules/{schedule_id}/rotations/{rotation_id}/events/{event_id}");
        let url = self.url(&[
            "schedules",
            schedule_id.as_str(),
            "rotations",
            rotation_id.as_str(),
            "events",
            event_id.as_str(),
        ])?;
        self.send(&endpoint, self.http.delete(url)).await?;
        Ok(())
    }
}
