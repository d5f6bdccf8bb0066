//! Google Calendar adapter for the [`CalendarStore`] port.
//!
//! Responses are deserialized into typed wire structs and mapped onto the
//! engine's event model. HTTP status codes are classified into the
//! transient/permanent split of [`CalendarError`] here, so the commit
//! engine only ever consults `is_retryable`.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::calendar::{BufferKind, CalendarEvent, EventDraft, EventStatus};
use crate::error::CalendarError;
use crate::store::CalendarStore;

const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

/// Private extended-property keys linking events back to tasks.
const PROP_TASK_ID: &str = "slotwise_task_id";
const PROP_BUFFER: &str = "slotwise_buffer";

/// Google Calendar backed calendar store.
pub struct GoogleCalendarStore {
    client: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl GoogleCalendarStore {
    pub fn new(access_token: impl Into<String>) -> Result<Self, CalendarError> {
        Self::with_base_url(access_token, DEFAULT_BASE_URL)
    }

    /// Override the API endpoint; used by tests against a local server.
    pub fn with_base_url(
        access_token: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, CalendarError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| CalendarError::Api(format!("invalid base url: {}", e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            access_token: access_token.into(),
        })
    }

    fn events_url(&self, calendar_id: &str) -> Result<Url, CalendarError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CalendarError::Api("base url cannot hold paths".to_string()))?
            .push("calendars")
            .push(calendar_id)
            .push("events");
        Ok(url)
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> Result<Url, CalendarError> {
        let mut url = self.events_url(calendar_id)?;
        url.path_segments_mut()
            .map_err(|_| CalendarError::Api("base url cannot hold paths".to_string()))?
            .push(event_id);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, CalendarError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

/// Map an HTTP status onto the transient/permanent error split.
fn classify_status(status: StatusCode, body: &str) -> CalendarError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CalendarError::AuthenticationRequired,
        StatusCode::NOT_FOUND | StatusCode::GONE => {
            CalendarError::Gone(format!("{}: {}", status, truncate(body)))
        }
        StatusCode::TOO_MANY_REQUESTS => CalendarError::RateLimited,
        s if s.is_server_error() => {
            CalendarError::Transient(format!("{}: {}", status, truncate(body)))
        }
        _ => CalendarError::Api(format!("{}: {}", status, truncate(body))),
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(200) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl CalendarStore for GoogleCalendarStore {
    async fn list_events(
        &self,
        calendar_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let mut url = self.events_url(calendar_id)?;
        url.query_pairs_mut()
            .append_pair("timeMin", &from.to_rfc3339())
            .append_pair("timeMax", &to.to_rfc3339())
            .append_pair("singleEvents", "true")
            .append_pair("orderBy", "startTime");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let body: EventListResponse = Self::check(response).await?.json().await?;

        Ok(body
            .items
            .into_iter()
            .filter_map(|e| e.into_event(calendar_id))
            .collect())
    }

    async fn get_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<CalendarEvent, CalendarError> {
        let url = self.event_url(calendar_id, event_id)?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        let body: GoogleEvent = Self::check(response).await?.json().await?;
        body.into_event(calendar_id)
            .ok_or_else(|| CalendarError::Api(format!("event {} has no usable times", event_id)))
    }

    async fn create_event(&self, draft: &EventDraft) -> Result<CalendarEvent, CalendarError> {
        let url = self.events_url(&draft.calendar_id)?;
        let payload = GoogleEventWrite::from_draft(draft);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        let body: GoogleEvent = Self::check(response).await?.json().await?;
        body.into_event(&draft.calendar_id)
            .ok_or_else(|| CalendarError::Api("created event has no usable times".to_string()))
    }

    async fn move_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<CalendarEvent, CalendarError> {
        let url = self.event_url(calendar_id, event_id)?;
        let payload = GoogleEventPatch {
            start: GoogleEventTime::timed(start),
            end: GoogleEventTime::timed(end),
        };
        let response = self
            .client
            .patch(url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        let body: GoogleEvent = Self::check(response).await?.json().await?;
        body.into_event(calendar_id)
            .ok_or_else(|| CalendarError::Api(format!("event {} has no usable times", event_id)))
    }

    async fn delete_event(
        &self,
        calendar_id: &str,
        event_id: &str,
    ) -> Result<(), CalendarError> {
        let url = self.event_url(calendar_id, event_id)?;
        let response = self
            .client
            .delete(url)
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<GoogleEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEvent {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    status: Option<String>,
    start: Option<GoogleEventTime>,
    end: Option<GoogleEventTime>,
    #[serde(default)]
    recurring_event_id: Option<String>,
    #[serde(default)]
    extended_properties: Option<ExtendedProperties>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ExtendedProperties {
    #[serde(default)]
    private: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    date_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    date: Option<NaiveDate>,
}

impl GoogleEventTime {
    fn timed(at: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(at),
            date: None,
        }
    }

    fn resolve(&self) -> Option<(DateTime<Utc>, bool)> {
        if let Some(at) = self.date_time {
            return Some((at, false));
        }
        let date = self.date?;
        Some((date.and_hms_opt(0, 0, 0)?.and_utc(), true))
    }
}

impl GoogleEvent {
    /// Map onto the engine's event model; events without resolvable times
    /// (cancelled instances in some responses) are dropped.
    fn into_event(self, calendar_id: &str) -> Option<CalendarEvent> {
        let (start, start_all_day) = self.start.as_ref()?.resolve()?;
        let (end, _) = self.end.as_ref()?.resolve()?;
        let status = match self.status.as_deref() {
            Some("tentative") => EventStatus::Tentative,
            Some("cancelled") => EventStatus::Cancelled,
            _ => EventStatus::Confirmed,
        };
        let private = self
            .extended_properties
            .map(|p| p.private)
            .unwrap_or_default();
        let buffer = match private.get(PROP_BUFFER).map(String::as_str) {
            Some("before") => Some(BufferKind::Before),
            Some("after") => Some(BufferKind::After),
            _ => None,
        };
        Some(CalendarEvent {
            id: self.id,
            calendar_id: calendar_id.to_string(),
            title: self.summary.unwrap_or_default(),
            start,
            end,
            all_day: start_all_day,
            status,
            task_id: private.get(PROP_TASK_ID).cloned(),
            buffer,
            recurring_event_id: self.recurring_event_id,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleEventWrite {
    summary: String,
    start: GoogleEventTime,
    end: GoogleEventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    extended_properties: Option<ExtendedProperties>,
}

impl GoogleEventWrite {
    fn from_draft(draft: &EventDraft) -> Self {
        let mut private = HashMap::new();
        if let Some(task_id) = &draft.task_id {
            private.insert(PROP_TASK_ID.to_string(), task_id.clone());
        }
        if let Some(kind) = draft.buffer {
            let value = match kind {
                BufferKind::Before => "before",
                BufferKind::After => "after",
            };
            private.insert(PROP_BUFFER.to_string(), value.to_string());
        }
        Self {
            summary: draft.title.clone(),
            start: GoogleEventTime::timed(draft.start),
            end: GoogleEventTime::timed(draft.end),
            extended_properties: (!private.is_empty())
                .then_some(ExtendedProperties { private }),
        }
    }
}

#[derive(Debug, Serialize)]
struct GoogleEventPatch {
    start: GoogleEventTime,
    end: GoogleEventTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store(server: &mockito::ServerGuard) -> GoogleCalendarStore {
        GoogleCalendarStore::with_base_url("test-token", &server.url()).unwrap()
    }

    #[tokio::test]
    async fn list_events_maps_wire_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/calendars/primary/events")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{
                  "items": [
                    {
                      "id": "ev1",
                      "summary": "Standup",
                      "status": "confirmed",
                      "start": {"dateTime": "2025-06-02T10:00:00Z"},
                      "end": {"dateTime": "2025-06-02T11:00:00Z"},
                      "extendedProperties": {"private": {"slotwise_task_id": "t1"}}
                    },
                    {
                      "id": "ev2",
                      "summary": "Offsite",
                      "start": {"date": "2025-06-03"},
                      "end": {"date": "2025-06-04"}
                    }
                  ]
                }"#,
            )
            .create_async()
            .await;

        let events = store(&server)
            .list_events(
                "primary",
                Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 6, 5, 0, 0, 0).unwrap(),
            )
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].task_id.as_deref(), Some("t1"));
        assert!(!events[0].all_day);
        assert!(events[1].all_day);
        assert_eq!(events[1].title, "Offsite");
    }

    #[tokio::test]
    async fn create_event_round_trips_task_link() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/calendars/primary/events")
            .with_status(200)
            .with_body(
                r#"{
                  "id": "ev-new",
                  "summary": "Focus block",
                  "start": {"dateTime": "2025-06-02T09:00:00Z"},
                  "end": {"dateTime": "2025-06-02T10:00:00Z"},
                  "extendedProperties": {"private": {"slotwise_task_id": "t1"}}
                }"#,
            )
            .create_async()
            .await;

        let draft = EventDraft::for_task(
            "primary",
            "Focus block",
            Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
            "t1",
        );
        let created = store(&server).create_event(&draft).await.unwrap();

        mock.assert_async().await;
        assert_eq!(created.id, "ev-new");
        assert_eq!(created.task_id.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn status_classification() {
        let mut server = mockito::Server::new_async().await;
        for (status, retryable) in [(429, true), (503, true), (404, false), (401, false)] {
            let mock = server
                .mock("DELETE", "/calendars/primary/events/ev1")
                .with_status(status)
                .create_async()
                .await;
            let err = store(&server)
                .delete_event("primary", "ev1")
                .await
                .unwrap_err();
            assert_eq!(err.is_retryable(), retryable, "status {}", status);
            mock.assert_async().await;
        }
    }

    #[tokio::test]
    async fn gone_event_maps_to_gone() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/calendars/primary/events/ev1")
            .with_status(410)
            .create_async()
            .await;
        let err = store(&server)
            .get_event("primary", "ev1")
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::Gone(_)));
    }
}
