use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use super::{SourceAdapter, check_status, http_client, retain_addressed};
use crate::core::parser::AgentMarkers;
use crate::core::types::{Record, SourceKind, TimeWindow, WindowConfig};

pub const DEFAULT_CALENDAR_URL: &str = "https://www.googleapis.com/calendar/v3";
const MAX_PAGES: usize = 10;

#[derive(Debug, Clone)]
pub struct CalendarConfig {
    pub base_url: String,
    pub calendar_id: String,
    pub access_token: String,
    pub window: WindowConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    items: Vec<Event>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct Event {
    id: String,
    status: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    start: Option<EventTime>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: Option<DateTime<FixedOffset>>,
    date: Option<NaiveDate>,
}

impl EventTime {
    fn to_utc(&self) -> Option<DateTime<Utc>> {
        if let Some(at) = self.date_time {
            return Some(at.with_timezone(&Utc));
        }
        self.date
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|d| d.and_utc())
    }
}

/// Calendar source backed by the Google Calendar v3 API.
///
/// Events have no comment thread, so reports are appended to the event
/// description instead.
pub struct CalendarSource {
    config: CalendarConfig,
    markers: AgentMarkers,
    client: reqwest::Client,
}

impl CalendarSource {
    pub fn new(config: CalendarConfig, markers: AgentMarkers) -> Result<Self> {
        Ok(Self {
            config,
            markers,
            client: http_client()?,
        })
    }

    fn events_url(&self) -> String {
        format!(
            "{}/calendars/{}/events",
            self.config.base_url.trim_end_matches('/'),
            urlencoding::encode(&self.config.calendar_id)
        )
    }

    fn event_url(&self, event_id: &str) -> String {
        format!("{}/{}", self.events_url(), urlencoding::encode(event_id))
    }

    async fn fetch_page(&self, window: &TimeWindow, page_token: Option<&str>) -> Result<EventsResponse> {
        let time_min = window.start.to_rfc3339_opts(SecondsFormat::Secs, true);
        let time_max = window.end.to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut query = vec![
            ("timeMin", time_min.as_str()),
            ("timeMax", time_max.as_str()),
            ("singleEvents", "true"),
            ("orderBy", "startTime"),
            ("maxResults", "250"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let res = self
            .client
            .get(self.events_url())
            .bearer_auth(&self.config.access_token)
            .query(&query)
            .send()
            .await
            .context("calendar events request failed")?;
        let res = check_status(res, "calendar events").await?;
        res.json().await.context("malformed calendar events response")
    }
}

/// Timed events must start inside the window; the API also returns events
/// that merely overlap it. All-day events are kept as-is.
fn event_to_record(event: Event, window: &TimeWindow) -> Option<Record> {
    if event.status.as_deref() == Some("cancelled") {
        return None;
    }
    let start = event.start.as_ref()?;
    let due_at = start.to_utc()?;
    if start.date_time.is_some() && !window.contains(due_at) {
        return None;
    }
    Some(Record {
        title: event.summary.unwrap_or_else(|| "(untitled event)".to_string()),
        id: event.id,
        source: SourceKind::CalendarEvent,
        body: event.description.filter(|d| !d.trim().is_empty()),
        due_at,
    })
}

#[async_trait]
impl SourceAdapter for CalendarSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CalendarEvent
    }

    fn window(&self) -> WindowConfig {
        self.config.window
    }

    async fn list_due_records(&self, window: &TimeWindow) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(window, page_token.as_deref()).await?;
            records.extend(
                page.items
                    .into_iter()
                    .filter_map(|e| event_to_record(e, window)),
            );
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        let found = records.len();
        let records = retain_addressed(records, &self.markers);
        info!(
            source = "calendar_event",
            found,
            addressed = records.len(),
            "fetched due calendar events"
        );
        Ok(records)
    }

    async fn post_comment(&self, record_id: &str, text: &str) -> Result<()> {
        let url = self.event_url(record_id);
        let res = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .send()
            .await
            .context("calendar event lookup failed")?;
        let event: Event = check_status(res, "calendar event lookup")
            .await?
            .json()
            .await
            .context("malformed calendar event")?;

        let description = match event.description.as_deref().map(str::trim_end) {
            Some(existing) if !existing.is_empty() => format!("{}\n\n{}", existing, text),
            _ => text.to_string(),
        };
        debug!(event_id = record_id, "appending report to event description");

        let res = self
            .client
            .patch(&url)
            .bearer_auth(&self.config.access_token)
            .json(&serde_json::json!({ "description": description }))
            .send()
            .await
            .context("calendar event update failed")?;
        check_status(res, "calendar event update").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn source(base_url: String) -> CalendarSource {
        CalendarSource::new(
            CalendarConfig {
                base_url,
                calendar_id: "team@example.com".to_string(),
                access_token: "tok".to_string(),
                window: WindowConfig::from_minutes(5, 15),
            },
            AgentMarkers::default(),
        )
        .unwrap()
    }

    fn window() -> TimeWindow {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        WindowConfig::from_minutes(5, 15).window_at(now)
    }

    #[tokio::test]
    async fn lists_addressed_events_and_follows_page_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/team@example.com/events"))
            .and(query_param("timeMin", "2026-10-17T11:55:00Z"))
            .and(query_param("timeMax", "2026-10-17T12:15:00Z"))
            .and(query_param("pageToken", "p2"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "e3", "status": "confirmed", "summary": "[Claude] sync",
                     "start": {"date": "2026-10-17"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendars/team@example.com/events"))
            .and(query_param("singleEvents", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {"id": "e1", "status": "confirmed", "summary": "Build",
                     "description": "Claude Code: Run `make`",
                     "start": {"dateTime": "2026-10-17T14:05:00+02:00"}},
                    {"id": "e2", "status": "cancelled", "summary": "[Claude] gone",
                     "start": {"dateTime": "2026-10-17T12:05:00Z"}},
                    {"id": "e4", "status": "confirmed", "summary": "Standup",
                     "start": {"dateTime": "2026-10-17T12:10:00Z"}},
                    {"id": "e5", "status": "confirmed", "summary": "[Codex] morning run",
                     "start": {"dateTime": "2026-10-17T09:00:00Z"}}
                ],
                "nextPageToken": "p2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let records = source(server.uri())
            .list_due_records(&window())
            .await
            .unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["e1", "e3"]);
        assert_eq!(
            records[0].due_at,
            Utc.with_ymd_and_hms(2026, 10, 17, 12, 5, 0).unwrap()
        );
        assert_eq!(records[1].source, SourceKind::CalendarEvent);
    }

    #[tokio::test]
    async fn report_is_appended_to_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/team@example.com/events/e1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "e1", "description": "Claude Code: Run `make`\n"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/calendars/team@example.com/events/e1"))
            .and(body_json(json!({
                "description": "Claude Code: Run `make`\n\nreport"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "e1"})))
            .expect(1)
            .mount(&server)
            .await;

        source(server.uri())
            .post_comment("e1", "report")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_update_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/calendars/team@example.com/events/e1"))
            .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
            .mount(&server)
            .await;

        let result = source(server.uri()).post_comment("e1", "report").await;
        assert!(result.is_err());
    }
}
