use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};

use super::{SourceAdapter, check_status, http_client, retain_addressed};
use crate::core::parser::AgentMarkers;
use crate::core::types::{Record, SourceKind, TimeWindow, WindowConfig};

const PAGE_SIZE: u64 = 50;
/// Upper bound on pages fetched per poll.
const MAX_PAGES: u64 = 20;

#[derive(Debug, Clone)]
pub struct JiraConfig {
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    /// Extra JQL ANDed into the due-date query, e.g. `project = OPS`.
    pub extra_jql: Option<String>,
    pub window: WindowConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    total: u64,
    #[serde(default)]
    issues: Vec<Issue>,
}

#[derive(Deserialize)]
struct Issue {
    key: String,
    fields: IssueFields,
}

#[derive(Deserialize)]
struct IssueFields {
    summary: Option<String>,
    description: Option<String>,
    duedate: Option<String>,
}

/// Ticket source backed by the Jira REST v2 API.
pub struct JiraSource {
    config: JiraConfig,
    markers: AgentMarkers,
    client: reqwest::Client,
}

impl JiraSource {
    pub fn new(config: JiraConfig, markers: AgentMarkers) -> Result<Self> {
        Ok(Self {
            config,
            markers,
            client: http_client()?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn search_jql(&self, window: &TimeWindow) -> String {
        let mut jql = format!(
            r#"duedate >= "{}" AND duedate <= "{}""#,
            window.start.format("%Y-%m-%d"),
            window.end.format("%Y-%m-%d")
        );
        if let Some(extra) = self
            .config
            .extra_jql
            .as_deref()
            .filter(|e| !e.trim().is_empty())
        {
            jql.push_str(&format!(" AND ({})", extra.trim()));
        }
        jql.push_str(" ORDER BY duedate ASC");
        jql
    }

    async fn fetch_page(&self, jql: &str, start_at: u64) -> Result<SearchResponse> {
        let start_at = start_at.to_string();
        let max_results = PAGE_SIZE.to_string();
        let res = self
            .client
            .get(self.url("/rest/api/2/search"))
            .basic_auth(&self.config.email, Some(&self.config.api_token))
            .query(&[
                ("jql", jql),
                ("fields", "summary,description,duedate"),
                ("startAt", start_at.as_str()),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await
            .context("ticket search request failed")?;
        let res = check_status(res, "ticket search").await?;
        res.json().await.context("malformed ticket search response")
    }
}

fn issue_to_record(issue: Issue) -> Option<Record> {
    let due = issue.fields.duedate.as_deref()?;
    let due_at = NaiveDate::parse_from_str(due, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)?
        .and_utc();
    Some(Record {
        title: issue.fields.summary.unwrap_or_else(|| issue.key.clone()),
        id: issue.key,
        source: SourceKind::Ticket,
        body: issue.fields.description.filter(|d| !d.trim().is_empty()),
        due_at,
    })
}

#[async_trait]
impl SourceAdapter for JiraSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Ticket
    }

    fn window(&self) -> WindowConfig {
        self.config.window
    }

    async fn list_due_records(&self, window: &TimeWindow) -> Result<Vec<Record>> {
        let jql = self.search_jql(window);
        debug!(jql = %jql, "searching tickets");

        let mut records = Vec::new();
        let mut start_at = 0;
        for _ in 0..MAX_PAGES {
            let page = self.fetch_page(&jql, start_at).await?;
            let fetched = page.issues.len() as u64;
            records.extend(page.issues.into_iter().filter_map(issue_to_record));
            start_at += fetched;
            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        let found = records.len();
        let records = retain_addressed(records, &self.markers);
        info!(
            source = "ticket",
            found,
            addressed = records.len(),
            "fetched due tickets"
        );
        Ok(records)
    }

    async fn post_comment(&self, record_id: &str, text: &str) -> Result<()> {
        let url = self.url(&format!(
            "/rest/api/2/issue/{}/comment",
            urlencoding::encode(record_id)
        ));
        let res = self
            .client
            .post(url)
            .basic_auth(&self.config.email, Some(&self.config.api_token))
            .json(&serde_json::json!({ "body": text }))
            .send()
            .await
            .context("ticket comment request failed")?;
        check_status(res, "ticket comment").await?;
        Ok(())
    }
}
