pub mod calendar;
pub mod jira;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::core::parser::AgentMarkers;
use crate::core::types::{Record, SourceKind, TimeWindow, WindowConfig};

pub use calendar::{CalendarConfig, CalendarSource};
pub use jira::{JiraConfig, JiraSource};

/// Boundary to one external record system.
///
/// Adapters only read in `list_due_records`; `post_comment` is the single
/// write and is driven by the reporter.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Grace and lookahead used to build this source's poll window.
    fn window(&self) -> WindowConfig;

    /// Records due within `window` that address an agent.
    async fn list_due_records(&self, window: &TimeWindow) -> Result<Vec<Record>>;

    async fn post_comment(&self, record_id: &str, text: &str) -> Result<()>;
}

/// Drop records whose title and body carry no agent marker.
pub(crate) fn retain_addressed(records: Vec<Record>, markers: &AgentMarkers) -> Vec<Record> {
    records
        .into_iter()
        .filter(|r| markers.addresses_agent(&r.title, r.body.as_deref()))
        .collect()
}

/// Map a non-2xx response into an error carrying status and body.
pub(crate) async fn check_status(res: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().await.unwrap_or_default();
    Err(anyhow!(
        "{} failed with HTTP {}: {}",
        what,
        status,
        body.chars().take(500).collect::<String>()
    ))
}

pub(crate) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("duetask/", env!("CARGO_PKG_VERSION")))
        .build()?)
}
