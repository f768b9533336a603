use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Ticket,
    CalendarEvent,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Ticket => "ticket",
            SourceKind::CalendarEvent => "calendar_event",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work discovered from a source during one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub source: SourceKind,
    pub title: String,
    pub body: Option<String>,
    pub due_at: DateTime<Utc>,
}

impl Record {
    /// Ids are only unique within a source, so the ledger keys on both.
    pub fn ledger_key(&self) -> String {
        format!("{}:{}", self.source.as_str(), self.id)
    }

    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

/// Inclusive `[start, end]` range a source is queried with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn around(now: DateTime<Utc>, grace: Duration, lookahead: Duration) -> Self {
        Self {
            start: now - grace,
            end: now + lookahead,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }
}

/// Per-source window bounds, tuned independently per source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowConfig {
    pub grace: Duration,
    pub lookahead: Duration,
}

impl WindowConfig {
    pub fn from_minutes(grace: u32, lookahead: u32) -> Self {
        Self {
            grace: Duration::minutes(i64::from(grace)),
            lookahead: Duration::minutes(i64::from(lookahead)),
        }
    }

    pub fn window_at(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow::around(now, self.grace, self.lookahead)
    }
}
