//! Scripted fakes for the process and source seams.

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core::process::{Invocation, ProcessOutput, ProcessRunner};
use crate::core::types::{Record, SourceKind, TimeWindow, WindowConfig};
use crate::sources::SourceAdapter;

#[derive(Debug, Clone)]
pub enum FakeRun {
    Exit { code: i32, stdout: String, stderr: String },
    TimedOut,
    SpawnError(String),
    Panic,
}

impl FakeRun {
    pub fn ok(stdout: &str) -> Self {
        FakeRun::Exit {
            code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn exit(code: i32, stderr: &str) -> Self {
        FakeRun::Exit {
            code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}

/// Replays queued results in order, then falls back to `default`.
pub struct FakeRunner {
    queue: Mutex<VecDeque<FakeRun>>,
    default: FakeRun,
    calls: Mutex<Vec<Invocation>>,
}

impl FakeRunner {
    pub fn new(default: FakeRun) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            default,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(FakeRun::ok(""))
    }

    pub fn then(self, run: FakeRun) -> Self {
        self.queue.lock().unwrap().push_back(run);
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for FakeRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        let next = self
            .queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        match next {
            FakeRun::Exit {
                code,
                stdout,
                stderr,
            } => Ok(ProcessOutput {
                stdout,
                stderr,
                exit_code: Some(code),
                timed_out: false,
            }),
            FakeRun::TimedOut => Ok(ProcessOutput {
                timed_out: true,
                ..ProcessOutput::default()
            }),
            FakeRun::SpawnError(msg) => Err(anyhow!(msg)),
            FakeRun::Panic => panic!("runner blew up"),
        }
    }
}

pub fn record(source: SourceKind, id: &str, body: &str) -> Record {
    Record {
        id: id.to_string(),
        source,
        title: format!("Record {}", id),
        body: Some(body.to_string()),
        due_at: Utc::now(),
    }
}

/// In-memory source: serves a fixed record list and captures comments.
pub struct FakeSource {
    kind: SourceKind,
    records: Mutex<Vec<Record>>,
    fail_listing: bool,
    fail_comments: bool,
    comments: Mutex<Vec<(String, String)>>,
    windows: Mutex<Vec<TimeWindow>>,
}

impl FakeSource {
    pub fn new(kind: SourceKind, records: Vec<Record>) -> Self {
        Self {
            kind,
            records: Mutex::new(records),
            fail_listing: false,
            fail_comments: false,
            comments: Mutex::new(Vec::new()),
            windows: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(kind: SourceKind) -> Self {
        Self {
            fail_listing: true,
            ..Self::new(kind, Vec::new())
        }
    }

    pub fn with_failing_comments(mut self) -> Self {
        self.fail_comments = true;
        self
    }

    pub fn set_records(&self, records: Vec<Record>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn comments(&self) -> Vec<(String, String)> {
        self.comments.lock().unwrap().clone()
    }

    pub fn last_window_start(&self) -> Option<DateTime<Utc>> {
        self.windows.lock().unwrap().last().map(|w| w.start)
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn window(&self) -> WindowConfig {
        WindowConfig::from_minutes(5, 15)
    }

    async fn list_due_records(&self, window: &TimeWindow) -> Result<Vec<Record>> {
        self.windows.lock().unwrap().push(*window);
        if self.fail_listing {
            bail!("{} source unreachable", self.kind);
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn post_comment(&self, record_id: &str, text: &str) -> Result<()> {
        if self.fail_comments {
            bail!("comment rejected");
        }
        self.comments
            .lock()
            .unwrap()
            .push((record_id.to_string(), text.to_string()));
        Ok(())
    }
}
