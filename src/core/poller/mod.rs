use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::dispatcher::Dispatcher;
use crate::core::ledger::{RetryPolicy, RunLedger};
use crate::core::outcome::Outcome;
use crate::core::parser::TaskParser;
use crate::core::reporter;
use crate::core::task::TaskKind;
use crate::core::types::Record;
use crate::sources::SourceAdapter;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
    ProcessingBatch,
    Sleeping,
    Stopping,
    Stopped,
}

pub fn can_transition(from: PollerState, to: PollerState) -> bool {
    use PollerState::*;
    match from {
        Idle => matches!(to, Polling | Stopping),
        Polling => matches!(to, ProcessingBatch | Stopping),
        ProcessingBatch => matches!(to, Idle | Sleeping | Stopping),
        Sleeping => matches!(to, Polling | Stopping),
        Stopping => matches!(to, Stopped),
        Stopped => false,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub discovered: usize,
    pub skipped: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// One record as seen by `list`: parsed but not executed.
#[derive(Debug, Clone)]
pub struct DiscoveredRecord {
    pub record: Record,
    pub kind: TaskKind,
    pub summary: String,
    pub already_run: bool,
}

/// Drives sources through parse, dispatch, report and mark.
///
/// Records are handled one at a time in the order the sources return them.
/// The ledger is the only state shared across cycles.
pub struct Poller {
    sources: Vec<Arc<dyn SourceAdapter>>,
    parser: TaskParser,
    dispatcher: Arc<Dispatcher>,
    ledger: Arc<dyn RunLedger>,
    policy: RetryPolicy,
    interval: Duration,
    state: PollerState,
}

impl Poller {
    pub fn new(
        sources: Vec<Arc<dyn SourceAdapter>>,
        parser: TaskParser,
        dispatcher: Arc<Dispatcher>,
        ledger: Arc<dyn RunLedger>,
    ) -> Self {
        Self {
            sources,
            parser,
            dispatcher,
            ledger,
            policy: RetryPolicy::default(),
            interval: DEFAULT_POLL_INTERVAL,
            state: PollerState::Idle,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    fn transition(&mut self, to: PollerState) {
        if !can_transition(self.state, to) {
            warn!(from = ?self.state, to = ?to, "ignoring invalid poller transition");
            return;
        }
        debug!(from = ?self.state, to = ?to, "poller transition");
        self.state = to;
    }

    /// Single cycle for one-shot mode; returns to `Idle`.
    pub async fn poll_once(&mut self, cancel: &CancellationToken) -> CycleSummary {
        let summary = self.run_cycle(cancel).await;
        if cancel.is_cancelled() {
            self.stop();
        } else {
            self.transition(PollerState::Idle);
        }
        summary
    }

    /// Poll immediately, then every `interval` until `cancel` fires.
    /// Returns the number of completed cycles.
    pub async fn run_continuous(&mut self, cancel: CancellationToken) -> u64 {
        let mut cycles = 0;
        info!(
            interval_secs = self.interval.as_secs(),
            sources = self.sources.len(),
            "starting continuous polling"
        );
        while !cancel.is_cancelled() {
            self.run_cycle(&cancel).await;
            cycles += 1;
            if cancel.is_cancelled() {
                break;
            }

            self.transition(PollerState::Sleeping);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        self.stop();
        info!(cycles, "polling stopped");
        cycles
    }

    fn stop(&mut self) {
        self.transition(PollerState::Stopping);
        self.transition(PollerState::Stopped);
    }

    async fn fetch_all(&self) -> Vec<(usize, Record)> {
        let mut batch = Vec::new();
        for (idx, source) in self.sources.iter().enumerate() {
            let window = source.window().window_at(Utc::now());
            match source.list_due_records(&window).await {
                Ok(records) => {
                    debug!(source = %source.kind(), count = records.len(), "source returned records");
                    batch.extend(records.into_iter().map(|r| (idx, r)));
                }
                Err(e) => {
                    error!(source = %source.kind(), "failed to list due records: {:#}", e);
                }
            }
        }
        batch
    }

    async fn run_cycle(&mut self, cancel: &CancellationToken) -> CycleSummary {
        let cycle = Uuid::new_v4();
        self.transition(PollerState::Polling);
        let batch = self.fetch_all().await;
        self.transition(PollerState::ProcessingBatch);

        let mut summary = CycleSummary {
            discovered: batch.len(),
            ..CycleSummary::default()
        };
        for (idx, record) in batch {
            if cancel.is_cancelled() {
                info!(%cycle, "cancelled; leaving remaining records for a later run");
                break;
            }
            let key = record.ledger_key();
            match self.ledger.lookup(&key).await {
                Ok(entry) if self.policy.should_skip(entry.as_ref()) => {
                    debug!(%cycle, record_id = %record.id, "already executed, skipping");
                    summary.skipped += 1;
                    continue;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(%cycle, record_id = %record.id, "ledger lookup failed, skipping: {:#}", e);
                    summary.skipped += 1;
                    continue;
                }
            }

            let source = self.sources[idx].clone();
            let outcome = self.process_record(source.as_ref(), &record).await;
            if outcome.is_success() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        info!(
            %cycle,
            discovered = summary.discovered,
            skipped = summary.skipped,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "poll cycle finished"
        );
        summary
    }

    async fn process_record(&self, source: &dyn SourceAdapter, record: &Record) -> Outcome {
        let task = self.parser.parse_record(record);
        info!(
            source = %record.source,
            record_id = %record.id,
            kind = %task.kind(),
            "processing record"
        );

        // Spawned so a panicking runner fails this record only.
        let dispatcher = self.dispatcher.clone();
        let (rec, t) = (record.clone(), task.clone());
        let outcome = match tokio::spawn(async move { dispatcher.dispatch(&rec, &t).await }).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(record_id = %record.id, "dispatch aborted: {}", e);
                Outcome::failure(format!("dispatch aborted: {}", e))
            }
        };
        info!(
            record_id = %record.id,
            status = outcome.status().as_str(),
            "dispatch finished"
        );

        reporter::report(source, record, &task, &outcome).await;

        if let Err(e) = self.ledger.mark_run(&record.ledger_key(), outcome.status()).await {
            error!(record_id = %record.id, "failed to record execution: {:#}", e);
        }
        outcome
    }

    /// Fetch and parse due records without executing anything.
    pub async fn discover(&self) -> Vec<DiscoveredRecord> {
        let mut found = Vec::new();
        for (_, record) in self.fetch_all().await {
            let task = self.parser.parse_record(&record);
            let already_run = match self.ledger.lookup(&record.ledger_key()).await {
                Ok(entry) => self.policy.should_skip(entry.as_ref()),
                Err(e) => {
                    warn!(record_id = %record.id, "ledger lookup failed: {:#}", e);
                    false
                }
            };
            found.push(DiscoveredRecord {
                kind: task.kind(),
                summary: task.summary(),
                record,
                already_run,
            });
        }
        found
    }
}

#[cfg(test)]
mod tests;
