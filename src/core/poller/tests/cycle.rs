use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::core::dispatcher::Dispatcher;
use crate::core::ledger::{MemoryLedger, RetryPolicy, RunLedger};
use crate::core::outcome::OutcomeStatus;
use crate::core::parser::TaskParser;
use crate::core::poller::{Poller, PollerState};
use crate::core::process::{Invocation, ProcessOutput, ProcessRunner};
use crate::core::task::TaskKind;
use crate::core::testing::{FakeRun, FakeRunner, FakeSource, record};
use crate::core::types::SourceKind;
use crate::sources::SourceAdapter;

const RUN_BUILD: &str = "Claude Code: Run `make build`";
const INSTALL_EXPRESS: &str =
    "Claude Code: Install the express package using npm.\n\nResults: express is available.";

fn poller(
    root: &TempDir,
    sources: Vec<Arc<FakeSource>>,
    runner: Arc<dyn ProcessRunner>,
    ledger: Arc<MemoryLedger>,
) -> Poller {
    let dispatcher = Dispatcher::new(root.path().to_path_buf(), runner);
    let sources = sources
        .into_iter()
        .map(|s| s as Arc<dyn SourceAdapter>)
        .collect();
    Poller::new(
        sources,
        TaskParser::default(),
        Arc::new(dispatcher),
        ledger,
    )
}

#[tokio::test]
async fn same_record_is_dispatched_once_across_polls() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(
        SourceKind::Ticket,
        vec![record(SourceKind::Ticket, "OPS-1", RUN_BUILD)],
    ));
    let runner = Arc::new(FakeRunner::succeeding());
    let ledger = Arc::new(MemoryLedger::new());
    let mut p = poller(&root, vec![source.clone()], runner.clone(), ledger.clone());
    let cancel = CancellationToken::new();

    let first = p.poll_once(&cancel).await;
    let second = p.poll_once(&cancel).await;

    assert_eq!(first.succeeded, 1);
    assert_eq!(second.discovered, 1);
    assert_eq!(second.skipped, 1);
    assert_eq!(runner.calls().len(), 1);
    assert_eq!(source.comments().len(), 1);
    assert_eq!(p.state(), PollerState::Idle);
}

#[tokio::test]
async fn unaddressed_record_fails_without_side_effects_and_is_marked() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(
        SourceKind::CalendarEvent,
        vec![record(SourceKind::CalendarEvent, "ev-1", "Weekly sync, bring notes")],
    ));
    let runner = Arc::new(FakeRunner::succeeding());
    let ledger = Arc::new(MemoryLedger::new());
    let mut p = poller(&root, vec![source.clone()], runner.clone(), ledger.clone());

    let summary = p.poll_once(&CancellationToken::new()).await;

    assert_eq!(summary.failed, 1);
    assert!(runner.calls().is_empty());
    let entry = ledger.lookup("calendar_event:ev-1").await.unwrap().unwrap();
    assert_eq!(entry.last_status, OutcomeStatus::Failure);
    let comments = source.comments();
    assert!(comments[0].1.contains("Error: unrecognized task"));
}

#[tokio::test]
async fn failed_install_posts_failure_report() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(
        SourceKind::Ticket,
        vec![record(SourceKind::Ticket, "OPS-2", INSTALL_EXPRESS)],
    ));
    let runner = Arc::new(FakeRunner::new(FakeRun::exit(1, "npm ERR! 404")));
    let ledger = Arc::new(MemoryLedger::new());
    let mut p = poller(&root, vec![source.clone()], runner.clone(), ledger.clone());

    let summary = p.poll_once(&CancellationToken::new()).await;

    assert_eq!(summary.failed, 1);
    let comments = source.comments();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].0, "OPS-2");
    assert!(comments[0].1.contains("Status: ❌ Failed"));
    assert!(comments[0].1.contains("Exit code: 1"));
    assert!(comments[0].1.contains("Expected result: express is available."));
    assert!(ledger.has_run("ticket:OPS-2").await.unwrap());
}

#[tokio::test]
async fn panicking_runner_only_fails_its_own_record() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(
        SourceKind::Ticket,
        vec![
            record(SourceKind::Ticket, "OPS-3", RUN_BUILD),
            record(SourceKind::Ticket, "OPS-4", RUN_BUILD),
        ],
    ));
    let runner = Arc::new(FakeRunner::succeeding().then(FakeRun::Panic));
    let ledger = Arc::new(MemoryLedger::new());
    let mut p = poller(&root, vec![source.clone()], runner.clone(), ledger.clone());

    let summary = p.poll_once(&CancellationToken::new()).await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(runner.calls().len(), 2);
    let comments = source.comments();
    assert!(comments[0].1.contains("dispatch aborted"));
    assert!(comments[1].1.contains("✅"));
    assert!(ledger.has_run("ticket:OPS-3").await.unwrap());
    assert!(ledger.has_run("ticket:OPS-4").await.unwrap());
}

#[tokio::test]
async fn failing_source_does_not_block_other_sources() {
    let root = TempDir::new().unwrap();
    let broken = Arc::new(FakeSource::failing(SourceKind::Ticket));
    let calendar = Arc::new(FakeSource::new(
        SourceKind::CalendarEvent,
        vec![record(SourceKind::CalendarEvent, "ev-2", RUN_BUILD)],
    ));
    let runner = Arc::new(FakeRunner::succeeding());
    let mut p = poller(
        &root,
        vec![broken.clone(), calendar.clone()],
        runner.clone(),
        Arc::new(MemoryLedger::new()),
    );

    let summary = p.poll_once(&CancellationToken::new()).await;

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.succeeded, 1);
    assert!(broken.last_window_start().is_some());
    assert_eq!(calendar.comments().len(), 1);
}

#[tokio::test]
async fn same_id_from_different_sources_runs_for_each() {
    let root = TempDir::new().unwrap();
    let tickets = Arc::new(FakeSource::new(
        SourceKind::Ticket,
        vec![record(SourceKind::Ticket, "42", RUN_BUILD)],
    ));
    let calendar = Arc::new(FakeSource::new(
        SourceKind::CalendarEvent,
        vec![record(SourceKind::CalendarEvent, "42", RUN_BUILD)],
    ));
    let runner = Arc::new(FakeRunner::succeeding());
    let mut p = poller(
        &root,
        vec![tickets.clone(), calendar.clone()],
        runner.clone(),
        Arc::new(MemoryLedger::new()),
    );

    let summary = p.poll_once(&CancellationToken::new()).await;

    assert_eq!(summary.succeeded, 2);
    assert_eq!(tickets.comments().len(), 1);
    assert_eq!(calendar.comments().len(), 1);
}

#[tokio::test]
async fn retry_policy_retries_failures_up_to_cap() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(
        SourceKind::Ticket,
        vec![record(SourceKind::Ticket, "OPS-5", RUN_BUILD)],
    ));
    let runner = Arc::new(FakeRunner::new(FakeRun::exit(2, "boom")));
    let ledger = Arc::new(MemoryLedger::new());
    let mut p = poller(&root, vec![source.clone()], runner.clone(), ledger.clone())
        .with_policy(RetryPolicy::RetryFailed { max_attempts: 2 });
    let cancel = CancellationToken::new();

    for _ in 0..3 {
        p.poll_once(&cancel).await;
    }

    assert_eq!(runner.calls().len(), 2);
    assert_eq!(
        ledger.lookup("ticket:OPS-5").await.unwrap().unwrap().attempts,
        2
    );
}

#[tokio::test]
async fn cancelled_poll_processes_nothing() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(
        SourceKind::Ticket,
        vec![record(SourceKind::Ticket, "OPS-6", RUN_BUILD)],
    ));
    let runner = Arc::new(FakeRunner::succeeding());
    let ledger = Arc::new(MemoryLedger::new());
    let mut p = poller(&root, vec![source.clone()], runner.clone(), ledger.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = p.poll_once(&cancel).await;

    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.succeeded + summary.failed + summary.skipped, 0);
    assert!(runner.calls().is_empty());
    assert!(!ledger.has_run("ticket:OPS-6").await.unwrap());
    assert_eq!(p.state(), PollerState::Stopped);
}

/// Cancels the shared token from inside the first run.
struct CancellingRunner {
    cancel: CancellationToken,
}

#[async_trait]
impl ProcessRunner for CancellingRunner {
    async fn run(&self, _invocation: &Invocation) -> Result<ProcessOutput> {
        self.cancel.cancel();
        Ok(ProcessOutput {
            exit_code: Some(0),
            ..ProcessOutput::default()
        })
    }
}

#[tokio::test]
async fn in_flight_record_completes_after_cancellation() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(
        SourceKind::Ticket,
        vec![
            record(SourceKind::Ticket, "OPS-7", RUN_BUILD),
            record(SourceKind::Ticket, "OPS-8", RUN_BUILD),
        ],
    ));
    let cancel = CancellationToken::new();
    let runner = Arc::new(CancellingRunner {
        cancel: cancel.clone(),
    });
    let ledger = Arc::new(MemoryLedger::new());
    let mut p = poller(&root, vec![source.clone()], runner, ledger.clone());

    let summary = p.poll_once(&cancel).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(source.comments().len(), 1);
    assert!(ledger.has_run("ticket:OPS-7").await.unwrap());
    assert!(!ledger.has_run("ticket:OPS-8").await.unwrap());
}

#[tokio::test]
async fn continuous_mode_polls_immediately_and_stops_on_cancel() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(
        SourceKind::Ticket,
        vec![record(SourceKind::Ticket, "OPS-9", RUN_BUILD)],
    ));
    let runner = Arc::new(FakeRunner::succeeding());
    let mut p = poller(
        &root,
        vec![source.clone()],
        runner.clone(),
        Arc::new(MemoryLedger::new()),
    )
    .with_interval(Duration::from_secs(3600));
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let cycles = p.run_continuous(cancel).await;
            (cycles, p.state())
        }
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while source.comments().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("first cycle should run without waiting for the interval");
    cancel.cancel();

    let (cycles, state) = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop should stop promptly")
        .unwrap();
    assert_eq!(cycles, 1);
    assert_eq!(state, PollerState::Stopped);
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn discover_parses_without_executing() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(
        SourceKind::Ticket,
        vec![
            record(SourceKind::Ticket, "OPS-10", INSTALL_EXPRESS),
            record(SourceKind::Ticket, "OPS-11", "just a note"),
        ],
    ));
    let runner = Arc::new(FakeRunner::succeeding());
    let ledger = Arc::new(MemoryLedger::new());
    let mut p = poller(&root, vec![source.clone()], runner.clone(), ledger.clone());

    let found = p.discover().await;
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].kind, TaskKind::InstallPackage);
    assert_eq!(found[0].summary, "Package: express (npm)");
    assert_eq!(found[1].kind, TaskKind::Unknown);
    assert!(found.iter().all(|f| !f.already_run));
    assert!(runner.calls().is_empty());
    assert!(source.comments().is_empty());

    p.poll_once(&CancellationToken::new()).await;
    let found = p.discover().await;
    assert!(found.iter().all(|f| f.already_run));
}

#[tokio::test]
async fn records_returned_later_are_picked_up() {
    let root = TempDir::new().unwrap();
    let source = Arc::new(FakeSource::new(SourceKind::Ticket, vec![]));
    let runner = Arc::new(FakeRunner::succeeding());
    let mut p = poller(
        &root,
        vec![source.clone()],
        runner.clone(),
        Arc::new(MemoryLedger::new()),
    );
    let cancel = CancellationToken::new();

    assert_eq!(p.poll_once(&cancel).await.discovered, 0);
    source.set_records(vec![record(SourceKind::Ticket, "OPS-12", RUN_BUILD)]);
    assert_eq!(p.poll_once(&cancel).await.succeeded, 1);
}
