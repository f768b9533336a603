use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::core::dispatcher::Dispatcher;
use crate::core::ledger::{MemoryLedger, RunLedger, SqliteLedger};
use crate::core::parser::{AgentMarkers, TaskParser};
use crate::core::poller::{CycleSummary, Poller};
use crate::core::process::NativeProcessRunner;
use crate::core::terminal::{
    GuideSection, print_info, print_status, print_step, print_success, print_warn,
};
use crate::sources::{CalendarSource, JiraSource, SourceAdapter};

fn build_poller(config: &Config) -> Result<Poller> {
    let markers = AgentMarkers::new(&config.agent_markers)?;
    info!(markers = ?markers.names(), "recognized agent markers");

    let mut sources: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    if let Some(jira) = &config.jira {
        sources.push(Arc::new(JiraSource::new(jira.clone(), markers.clone())?));
    }
    if let Some(calendar) = &config.calendar {
        sources.push(Arc::new(CalendarSource::new(
            calendar.clone(),
            markers.clone(),
        )?));
    }

    let root = std::fs::canonicalize(&config.root)
        .with_context(|| format!("cannot resolve root {}", config.root.display()))?;
    let dispatcher = Dispatcher::new(root, Arc::new(NativeProcessRunner))
        .with_command_timeout(config.command_timeout)
        .with_excerpt_limit(config.excerpt_chars)
        .with_overwrite(config.allow_overwrite);

    let ledger: Arc<dyn RunLedger> = match &config.ledger_path {
        Some(path) => {
            info!(path = %path.display(), "using persistent ledger");
            Arc::new(SqliteLedger::open(path)?)
        }
        None => Arc::new(MemoryLedger::new()),
    };

    Ok(Poller::new(
        sources,
        TaskParser::new(markers),
        Arc::new(dispatcher),
        ledger,
    )
    .with_policy(config.retry_policy)
    .with_interval(config.poll_interval))
}

fn print_summary(summary: &CycleSummary) {
    GuideSection::new("Poll cycle")
        .status("Discovered", &summary.discovered.to_string())
        .status("Skipped", &summary.skipped.to_string())
        .status("Succeeded", &summary.succeeded.to_string())
        .status("Failed", &summary.failed.to_string())
        .print();
}

/// Cancel `token` on Ctrl+C, and on SIGTERM where available.
fn cancel_on_shutdown(token: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("shutdown signal received");
        token.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            print_warn(&format!("cannot listen for SIGTERM, Ctrl+C only: {}", e));
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}

pub async fn run_once(config: &Config) -> Result<()> {
    let mut poller = build_poller(config)?;
    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    print_step(&format!("Polling once (root: {})", config.root.display()));
    let summary = poller.poll_once(&cancel).await;
    print_summary(&summary);
    Ok(())
}

pub async fn run_continuous(config: &Config) -> Result<()> {
    let mut poller = build_poller(config)?;
    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    print_step(&format!(
        "Polling every {}s (root: {}). Press Ctrl+C to stop.",
        config.poll_interval.as_secs(),
        config.root.display()
    ));
    let cycles = poller.run_continuous(cancel).await;
    print_success(&format!("Stopped after {} cycle(s).", cycles));
    Ok(())
}

pub async fn run_list(config: &Config) -> Result<()> {
    let poller = build_poller(config)?;
    let found = poller.discover().await;
    if found.is_empty() {
        print_info("No due records address an agent right now.");
        return Ok(());
    }

    print_step(&format!("{} due record(s):", found.len()));
    for item in &found {
        let label = format!("{} {}", item.record.source, item.record.id);
        let seen = if item.already_run { " (already run)" } else { "" };
        print_status(
            &label,
            &format!(
                "{} | {} | due {}{}",
                item.record.title,
                item.summary,
                item.record.due_at.format("%Y-%m-%d %H:%M UTC"),
                seen
            ),
        );
    }
    Ok(())
}
