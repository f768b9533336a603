use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tracing::{debug, warn};

use crate::platform::{NativePlatform, Platform};

/// What to start: a named executable or an inline shell string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Program {
    Exec { program: String, args: Vec<String> },
    Shell(String),
}

impl Program {
    pub fn display(&self) -> String {
        match self {
            Program::Exec { program, args } if args.is_empty() => program.clone(),
            Program::Exec { program, args } => format!("{} {}", program, args.join(" ")),
            Program::Shell(command) => command.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: Program,
    pub cwd: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the child was killed by a signal or timed out.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Runs child processes with captured output and a hard timeout.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput>;
}

/// Spawns real processes through tokio.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProcessRunner;

#[async_trait]
impl ProcessRunner for NativeProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput> {
        let mut cmd = match &invocation.program {
            Program::Exec { program, args } => {
                let mut cmd = tokio::process::Command::new(program);
                cmd.args(args);
                cmd
            }
            Program::Shell(command) => NativePlatform::shell_inline(command),
        };
        cmd.current_dir(&invocation.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            command = %invocation.program.display(),
            cwd = %invocation.cwd.display(),
            "spawning child process"
        );
        let child = cmd
            .spawn()
            .with_context(|| format!("failed to start `{}`", invocation.program.display()))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        match tokio::time::timeout(invocation.timeout, child.wait_with_output()).await {
            Ok(output) => {
                let output = output.context("failed to collect child output")?;
                Ok(ProcessOutput {
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                    exit_code: output.status.code(),
                    timed_out: false,
                })
            }
            Err(_) => {
                warn!(
                    command = %invocation.program.display(),
                    timeout_secs = invocation.timeout.as_secs(),
                    "child process timed out and was killed"
                );
                Ok(ProcessOutput {
                    timed_out: true,
                    ..ProcessOutput::default()
                })
            }
        }
    }
}
