mod paths;
mod template;

use paths::{ensure_within, existing_entry, sanitize_filename, sanitize_relative};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::core::outcome::{Outcome, excerpt};
use crate::core::process::{Invocation, ProcessOutput, ProcessRunner, Program};
use crate::core::task::{Task, TaskAction};
use crate::core::types::Record;
use crate::platform::{NativePlatform, Platform};
use template::Provenance;

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_EXCERPT_CHARS: usize = 1500;

/// Executes typed tasks. Every failure, including filesystem and spawn
/// errors, comes back as a `Failure` outcome rather than an `Err`.
pub struct Dispatcher {
    root: PathBuf,
    runner: Arc<dyn ProcessRunner>,
    command_timeout: Duration,
    excerpt_limit: usize,
    allow_overwrite: bool,
    host: String,
}

impl Dispatcher {
    pub fn new(root: PathBuf, runner: Arc<dyn ProcessRunner>) -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown-host".to_string());
        Self {
            root,
            runner,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            excerpt_limit: DEFAULT_EXCERPT_CHARS,
            allow_overwrite: false,
            host,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_excerpt_limit(mut self, limit: usize) -> Self {
        self.excerpt_limit = limit.max(1);
        self
    }

    pub fn with_overwrite(mut self, allow: bool) -> Self {
        self.allow_overwrite = allow;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn dispatch(&self, record: &Record, task: &Task) -> Outcome {
        let result = match &task.action {
            TaskAction::Unknown { .. } => return Outcome::failure("unrecognized task"),
            TaskAction::CreateFile {
                filename,
                directory,
                content,
            } => {
                self.create_file(record, task, filename, directory, content)
                    .await
            }
            TaskAction::InstallPackage {
                package_name,
                package_manager,
                options,
            } => {
                self.install_package(package_name, package_manager, options)
                    .await
            }
            TaskAction::RunCommand {
                command,
                working_directory,
            } => self.run_command(command, working_directory.as_deref()).await,
        };

        result.unwrap_or_else(|e| {
            warn!(record_id = %record.id, kind = %task.kind(), "dispatch failed: {:#}", e);
            Outcome::failure(format!("{:#}", e))
        })
    }

    async fn create_file(
        &self,
        record: &Record,
        task: &Task,
        filename: &str,
        directory: &str,
        content: &str,
    ) -> Result<Outcome> {
        let relative_dir = sanitize_relative(directory)?;
        let filename = sanitize_filename(filename)?;
        let dir = self.root.join(&relative_dir);

        ensure_within(&self.root, &dir)?;
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create directory {}", dir.display()))?;
        ensure_within(&self.root, &dir)?;

        let path = dir.join(&filename);
        let shown = relative_dir.join(&filename);
        if existing_entry(&path)? && !self.allow_overwrite {
            bail!("{} already exists", shown.display());
        }

        let body = template::render(
            &filename,
            content,
            &Provenance {
                record_id: &record.id,
                source: record.source,
                agent_label: task.agent_label.as_deref(),
                created_at: Utc::now(),
                host: &self.host,
            },
        );
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true);
        if self.allow_overwrite {
            options.create(true).truncate(true);
        } else {
            // Fails on anything that appeared since the check, symlinks included.
            options.create_new(true);
        }
        let mut file = options.open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                anyhow::anyhow!("{} already exists", shown.display())
            } else {
                anyhow::Error::new(e).context(format!("failed to open {}", path.display()))
            }
        })?;
        file.write_all(body.as_bytes())
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;

        info!(path = %shown.display(), bytes = body.len(), "file created");
        Ok(Outcome::success(format!(
            "Wrote {} ({} bytes)",
            shown.display(),
            body.len()
        )))
    }

    async fn install_package(
        &self,
        package_name: &str,
        package_manager: &str,
        options: &[String],
    ) -> Result<Outcome> {
        if package_name.starts_with('-') {
            bail!("refusing package name that looks like a flag: {}", package_name);
        }
        let mut args = vec!["install".to_string(), package_name.to_string()];
        args.extend(options.iter().cloned());
        let invocation = Invocation {
            program: Program::Exec {
                program: NativePlatform::package_manager_program(package_manager),
                args,
            },
            cwd: self.root.clone(),
            timeout: self.command_timeout,
        };
        let output = self.runner.run(&invocation).await?;
        Ok(self.process_outcome(&invocation, output))
    }

    async fn run_command(&self, command: &str, working_directory: Option<&str>) -> Result<Outcome> {
        let cwd = match working_directory {
            Some(dir) => self.root.join(sanitize_relative(dir)?),
            None => self.root.clone(),
        };
        let is_dir = tokio::fs::metadata(&cwd)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            bail!("working directory {} not found", cwd.display());
        }
        ensure_within(&self.root, &cwd)?;

        let invocation = Invocation {
            program: Program::Shell(command.to_string()),
            cwd,
            timeout: self.command_timeout,
        };
        let output = self.runner.run(&invocation).await?;
        Ok(self.process_outcome(&invocation, output))
    }

    fn process_outcome(&self, invocation: &Invocation, output: ProcessOutput) -> Outcome {
        let shown = invocation.program.display();
        let stdout = excerpt(&output.stdout, self.excerpt_limit);
        let stderr = excerpt(&output.stderr, self.excerpt_limit);

        let outcome = if output.timed_out {
            Outcome::failure(format!(
                "`{}` timed out after {}s",
                shown,
                invocation.timeout.as_secs()
            ))
        } else if output.success() {
            Outcome::success(format!("`{}` exited with code 0", shown))
        } else {
            match output.exit_code {
                Some(code) => Outcome::failure(format!("`{}` exited with code {}", shown, code)),
                None => Outcome::failure(format!("`{}` was terminated by a signal", shown)),
            }
        };
        outcome.with_output(stdout, stderr, output.exit_code)
    }
}
