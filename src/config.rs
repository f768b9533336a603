use anyhow::{Context, Result, anyhow, bail};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

use crate::core::dispatcher::{DEFAULT_COMMAND_TIMEOUT, DEFAULT_EXCERPT_CHARS};
use crate::core::ledger::RetryPolicy;
use crate::core::parser::DEFAULT_AGENT_NAMES;
use crate::core::poller::DEFAULT_POLL_INTERVAL;
use crate::core::types::WindowConfig;
use crate::sources::calendar::DEFAULT_CALENDAR_URL;
use crate::sources::{CalendarConfig, JiraConfig};

/// Runtime settings, read from `DUETASK_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub root: PathBuf,
    pub poll_interval: Duration,
    pub command_timeout: Duration,
    pub excerpt_chars: usize,
    pub agent_markers: Vec<String>,
    pub retry_policy: RetryPolicy,
    pub allow_overwrite: bool,
    pub ledger_path: Option<PathBuf>,
    pub log_level: Level,
    pub log_file: Option<PathBuf>,
    pub jira: Option<JiraConfig>,
    pub calendar: Option<CalendarConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse settings from any key lookup. Fails on malformed values; use
    /// [`Config::validate`] for the checks that depend on flags too.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let root = match get("DUETASK_ROOT") {
            Some(root) => PathBuf::from(root),
            None => std::env::current_dir().context("cannot determine current directory")?,
        };

        let agent_markers: Vec<String> = get("DUETASK_AGENT_MARKERS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .filter(|names: &Vec<String>| !names.is_empty())
            .unwrap_or_else(|| DEFAULT_AGENT_NAMES.iter().map(|s| s.to_string()).collect());

        let log_level = match get("DUETASK_LOG") {
            Some(level) => Level::from_str(&level)
                .map_err(|_| anyhow!("DUETASK_LOG must be one of error, warn, info, debug, trace; got '{}'", level))?,
            None => Level::INFO,
        };

        let jira = match get("DUETASK_JIRA_URL") {
            Some(base_url) => {
                let (Some(email), Some(api_token)) =
                    (get("DUETASK_JIRA_EMAIL"), get("DUETASK_JIRA_TOKEN"))
                else {
                    bail!("DUETASK_JIRA_URL is set but DUETASK_JIRA_EMAIL or DUETASK_JIRA_TOKEN is missing");
                };
                Some(JiraConfig {
                    base_url,
                    email,
                    api_token,
                    extra_jql: get("DUETASK_JIRA_JQL"),
                    window: WindowConfig::from_minutes(
                        number(&get, "DUETASK_JIRA_GRACE_MINS", 60)?,
                        number(&get, "DUETASK_JIRA_LOOKAHEAD_MINS", 1440)?,
                    ),
                })
            }
            None => None,
        };

        let calendar = match get("DUETASK_CALENDAR_TOKEN") {
            Some(access_token) => Some(CalendarConfig {
                base_url: get("DUETASK_CALENDAR_URL")
                    .unwrap_or_else(|| DEFAULT_CALENDAR_URL.to_string()),
                calendar_id: get("DUETASK_CALENDAR_ID").unwrap_or_else(|| "primary".to_string()),
                access_token,
                window: WindowConfig::from_minutes(
                    number(&get, "DUETASK_CALENDAR_GRACE_MINS", 5)?,
                    number(&get, "DUETASK_CALENDAR_LOOKAHEAD_MINS", 15)?,
                ),
            }),
            None => None,
        };

        Ok(Self {
            root,
            poll_interval: Duration::from_secs(number(
                &get,
                "DUETASK_POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL.as_secs(),
            )?),
            command_timeout: Duration::from_secs(number(
                &get,
                "DUETASK_COMMAND_TIMEOUT_SECS",
                DEFAULT_COMMAND_TIMEOUT.as_secs(),
            )?),
            excerpt_chars: number(&get, "DUETASK_EXCERPT_CHARS", DEFAULT_EXCERPT_CHARS)?,
            agent_markers,
            retry_policy: RetryPolicy::from_max_attempts(number(&get, "DUETASK_RETRY_FAILED", 0)?),
            allow_overwrite: flag(&get, "DUETASK_ALLOW_OVERWRITE")?,
            ledger_path: get("DUETASK_LEDGER_PATH").map(PathBuf::from),
            log_level,
            log_file: get("DUETASK_LOG_FILE").map(PathBuf::from),
            jira,
            calendar,
        })
    }

    /// Startup checks that must pass before polling begins.
    pub fn validate(&self) -> Result<()> {
        if self.jira.is_none() && self.calendar.is_none() {
            bail!("no source configured: set DUETASK_JIRA_URL or DUETASK_CALENDAR_TOKEN");
        }
        if !self.root.is_dir() {
            bail!("root directory {} does not exist", self.root.display());
        }
        if self.poll_interval.is_zero() {
            bail!("poll interval must be at least one second");
        }
        if self.command_timeout.is_zero() {
            bail!("DUETASK_COMMAND_TIMEOUT_SECS must be at least 1");
        }
        Ok(())
    }
}

fn number<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| anyhow!("{} must be a non-negative number, got '{}'", key, raw)),
        None => Ok(default),
    }
}

fn flag<G>(get: &G, key: &str) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        None | Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some(other) => bail!("{} must be true or false, got '{}'", key, other),
    }
}
