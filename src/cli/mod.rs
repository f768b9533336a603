mod poll;

use anyhow::{Result, anyhow};
use console::style;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::Config;
use crate::core::terminal::{self, GuideSection, print_error};
use crate::logging;

fn print_help() {
    terminal::print_banner();

    GuideSection::new("Commands")
        .command("poll", "Run a single poll cycle and exit")
        .command("continuous", "Poll on an interval until Ctrl+C")
        .command("list", "Show due records and their parsed tasks without running them")
        .command("test", "Alias for list")
        .command("help", "Show this help")
        .print();

    GuideSection::new("Flags")
        .command("--root <dir>", "Directory files are written to and commands run in")
        .command("--interval <secs>", "Seconds between cycles in continuous mode")
        .print();

    GuideSection::new("Sources")
        .text("Tickets:  DUETASK_JIRA_URL, DUETASK_JIRA_EMAIL, DUETASK_JIRA_TOKEN")
        .text("Calendar: DUETASK_CALENDAR_TOKEN [, DUETASK_CALENDAR_ID]")
        .blank()
        .text("Records are picked up when their title or body addresses an agent,")
        .text("e.g. \"Claude Code: Install the express package using npm.\"")
        .print();

    println!(
        "\n {} {} <command> [flags]\n",
        style("Usage:").bold(),
        style("duetask").green()
    );
}

/// Overrides taken from the command line; they win over the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct CliFlags {
    pub root: Option<PathBuf>,
    pub interval: Option<Duration>,
}

impl CliFlags {
    fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(interval) = self.interval {
            config.poll_interval = interval;
        }
    }
}

pub(crate) fn parse_flags(args: &[String], start: usize) -> Result<CliFlags> {
    let mut flags = CliFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--root" | "-r" => {
                if i + 1 < args.len() {
                    flags.root = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    return Err(anyhow!("--root requires a directory"));
                }
            }
            "--interval" | "-i" => {
                if i + 1 < args.len() {
                    let secs: u64 = args[i + 1].parse().map_err(|_| {
                        anyhow!("--interval expects whole seconds, got '{}'", args[i + 1])
                    })?;
                    flags.interval = Some(Duration::from_secs(secs));
                    i += 2;
                } else {
                    return Err(anyhow!("--interval requires a value"));
                }
            }
            _ => i += 1,
        }
    }
    Ok(flags)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or("help");

    match cmd {
        "poll" | "continuous" | "list" | "test" => {}
        "help" | "--help" | "-h" => {
            print_help();
            return Ok(());
        }
        other => {
            print_error(&format!("Unknown command: {}", other));
            print_help();
            return Ok(());
        }
    }

    let flags = parse_flags(&args, 2)?;
    let mut config = Config::from_env()?;
    flags.apply(&mut config);
    config.validate()?;
    logging::init(config.log_level, config.log_file.as_deref())?;

    match cmd {
        "poll" => poll::run_once(&config).await,
        "continuous" => poll::run_continuous(&config).await,
        _ => poll::run_list(&config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_flags_reads_root_and_interval() {
        let parsed = parse_flags(
            &args(&["duetask", "continuous", "--root", "/srv/work", "--interval", "30"]),
            2,
        )
        .unwrap();
        assert_eq!(parsed.root, Some(PathBuf::from("/srv/work")));
        assert_eq!(parsed.interval, Some(Duration::from_secs(30)));
    }

    #[test]
    fn parse_flags_ignores_unknown_tokens() {
        let parsed = parse_flags(&args(&["duetask", "poll", "--verbose"]), 2).unwrap();
        assert_eq!(parsed, CliFlags::default());
    }

    #[test]
    fn parse_flags_rejects_bad_interval_and_missing_values() {
        assert!(parse_flags(&args(&["duetask", "continuous", "--interval", "soon"]), 2).is_err());
        assert!(parse_flags(&args(&["duetask", "poll", "--root"]), 2).is_err());
    }
}
