mod markers;
mod rules;

pub use markers::{AgentMarkers, DEFAULT_AGENT_NAMES, MarkerMatch};

use tracing::debug;

use crate::core::task::{Task, TaskAction, TaskKind};
use crate::core::types::Record;
use rules::{
    CLASS_RULES, COMMAND_RULES, CONTENT_RULES, DEV_DEPENDENCY, DIRECTORY_RULES, EXPECTED_RESULT,
    FILENAME_RULES, GLOBALLY, MANAGER_RULES, NODE_MANAGERS, OPTION_FLAG, PACKAGE_RULES, SPAN_END,
    WORKING_DIRECTORY_RULES, first_match,
};

const DEFAULT_PACKAGE_MANAGER: &str = "npm";

/// Turns free-text instruction blocks into typed tasks.
///
/// Parsing is total: any input yields a well-formed `Task`, falling back to
/// `TaskAction::Unknown` whenever a kind-specific field cannot be extracted.
#[derive(Debug, Clone, Default)]
pub struct TaskParser {
    markers: AgentMarkers,
}

impl TaskParser {
    pub fn new(markers: AgentMarkers) -> Self {
        Self { markers }
    }

    pub fn parse(&self, body: &str) -> Task {
        let expected_result = extract_expected_result(body);
        let Some(marker) = self.markers.find(body) else {
            return Task {
                agent_label: None,
                expected_result,
                action: TaskAction::Unknown {
                    raw_text: body.to_string(),
                },
            };
        };
        let span = instruction_span(&body[marker.end..]);
        Task {
            agent_label: Some(marker.label),
            expected_result,
            action: parse_action(span),
        }
    }

    /// Like `parse`, but a bracketed marker in the title addresses a body
    /// that carries no marker of its own.
    pub fn parse_record(&self, record: &Record) -> Task {
        let body = record.body_text();
        if self.markers.find(body).is_some() {
            return self.parse(body);
        }
        match self.markers.find(&record.title) {
            Some(marker) => {
                let mut task = self.parse(&format!("{}: {}", marker.label, body));
                if let TaskAction::Unknown { raw_text } = &mut task.action
                    && raw_text.trim().is_empty()
                {
                    *raw_text = record.title.clone();
                }
                task
            }
            None => self.parse(body),
        }
    }
}

/// Text between the marker and the first results label.
fn instruction_span(after_marker: &str) -> &str {
    match SPAN_END.find(after_marker) {
        Some(m) => &after_marker[..m.start()],
        None => after_marker,
    }
}

fn extract_expected_result(body: &str) -> Option<String> {
    EXPECTED_RESULT
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn classify(span: &str) -> TaskKind {
    CLASS_RULES
        .iter()
        .find(|rule| rule.matches(span))
        .map(|rule| rule.kind)
        .unwrap_or(TaskKind::Unknown)
}

fn parse_action(span: &str) -> TaskAction {
    let kind = classify(span);
    let action = match kind {
        TaskKind::CreateFile => extract_create_file(span),
        TaskKind::InstallPackage => extract_install_package(span),
        TaskKind::RunCommand => extract_run_command(span),
        TaskKind::Unknown => None,
    };
    match action {
        Some(action) => action,
        None => {
            if kind != TaskKind::Unknown {
                debug!(kind = %kind, "required field missing, downgrading to unknown");
            }
            TaskAction::Unknown {
                raw_text: span.trim().to_string(),
            }
        }
    }
}

fn extract_create_file(span: &str) -> Option<TaskAction> {
    let file = first_match(&FILENAME_RULES, span, &|_| false)?;
    let (inline_dir, filename) = match file.value.rsplit_once('/') {
        Some((dir, name)) => (dir.to_string(), name.to_string()),
        None => (String::new(), file.value.clone()),
    };
    let explicit_dir = first_match(&DIRECTORY_RULES, span, &|v| v.ends_with(&filename))
        .map(|m| m.value)
        .unwrap_or_default();
    let directory = join_directories(explicit_dir, inline_dir);

    let full_name = file.value.as_str();
    let content = first_match(&CONTENT_RULES, span, &|v| v.contains(full_name))?;
    debug!(
        filename_rule = file.rule,
        content_rule = content.rule,
        "parsed create_file"
    );

    Some(TaskAction::CreateFile {
        filename,
        directory,
        content: content.value,
    })
}

fn ends_with_dir(path: &str, suffix: &str) -> bool {
    path == suffix || path.ends_with(&format!("/{}", suffix))
}

/// Combine "in the <dir> folder" with a path prefix on the filename. When
/// one already ends with the other, the longer one is used alone.
fn join_directories(explicit: String, inline: String) -> String {
    if explicit.is_empty() || ends_with_dir(&inline, &explicit) {
        inline
    } else if inline.is_empty() || ends_with_dir(&explicit, &inline) {
        explicit
    } else {
        format!("{}/{}", explicit, inline)
    }
}

fn extract_install_package(span: &str) -> Option<TaskAction> {
    let package = first_match(&PACKAGE_RULES, span, &|_| false)?;
    let package_manager = first_match(&MANAGER_RULES, span, &|_| false)
        .map(|m| m.value)
        .unwrap_or_else(|| DEFAULT_PACKAGE_MANAGER.to_string());

    let mut options: Vec<String> = OPTION_FLAG
        .captures_iter(span)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches(['.', ',']).to_string())
        .collect();
    if NODE_MANAGERS.contains(&package_manager.as_str()) {
        if DEV_DEPENDENCY.is_match(span) && !options.iter().any(|o| o == "--save-dev" || o == "-D")
        {
            options.push("--save-dev".to_string());
        }
        if GLOBALLY.is_match(span) && !options.iter().any(|o| o == "-g" || o == "--global") {
            options.push("-g".to_string());
        }
    }
    options.dedup();
    debug!(package_rule = package.rule, "parsed install_package");

    Some(TaskAction::InstallPackage {
        package_name: package.value,
        package_manager,
        options,
    })
}

fn extract_run_command(span: &str) -> Option<TaskAction> {
    let command = first_match(&COMMAND_RULES, span, &|_| false)?;
    let working_directory = first_match(&WORKING_DIRECTORY_RULES, span, &|_| false)
        .map(|m| m.value)
        .filter(|d| !d.is_empty());
    debug!(command_rule = command.rule, "parsed run_command");

    Some(TaskAction::RunCommand {
        command: command.value,
        working_directory,
    })
}
