/// Coarse classification of a parsed instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    CreateFile,
    InstallPackage,
    RunCommand,
    Unknown,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::CreateFile => "create_file",
            TaskKind::InstallPackage => "install_package",
            TaskKind::RunCommand => "run_command",
            TaskKind::Unknown => "unknown",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskKind::CreateFile => "Create file",
            TaskKind::InstallPackage => "Install package",
            TaskKind::RunCommand => "Run command",
            TaskKind::Unknown => "Unrecognized task",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific payload. Each variant carries every field its action needs,
/// so a half-parsed action cannot be constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    CreateFile {
        filename: String,
        /// Relative to the root; empty means the root itself.
        directory: String,
        content: String,
    },
    InstallPackage {
        package_name: String,
        package_manager: String,
        options: Vec<String>,
    },
    RunCommand {
        command: String,
        working_directory: Option<String>,
    },
    Unknown {
        raw_text: String,
    },
}

/// The typed form of one record's instruction block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub agent_label: Option<String>,
    pub expected_result: Option<String>,
    pub action: TaskAction,
}

impl Task {
    pub fn unknown(raw_text: impl Into<String>) -> Self {
        Self {
            agent_label: None,
            expected_result: None,
            action: TaskAction::Unknown {
                raw_text: raw_text.into(),
            },
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self.action {
            TaskAction::CreateFile { .. } => TaskKind::CreateFile,
            TaskAction::InstallPackage { .. } => TaskKind::InstallPackage,
            TaskAction::RunCommand { .. } => TaskKind::RunCommand,
            TaskAction::Unknown { .. } => TaskKind::Unknown,
        }
    }

    /// One-line human summary used in reports and `list` output.
    pub fn summary(&self) -> String {
        match &self.action {
            TaskAction::CreateFile {
                filename,
                directory,
                ..
            } => {
                if directory.is_empty() {
                    format!("File: {}", filename)
                } else {
                    format!("File: {}/{}", directory, filename)
                }
            }
            TaskAction::InstallPackage {
                package_name,
                package_manager,
                options,
            } => {
                if options.is_empty() {
                    format!("Package: {} ({})", package_name, package_manager)
                } else {
                    format!(
                        "Package: {} ({} {})",
                        package_name,
                        package_manager,
                        options.join(" ")
                    )
                }
            }
            TaskAction::RunCommand {
                command,
                working_directory,
            } => match working_directory {
                Some(dir) => format!("Command: {} (in {})", command, dir),
                None => format!("Command: {}", command),
            },
            TaskAction::Unknown { .. } => "No recognizable instruction".to_string(),
        }
    }
}
