#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

impl OutcomeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeStatus::Success => "success",
            OutcomeStatus::Failure => "failure",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "success" => Some(OutcomeStatus::Success),
            "failure" => Some(OutcomeStatus::Failure),
            _ => None,
        }
    }
}

/// Result of dispatching one task. `error_message` is set iff the status is
/// `Failure`; the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    status: OutcomeStatus,
    pub stdout_excerpt: String,
    pub stderr_excerpt: String,
    pub exit_code: Option<i32>,
    error_message: Option<String>,
    /// Short description of what was done, e.g. the path written.
    pub detail: Option<String>,
}

impl Outcome {
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            stdout_excerpt: String::new(),
            stderr_excerpt: String::new(),
            exit_code: None,
            error_message: None,
            detail: Some(detail.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            stdout_excerpt: String::new(),
            stderr_excerpt: String::new(),
            exit_code: None,
            error_message: Some(message.into()),
            detail: None,
        }
    }

    pub fn with_output(mut self, stdout: String, stderr: String, exit_code: Option<i32>) -> Self {
        self.stdout_excerpt = stdout;
        self.stderr_excerpt = stderr;
        self.exit_code = exit_code;
        self
    }

    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

const TRUNCATION_MARKER: &str = "…(truncated)\n";

/// Keep the last `limit` chars of process output, which is where errors
/// usually land. Cuts on a char boundary.
pub fn excerpt(text: &str, limit: usize) -> String {
    let text = text.trim_end();
    let total = text.chars().count();
    if total <= limit {
        return text.to_string();
    }
    let skip = total - limit;
    let start = text
        .char_indices()
        .nth(skip)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    format!("{}{}", TRUNCATION_MARKER, &text[start..])
}
