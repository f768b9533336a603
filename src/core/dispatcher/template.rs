use chrono::{DateTime, Utc};

use crate::core::types::SourceKind;

/// Who asked for a file and when; rendered as a footer.
#[derive(Debug, Clone)]
pub struct Provenance<'a> {
    pub record_id: &'a str,
    pub source: SourceKind,
    pub agent_label: Option<&'a str>,
    pub created_at: DateTime<Utc>,
    pub host: &'a str,
}

enum CommentStyle {
    Markdown,
    Line(&'static str),
    Block(&'static str, &'static str),
    Plain,
    /// Formats that cannot carry a comment without breaking.
    Omit,
}

fn comment_style(filename: &str) -> CommentStyle {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "md" | "markdown" => CommentStyle::Markdown,
        "js" | "mjs" | "cjs" | "ts" | "tsx" | "jsx" | "rs" | "go" | "java" | "kt" | "c" | "h"
        | "cpp" | "hpp" | "cs" | "swift" | "scss" | "dart" => CommentStyle::Line("//"),
        "py" | "sh" | "bash" | "zsh" | "rb" | "yml" | "yaml" | "toml" | "ini" | "conf" | "env"
        | "r" | "pl" => CommentStyle::Line("#"),
        "sql" | "lua" => CommentStyle::Line("--"),
        "html" | "htm" | "xml" | "svg" | "vue" => CommentStyle::Block("<!--", "-->"),
        "css" => CommentStyle::Block("/*", "*/"),
        "json" | "lock" | "csv" | "tsv" => CommentStyle::Omit,
        _ => CommentStyle::Plain,
    }
}

fn footer_text(p: &Provenance<'_>) -> String {
    format!(
        "Created by {} for {} {} on {} at {}",
        p.agent_label.unwrap_or("duetask"),
        p.source.as_str(),
        p.record_id,
        p.host,
        p.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// File body: the requested content followed by a provenance footer in the
/// file type's comment syntax.
pub fn render(filename: &str, content: &str, provenance: &Provenance<'_>) -> String {
    let mut body = content.to_string();
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    let footer = footer_text(provenance);
    match comment_style(filename) {
        CommentStyle::Omit => {}
        CommentStyle::Markdown => body.push_str(&format!("\n---\n*{}*\n", footer)),
        CommentStyle::Line(prefix) => body.push_str(&format!("\n{} {}\n", prefix, footer)),
        CommentStyle::Block(open, close) => {
            body.push_str(&format!("\n{} {} {}\n", open, footer, close))
        }
        CommentStyle::Plain => body.push_str(&format!("\n{}\n", footer)),
    }
    body
}
