//! Rule tables for the instruction parser.
//!
//! Each field has an ordered list of named rules. A rule is a pattern plus an
//! acceptance check on the captured text; the first accepted capture wins.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::core::task::TaskKind;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static parser pattern compiles")
}

/// Extension-bearing token such as `notes.md` or `src/app.ts`.
const FILE_TOKEN: &str = r"(?:[\w.-]+/)*[\w-][\w.-]*\.[A-Za-z][A-Za-z0-9]{0,7}";

pub(crate) const PACKAGE_MANAGERS: &[&str] = &[
    "npm", "yarn", "pnpm", "bun", "pip3", "pip", "cargo", "gem", "composer", "brew",
];

/// Managers that understand `--save-dev` and `-g`.
pub(crate) const NODE_MANAGERS: &[&str] = &["npm", "yarn", "pnpm", "bun"];

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "and", "or", "to", "in", "into", "with", "using", "via", "from", "for",
    "of", "on", "it", "this", "that", "named", "called", "package", "packages", "library",
    "module", "dependency", "dependencies", "manager", "file", "folder", "directory", "dir",
    "working", "current", "same",
];

pub(crate) fn is_stopword(word: &str) -> bool {
    STOPWORDS.iter().any(|s| s.eq_ignore_ascii_case(word))
}

fn is_manager(word: &str) -> bool {
    PACKAGE_MANAGERS.iter().any(|m| m.eq_ignore_ascii_case(word))
}

pub(crate) struct ClassRule {
    pub kind: TaskKind,
    pub verb: Regex,
    pub requires: Option<Regex>,
}

impl ClassRule {
    pub fn matches(&self, span: &str) -> bool {
        self.verb.is_match(span) && self.requires.as_ref().is_none_or(|r| r.is_match(span))
    }
}

/// Classification precedence: create-file, install-package, run-command.
pub(crate) static CLASS_RULES: LazyLock<Vec<ClassRule>> = LazyLock::new(|| {
    vec![
        ClassRule {
            kind: TaskKind::CreateFile,
            verb: re(r"(?i)\b(?:create|write|make|generate|touch|save)\b"),
            requires: Some(re(&format!(r"\b{}\b", FILE_TOKEN))),
        },
        ClassRule {
            kind: TaskKind::InstallPackage,
            verb: re(r"(?i)\b(?:install|add)\b"),
            requires: Some(re(
                r"(?i)\b(?:npm|yarn|pnpm|bun|pip3?|cargo|gem|composer|brew|packages?|library|module|dependency|crate)\b",
            )),
        },
        ClassRule {
            kind: TaskKind::RunCommand,
            verb: re(r"(?i)\b(?:run|execute|exec)\b"),
            requires: None,
        },
    ]
});

pub(crate) struct FieldRule {
    pub name: &'static str,
    pub pattern: Regex,
    pub accept: fn(&str) -> bool,
    pub map: fn(&str) -> String,
}

impl FieldRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: re(pattern),
            accept: |v| !v.is_empty(),
            map: |v| v.to_string(),
        }
    }

    fn accept(mut self, accept: fn(&str) -> bool) -> Self {
        self.accept = accept;
        self
    }

    fn map(mut self, map: fn(&str) -> String) -> Self {
        self.map = map;
        self
    }
}

/// A field value together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FieldMatch {
    pub rule: &'static str,
    pub value: String,
}

fn first_group<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.iter().skip(1).flatten().next().map(|m| m.as_str())
}

/// Run `rules` in order over `text`; the first accepted capture wins.
/// `reject` filters out captures that are valid in isolation but wrong in
/// context (e.g. content that is really the filename sentence).
pub(crate) fn first_match(
    rules: &[FieldRule],
    text: &str,
    reject: &dyn Fn(&str) -> bool,
) -> Option<FieldMatch> {
    for rule in rules {
        for caps in rule.pattern.captures_iter(text) {
            let Some(raw) = first_group(&caps) else {
                continue;
            };
            let value = (rule.map)(raw);
            if (rule.accept)(&value) && !reject(&value) {
                return Some(FieldMatch {
                    rule: rule.name,
                    value,
                });
            }
        }
    }
    None
}

fn trim_token(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim_end_matches(['.', ',', ';', ':', '/'])
        .to_string()
}

fn plain_word(value: &str) -> bool {
    !value.is_empty() && !is_stopword(value)
}

fn directory_value(value: &str) -> String {
    let value = trim_token(value).replace('\\', "/");
    if value.eq_ignore_ascii_case("root") || value == "." {
        String::new()
    } else {
        value
    }
}

fn directory_ok(value: &str) -> bool {
    // Empty is the root itself, which is a legitimate answer.
    value.is_empty() || !is_stopword(value)
}

pub(crate) static FILENAME_RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    vec![
        FieldRule::new("quoted_filename", &format!(r#"["'`]({})["'`]"#, FILE_TOKEN)),
        FieldRule::new(
            "named_filename",
            &format!(r"(?i)\b(?:file|named|called)\s+({})\b", FILE_TOKEN),
        ),
        FieldRule::new("bare_filename", &format!(r"\b({})\b", FILE_TOKEN)),
    ]
});

pub(crate) static DIRECTORY_RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    vec![
        FieldRule::new(
            "in_named_folder",
            r#"(?i)\b(?:in|into|under|inside|within)\s+(?:the\s+)?["'`]?([\w./\\-]+?)["'`]?\s+(?:folder|directory|dir)\b"#,
        )
        .map(directory_value)
        .accept(directory_ok),
        FieldRule::new(
            "folder_named",
            r#"(?i)\b(?:folder|directory|dir)\s+(?:named\s+|called\s+)?["'`]?([\w./\\-]+)"#,
        )
        .map(directory_value)
        .accept(directory_ok),
        FieldRule::new(
            "in_path",
            r#"(?i)\b(?:in|into|under|inside)\s+["'`]?(/?(?:[\w.-]+/)+[\w.-]*)"#,
        )
        .map(directory_value)
        .accept(directory_ok),
    ]
});

pub(crate) static CONTENT_RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    vec![
        FieldRule::new("code_block", r"```[\w+-]*\n([\s\S]*?)```").map(|v| v.to_string()),
        FieldRule::new(
            "quoted_content",
            r#"(?is)\b(?:with\s+(?:the\s+)?(?:content|text)|containing|contents?|text)\s*:?\s*(?:"([^"]*)"|'([^']*)')"#,
        )
        .map(|v| v.to_string())
        .accept(|_| true),
        FieldRule::new(
            "labeled_content",
            r"(?is)\b(?:with\s+(?:the\s+)?(?:content|text)|containing|contents?)\s*:\s*(.+)",
        )
        .map(|v| v.trim().to_string()),
        FieldRule::new(
            "with_content",
            r"(?is)\b(?:with\s+(?:the\s+)?(?:content|text)|containing)\s+(.+)",
        )
        .map(|v| v.trim().to_string()),
        FieldRule::new("write_clause", r"(?is)\b(?:write|add|put)\s+(.+)")
            .map(|v| v.trim().to_string())
            .accept(|v| {
                let lower = v.to_ascii_lowercase();
                !v.is_empty()
                    && !["to ", "in ", "into ", "a file", "the file", "file "]
                        .iter()
                        .any(|p| lower.starts_with(p))
            }),
        FieldRule::new("empty_file", r"(?i)\b(empty|blank)\b")
            .map(|_| String::new())
            .accept(|_| true),
    ]
});

pub(crate) static PACKAGE_RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    let package_ok: fn(&str) -> bool =
        |v| plain_word(v) && !is_manager(v) && !v.starts_with('-');
    vec![
        FieldRule::new(
            "named_package",
            r#"(?i)\b(?:install|add)\s+(?:the\s+)?["'`]?(@?[\w./-]+(?:@[\w.^~-]+)?)["'`]?\s+(?:package|library|module|dependency|gem|crate)\b"#,
        )
        .map(trim_token)
        .accept(package_ok),
        FieldRule::new(
            "package_keyword",
            r#"(?i)\b(?:package|library|module|dependency|crate)\s+(?:named\s+|called\s+)?["'`]?(@?[\w./-]+)"#,
        )
        .map(trim_token)
        .accept(package_ok),
        FieldRule::new(
            "install_target",
            r#"(?i)\b(?:install|add)\s+(?:the\s+)?["'`]?(@?[\w./-]+(?:@[\w.^~-]+)?)"#,
        )
        .map(trim_token)
        .accept(package_ok),
    ]
});

pub(crate) static MANAGER_RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    vec![
        FieldRule::new(
            "named_manager",
            r"(?i)\b(npm|yarn|pnpm|bun|pip3|pip|cargo|gem|composer|brew)\b",
        )
        .map(|v| v.to_ascii_lowercase()),
    ]
});

pub(crate) static OPTION_FLAG: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?:^|\s)(--?[A-Za-z][\w=.@-]*)"));
pub(crate) static DEV_DEPENDENCY: LazyLock<Regex> =
    LazyLock::new(|| re(r"(?i)\bdev(?:elopment)?[\s-]+dependenc(?:y|ies)\b"));
pub(crate) static GLOBALLY: LazyLock<Regex> = LazyLock::new(|| re(r"(?i)\bglobal(?:ly)?\b"));

/// Trailing "in the <dir> folder" clause on a command sentence.
static DIRECTORY_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    re(r#"(?i)\s+(?:in|from|inside|within)\s+(?:the\s+)?["'`]?[\w./\\-]+["'`]?\s+(?:folder|directory|dir)\s*$"#)
});

fn command_sentence(value: &str) -> String {
    let sentence = match value.find(". ") {
        Some(idx) => &value[..idx],
        None => value,
    };
    let sentence = sentence.trim().trim_end_matches('.').trim();
    DIRECTORY_TAIL.replace(sentence, "").trim().to_string()
}

/// Rejects a command that opens a backtick or quote it never closes.
fn balanced_quotes(value: &str) -> bool {
    let even = |c: char| value.chars().filter(|&x| x == c).count() % 2 == 0;
    let single_ok = !value.starts_with('\'') || value[1..].contains('\'');
    !value.is_empty() && even('`') && even('"') && single_ok
}

pub(crate) static COMMAND_RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    vec![
        FieldRule::new("backtick_command", r"`([^`\n]+)`").map(|v| v.trim().to_string()),
        FieldRule::new(
            "quoted_command",
            r#"(?i)\b(?:run|execute|exec)\s+(?:the\s+)?(?:command\s+|script\s+)?(?:"([^"\n]+)"|'([^'\n]+)')"#,
        )
        .map(|v| v.trim().to_string()),
        FieldRule::new("labeled_command", r"(?i)\b(?:command|cmd)\s*:\s*([^\n]+)")
            .map(command_sentence)
            .accept(balanced_quotes),
        FieldRule::new(
            "verb_sentence",
            r"(?i)\b(?:run|execute|exec)\s+(?:the\s+)?(?:shell\s+)?(?:command\s+)?([^\n]+)",
        )
        .map(command_sentence)
        .accept(balanced_quotes),
    ]
});

pub(crate) static WORKING_DIRECTORY_RULES: LazyLock<Vec<FieldRule>> = LazyLock::new(|| {
    vec![
        FieldRule::new(
            "in_named_folder",
            r#"(?i)\b(?:in|from|inside|within)\s+(?:the\s+)?["'`]?([\w./\\-]+?)["'`]?\s+(?:folder|directory|dir)\b"#,
        )
        .map(directory_value)
        .accept(directory_ok),
        FieldRule::new(
            "cwd_label",
            r#"(?i)\b(?:cwd|working\s+directory)\s*[:=]\s*["'`]?([\w./\\-]+)"#,
        )
        .map(directory_value)
        .accept(directory_ok),
    ]
});

pub(crate) static EXPECTED_RESULT: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?ims)^[ \t]*(?:expected\s+results?|success\s+criteria|results?)[ \t]*:\s*(.+?)(?:\n\s*\n|\z)")
});

pub(crate) static SPAN_END: LazyLock<Regex> = LazyLock::new(|| {
    re(r"(?im)^[ \t]*(?:expected\s+results?|success\s+criteria|results?)[ \t]*:")
});
