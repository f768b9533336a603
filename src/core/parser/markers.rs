use anyhow::{Result, bail};
use regex::Regex;

pub const DEFAULT_AGENT_NAMES: &[&str] = &[
    "Claude Code",
    "Claude",
    "Gemini CLI",
    "Gemini",
    "Codex",
    "Copilot",
];

/// Where an agent marker was found in a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerMatch {
    /// The configured spelling of the agent name.
    pub label: String,
    pub start: usize,
    pub end: usize,
}

/// Recognizes "addressed-to-an-agent" markers: `Name:` or `[Name]`.
#[derive(Debug, Clone)]
pub struct AgentMarkers {
    names: Vec<String>,
    pattern: Regex,
}

impl AgentMarkers {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names: Vec<String> = names
            .into_iter()
            .map(|n| n.as_ref().trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();
        if names.is_empty() {
            bail!("at least one agent marker name is required");
        }
        // Longest first so "Claude Code" wins over "Claude".
        names.sort_by_key(|n| (std::cmp::Reverse(n.len()), n.to_lowercase()));
        names.dedup_by(|a, b| a.eq_ignore_ascii_case(b));

        let alternation = names
            .iter()
            .map(|n| regex::escape(n).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = Regex::new(&format!(
            r"(?i)\[\s*({alt})\s*\]\s*:?|\b({alt})\s*:",
            alt = alternation
        ))?;

        Ok(Self { names, pattern })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn find(&self, text: &str) -> Option<MarkerMatch> {
        let caps = self.pattern.captures(text)?;
        let whole = caps.get(0)?;
        let spoken = caps.get(1).or_else(|| caps.get(2))?.as_str();
        Some(MarkerMatch {
            label: self.canonical(spoken),
            start: whole.start(),
            end: whole.end(),
        })
    }

    /// True when either the title or the body addresses one of the agents.
    pub fn addresses_agent(&self, title: &str, body: Option<&str>) -> bool {
        self.find(title).is_some() || body.is_some_and(|b| self.find(b).is_some())
    }

    fn canonical(&self, spoken: &str) -> String {
        let squashed = spoken.split_whitespace().collect::<Vec<_>>().join(" ");
        self.names
            .iter()
            .find(|n| n.eq_ignore_ascii_case(&squashed))
            .cloned()
            .unwrap_or(squashed)
    }
}

impl Default for AgentMarkers {
    fn default() -> Self {
        Self::new(DEFAULT_AGENT_NAMES).expect("default agent names are non-empty")
    }
}
