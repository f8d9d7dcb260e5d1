use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Alert severity, derived from message text only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Success,
    Info,
}

/// Keyword rules, evaluated in order. First match wins.
const RULES: &[(Severity, &[&str])] = &[
    (Severity::Critical, &["critical", "unauthorized", "attack"]),
    (Severity::Warning, &["warning", "suspicious"]),
    (Severity::Success, &["success", "resolved"]),
];

/// Classify a message by case-insensitive keyword match.
///
/// Total: text matching no rule is [`Severity::Info`].
pub fn classify(message: &str) -> Severity {
    let lowered = message.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| lowered.contains(k)))
        .map_or(Severity::Info, |(severity, _)| *severity)
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::Warning,
        Severity::Info,
        Severity::Success,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Success => "success",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown severity: {0}")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "warning" => Ok(Self::Warning),
            "success" => Ok(Self::Success),
            "info" => Ok(Self::Info),
            other => Err(UnknownSeverity(other.to_string())),
        }
    }
}
