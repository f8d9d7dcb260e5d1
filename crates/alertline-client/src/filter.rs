use std::fmt;
use std::str::FromStr;

use alertline_core::{Alert, Severity};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The single active filter dimension.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    #[default]
    None,
    Severity,
    Hostname,
    Message,
    Date,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Severity => "severity",
            Self::Hostname => "hostname",
            Self::Message => "message",
            Self::Date => "date",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter kind: {0}")]
pub struct UnknownFilterKind(pub String);

impl FromStr for FilterKind {
    type Err = UnknownFilterKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "severity" => Ok(Self::Severity),
            "hostname" | "host" => Ok(Self::Hostname),
            "message" => Ok(Self::Message),
            "date" => Ok(Self::Date),
            _ => Err(UnknownFilterKind(s.to_string())),
        }
    }
}

/// A filter dimension plus its value.
///
/// An empty value matches everything. A severity or date value that does not
/// parse matches nothing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AlertFilter {
    kind: FilterKind,
    value: String,
}

impl AlertFilter {
    pub fn new(kind: FilterKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Switch dimension. The value is cleared whenever the dimension changes.
    pub fn set_kind(&mut self, kind: FilterKind) {
        if kind != self.kind {
            self.kind = kind;
            self.value.clear();
        }
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = value.into();
    }

    pub fn is_active(&self) -> bool {
        self.kind != FilterKind::None && !self.value.trim().is_empty()
    }

    /// Parse the value once for repeated matching.
    pub fn compile(&self) -> Matcher {
        let value = self.value.trim();
        if value.is_empty() {
            return Matcher::All;
        }
        match self.kind {
            FilterKind::None => Matcher::All,
            FilterKind::Severity => value
                .parse::<Severity>()
                .map_or(Matcher::Nothing, Matcher::Severity),
            FilterKind::Hostname => Matcher::Hostname(value.to_lowercase()),
            FilterKind::Message => Matcher::Message(value.to_lowercase()),
            FilterKind::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_or(Matcher::Nothing, Matcher::Date),
        }
    }

    pub fn matches(&self, alert: &Alert) -> bool {
        self.compile().matches(alert)
    }
}

/// Compiled form of an [`AlertFilter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    All,
    Nothing,
    Severity(Severity),
    /// Lowercased needle.
    Hostname(String),
    /// Lowercased needle.
    Message(String),
    /// Local calendar date.
    Date(NaiveDate),
}

impl Matcher {
    pub fn matches(&self, alert: &Alert) -> bool {
        match self {
            Self::All => true,
            Self::Nothing => false,
            Self::Severity(s) => alert.severity == *s,
            Self::Hostname(needle) => alert.hostname.to_lowercase().contains(needle.as_str()),
            Self::Message(needle) => alert.message.to_lowercase().contains(needle.as_str()),
            Self::Date(date) => alert.local_date() == *date,
        }
    }
}
