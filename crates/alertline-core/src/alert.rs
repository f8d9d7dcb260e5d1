use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::PayloadError;
use crate::ids::AlertId;
use crate::severity::{classify, Severity};

/// Unclassified hostname + message pair as emitted by a source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAlertFact {
    pub hostname: String,
    pub message: String,
}

impl RawAlertFact {
    pub fn new(hostname: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            message: message.into(),
        }
    }
}

/// Server → viewer frame. Serialized as `{"type":"alert","hostname":..,"message":..}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Alert(RawAlertFact),
}

/// Serialize a fact into its wire envelope.
pub fn encode_envelope(fact: &RawAlertFact) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ServerMessage::Alert(fact.clone()))
}

/// Validate and decode a wire frame into a fact.
pub fn decode_envelope(text: &str) -> Result<RawAlertFact, PayloadError> {
    let value: serde_json::Value = serde_json::from_str(text).map_err(PayloadError::InvalidJson)?;
    let obj = value.as_object().ok_or(PayloadError::NotAnObject)?;
    let kind = obj
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(PayloadError::MissingType)?;
    if kind != "alert" {
        return Err(PayloadError::UnexpectedType(kind.to_string()));
    }
    serde_json::from_value(value).map_err(PayloadError::MalformedFields)
}

/// A normalized, classified alert record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub hostname: String,
    pub message: String,
    /// When the fact was accepted locally; origin time is not transmitted.
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
}

impl Alert {
    /// Normalize a fact received now.
    pub fn from_fact(fact: RawAlertFact) -> Self {
        Self::from_fact_at(fact, Utc::now())
    }

    pub fn from_fact_at(fact: RawAlertFact, timestamp: DateTime<Utc>) -> Self {
        let severity = classify(&fact.message);
        Self {
            id: AlertId::new(),
            hostname: fact.hostname,
            message: fact.message,
            timestamp,
            severity,
        }
    }

    /// Calendar date of the timestamp in the local time zone.
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.with_timezone(&Local).date_naive()
    }
}
