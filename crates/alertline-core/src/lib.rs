//! # alertline-core
//!
//! Shared model for the alert pipeline: branded IDs, the severity classifier,
//! raw facts and normalized alerts, the wire envelope, and alert sources.

pub mod alert;
pub mod errors;
pub mod ids;
pub mod severity;
pub mod source;

pub use alert::{decode_envelope, encode_envelope, Alert, RawAlertFact, ServerMessage};
pub use errors::{CatalogError, PayloadError};
pub use ids::{AlertId, SessionId};
pub use severity::{classify, Severity};
pub use source::{AlertSource, Catalog, SyntheticSource};
