/// A server frame that could not be turned into an alert fact.
///
/// Always recoverable: the frame is dropped and the connection stays up.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("missing message type")]
    MissingType,
    #[error("unexpected message type: {0}")]
    UnexpectedType(String),
    #[error("malformed alert fields: {0}")]
    MalformedFields(#[source] serde_json::Error),
}

impl PayloadError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidJson(_) => "invalid_json",
            Self::NotAnObject => "not_an_object",
            Self::MissingType => "missing_type",
            Self::UnexpectedType(_) => "unexpected_type",
            Self::MalformedFields(_) => "malformed_fields",
        }
    }
}

/// Catalog construction failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("catalog has no messages")]
    NoMessages,
    #[error("catalog has no hostnames")]
    NoHostnames,
}
