//! Error taxonomy shared by the store, aggregator, agents and orchestrator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// `status` is `None` when the endpoint could not be reached at all.
    #[error("{service} unavailable{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    UpstreamUnavailable {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    #[error("Analysis already in progress for user {user_id}")]
    Conflict { user_id: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// True for upstream errors that carried an HTTP status (the endpoint answered).
    pub fn is_upstream_status(&self) -> bool {
        matches!(
            self,
            Error::UpstreamUnavailable {
                status: Some(_),
                ..
            }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display() {
        let err = Error::UpstreamUnavailable {
            service: "store",
            status: Some(503),
            message: "busy".to_string(),
        };
        assert_eq!(err.to_string(), "store unavailable (HTTP 503): busy");
        assert!(err.is_upstream_status());

        let err = Error::UpstreamUnavailable {
            service: "model",
            status: None,
            message: "connection refused".to_string(),
        };
        assert_eq!(err.to_string(), "model unavailable: connection refused");
        assert!(!err.is_upstream_status());
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::not_found("customer", "c-1");
        assert_eq!(err.to_string(), "customer not found: c-1");
    }
}
