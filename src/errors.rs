//! Typed error hierarchy for the tender pipeline.
//!
//! Two top-level enums cover the two layers:
//! - `ServiceError`: a single call to an external collaborator failed
//! - `PipelineError`: a pipeline stage failed, classified by how it propagates

use thiserror::Error;

/// Failure of one call to an external collaborator (extraction, LLM, render).
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection refused or connection establishment timed out.
    #[error("Could not connect to {service}: {message}")]
    Connect { service: String, message: String },

    #[error("{service} timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    #[error("Malformed response from {service}: {message}")]
    Decode { service: String, message: String },

    #[error("{service} stream ended unexpectedly: {message}")]
    Protocol { service: String, message: String },
}

impl ServiceError {
    /// Only connection-establishment failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Connect { .. })
    }

    /// Classify a reqwest failure for the named service.
    pub fn from_reqwest(service: &str, timeout_secs: u64, err: reqwest::Error) -> Self {
        if err.is_connect() {
            ServiceError::Connect {
                service: service.to_string(),
                message: err.to_string(),
            }
        } else if err.is_timeout() {
            ServiceError::Timeout {
                service: service.to_string(),
                secs: timeout_secs,
            }
        } else if err.is_decode() {
            ServiceError::Decode {
                service: service.to_string(),
                message: err.to_string(),
            }
        } else {
            ServiceError::Protocol {
                service: service.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Errors that abort (or, for `PartialItemFailure`, are absorbed by) a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage} failed after {attempts} attempts: {last}")]
    TransientExternal {
        stage: String,
        attempts: u32,
        #[source]
        last: ServiceError,
    },

    #[error(transparent)]
    PermanentExternal(#[from] ServiceError),

    #[error("{0}")]
    Precondition(String),

    #[error("Item '{item}' failed: {reason}")]
    PartialItemFailure { item: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn storage(err: impl Into<anyhow::Error>) -> Self {
        PipelineError::Storage(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_error() -> ServiceError {
        ServiceError::Connect {
            service: "ocr".to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn only_connect_errors_are_retryable() {
        assert!(connect_error().is_retryable());
        let status = ServiceError::Status {
            service: "ocr".to_string(),
            status: 500,
            body: "boom".to_string(),
        };
        assert!(!status.is_retryable());
        let timeout = ServiceError::Timeout {
            service: "ollama".to_string(),
            secs: 600,
        };
        assert!(!timeout.is_retryable());
    }

    #[test]
    fn transient_external_message_states_attempts_and_cause() {
        let err = PipelineError::TransientExternal {
            stage: "extract-text".to_string(),
            attempts: 3,
            last: connect_error(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn service_error_converts_to_permanent_external() {
        let err: PipelineError = ServiceError::Decode {
            service: "ollama".to_string(),
            message: "not json".to_string(),
        }
        .into();
        match &err {
            PipelineError::PermanentExternal(ServiceError::Decode { message, .. }) => {
                assert_eq!(message, "not json");
            }
            _ => panic!("Expected PermanentExternal(Decode)"),
        }
    }

    #[test]
    fn precondition_message_is_passed_through() {
        let err = PipelineError::Precondition("no analysis on record".to_string());
        assert_eq!(err.to_string(), "no analysis on record");
    }

    #[test]
    fn errors_implement_std_error() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&connect_error());
        assert_std_error(&PipelineError::Precondition("x".to_string()));
    }
}
