//! Error types for resource handlers.

use thiserror::Error;

use crate::api::{ApiError, ApiErrorKind};
use crate::schema::Diagnostic;
use crate::types::EntityKind;

/// Errors that can occur while dispatching a lifecycle event.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The requested resource type is not registered.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A handler was registered under one of the reserved base names.
    #[error("Reserved resource type name: {0}")]
    ReservedName(String),

    /// A handler was registered twice under the same name.
    #[error("Resource type already registered: {0}")]
    DuplicateResource(String),

    /// The lifecycle event is malformed (missing property, bad physical id).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Resource properties failed schema validation.
    #[error("Validation error: {}", summarize(.0))]
    Validation(Vec<Diagnostic>),

    /// Credentials or deployment settings are missing or unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The remote API rejected a call. The remote code and message are kept.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A create collided with an existing entity that the name lookup could not find.
    #[error("{kind} '{name}' already exists but was not found by name lookup")]
    NotFoundAfterCollision {
        /// Entity kind that collided.
        kind: EntityKind,
        /// Name used for the create and the lookup.
        name: String,
    },

    /// The account is not entitled to install an enterprise-only app.
    #[error("{0} is available to Enterprise or Trial Account Type only")]
    NotEntitled(String),

    /// A server-side job finished in the failed state.
    #[error("Job {job_id} failed: {status_message}")]
    JobFailed {
        /// Remote job identifier.
        job_id: String,
        /// Status message reported by the remote service.
        status_message: String,
    },

    /// A server-side job did not reach a terminal state within the poll budget.
    #[error("Job {job_id} still in progress after {attempts} status checks")]
    PollTimeout {
        /// Remote job identifier.
        job_id: String,
        /// Number of status checks performed.
        attempts: u32,
    },

    /// A remote response did not have the expected format.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ResourceError {
    /// Get the error message as a string.
    pub fn message(&self) -> String {
        match self {
            Self::UnknownResource(msg)
            | Self::ReservedName(msg)
            | Self::DuplicateResource(msg)
            | Self::InvalidRequest(msg)
            | Self::Configuration(msg)
            | Self::NotEntitled(msg)
            | Self::Decode(msg) => msg.clone(),
            Self::Validation(diagnostics) => summarize(diagnostics),
            Self::Api(err) => err.message.clone(),
            Self::JobFailed { status_message, .. } => status_message.clone(),
            other => other.to_string(),
        }
    }

    /// Whether the orchestrator should retry the event.
    ///
    /// Collisions that cannot be resolved and unfinished jobs point at
    /// remote eventual consistency, so they are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotFoundAfterCollision { .. } | Self::PollTimeout { .. }
        )
    }

    /// The remote error, if this error came from the remote API.
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Whether this is a remote error of the given kind.
    pub fn is_api_kind(&self, kind: ApiErrorKind) -> bool {
        self.api_error().is_some_and(|err| err.kind == kind)
    }

    /// Shorthand for a missing required property.
    pub(crate) fn missing_property(name: &str) -> Self {
        Self::InvalidRequest(format!("missing required property '{}'", name))
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| match &d.attribute {
            Some(attr) => format!("{} ({})", d.summary, attr),
            None => d.summary.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}
