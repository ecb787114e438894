//! Interfaces to the remote services the handlers drive.
//!
//! Each capability a handler uses is a separate trait so tests can supply an
//! in-memory fake (see [`crate::testing`]). Concrete HTTP and AWS SDK clients
//! live outside this crate and plug in through a [`Connector`].
//!
//! Remote failures are decoded once, at the client boundary, into an
//! [`ApiError`] whose [`ApiErrorKind`] the handlers branch on.

pub mod cloudtrail;
pub mod sumo;
pub mod template;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::{AwsConfig, SumoConfig};
use crate::error::ResourceError;

pub use cloudtrail::{TrailApi, TrailInfo, TrailParams};
pub use sumo::{
    AppApi, AppInstallRequest, Collector, CollectorApi, Connection, ConnectionApi, ContentApi,
    Folder, FolderApi, FolderChild, Header, JobHandle, SearchApi, SearchJobRequest,
    SearchJobStatus, Source, SourceApi, SumoApi,
};
pub use template::{render_template, template_key, TemplateStore};

/// Error codes the vendor returns when a name is already taken.
pub const COLLISION_CODES: &[&str] = &[
    "collectors.validation.name.duplicate",
    "connection:name_already_exists",
    "content:duplicate_content",
    "TrailAlreadyExistsException",
];

/// How a remote error should be handled by the lifecycle protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApiErrorKind {
    /// The name is already in use by another remote object.
    Collision,
    /// The remote object does not exist.
    NotFound,
    /// Anything else. Always propagated.
    Other,
}

/// A remote API failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} ({code}, HTTP {status})")]
pub struct ApiError {
    /// Classification used by the lifecycle protocol.
    pub kind: ApiErrorKind,
    /// HTTP status of the failed call.
    pub status: u16,
    /// Machine-readable error code reported by the remote service.
    pub code: String,
    /// Human-readable message reported by the remote service.
    pub message: String,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(
        kind: ApiErrorKind,
        status: u16,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Decode an error response body.
    ///
    /// Accepts both shapes the vendor emits: a flat `{"code", "message"}`
    /// object and the `{"errors": [{"code", "message"}, ...]}` envelope. For
    /// the envelope, a collision code anywhere in the list wins over the
    /// first entry.
    pub fn from_response(status: u16, body: &Value) -> Self {
        let entries: Vec<(&str, &str)> = match body.get("errors").and_then(Value::as_array) {
            Some(errors) => errors.iter().map(code_and_message).collect(),
            None => vec![code_and_message(body)],
        };

        let (code, message) = entries
            .iter()
            .copied()
            .find(|(code, _)| COLLISION_CODES.contains(code))
            .or_else(|| entries.first().copied())
            .unwrap_or(("", ""));

        Self::new(classify(status, code), status, code, message)
    }

    /// Whether the remote service rejected the caller's entitlement (HTTP 403).
    pub fn is_forbidden(&self) -> bool {
        self.status == 403
    }
}

fn code_and_message(value: &Value) -> (&str, &str) {
    (
        value.get("code").and_then(Value::as_str).unwrap_or(""),
        value.get("message").and_then(Value::as_str).unwrap_or(""),
    )
}

fn classify(status: u16, code: &str) -> ApiErrorKind {
    if COLLISION_CODES.contains(&code) {
        return ApiErrorKind::Collision;
    }
    let lowered = code.to_ascii_lowercase();
    if status == 404
        || lowered.ends_with("not_found")
        || lowered.ends_with("notfound")
        || lowered.ends_with("notfoundexception")
    {
        return ApiErrorKind::NotFound;
    }
    ApiErrorKind::Other
}

/// A remote representation together with its concurrency token.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    /// The fetched entity.
    pub value: T,
    /// The ETag to send back with the write.
    pub etag: String,
}

impl<T> Versioned<T> {
    /// Wrap a value with its ETag.
    pub fn new(value: T, etag: impl Into<String>) -> Self {
        Self {
            value,
            etag: etag.into(),
        }
    }
}

/// Remote entities that can be looked up by exact name.
pub trait Named {
    /// The entity's display name.
    fn name(&self) -> &str;
}

/// Opens sessions against the remote services for one dispatch.
///
/// Implementations build a fresh client per call; the handler that asked for
/// it owns the session until the dispatch returns.
pub trait Connector: Send + Sync {
    /// Open a Sumo Logic session with the given credentials.
    fn sumo(&self, config: &SumoConfig) -> Result<Arc<dyn SumoApi>, ResourceError>;

    /// Open a CloudTrail session in the configured region.
    fn cloudtrail(&self, config: &AwsConfig) -> Result<Arc<dyn TrailApi>, ResourceError>;

    /// The store app templates are fetched from.
    fn templates(&self) -> Arc<dyn TemplateStore>;
}

/// Deserialize an optional identifier the API may send as a number or a string.
pub(crate) fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collision => write!(f, "collision"),
            Self::NotFound => write!(f, "not found"),
            Self::Other => write!(f, "other"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_flat_collision() {
        let err = ApiError::from_response(
            400,
            &json!({
                "status": 400,
                "id": "QH3IV-JUYH3-GFAAV",
                "code": "collectors.validation.name.duplicate",
                "message": "A collector with this name already exists."
            }),
        );
        assert_eq!(err.kind, ApiErrorKind::Collision);
        assert_eq!(err.code, "collectors.validation.name.duplicate");
        assert_eq!(err.message, "A collector with this name already exists.");
    }

    #[test]
    fn test_decode_envelope_prefers_collision() {
        let err = ApiError::from_response(
            400,
            &json!({
                "id": "8UQOI-1ZFRU-9VY1N",
                "errors": [
                    {"code": "connection:invalid_header", "message": "bad header"},
                    {"code": "connection:name_already_exists", "message": "Name taken"}
                ]
            }),
        );
        assert_eq!(err.kind, ApiErrorKind::Collision);
        assert_eq!(err.code, "connection:name_already_exists");
        assert_eq!(err.message, "Name taken");
    }

    #[test]
    fn test_decode_not_found() {
        let err = ApiError::from_response(404, &json!({"code": "collector.notfound"}));
        assert_eq!(err.kind, ApiErrorKind::NotFound);

        let err = ApiError::from_response(400, &json!({"code": "TrailNotFoundException"}));
        assert_eq!(err.kind, ApiErrorKind::NotFound);

        let err = ApiError::from_response(400, &json!({"code": "TrailAlreadyExistsException"}));
        assert_eq!(err.kind, ApiErrorKind::Collision);

        let err =
            ApiError::from_response(400, &json!({"errors": [{"code": "content:not_found"}]}));
        assert_eq!(err.kind, ApiErrorKind::NotFound);
    }

    #[test]
    fn test_decode_other_keeps_code() {
        let err = ApiError::from_response(
            403,
            &json!({"errors": [{"code": "search:forbidden", "message": "No access"}]}),
        );
        assert_eq!(err.kind, ApiErrorKind::Other);
        assert!(err.is_forbidden());
        assert_eq!(err.code, "search:forbidden");
        assert_eq!(err.message, "No access");
    }

    #[test]
    fn test_decode_unexpected_body() {
        let err = ApiError::from_response(502, &json!("Bad Gateway"));
        assert_eq!(err.kind, ApiErrorKind::Other);
        assert_eq!(err.status, 502);
        assert!(err.code.is_empty());
    }

    #[test]
    fn test_numeric_ids() {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(default, deserialize_with = "de_opt_id")]
            id: Option<String>,
        }

        let probe: Probe = serde_json::from_value(json!({"id": 108920384})).unwrap();
        assert_eq!(probe.id.as_deref(), Some("108920384"));

        let probe: Probe = serde_json::from_value(json!({"id": "0000000006F1C2A9"})).unwrap();
        assert_eq!(probe.id.as_deref(), Some("0000000006F1C2A9"));

        let probe: Probe = serde_json::from_value(json!({})).unwrap();
        assert!(probe.id.is_none());
    }
}
