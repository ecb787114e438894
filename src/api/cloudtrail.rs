//! CloudTrail trail management.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ApiError;

/// Parameters for `CreateTrail` / `UpdateTrail`.
///
/// Boolean settings left as `None` are omitted so the service default applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TrailParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_bucket_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_key_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_global_service_events: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_multi_region_trail: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_log_file_validation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_organization_trail: Option<bool>,
}

/// The part of a trail description the handler reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailInfo {
    #[serde(rename = "TrailARN")]
    pub trail_arn: String,
}

#[async_trait]
pub trait TrailApi: Send + Sync {
    async fn create_trail(&self, params: &TrailParams) -> Result<TrailInfo, ApiError>;

    async fn update_trail(&self, params: &TrailParams) -> Result<TrailInfo, ApiError>;

    /// `GetTrail`; an unknown name is a `NotFound` error.
    async fn get_trail(&self, name: &str) -> Result<TrailInfo, ApiError>;

    async fn delete_trail(&self, name: &str) -> Result<(), ApiError>;

    async fn start_logging(&self, name: &str) -> Result<(), ApiError>;
}
