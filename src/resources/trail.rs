//! CloudTrail trails.
//!
//! The trail is addressed by name throughout; the ARN returned on create is
//! only reported back as the physical id and the `TrailArn` attribute.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{HandlerContext, Resource, ResourceHandler};
use crate::api::{ApiError, ApiErrorKind, TrailApi, TrailInfo, TrailParams};
use crate::error::ResourceError;
use crate::protocol::{create_or_adopt, delete_if_requested};
use crate::schema::{Attribute, Schema};
use crate::types::{CallResult, EntityKind, LifecycleEvent, Properties};

/// Registry key.
pub const NAME: &str = "AWSTrail";

/// Output attribute carrying the trail ARN.
pub const TRAIL_ARN: &str = "TrailArn";

pub fn schema() -> Schema {
    Schema::new()
        .with_description("A CloudTrail trail delivering to S3")
        .with_attribute("TrailName", Attribute::required_string())
        .with_attribute("S3BucketName", Attribute::required_string())
        .with_attribute("S3KeyPrefix", Attribute::optional_string())
        .with_attribute("IncludeGlobalServiceEvents", Attribute::optional_bool())
        .with_attribute("IsMultiRegionTrail", Attribute::optional_bool())
        .with_attribute("EnableLogFileValidation", Attribute::optional_bool())
        .with_attribute("IsOrganizationTrail", Attribute::optional_bool())
        .with_remove_on_delete()
}

pub fn factory(
    ctx: &HandlerContext,
    _props: &Properties<'_>,
) -> Result<Box<dyn ResourceHandler>, ResourceError> {
    let api = ctx.connector.cloudtrail(&ctx.aws)?;
    Ok(Box::new(TrailResource::new(api)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct AwsTrailParams {
    pub trail: TrailParams,
    /// Trails are removed with the stack unless told otherwise.
    pub remove_on_delete_stack: bool,
}

pub struct TrailResource<C: ?Sized + TrailApi = dyn TrailApi> {
    api: Arc<C>,
}

impl<C: ?Sized + TrailApi> TrailResource<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self { api }
    }

    /// The trail named `name`, if it exists.
    async fn find_trail(&self, name: &str) -> Result<Option<TrailInfo>, ApiError> {
        match self.api.get_trail(name).await {
            Ok(info) => Ok(Some(info)),
            Err(err) if err.kind == ApiErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn start_logging(
        &self,
        name: &str,
        info: TrailInfo,
    ) -> Result<CallResult, ResourceError> {
        self.api.start_logging(name).await?;
        info!(trail = name, arn = %info.trail_arn, "Trail is logging");
        Ok(CallResult::new(info.trail_arn.clone()).with_attribute(TRAIL_ARN, info.trail_arn))
    }
}

#[async_trait]
impl<C: ?Sized + TrailApi> Resource for TrailResource<C> {
    type Params = AwsTrailParams;

    fn extract_params(&self, event: &LifecycleEvent) -> Result<AwsTrailParams, ResourceError> {
        let props = event.properties();
        Ok(AwsTrailParams {
            trail: TrailParams {
                name: props.require_str("TrailName")?.to_string(),
                s3_bucket_name: props.string("S3BucketName"),
                s3_key_prefix: props.string("S3KeyPrefix"),
                include_global_service_events: props.bool_like("IncludeGlobalServiceEvents"),
                is_multi_region_trail: props.bool_like("IsMultiRegionTrail"),
                enable_log_file_validation: props.bool_like("EnableLogFileValidation"),
                is_organization_trail: props.bool_like("IsOrganizationTrail"),
            },
            remove_on_delete_stack: props.remove_on_delete_stack(true),
        })
    }

    async fn create(&self, params: &AwsTrailParams) -> Result<CallResult, ResourceError> {
        let name = params.trail.name.as_str();
        let trail = create_or_adopt(
            EntityKind::Trail,
            name,
            self.api.create_trail(&params.trail),
            || self.find_trail(name),
        )
        .await?
        .into_inner();
        self.start_logging(name, trail).await
    }

    async fn update(&self, params: &AwsTrailParams) -> Result<CallResult, ResourceError> {
        let updated = self.api.update_trail(&params.trail).await?;
        info!(trail = %params.trail.name, "Updated trail");
        self.start_logging(&params.trail.name, updated).await
    }

    async fn delete(&self, params: &AwsTrailParams) -> Result<(), ResourceError> {
        let name = params.trail.name.as_str();
        delete_if_requested(EntityKind::Trail, name, params.remove_on_delete_stack, || {
            self.api.delete_trail(name)
        })
        .await
    }
}
