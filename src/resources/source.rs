//! Sources attached to a collector.
//!
//! [`HttpSourceResource`] manages HTTP push endpoints; [`AwsSourceResource`]
//! manages S3 polling sources. Both share the create / update / delete
//! plumbing in [`Sources`] and differ only in the body they send.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use super::{
    delete_target, previous_remote_id, require_remote_id, HandlerContext, Resource,
    ResourceHandler,
};
use crate::api::{Source, SourceApi, SumoApi};
use crate::config::SumoConfig;
use crate::error::ResourceError;
use crate::protocol::{create_or_adopt, delete_if_requested, find_by_name};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::types::{CallResult, EntityKind, LifecycleEvent, Properties};

/// Registry key of the HTTP source handler.
pub const HTTP_SOURCE: &str = "HTTPSource";

/// Registry key of the S3 polling source handler.
pub const AWS_SOURCE: &str = "AWSSource";

/// Output attribute carrying the source's ingestion URL.
pub const SUMO_ENDPOINT: &str = "SUMO_ENDPOINT";

/// Locator used with `DateFormat` when `DateLocatorRegex` is not given.
pub const DEFAULT_DATE_LOCATOR: &str = r#""timestamp": (.*),"#;

/// Milliseconds between two scans of the bucket.
const SCAN_INTERVAL_MS: u64 = 300_000;

fn source_schema(description: &str) -> Schema {
    Schema::new()
        .with_description(description)
        .with_sumo_credentials()
        .with_attribute("CollectorId", Attribute::required_string())
        .with_attribute("SourceName", Attribute::required_string())
        .with_attribute("SourceCategory", Attribute::optional_string())
        .with_attribute("DateFormat", Attribute::optional_string())
        .with_attribute(
            "DateLocatorRegex",
            Attribute::optional_string()
                .with_description("Regex locating the timestamp, used with DateFormat"),
        )
        .with_remove_on_delete()
}

pub fn http_schema() -> Schema {
    source_schema("An HTTP source on a hosted collector")
}

pub fn aws_schema() -> Schema {
    source_schema("An S3 polling source on a hosted collector")
        .with_attribute(
            "SourceType",
            Attribute::required_string()
                .with_description("AWS content type, e.g. AwsCloudTrailBucket"),
        )
        .with_attribute("TargetBucketName", Attribute::required_string())
        .with_attribute("PathExpression", Attribute::required_string())
        .with_attribute("RoleArn", Attribute::required_string())
        .with_attribute(
            "filters",
            Attribute::new(
                AttributeType::list(AttributeType::map(AttributeType::Dynamic)),
                AttributeFlags::optional(),
            ),
        )
        .with_attribute("multilineProcessingEnabled", Attribute::optional_bool())
        .with_attribute("useAutolineMatching", Attribute::optional_bool())
}

pub fn http_factory(
    ctx: &HandlerContext,
    props: &Properties<'_>,
) -> Result<Box<dyn ResourceHandler>, ResourceError> {
    let api = ctx.connector.sumo(&SumoConfig::from_properties(props)?)?;
    Ok(Box::new(HttpSourceResource::new(api)))
}

pub fn aws_factory(
    ctx: &HandlerContext,
    props: &Properties<'_>,
) -> Result<Box<dyn ResourceHandler>, ResourceError> {
    let api = ctx.connector.sumo(&SumoConfig::from_properties(props)?)?;
    Ok(Box::new(AwsSourceResource::new(api)))
}

/// Where a source lives and whether it may be removed.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTarget {
    pub collector_id: String,
    pub source_id: Option<String>,
    pub source_name: String,
    pub remove_on_delete_stack: bool,
}

impl SourceTarget {
    fn from_event(event: &LifecycleEvent) -> Result<Self, ResourceError> {
        let props = event.properties();
        Ok(Self {
            collector_id: props.require_str("CollectorId")?.to_string(),
            source_id: previous_remote_id(event)?,
            source_name: props.string("SourceName").unwrap_or_default(),
            remove_on_delete_stack: props.remove_on_delete_stack(false),
        })
    }
}

/// Timestamp parsing settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DateFormat {
    pub format: String,
    pub locator: String,
}

impl DateFormat {
    fn from_properties(props: &Properties<'_>) -> Option<Self> {
        let format = props.str("DateFormat").filter(|f| !f.is_empty())?;
        Some(Self {
            format: format.to_string(),
            locator: props
                .string("DateLocatorRegex")
                .unwrap_or_else(|| DEFAULT_DATE_LOCATOR.to_string()),
        })
    }

    fn to_value(&self) -> Value {
        json!([{"format": self.format, "locator": self.locator}])
    }
}

fn source_result(source: Source) -> Result<CallResult, ResourceError> {
    let id = source
        .id
        .ok_or_else(|| ResourceError::Decode("source response has no id".to_string()))?;
    let mut result = CallResult::new(id);
    if let Some(url) = source.url {
        result = result.with_attribute(SUMO_ENDPOINT, url);
    }
    Ok(result)
}

/// Lifecycle plumbing shared by every source type.
struct Sources<C: ?Sized> {
    api: Arc<C>,
}

impl<C: ?Sized + SourceApi> Sources<C> {
    async fn create(
        &self,
        target: &SourceTarget,
        body: Source,
    ) -> Result<CallResult, ResourceError> {
        let collector_id = target.collector_id.as_str();
        let source = create_or_adopt(
            EntityKind::Source,
            &target.source_name,
            self.api.create_source(collector_id, &body),
            || {
                find_by_name(&target.source_name, |limit, offset| {
                    self.api.list_sources(collector_id, limit, offset)
                })
            },
        )
        .await?
        .into_inner();

        source_result(source)
    }

    async fn update<F>(
        &self,
        target: &SourceTarget,
        resource: &str,
        apply: F,
    ) -> Result<CallResult, ResourceError>
    where
        F: FnOnce(&mut Source) + Send,
    {
        let source_id = require_remote_id(&target.source_id, resource)?;
        let current = self.api.source(&target.collector_id, &source_id).await?;

        let mut source = current.value;
        source.name = target.source_name.clone();
        apply(&mut source);

        let mut updated = self
            .api
            .update_source(&target.collector_id, &source, &current.etag)
            .await?;
        info!(source_id = %source_id, "Updated source");

        if updated.id.is_none() {
            updated.id = Some(source_id);
        }
        source_result(updated)
    }

    async fn delete(&self, target: &SourceTarget, resource: &str) -> Result<(), ResourceError> {
        let Some(source_id) = delete_target(&target.source_id, resource) else {
            return Ok(());
        };
        let collector_id = target.collector_id.as_str();
        delete_if_requested(EntityKind::Source, source_id, target.remove_on_delete_stack, || {
            self.api.delete_source(collector_id, source_id)
        })
        .await
    }
}

// =========================================================================
// HTTPSource
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct HttpSourceParams {
    pub target: SourceTarget,
    pub source_category: Option<String>,
    pub date_format: Option<DateFormat>,
}

pub struct HttpSourceResource<C: ?Sized + SourceApi = dyn SumoApi> {
    sources: Sources<C>,
}

impl<C: ?Sized + SourceApi> HttpSourceResource<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self {
            sources: Sources { api },
        }
    }
}

#[async_trait]
impl<C: ?Sized + SourceApi> Resource for HttpSourceResource<C> {
    type Params = HttpSourceParams;

    fn extract_params(&self, event: &LifecycleEvent) -> Result<HttpSourceParams, ResourceError> {
        let props = event.properties();
        Ok(HttpSourceParams {
            target: SourceTarget::from_event(event)?,
            source_category: props.string("SourceCategory"),
            date_format: DateFormat::from_properties(&props),
        })
    }

    async fn create(&self, params: &HttpSourceParams) -> Result<CallResult, ResourceError> {
        let mut body = Source::named(params.target.source_name.clone());
        body.set("sourceType", "HTTP");
        body.set("messagePerRequest", false);
        if let Some(category) = &params.source_category {
            body.set("category", category.as_str());
        }
        if let Some(date_format) = &params.date_format {
            body.set("defaultDateFormats", date_format.to_value());
        }
        self.sources.create(&params.target, body).await
    }

    async fn update(&self, params: &HttpSourceParams) -> Result<CallResult, ResourceError> {
        self.sources
            .update(&params.target, HTTP_SOURCE, |source| {
                if let Some(category) = &params.source_category {
                    source.set("category", category.as_str());
                }
                if let Some(date_format) = &params.date_format {
                    source.set("defaultDateFormats", date_format.to_value());
                }
            })
            .await
    }

    async fn delete(&self, params: &HttpSourceParams) -> Result<(), ResourceError> {
        self.sources.delete(&params.target, HTTP_SOURCE).await
    }
}

// =========================================================================
// AWSSource
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct AwsSourceParams {
    pub target: SourceTarget,
    pub source_type: String,
    pub source_category: Option<String>,
    pub date_format: Option<DateFormat>,
    pub filters: Vec<Value>,
    pub multiline_processing_enabled: Option<bool>,
    pub use_autoline_matching: Option<bool>,
    pub bucket_name: String,
    pub path_expression: String,
    pub role_arn: String,
}

impl AwsSourceParams {
    /// Write the common and polling settings over `source`.
    fn apply(&self, source: &mut Source) {
        let description_type = if self.source_type.is_empty() {
            "HTTP"
        } else {
            self.source_type.as_str()
        };
        source.name = self.target.source_name.clone();
        source.set(
            "description",
            format!("This {} source is created by AWS SAM Application", description_type),
        );
        if let Some(category) = &self.source_category {
            source.set("category", category.as_str());
        }
        if let Some(date_format) = &self.date_format {
            source.set("defaultDateFormats", date_format.to_value());
        }
        if !self.filters.is_empty() {
            source.set("filters", self.filters.clone());
        }
        if let Some(enabled) = self.multiline_processing_enabled {
            source.set("multilineProcessingEnabled", enabled);
        }
        if let Some(enabled) = self.use_autoline_matching {
            source.set("useAutolineMatching", enabled);
        }

        source.set("sourceType", "Polling");
        source.set("contentType", self.source_type.as_str());
        source.set(
            "thirdPartyRef",
            json!({
                "resources": [{
                    "serviceType": self.source_type,
                    "path": {
                        "type": "S3BucketPathExpression",
                        "bucketName": self.bucket_name,
                        "pathExpression": self.path_expression
                    },
                    "authentication": {
                        "type": "AWSRoleBasedAuthentication",
                        "roleARN": self.role_arn
                    }
                }]
            }),
        );
        source.set("scanInterval", SCAN_INTERVAL_MS);
        source.set("paused", false);
    }
}

/// Processing rules with a non-blank `regexp`.
fn processing_rules(props: &Properties<'_>) -> Vec<Value> {
    props
        .list("filters")
        .map(|filters| {
            filters
                .iter()
                .filter(|f| {
                    f.get("regexp")
                        .and_then(Value::as_str)
                        .is_some_and(|re| !re.trim().is_empty())
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

pub struct AwsSourceResource<C: ?Sized + SourceApi = dyn SumoApi> {
    sources: Sources<C>,
}

impl<C: ?Sized + SourceApi> AwsSourceResource<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self {
            sources: Sources { api },
        }
    }
}

#[async_trait]
impl<C: ?Sized + SourceApi> Resource for AwsSourceResource<C> {
    type Params = AwsSourceParams;

    fn extract_params(&self, event: &LifecycleEvent) -> Result<AwsSourceParams, ResourceError> {
        let props = event.properties();
        let string = |key: &str| props.string(key).unwrap_or_default();
        Ok(AwsSourceParams {
            target: SourceTarget::from_event(event)?,
            source_type: string("SourceType"),
            source_category: props.string("SourceCategory"),
            date_format: DateFormat::from_properties(&props),
            filters: processing_rules(&props),
            multiline_processing_enabled: props.bool_like("multilineProcessingEnabled"),
            use_autoline_matching: props.bool_like("useAutolineMatching"),
            bucket_name: string("TargetBucketName"),
            path_expression: string("PathExpression"),
            role_arn: string("RoleArn"),
        })
    }

    async fn create(&self, params: &AwsSourceParams) -> Result<CallResult, ResourceError> {
        let mut body = Source::default();
        params.apply(&mut body);
        self.sources.create(&params.target, body).await
    }

    async fn update(&self, params: &AwsSourceParams) -> Result<CallResult, ResourceError> {
        self.sources
            .update(&params.target, AWS_SOURCE, |source| params.apply(source))
            .await
    }

    async fn delete(&self, params: &AwsSourceParams) -> Result<(), ResourceError> {
        self.sources.delete(&params.target, AWS_SOURCE).await
    }
}
