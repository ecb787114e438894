//! Hosted collectors.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{
    delete_target, previous_remote_id, require_remote_id, HandlerContext, Resource,
    ResourceHandler,
};
use crate::api::{Collector, CollectorApi, SumoApi};
use crate::config::SumoConfig;
use crate::error::ResourceError;
use crate::protocol::{create_or_adopt, delete_if_requested, find_by_name};
use crate::schema::{Attribute, Schema};
use crate::types::{CallResult, EntityKind, LifecycleEvent, Properties};

/// Registry key.
pub const NAME: &str = "Collector";

/// Output attribute carrying the collector id.
pub const COLLECTOR_ID: &str = "COLLECTOR_ID";

const DEFAULT_COLLECTOR_TYPE: &str = "Hosted";

pub fn schema() -> Schema {
    Schema::new()
        .with_description("A Sumo Logic collector")
        .with_sumo_credentials()
        .with_attribute(
            "CollectorType",
            Attribute::optional_string().with_description("Collector type, Hosted by default"),
        )
        .with_attribute("CollectorName", Attribute::required_string())
        .with_attribute("SourceCategory", Attribute::optional_string())
        .with_attribute("Description", Attribute::optional_string())
        .with_remove_on_delete()
}

pub fn factory(
    ctx: &HandlerContext,
    props: &Properties<'_>,
) -> Result<Box<dyn ResourceHandler>, ResourceError> {
    let api = ctx.connector.sumo(&SumoConfig::from_properties(props)?)?;
    Ok(Box::new(CollectorResource::new(api)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectorParams {
    pub collector_id: Option<String>,
    pub collector_type: String,
    pub collector_name: String,
    pub source_category: Option<String>,
    pub description: Option<String>,
    pub remove_on_delete_stack: bool,
}

pub struct CollectorResource<C: ?Sized + CollectorApi = dyn SumoApi> {
    api: Arc<C>,
}

impl<C: ?Sized + CollectorApi> CollectorResource<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self { api }
    }
}

fn collector_id(collector: Collector) -> Result<String, ResourceError> {
    collector
        .id
        .ok_or_else(|| ResourceError::Decode("collector response has no id".to_string()))
}

fn result(id: String) -> CallResult {
    CallResult::new(id.clone()).with_attribute(COLLECTOR_ID, id)
}

#[async_trait]
impl<C: ?Sized + CollectorApi> Resource for CollectorResource<C> {
    type Params = CollectorParams;

    fn extract_params(&self, event: &LifecycleEvent) -> Result<CollectorParams, ResourceError> {
        let props = event.properties();
        Ok(CollectorParams {
            collector_id: previous_remote_id(event)?,
            collector_type: props
                .string("CollectorType")
                .unwrap_or_else(|| DEFAULT_COLLECTOR_TYPE.to_string()),
            collector_name: props.string("CollectorName").unwrap_or_default(),
            source_category: props.string("SourceCategory"),
            description: props.string("Description"),
            remove_on_delete_stack: props.remove_on_delete_stack(false),
        })
    }

    async fn create(&self, params: &CollectorParams) -> Result<CallResult, ResourceError> {
        let body = Collector {
            name: params.collector_name.clone(),
            collector_type: Some(params.collector_type.clone()),
            description: Some(params.description.clone().unwrap_or_default()),
            category: params.source_category.clone(),
            ..Default::default()
        };
        let filter = params.collector_type.to_lowercase();

        let collector = create_or_adopt(
            EntityKind::Collector,
            &params.collector_name,
            self.api.create_collector(&body),
            || {
                find_by_name(&params.collector_name, |limit, offset| {
                    self.api.list_collectors(&filter, limit, offset)
                })
            },
        )
        .await?
        .into_inner();

        Ok(result(collector_id(collector)?))
    }

    async fn update(&self, params: &CollectorParams) -> Result<CallResult, ResourceError> {
        let id = require_remote_id(&params.collector_id, NAME)?;
        let current = self.api.collector(&id).await?;

        let mut collector = current.value;
        collector.name = params.collector_name.clone();
        if let Some(category) = &params.source_category {
            collector.category = Some(category.clone());
        }
        if let Some(description) = &params.description {
            collector.description = Some(description.clone());
        }

        let updated = self.api.update_collector(&collector, &current.etag).await?;
        let id = updated.id.unwrap_or(id);
        info!(collector_id = %id, "Updated collector");
        Ok(result(id))
    }

    async fn delete(&self, params: &CollectorParams) -> Result<(), ResourceError> {
        let Some(id) = delete_target(&params.collector_id, NAME) else {
            return Ok(());
        };
        delete_if_requested(EntityKind::Collector, id, params.remove_on_delete_stack, || {
            self.api.delete_collector(id)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, ApiErrorKind};
    use crate::testing::{assert_api_error, with_sumo_credentials, ResourceTester};
    use serde_json::json;

    fn props() -> serde_json::Value {
        with_sumo_credentials(json!({
            "CollectorType": "Hosted",
            "CollectorName": "CloudTrailCollector",
            "SourceCategory": "Labs/AWS/CloudTrail",
            "RemoveOnDeleteStack": "true"
        }))
    }

    #[tokio::test]
    async fn test_create() {
        let tester = ResourceTester::new();
        let response = tester.create("Custom::Collector", props()).await.unwrap();

        let id = &response.data[COLLECTOR_ID];
        assert_eq!(response.physical_resource_id, format!("Collector/{}", id));

        let stored = tester.sumo().stored_collector(id).unwrap();
        assert_eq!(stored.category.as_deref(), Some("Labs/AWS/CloudTrail"));
        assert_eq!(stored.description.as_deref(), Some(""));
        assert_eq!(stored.collector_type.as_deref(), Some("Hosted"));
    }

    #[tokio::test]
    async fn test_double_create_adopts() {
        let tester = ResourceTester::new();
        let first = tester.create("Custom::Collector", props()).await.unwrap();
        let second = tester.create("Custom::Collector", props()).await.unwrap();

        assert_eq!(first.physical_resource_id, second.physical_resource_id);
        assert_eq!(tester.sumo().collector_count(), 1);
        assert_eq!(tester.sumo().calls("list_collectors"), 1);
    }

    #[tokio::test]
    async fn test_adopts_across_pages() {
        let tester = ResourceTester::new();
        for i in 0..350 {
            tester.sumo().seed_collector(&format!("filler-{}", i), "Hosted");
        }
        let existing = tester.sumo().seed_collector("CloudTrailCollector", "Hosted");

        let response = tester.create("Custom::Collector", props()).await.unwrap();
        assert_eq!(response.data[COLLECTOR_ID], existing);
        assert_eq!(tester.sumo().calls("list_collectors"), 2);
    }

    #[tokio::test]
    async fn test_collision_without_listing_is_retryable() {
        let tester = ResourceTester::new();
        tester.sumo().seed_collector("CloudTrailCollector", "Hosted");
        tester.sumo().hide_listings();

        let err = tester.create("Custom::Collector", props()).await.unwrap_err();
        assert!(matches!(
            err,
            ResourceError::NotFoundAfterCollision {
                kind: EntityKind::Collector,
                ..
            }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_create_error_propagates() {
        let tester = ResourceTester::new();
        tester.sumo().fail_next(
            "create_collector",
            ApiError::new(
                ApiErrorKind::Other,
                400,
                "collectors.validation.fields.invalid",
                "Invalid category",
            ),
        );

        let result = tester.create("Custom::Collector", props()).await;
        assert_api_error(&result, "collectors.validation.fields.invalid");
        assert_eq!(tester.sumo().calls("list_collectors"), 0);
    }

    #[tokio::test]
    async fn test_update_mutates_supplied_fields() {
        let tester = ResourceTester::new();
        let created = tester.create("Custom::Collector", props()).await.unwrap();

        let mut updated_props = props();
        updated_props["CollectorName"] = json!("CloudTrailCollector-v2");
        updated_props["Description"] = json!("renamed");
        updated_props
            .as_object_mut()
            .unwrap()
            .remove("SourceCategory");

        let updated = tester
            .update("Custom::Collector", &created.physical_resource_id, updated_props)
            .await
            .unwrap();
        assert_eq!(updated.physical_resource_id, created.physical_resource_id);

        let stored = tester
            .sumo()
            .stored_collector(&created.data[COLLECTOR_ID])
            .unwrap();
        assert_eq!(stored.name, "CloudTrailCollector-v2");
        assert_eq!(stored.description.as_deref(), Some("renamed"));
        assert_eq!(stored.category.as_deref(), Some("Labs/AWS/CloudTrail"));
    }

    #[tokio::test]
    async fn test_update_with_stale_etag_fails() {
        let tester = ResourceTester::new();
        let created = tester.create("Custom::Collector", props()).await.unwrap();
        tester.sumo().fail_next(
            "update_collector",
            ApiError::new(ApiErrorKind::Other, 412, "api.precondition.failed", "stale"),
        );

        let result = tester
            .update("Custom::Collector", &created.physical_resource_id, props())
            .await;
        assert_api_error(&result, "api.precondition.failed");
    }

    #[tokio::test]
    async fn test_delete_honours_flag() {
        let tester = ResourceTester::new();
        let created = tester.create("Custom::Collector", props()).await.unwrap();

        let mut keep = props();
        keep["RemoveOnDeleteStack"] = json!("false");
        tester
            .delete("Custom::Collector", &created.physical_resource_id, keep)
            .await
            .unwrap();
        assert_eq!(tester.sumo().calls("delete_collector"), 0);
        assert_eq!(tester.sumo().collector_count(), 1);

        tester
            .delete("Custom::Collector", &created.physical_resource_id, props())
            .await
            .unwrap();
        assert_eq!(tester.sumo().collector_count(), 0);

        // Already gone.
        tester
            .delete("Custom::Collector", &created.physical_resource_id, props())
            .await
            .unwrap();
        assert_eq!(tester.sumo().calls("delete_collector"), 2);
    }

    #[tokio::test]
    async fn test_delete_defaults_to_keep() {
        let tester = ResourceTester::new();
        let id = tester.sumo().seed_collector("shared", "Hosted");

        let mut unflagged = props();
        unflagged.as_object_mut().unwrap().remove("RemoveOnDeleteStack");
        tester
            .delete("Custom::Collector", &format!("Collector/{}", id), unflagged)
            .await
            .unwrap();
        assert_eq!(tester.sumo().calls("delete_collector"), 0);
    }

    #[tokio::test]
    async fn test_delete_with_malformed_physical_id_is_noop() {
        let tester = ResourceTester::new();
        tester
            .delete("Custom::Collector", "not-a-physical-id", props())
            .await
            .unwrap();
        assert_eq!(tester.sumo().calls("delete_collector"), 0);
    }

    #[test]
    fn test_extract_params() {
        let api = Arc::new(crate::testing::FakeSumo::new());
        let resource = CollectorResource::new(api);
        let event = LifecycleEvent::new(
            crate::types::RequestKind::Update,
            "Custom::Collector",
            props().as_object().unwrap().clone(),
        )
        .with_physical_id("Collector/abc123");

        let params = resource.extract_params(&event).unwrap();
        assert_eq!(params.collector_id.as_deref(), Some("abc123"));
        assert_eq!(params.collector_type, "Hosted");
        assert!(params.remove_on_delete_stack);
    }
}
