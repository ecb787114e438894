//! Lifecycle dispatcher.
//!
//! One [`Dispatcher::dispatch`] call handles one lifecycle event:
//!
//! 1. strip the optional `Custom::` prefix and look the type up in the
//!    [`ResourceRegistry`];
//! 2. validate the properties against the type's schema (Create and Update
//!    only, so a stack can always be torn down);
//! 3. build the handler through its factory and run the lifecycle method;
//! 4. shape the [`LifecycleResponse`].

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, info, instrument};

use crate::error::ResourceError;
use crate::registry::ResourceRegistry;
use crate::resources::HandlerContext;
use crate::types::{LifecycleEvent, LifecycleResponse, PhysicalResourceId, RequestKind};
use crate::validation::validate_result;

/// Routes lifecycle events to resource handlers.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<ResourceRegistry>,
    context: HandlerContext,
}

impl Dispatcher {
    pub fn new(registry: impl Into<Arc<ResourceRegistry>>, context: HandlerContext) -> Self {
        Self {
            registry: registry.into(),
            context,
        }
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Handle one lifecycle event.
    #[instrument(
        skip(self, event),
        name = "dispatch",
        fields(resource_type = %event.type_name(), request_kind = %event.request_kind)
    )]
    pub async fn dispatch(
        &self,
        event: &LifecycleEvent,
    ) -> Result<LifecycleResponse, ResourceError> {
        match self.run(event).await {
            Ok(response) => {
                info!(
                    physical_resource_id = %response.physical_resource_id,
                    "Dispatch completed successfully"
                );
                Ok(response)
            },
            Err(e) => {
                error!(error = %e, retryable = e.is_retryable(), "Dispatch failed");
                Err(e)
            },
        }
    }

    async fn run(&self, event: &LifecycleEvent) -> Result<LifecycleResponse, ResourceError> {
        let type_name = event.type_name();
        let entry = self.registry.get(type_name)?;

        debug!(
            properties = ?entry.schema.redact(&event.resource_properties),
            physical_resource_id = ?event.physical_resource_id,
            "Dispatching"
        );

        if event.request_kind != RequestKind::Delete {
            let props = Value::Object(event.resource_properties.clone());
            validate_result(&entry.schema, &props).map_err(ResourceError::Validation)?;
        }

        let handler = (entry.factory)(&self.context, &event.properties())?;
        let result = handler.handle(event).await?;

        Ok(match result {
            Some(result) => LifecycleResponse {
                data: result.output_attributes,
                physical_resource_id: PhysicalResourceId::new(type_name, result.physical_id)
                    .to_string(),
            },
            None => LifecycleResponse {
                data: Default::default(),
                physical_resource_id: event.physical_resource_id.clone().unwrap_or_default(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{assert_error_contains, with_sumo_credentials, ResourceTester};
    use serde_json::json;

    fn collector_props() -> Value {
        with_sumo_credentials(json!({
            "CollectorName": "dispatch-collector",
            "RemoveOnDeleteStack": "true"
        }))
    }

    #[tokio::test]
    async fn test_unknown_resource_type() {
        let tester = ResourceTester::new();
        let err = tester
            .create("Custom::Widget", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::UnknownResource(ref name) if name == "Widget"));
    }

    #[tokio::test]
    async fn test_reserved_base_names_do_not_dispatch() {
        let tester = ResourceTester::new();
        let err = tester
            .create("Custom::SumoResource", collector_props())
            .await
            .unwrap_err();
        assert!(matches!(err, ResourceError::UnknownResource(_)));
    }

    #[tokio::test]
    async fn test_prefix_is_optional() {
        let tester = ResourceTester::new();
        let with_prefix = tester.create("Custom::Collector", collector_props()).await.unwrap();
        let without = tester.create("Collector", collector_props()).await.unwrap();
        assert_eq!(with_prefix.physical_resource_id, without.physical_resource_id);
        assert!(with_prefix.physical_resource_id.starts_with("Collector/"));
    }

    #[tokio::test]
    async fn test_validation_blocks_create() {
        let tester = ResourceTester::new();
        let err = tester
            .create("Custom::Collector", json!({"CollectorName": "no-credentials"}))
            .await
            .unwrap_err();
        match &err {
            ResourceError::Validation(diagnostics) => {
                assert_error_contains(diagnostics, "SumoAccessID");
            },
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(tester.sumo().calls("create_collector"), 0);
    }

    #[tokio::test]
    async fn test_delete_echoes_physical_id() {
        let tester = ResourceTester::new();
        let created = tester.create("Custom::Collector", collector_props()).await.unwrap();

        let response = tester
            .delete("Custom::Collector", &created.physical_resource_id, collector_props())
            .await
            .unwrap();
        assert_eq!(response.physical_resource_id, created.physical_resource_id);
        assert!(response.data.is_empty());
    }

    #[tokio::test]
    async fn test_delete_skips_validation() {
        let tester = ResourceTester::new();
        let mut props = collector_props();
        props.as_object_mut().unwrap().remove("CollectorName");

        let response = tester
            .delete("Custom::Collector", "Collector/100000099", props)
            .await;
        tokio_test::assert_ok!(response);
    }

    #[tokio::test]
    async fn test_update_without_physical_id() {
        let tester = ResourceTester::new();
        let event = LifecycleEvent::new(
            RequestKind::Update,
            "Custom::Collector",
            collector_props().as_object().unwrap().clone(),
        );
        let err = tokio_test::assert_err!(tester.dispatch(&event).await);
        assert!(matches!(err, ResourceError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_update_parses_physical_id() {
        let tester = ResourceTester::new();
        let id = tester.sumo().seed_collector("dispatch-collector", "Hosted");

        let response = tester
            .update("Custom::Collector", &format!("Collector/{}", id), collector_props())
            .await
            .unwrap();
        assert_eq!(response.physical_resource_id, format!("Collector/{}", id));
        assert_eq!(response.data["COLLECTOR_ID"], id);
    }

    #[tokio::test]
    async fn test_cloudformation_event_shape() {
        let tester = ResourceTester::new();
        let raw = json!({
            "RequestType": "Create",
            "ResponseURL": "https://cloudformation-custom-resource-response.s3.amazonaws.com/",
            "StackId": "arn:aws:cloudformation:us-east-1:123456789012:stack/sumo/guid",
            "RequestId": "b3d1c7a0",
            "ResourceType": "Custom::Collector",
            "LogicalResourceId": "SumoHostedCollector",
            "ResourceProperties": collector_props()
        });
        let event: LifecycleEvent = serde_json::from_value(raw).unwrap();
        assert_eq!(event.logical_resource_id.as_deref(), Some("SumoHostedCollector"));

        let response = tester.dispatch(&event).await.unwrap();
        let wire = serde_json::to_value(&response).unwrap();
        assert!(wire["PhysicalResourceId"]
            .as_str()
            .unwrap()
            .starts_with("Collector/"));
        assert!(wire["Data"]["COLLECTOR_ID"].is_string());
    }

    #[test]
    fn test_registry_accessor() {
        let tester = ResourceTester::new();
        assert_eq!(tester.dispatcher().registry().len(), 6);
    }
}
