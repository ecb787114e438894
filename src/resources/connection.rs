//! Outbound webhook connections (AWS Security Hub).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use super::{
    delete_target, previous_remote_id, require_remote_id, HandlerContext, Resource,
    ResourceHandler,
};
use crate::api::{Connection, ConnectionApi, SumoApi};
use crate::config::SumoConfig;
use crate::error::ResourceError;
use crate::protocol::{create_or_adopt, delete_if_requested, find_by_name};
use crate::schema::{Attribute, Schema, REDACTED};
use crate::types::{CallResult, EntityKind, LifecycleEvent, Properties};

/// Registry key.
pub const NAME: &str = "Connections";

/// Output attribute carrying the connection id.
pub const CONNECTION_ID: &str = "CONNECTION_ID";

const DEFAULT_CONNECTION_TYPE: &str = "WebhookDefinition";

/// Connection type passed to the delete endpoint.
const DELETE_CONNECTION_TYPE: &str = "WebhookConnection";

/// Payload template sent with each Security Hub finding.
pub const DEFAULT_PAYLOAD: &str = r#"{"Types":"HIPAA Controls","Description":"This search","GeneratorID":"InsertFindingsScheduledSearch","Severity":30,"SourceUrl":"https://service.sumologic.com/ui/#/search/RmC8kAUGZbXrkj2rOFmUxmHtzINUgfJnFplh3QWY","ComplianceStatus":"FAILED","Rows":"[{\"Timeslice\":1542719060000,\"finding_time\":\"1542719060000\",\"item_name\":\"A nice dashboard.png\",\"title\":\"Vulnerability\",\"resource_id\":\"10.178.11.43\",\"resource_type\":\"Other\"}]"}"#;

pub fn schema() -> Schema {
    Schema::new()
        .with_description("A webhook connection")
        .with_sumo_credentials()
        .with_attribute(
            "Type",
            Attribute::optional_string()
                .with_description("Connection type, WebhookDefinition by default"),
        )
        .with_attribute("Name", Attribute::required_string())
        .with_attribute("Description", Attribute::optional_string())
        .with_attribute("URL", Attribute::optional_string())
        .with_attribute("UserName", Attribute::optional_string())
        .with_attribute("Password", Attribute::optional_string().sensitive())
        .with_attribute("Region", Attribute::optional_string())
        .with_attribute("ServiceName", Attribute::optional_string())
        .with_attribute("WebhookType", Attribute::optional_string())
        .with_remove_on_delete()
}

pub fn factory(
    ctx: &HandlerContext,
    props: &Properties<'_>,
) -> Result<Box<dyn ResourceHandler>, ResourceError> {
    let api = ctx.connector.sumo(&SumoConfig::from_properties(props)?)?;
    Ok(Box::new(ConnectionResource::new(api)))
}

#[derive(Clone, PartialEq)]
pub struct ConnectionParams {
    pub connection_id: Option<String>,
    pub connection_type: String,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub region: Option<String>,
    pub service_name: Option<String>,
    pub webhook_type: Option<String>,
    pub remove_on_delete_stack: bool,
}

impl ConnectionParams {
    /// Header name and value for every supplied credential and routing field.
    fn headers(&self) -> Vec<(&'static str, &str)> {
        [
            ("accessKey", &self.username),
            ("secretKey", &self.password),
            ("awsRegion", &self.region),
            ("serviceName", &self.service_name),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("connection_id", &self.connection_id)
            .field("connection_type", &self.connection_type)
            .field("name", &self.name)
            .field("description", &self.description)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("region", &self.region)
            .field("service_name", &self.service_name)
            .field("webhook_type", &self.webhook_type)
            .field("remove_on_delete_stack", &self.remove_on_delete_stack)
            .finish()
    }
}

pub struct ConnectionResource<C: ?Sized + ConnectionApi = dyn SumoApi> {
    api: Arc<C>,
}

impl<C: ?Sized + ConnectionApi> ConnectionResource<C> {
    pub fn new(api: Arc<C>) -> Self {
        Self { api }
    }
}

fn result(
    connection: Connection,
    fallback_id: Option<String>,
) -> Result<CallResult, ResourceError> {
    let id = connection
        .id
        .or(fallback_id)
        .ok_or_else(|| ResourceError::Decode("connection response has no id".to_string()))?;
    Ok(CallResult::new(id.clone()).with_attribute(CONNECTION_ID, id))
}

#[async_trait]
impl<C: ?Sized + ConnectionApi> Resource for ConnectionResource<C> {
    type Params = ConnectionParams;

    fn extract_params(&self, event: &LifecycleEvent) -> Result<ConnectionParams, ResourceError> {
        let props = event.properties();
        Ok(ConnectionParams {
            connection_id: previous_remote_id(event)?,
            connection_type: props
                .string("Type")
                .unwrap_or_else(|| DEFAULT_CONNECTION_TYPE.to_string()),
            name: props.string("Name").unwrap_or_default(),
            description: props.string("Description"),
            url: props.string("URL"),
            username: props.string("UserName"),
            password: props.string("Password"),
            region: props.string("Region"),
            service_name: props.string("ServiceName"),
            webhook_type: props.string("WebhookType"),
            remove_on_delete_stack: props.remove_on_delete_stack(false),
        })
    }

    async fn create(&self, params: &ConnectionParams) -> Result<CallResult, ResourceError> {
        let mut body = Connection {
            connection_type: params.connection_type.clone(),
            name: params.name.clone(),
            description: params.description.clone(),
            url: params.url.clone(),
            default_payload: Some(DEFAULT_PAYLOAD.to_string()),
            webhook_type: params.webhook_type.clone(),
            ..Default::default()
        };
        for (name, value) in params.headers() {
            body.set_header(name, value);
        }

        let connection = create_or_adopt(
            EntityKind::Connection,
            &params.name,
            self.api.create_connection(&body),
            || find_by_name(&params.name, |limit, offset| self.api.list_connections(limit, offset)),
        )
        .await?
        .into_inner();

        result(connection, None)
    }

    async fn update(&self, params: &ConnectionParams) -> Result<CallResult, ResourceError> {
        let id = require_remote_id(&params.connection_id, NAME)?;
        let current = self.api.connection(&id).await?;

        let mut connection = current.value;
        connection.connection_type = params.connection_type.clone();
        if !params.name.is_empty() {
            connection.name = params.name.clone();
        }
        if params.description.is_some() {
            connection.description = params.description.clone();
        }
        if params.url.is_some() {
            connection.url = params.url.clone();
        }
        if params.webhook_type.is_some() {
            connection.webhook_type = params.webhook_type.clone();
        }
        for (name, value) in params.headers() {
            connection.set_header(name, value);
        }

        let updated = self.api.update_connection(&connection, &current.etag).await?;
        info!(connection_id = %id, "Updated connection");
        result(updated, Some(id))
    }

    async fn delete(&self, params: &ConnectionParams) -> Result<(), ResourceError> {
        let Some(id) = delete_target(&params.connection_id, NAME) else {
            return Ok(());
        };
        delete_if_requested(EntityKind::Connection, id, params.remove_on_delete_stack, || {
            self.api.delete_connection(id, DELETE_CONNECTION_TYPE)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{with_sumo_credentials, ResourceTester};
    use serde_json::{json, Value};

    fn props() -> Value {
        with_sumo_credentials(json!({
            "Type": "WebhookDefinition",
            "Name": "SecurityHubConnection",
            "Description": "Sends findings to Security Hub",
            "URL": "https://lambda-url.us-east-1.on.aws/",
            "UserName": "AKIAEXAMPLE",
            "Password": "secret-key",
            "Region": "us-east-1",
            "ServiceName": "execute-api",
            "WebhookType": "AWSLambda",
            "RemoveOnDeleteStack": "true"
        }))
    }

    #[tokio::test]
    async fn test_create() {
        let tester = ResourceTester::new();
        let response = tester.create("Custom::Connections", props()).await.unwrap();

        let id = &response.data[CONNECTION_ID];
        assert_eq!(response.physical_resource_id, format!("Connections/{}", id));

        let stored = tester.sumo().stored_connection(id).unwrap();
        assert_eq!(stored.connection_type, "WebhookDefinition");
        assert_eq!(stored.webhook_type.as_deref(), Some("AWSLambda"));
        assert_eq!(stored.header("accessKey"), Some("AKIAEXAMPLE"));
        assert_eq!(stored.header("secretKey"), Some("secret-key"));
        assert_eq!(stored.header("awsRegion"), Some("us-east-1"));
        assert_eq!(stored.header("serviceName"), Some("execute-api"));

        let payload: Value =
            serde_json::from_str(stored.default_payload.as_deref().unwrap()).unwrap();
        assert_eq!(payload["GeneratorID"], "InsertFindingsScheduledSearch");
        let rows: Value = serde_json::from_str(payload["Rows"].as_str().unwrap()).unwrap();
        assert_eq!(rows[0]["resource_id"], "10.178.11.43");
    }

    #[tokio::test]
    async fn test_double_create_adopts_by_name() {
        let tester = ResourceTester::new();
        let first = tester.create("Custom::Connections", props()).await.unwrap();
        let second = tester.create("Custom::Connections", props()).await.unwrap();

        assert_eq!(first.physical_resource_id, second.physical_resource_id);
        assert_eq!(tester.sumo().connection_count(), 1);
        assert_eq!(tester.sumo().calls("list_connections"), 1);
    }

    #[tokio::test]
    async fn test_update_writes_connection() {
        let tester = ResourceTester::new();
        let created = tester.create("Custom::Connections", props()).await.unwrap();

        let mut updated_props = props();
        updated_props["URL"] = json!("https://lambda-url.eu-west-1.on.aws/");
        updated_props["Password"] = json!("rotated-key");

        tester
            .update("Custom::Connections", &created.physical_resource_id, updated_props)
            .await
            .unwrap();
        assert_eq!(tester.sumo().calls("update_connection"), 1);
        assert_eq!(tester.sumo().calls("update_collector"), 0);

        let stored = tester
            .sumo()
            .stored_connection(&created.data[CONNECTION_ID])
            .unwrap();
        assert_eq!(stored.url.as_deref(), Some("https://lambda-url.eu-west-1.on.aws/"));
        assert_eq!(stored.header("secretKey"), Some("rotated-key"));
        assert_eq!(stored.headers.len(), 4);
    }

    #[tokio::test]
    async fn test_delete_uses_webhook_connection_type() {
        let tester = ResourceTester::new();
        let created = tester.create("Custom::Connections", props()).await.unwrap();

        tester
            .delete("Custom::Connections", &created.physical_resource_id, props())
            .await
            .unwrap();
        assert_eq!(tester.sumo().connection_count(), 0);
        assert_eq!(tester.sumo().deleted_connection_types(), vec!["WebhookConnection"]);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let tester = ResourceTester::new();
        let mut renamed = props();
        renamed["Description"] = json!("Rotated");

        let updated = tester
            .lifecycle_crud("Custom::Connections", props(), renamed)
            .await
            .unwrap();
        assert!(updated.physical_resource_id.starts_with("Connections/"));
        assert_eq!(tester.sumo().calls("create_connection"), 1);
        assert_eq!(tester.sumo().calls("update_connection"), 1);
        assert_eq!(tester.sumo().connection_count(), 0);
    }

    #[test]
    fn test_debug_redacts_password() {
        let resource = ConnectionResource::new(Arc::new(crate::testing::FakeSumo::new()));
        let event = LifecycleEvent::new(
            crate::types::RequestKind::Create,
            "Custom::Connections",
            props().as_object().unwrap().clone(),
        );
        let params = resource.extract_params(&event).unwrap();
        let rendered = format!("{:?}", params);
        assert!(!rendered.contains("secret-key"));
        assert!(rendered.contains(REDACTED));
    }
}
