//! Sumo Logic API capabilities and the entities they exchange.
//!
//! Field names follow the vendor's JSON so a transport can serialize these
//! types directly. Unknown fields are carried in a flattened map so a
//! fetch-modify-write cycle never drops server-side settings.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{de_opt_id, ApiError, Named, Versioned};
use crate::poll::JobStatusReport;

/// A collector: a named ingestion endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collector {
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A source attached to a collector.
///
/// Source bodies vary a lot by source type, so only the fields the handlers
/// read are typed; everything else lives in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Ingestion URL, present on HTTP sources.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Source {
    /// Create a source body with only a name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set a field on the source body.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    /// Read a field from the source body.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A header sent with every webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An outbound webhook connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub connection_type: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_type: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Connection {
    /// Set a header, replacing any header with the same name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.headers.iter_mut().find(|h| h.name == name) {
            Some(header) => header.value = value,
            None => self.headers.push(Header::new(name, value)),
        }
    }

    /// Look up a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }
}

/// A child entry in a content folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderChild {
    pub id: String,
    pub name: String,
}

/// A content folder in the library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub children: Vec<FolderChild>,
}

/// Handle returned by calls that start a server-side job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub id: String,
}

/// Request body for the app install API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInstallRequest {
    pub name: String,
    pub description: String,
    pub data_source_values: Map<String, Value>,
    pub destination_folder_id: String,
}

/// A search job submitted to the log platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchJobRequest {
    pub query: String,
    /// Start of the search window, epoch milliseconds.
    pub from: i64,
    /// End of the search window, epoch milliseconds.
    pub to: i64,
}

/// Status of a search job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchJobStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub pending_errors: Vec<String>,
}

impl Named for Collector {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Source {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Connection {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Collector management.
#[async_trait]
pub trait CollectorApi: Send + Sync {
    async fn create_collector(&self, collector: &Collector) -> Result<Collector, ApiError>;

    async fn collector(&self, collector_id: &str) -> Result<Versioned<Collector>, ApiError>;

    async fn update_collector(
        &self,
        collector: &Collector,
        etag: &str,
    ) -> Result<Collector, ApiError>;

    async fn delete_collector(&self, collector_id: &str) -> Result<(), ApiError>;

    /// List one page of collectors, filtered by lower-cased collector type.
    async fn list_collectors(
        &self,
        filter_type: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Collector>, ApiError>;
}

/// Source management on a collector.
#[async_trait]
pub trait SourceApi: Send + Sync {
    async fn create_source(&self, collector_id: &str, source: &Source)
        -> Result<Source, ApiError>;

    async fn source(
        &self,
        collector_id: &str,
        source_id: &str,
    ) -> Result<Versioned<Source>, ApiError>;

    async fn update_source(
        &self,
        collector_id: &str,
        source: &Source,
        etag: &str,
    ) -> Result<Source, ApiError>;

    async fn delete_source(&self, collector_id: &str, source_id: &str) -> Result<(), ApiError>;

    async fn list_sources(
        &self,
        collector_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Source>, ApiError>;
}

/// Webhook connection management.
#[async_trait]
pub trait ConnectionApi: Send + Sync {
    async fn create_connection(&self, connection: &Connection) -> Result<Connection, ApiError>;

    async fn connection(&self, connection_id: &str) -> Result<Versioned<Connection>, ApiError>;

    async fn update_connection(
        &self,
        connection: &Connection,
        etag: &str,
    ) -> Result<Connection, ApiError>;

    async fn delete_connection(
        &self,
        connection_id: &str,
        connection_type: &str,
    ) -> Result<(), ApiError>;

    async fn list_connections(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Connection>, ApiError>;
}

/// Content library folders.
#[async_trait]
pub trait FolderApi: Send + Sync {
    /// The caller's personal folder, including its direct children.
    async fn personal_folder(&self) -> Result<Folder, ApiError>;

    async fn create_folder(
        &self,
        name: &str,
        description: &str,
        parent_id: &str,
    ) -> Result<Folder, ApiError>;

    async fn delete_folder(&self, folder_id: &str) -> Result<(), ApiError>;
}

/// Content import into a folder.
#[async_trait]
pub trait ContentApi: Send + Sync {
    async fn import_content(
        &self,
        folder_id: &str,
        content: &Value,
        overwrite: bool,
    ) -> Result<JobHandle, ApiError>;

    async fn import_status(
        &self,
        folder_id: &str,
        job_id: &str,
    ) -> Result<JobStatusReport, ApiError>;
}

/// Catalog app installation.
#[async_trait]
pub trait AppApi: Send + Sync {
    async fn install_app(
        &self,
        app_id: &str,
        request: &AppInstallRequest,
    ) -> Result<JobHandle, ApiError>;

    async fn install_status(&self, job_id: &str) -> Result<JobStatusReport, ApiError>;
}

/// Log search jobs.
#[async_trait]
pub trait SearchApi: Send + Sync {
    async fn create_search_job(&self, request: &SearchJobRequest) -> Result<JobHandle, ApiError>;

    async fn search_job_status(&self, job_id: &str) -> Result<SearchJobStatus, ApiError>;
}

/// Everything a Sumo Logic session offers.
pub trait SumoApi:
    CollectorApi + SourceApi + ConnectionApi + FolderApi + ContentApi + AppApi + SearchApi
{
}

impl<T> SumoApi for T where
    T: CollectorApi + SourceApi + ConnectionApi + FolderApi + ContentApi + AppApi + SearchApi
{
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collector_roundtrip_keeps_unknown_fields() {
        let wire = json!({
            "id": 108920384,
            "name": "CloudTrailCollector",
            "collectorType": "Hosted",
            "category": "Labs/AWS/CloudTrail",
            "timeZone": "UTC",
            "alive": true
        });
        let collector: Collector = serde_json::from_value(wire).unwrap();
        assert_eq!(collector.id.as_deref(), Some("108920384"));
        assert_eq!(collector.collector_type.as_deref(), Some("Hosted"));
        assert_eq!(collector.extra["timeZone"], "UTC");

        let back = serde_json::to_value(&collector).unwrap();
        assert_eq!(back["timeZone"], "UTC");
        assert_eq!(back["alive"], true);
        assert_eq!(back["id"], "108920384");
    }

    #[test]
    fn test_source_fields() {
        let mut source = Source::named("CloudTrailEvents");
        source.set("sourceType", "HTTP");
        source.set("messagePerRequest", false);

        let wire = serde_json::to_value(&source).unwrap();
        assert_eq!(
            wire,
            json!({"name": "CloudTrailEvents", "sourceType": "HTTP", "messagePerRequest": false})
        );
        assert_eq!(source.get("sourceType"), Some(&json!("HTTP")));
    }

    #[test]
    fn test_connection_headers() {
        let mut connection = Connection {
            name: "SecurityHub".to_string(),
            connection_type: "WebhookDefinition".to_string(),
            ..Default::default()
        };
        connection.set_header("accessKey", "AKIA1");
        connection.set_header("accessKey", "AKIA2");
        connection.set_header("awsRegion", "us-east-1");

        assert_eq!(connection.headers.len(), 2);
        assert_eq!(connection.header("accessKey"), Some("AKIA2"));

        let wire = serde_json::to_value(&connection).unwrap();
        assert_eq!(wire["type"], "WebhookDefinition");
    }

    #[test]
    fn test_folder_children_default() {
        let folder: Folder = serde_json::from_value(json!({"id": "0000000000A1B2C3"})).unwrap();
        assert!(folder.children.is_empty());
    }
}
