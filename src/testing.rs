//! Testing utilities for resource handlers.
//!
//! This module provides in-memory stand-ins for every remote service the
//! handlers talk to, and a [`ResourceTester`] that drives the dispatcher
//! with lifecycle events built from plain JSON properties.
//!
//! # Example
//!
//! ```ignore
//! use sumo_cfn_resources::testing::{with_sumo_credentials, ResourceTester};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_create_collector() {
//!     let tester = ResourceTester::new();
//!
//!     let response = tester
//!         .create("Custom::Collector", with_sumo_credentials(json!({
//!             "CollectorName": "CloudTrailCollector"
//!         })))
//!         .await
//!         .unwrap();
//!
//!     assert!(response.data.contains_key("COLLECTOR_ID"));
//!     assert_eq!(tester.sumo().calls("create_collector"), 1);
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::api::{
    ApiError, ApiErrorKind, AppApi, AppInstallRequest, Collector, CollectorApi, Connection,
    ConnectionApi, Connector, ContentApi, Folder, FolderApi, FolderChild, JobHandle, SearchApi,
    SearchJobRequest, SearchJobStatus, Source, SourceApi, SumoApi, TemplateStore, TrailApi,
    TrailInfo, TrailParams, Versioned,
};
use crate::config::{AwsConfig, PollOptions, SumoConfig};
use crate::dispatch::Dispatcher;
use crate::error::ResourceError;
use crate::poll::{Clock, JobStatusReport, Sleeper};
use crate::registry::ResourceRegistry;
use crate::resources::HandlerContext;
use crate::schema::{Diagnostic, DiagnosticSeverity};
use crate::types::{LifecycleEvent, LifecycleResponse, RequestKind};

/// Account id used in fake trail ARNs.
pub const FAKE_ACCOUNT_ID: &str = "123456789012";

/// Instant reported by [`FixedClock::default`]: 2024-03-05 14:30:15.123456 UTC.
pub const FIXED_TIMESTAMP: (i64, u32) = (1_709_649_015, 123_456_000);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(what: &str, id: &str) -> ApiError {
    ApiError::new(
        ApiErrorKind::NotFound,
        404,
        "not_found",
        format!("{} {} does not exist", what, id),
    )
}

// =========================================================================
// Sumo Logic
// =========================================================================

#[derive(Debug)]
struct Stored<T> {
    value: T,
    revision: u64,
}

impl<T: Clone> Stored<T> {
    fn new(value: T) -> Self {
        Self { value, revision: 1 }
    }

    fn versioned(&self) -> Versioned<T> {
        Versioned::new(self.value.clone(), etag(self.revision))
    }

    fn check_etag(&self, supplied: &str) -> Result<(), ApiError> {
        if supplied == etag(self.revision) {
            Ok(())
        } else {
            Err(ApiError::new(
                ApiErrorKind::Other,
                412,
                "api.precondition.failed",
                "The resource has been modified since it was fetched",
            ))
        }
    }
}

fn etag(revision: u64) -> String {
    format!("\"rev-{}\"", revision)
}

#[derive(Debug, Clone)]
struct FolderEntry {
    name: String,
    description: String,
    parent: Option<String>,
}

#[derive(Debug, Default)]
struct SumoState {
    next_id: u64,
    collectors: BTreeMap<String, Stored<Collector>>,
    sources: BTreeMap<String, BTreeMap<String, Stored<Source>>>,
    connections: BTreeMap<String, Stored<Connection>>,
    folders: BTreeMap<String, FolderEntry>,
    personal_folder_id: String,
    calls: HashMap<String, usize>,
    failures: HashMap<String, VecDeque<ApiError>>,
    hide_listings: bool,
    install_statuses: VecDeque<JobStatusReport>,
    import_statuses: VecDeque<JobStatusReport>,
    last_install_folder: Option<String>,
    installs: Vec<(String, AppInstallRequest)>,
    imports: Vec<(String, Value, bool)>,
    searches: Vec<SearchJobRequest>,
    search_status: SearchJobStatus,
    deleted_connection_types: Vec<String>,
}

impl SumoState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        format!("{}", 100_000_000 + self.next_id)
    }

    fn add_folder(&mut self, name: &str, description: &str, parent: Option<String>) -> String {
        let id = self.next_id();
        self.folders.insert(
            id.clone(),
            FolderEntry {
                name: name.to_string(),
                description: description.to_string(),
                parent,
            },
        );
        id
    }

    fn child_named(&self, parent_id: &str, name: &str) -> Option<String> {
        self.folders
            .iter()
            .find(|(_, f)| f.parent.as_deref() == Some(parent_id) && f.name == name)
            .map(|(id, _)| id.clone())
    }

    fn folder_view(&self, id: &str) -> Option<Folder> {
        let entry = self.folders.get(id)?;
        let children = self
            .folders
            .iter()
            .filter(|(_, f)| f.parent.as_deref() == Some(id))
            .map(|(child_id, f)| FolderChild {
                id: child_id.clone(),
                name: f.name.clone(),
            })
            .collect();
        Some(Folder {
            id: id.to_string(),
            name: entry.name.clone(),
            children,
        })
    }

    fn remove_folder_tree(&mut self, id: &str) {
        let children: Vec<String> = self
            .folders
            .iter()
            .filter(|(_, f)| f.parent.as_deref() == Some(id))
            .map(|(child_id, _)| child_id.clone())
            .collect();
        for child in children {
            self.remove_folder_tree(&child);
        }
        self.folders.remove(id);
    }
}

/// In-memory Sumo Logic account.
///
/// Behaves like the real API where the handlers care: creates collide on
/// duplicate names with the vendor's error codes, writes check the ETag,
/// deletes of unknown ids answer 404, and listings are paginated.
#[derive(Debug)]
pub struct FakeSumo {
    state: Mutex<SumoState>,
}

impl Default for FakeSumo {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeSumo {
    /// Create an empty account with a personal folder.
    pub fn new() -> Self {
        let mut state = SumoState {
            search_status: SearchJobStatus {
                state: "DONE GATHERING RESULTS".to_string(),
                pending_errors: Vec::new(),
            },
            ..Default::default()
        };
        state.personal_folder_id = state.add_folder("Personal", "", None);
        Self {
            state: Mutex::new(state),
        }
    }

    /// Record a call to `op` and fail it if a failure was queued.
    fn begin(&self, op: &str) -> Result<MutexGuard<'_, SumoState>, ApiError> {
        let mut state = lock(&self.state);
        *state.calls.entry(op.to_string()).or_default() += 1;
        if let Some(err) = state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state)
    }

    /// Number of calls made to the named trait method.
    pub fn calls(&self, op: &str) -> usize {
        lock(&self.state).calls.get(op).copied().unwrap_or(0)
    }

    /// Make the next call to `op` fail with `err`.
    pub fn fail_next(&self, op: &str, err: ApiError) {
        lock(&self.state)
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    /// Make every listing come back empty, as if the index lagged behind.
    pub fn hide_listings(&self) {
        lock(&self.state).hide_listings = true;
    }

    pub fn seed_collector(&self, name: &str, collector_type: &str) -> String {
        let mut state = lock(&self.state);
        let id = state.next_id();
        let collector = Collector {
            id: Some(id.clone()),
            name: name.to_string(),
            collector_type: Some(collector_type.to_string()),
            ..Default::default()
        };
        state.collectors.insert(id.clone(), Stored::new(collector));
        id
    }

    pub fn seed_source(&self, collector_id: &str, mut source: Source) -> String {
        let mut state = lock(&self.state);
        let id = state.next_id();
        source.id = Some(id.clone());
        state
            .sources
            .entry(collector_id.to_string())
            .or_default()
            .insert(id.clone(), Stored::new(source));
        id
    }

    pub fn seed_connection(&self, mut connection: Connection) -> String {
        let mut state = lock(&self.state);
        let id = state.next_id();
        connection.id = Some(id.clone());
        state.connections.insert(id.clone(), Stored::new(connection));
        id
    }

    pub fn seed_folder(&self, name: &str, parent_id: &str) -> String {
        lock(&self.state).add_folder(name, "", Some(parent_id.to_string()))
    }

    pub fn personal_folder_id(&self) -> String {
        lock(&self.state).personal_folder_id.clone()
    }

    pub fn stored_collector(&self, collector_id: &str) -> Option<Collector> {
        lock(&self.state)
            .collectors
            .get(collector_id)
            .map(|s| s.value.clone())
    }

    pub fn stored_source(&self, collector_id: &str, source_id: &str) -> Option<Source> {
        lock(&self.state)
            .sources
            .get(collector_id)
            .and_then(|sources| sources.get(source_id))
            .map(|s| s.value.clone())
    }

    pub fn stored_connection(&self, connection_id: &str) -> Option<Connection> {
        lock(&self.state)
            .connections
            .get(connection_id)
            .map(|s| s.value.clone())
    }

    /// A folder with its direct children.
    pub fn stored_folder(&self, folder_id: &str) -> Option<Folder> {
        lock(&self.state).folder_view(folder_id)
    }

    /// Description a folder was created with.
    pub fn folder_description(&self, folder_id: &str) -> Option<String> {
        lock(&self.state)
            .folders
            .get(folder_id)
            .map(|f| f.description.clone())
    }

    pub fn collector_count(&self) -> usize {
        lock(&self.state).collectors.len()
    }

    pub fn source_count(&self, collector_id: &str) -> usize {
        lock(&self.state)
            .sources
            .get(collector_id)
            .map_or(0, BTreeMap::len)
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.state).connections.len()
    }

    /// Statuses returned by successive `install_status` calls.
    ///
    /// Once the script runs out, the job reports success with the folder
    /// the last install created.
    pub fn script_install_statuses(&self, statuses: impl IntoIterator<Item = JobStatusReport>) {
        lock(&self.state).install_statuses.extend(statuses);
    }

    /// Statuses returned by successive `import_status` calls.
    pub fn script_import_statuses(&self, statuses: impl IntoIterator<Item = JobStatusReport>) {
        lock(&self.state).import_statuses.extend(statuses);
    }

    pub fn set_search_status(&self, status: SearchJobStatus) {
        lock(&self.state).search_status = status;
    }

    /// `(app id, request)` for every install.
    pub fn installs(&self) -> Vec<(String, AppInstallRequest)> {
        lock(&self.state).installs.clone()
    }

    /// `(folder id, content, overwrite)` for every import.
    pub fn imports(&self) -> Vec<(String, Value, bool)> {
        lock(&self.state).imports.clone()
    }

    pub fn searches(&self) -> Vec<SearchJobRequest> {
        lock(&self.state).searches.clone()
    }

    pub fn deleted_connection_types(&self) -> Vec<String> {
        lock(&self.state).deleted_connection_types.clone()
    }
}

fn page<T: Clone>(items: impl Iterator<Item = T>, limit: usize, offset: usize) -> Vec<T> {
    items.skip(offset).take(limit).collect()
}

#[async_trait]
impl CollectorApi for FakeSumo {
    async fn create_collector(&self, collector: &Collector) -> Result<Collector, ApiError> {
        let mut state = self.begin("create_collector")?;
        if state.collectors.values().any(|c| c.value.name == collector.name) {
            return Err(ApiError::new(
                ApiErrorKind::Collision,
                400,
                "collectors.validation.name.duplicate",
                "A collector with the same name already exists",
            ));
        }
        let id = state.next_id();
        let mut created = collector.clone();
        created.id = Some(id.clone());
        state.collectors.insert(id, Stored::new(created.clone()));
        Ok(created)
    }

    async fn collector(&self, collector_id: &str) -> Result<Versioned<Collector>, ApiError> {
        let state = self.begin("collector")?;
        state
            .collectors
            .get(collector_id)
            .map(Stored::versioned)
            .ok_or_else(|| not_found("Collector", collector_id))
    }

    async fn update_collector(
        &self,
        collector: &Collector,
        etag: &str,
    ) -> Result<Collector, ApiError> {
        let mut state = self.begin("update_collector")?;
        let id = collector.id.clone().unwrap_or_default();
        let stored = state
            .collectors
            .get_mut(&id)
            .ok_or_else(|| not_found("Collector", &id))?;
        stored.check_etag(etag)?;
        stored.value = collector.clone();
        stored.revision += 1;
        Ok(stored.value.clone())
    }

    async fn delete_collector(&self, collector_id: &str) -> Result<(), ApiError> {
        let mut state = self.begin("delete_collector")?;
        state
            .collectors
            .remove(collector_id)
            .map(|_| ())
            .ok_or_else(|| not_found("Collector", collector_id))
    }

    async fn list_collectors(
        &self,
        filter_type: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Collector>, ApiError> {
        let state = self.begin("list_collectors")?;
        if state.hide_listings {
            return Ok(Vec::new());
        }
        let matching = state.collectors.values().map(|s| &s.value).filter(|c| {
            c.collector_type
                .as_deref()
                .is_some_and(|t| t.to_lowercase() == filter_type)
        });
        Ok(page(matching.cloned(), limit, offset))
    }
}

#[async_trait]
impl SourceApi for FakeSumo {
    async fn create_source(&self, collector_id: &str, source: &Source) -> Result<Source, ApiError> {
        let mut state = self.begin("create_source")?;
        if !state.collectors.contains_key(collector_id) {
            return Err(not_found("Collector", collector_id));
        }
        let duplicate = state
            .sources
            .get(collector_id)
            .is_some_and(|sources| sources.values().any(|s| s.value.name == source.name));
        if duplicate {
            return Err(ApiError::new(
                ApiErrorKind::Collision,
                400,
                "collectors.validation.name.duplicate",
                "A source with the same name already exists",
            ));
        }

        let id = state.next_id();
        let mut created = source.clone();
        created.id = Some(id.clone());
        if source.get("sourceType") == Some(&Value::from("HTTP")) {
            created.url = Some(format!(
                "https://endpoint1.collection.sumologic.com/receiver/v1/http/{}",
                id
            ));
        }
        state
            .sources
            .entry(collector_id.to_string())
            .or_default()
            .insert(id, Stored::new(created.clone()));
        Ok(created)
    }

    async fn source(
        &self,
        collector_id: &str,
        source_id: &str,
    ) -> Result<Versioned<Source>, ApiError> {
        let state = self.begin("source")?;
        state
            .sources
            .get(collector_id)
            .and_then(|sources| sources.get(source_id))
            .map(Stored::versioned)
            .ok_or_else(|| not_found("Source", source_id))
    }

    async fn update_source(
        &self,
        collector_id: &str,
        source: &Source,
        etag: &str,
    ) -> Result<Source, ApiError> {
        let mut state = self.begin("update_source")?;
        let id = source.id.clone().unwrap_or_default();
        let stored = state
            .sources
            .get_mut(collector_id)
            .and_then(|sources| sources.get_mut(&id))
            .ok_or_else(|| not_found("Source", &id))?;
        stored.check_etag(etag)?;
        stored.value = source.clone();
        stored.revision += 1;
        Ok(stored.value.clone())
    }

    async fn delete_source(&self, collector_id: &str, source_id: &str) -> Result<(), ApiError> {
        let mut state = self.begin("delete_source")?;
        state
            .sources
            .get_mut(collector_id)
            .and_then(|sources| sources.remove(source_id))
            .map(|_| ())
            .ok_or_else(|| not_found("Source", source_id))
    }

    async fn list_sources(
        &self,
        collector_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Source>, ApiError> {
        let state = self.begin("list_sources")?;
        if state.hide_listings {
            return Ok(Vec::new());
        }
        let sources = state.sources.get(collector_id).into_iter().flat_map(|s| s.values());
        Ok(page(sources.map(|s| s.value.clone()), limit, offset))
    }
}

#[async_trait]
impl ConnectionApi for FakeSumo {
    async fn create_connection(&self, connection: &Connection) -> Result<Connection, ApiError> {
        let mut state = self.begin("create_connection")?;
        if state
            .connections
            .values()
            .any(|c| c.value.name == connection.name)
        {
            return Err(ApiError::from_response(
                400,
                &json!({"errors": [{
                    "code": "connection:name_already_exists",
                    "message": "A connection with the same name already exists"
                }]}),
            ));
        }
        let id = state.next_id();
        let mut created = connection.clone();
        created.id = Some(id.clone());
        state.connections.insert(id, Stored::new(created.clone()));
        Ok(created)
    }

    async fn connection(&self, connection_id: &str) -> Result<Versioned<Connection>, ApiError> {
        let state = self.begin("connection")?;
        state
            .connections
            .get(connection_id)
            .map(Stored::versioned)
            .ok_or_else(|| not_found("Connection", connection_id))
    }

    async fn update_connection(
        &self,
        connection: &Connection,
        etag: &str,
    ) -> Result<Connection, ApiError> {
        let mut state = self.begin("update_connection")?;
        let id = connection.id.clone().unwrap_or_default();
        let stored = state
            .connections
            .get_mut(&id)
            .ok_or_else(|| not_found("Connection", &id))?;
        stored.check_etag(etag)?;
        stored.value = connection.clone();
        stored.revision += 1;
        Ok(stored.value.clone())
    }

    async fn delete_connection(
        &self,
        connection_id: &str,
        connection_type: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.begin("delete_connection")?;
        state
            .deleted_connection_types
            .push(connection_type.to_string());
        state
            .connections
            .remove(connection_id)
            .map(|_| ())
            .ok_or_else(|| not_found("Connection", connection_id))
    }

    async fn list_connections(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Connection>, ApiError> {
        let state = self.begin("list_connections")?;
        if state.hide_listings {
            return Ok(Vec::new());
        }
        Ok(page(
            state.connections.values().map(|s| s.value.clone()),
            limit,
            offset,
        ))
    }
}

#[async_trait]
impl FolderApi for FakeSumo {
    async fn personal_folder(&self) -> Result<Folder, ApiError> {
        let state = self.begin("personal_folder")?;
        let id = state.personal_folder_id.clone();
        state
            .folder_view(&id)
            .ok_or_else(|| not_found("Folder", &id))
    }

    async fn create_folder(
        &self,
        name: &str,
        description: &str,
        parent_id: &str,
    ) -> Result<Folder, ApiError> {
        let mut state = self.begin("create_folder")?;
        if !state.folders.contains_key(parent_id) {
            return Err(not_found("Folder", parent_id));
        }
        if let Some(existing) = state.child_named(parent_id, name) {
            return Err(ApiError::from_response(
                400,
                &json!({"errors": [{
                    "code": "content:duplicate_content",
                    "message": format!(
                        "Content with name '{}' already exists: ContentId({})",
                        name, existing
                    )
                }]}),
            ));
        }
        let id = state.add_folder(name, description, Some(parent_id.to_string()));
        state
            .folder_view(&id)
            .ok_or_else(|| not_found("Folder", &id))
    }

    async fn delete_folder(&self, folder_id: &str) -> Result<(), ApiError> {
        let mut state = self.begin("delete_folder")?;
        if !state.folders.contains_key(folder_id) {
            return Err(not_found("Folder", folder_id));
        }
        state.remove_folder_tree(folder_id);
        Ok(())
    }
}

#[async_trait]
impl ContentApi for FakeSumo {
    async fn import_content(
        &self,
        folder_id: &str,
        content: &Value,
        overwrite: bool,
    ) -> Result<JobHandle, ApiError> {
        let mut state = self.begin("import_content")?;
        if !state.folders.contains_key(folder_id) {
            return Err(not_found("Folder", folder_id));
        }
        state
            .imports
            .push((folder_id.to_string(), content.clone(), overwrite));

        let name = content.get("name").and_then(Value::as_str).unwrap_or("");
        let description = content
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("");
        match state.child_named(folder_id, name) {
            Some(_) if !overwrite => {
                return Err(ApiError::new(
                    ApiErrorKind::Collision,
                    400,
                    "content:duplicate_content",
                    "Content with the same name already exists",
                ))
            },
            Some(_) => {},
            None => {
                state.add_folder(name, description, Some(folder_id.to_string()));
            },
        }

        let job = state.next_id();
        Ok(JobHandle {
            id: format!("import-{}", job),
        })
    }

    async fn import_status(
        &self,
        _folder_id: &str,
        _job_id: &str,
    ) -> Result<JobStatusReport, ApiError> {
        let mut state = self.begin("import_status")?;
        Ok(state
            .import_statuses
            .pop_front()
            .unwrap_or_else(|| JobStatusReport::success("Import completed")))
    }
}

#[async_trait]
impl AppApi for FakeSumo {
    async fn install_app(
        &self,
        app_id: &str,
        request: &AppInstallRequest,
    ) -> Result<JobHandle, ApiError> {
        let mut state = self.begin("install_app")?;
        if !state.folders.contains_key(&request.destination_folder_id) {
            return Err(not_found("Folder", &request.destination_folder_id));
        }
        state.installs.push((app_id.to_string(), request.clone()));
        let folder = state.add_folder(
            &request.name,
            &request.description,
            Some(request.destination_folder_id.clone()),
        );
        state.last_install_folder = Some(folder);

        let job = state.next_id();
        Ok(JobHandle {
            id: format!("install-{}", job),
        })
    }

    async fn install_status(&self, _job_id: &str) -> Result<JobStatusReport, ApiError> {
        let mut state = self.begin("install_status")?;
        if let Some(report) = state.install_statuses.pop_front() {
            return Ok(report);
        }
        let folder = state.last_install_folder.clone().unwrap_or_default();
        Ok(JobStatusReport::success(format!(
            "App installed successfully:{}",
            folder
        )))
    }
}

#[async_trait]
impl SearchApi for FakeSumo {
    async fn create_search_job(&self, request: &SearchJobRequest) -> Result<JobHandle, ApiError> {
        let mut state = self.begin("create_search_job")?;
        state.searches.push(request.clone());
        let job = state.next_id();
        Ok(JobHandle {
            id: format!("search-{}", job),
        })
    }

    async fn search_job_status(&self, _job_id: &str) -> Result<SearchJobStatus, ApiError> {
        let state = self.begin("search_job_status")?;
        Ok(state.search_status.clone())
    }
}

// =========================================================================
// CloudTrail
// =========================================================================

#[derive(Debug, Default)]
struct TrailState {
    trails: BTreeMap<String, TrailParams>,
    logging: BTreeSet<String>,
    calls: HashMap<String, usize>,
    failures: HashMap<String, VecDeque<ApiError>>,
}

/// In-memory CloudTrail.
#[derive(Debug)]
pub struct FakeTrails {
    region: String,
    state: Mutex<TrailState>,
}

impl Default for FakeTrails {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_AWS_REGION)
    }
}

impl FakeTrails {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Mutex::new(TrailState::default()),
        }
    }

    fn begin(&self, op: &str) -> Result<MutexGuard<'_, TrailState>, ApiError> {
        let mut state = lock(&self.state);
        *state.calls.entry(op.to_string()).or_default() += 1;
        if let Some(err) = state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(state)
    }

    fn arn(&self, name: &str) -> String {
        format!(
            "arn:aws:cloudtrail:{}:{}:trail/{}",
            self.region, FAKE_ACCOUNT_ID, name
        )
    }

    pub fn calls(&self, op: &str) -> usize {
        lock(&self.state).calls.get(op).copied().unwrap_or(0)
    }

    pub fn fail_next(&self, op: &str, err: ApiError) {
        lock(&self.state)
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn trail(&self, name: &str) -> Option<TrailParams> {
        lock(&self.state).trails.get(name).cloned()
    }

    pub fn is_logging(&self, name: &str) -> bool {
        lock(&self.state).logging.contains(name)
    }
}

fn trail_not_found(name: &str) -> ApiError {
    ApiError::new(
        ApiErrorKind::NotFound,
        400,
        "TrailNotFoundException",
        format!("Unknown trail: {}", name),
    )
}

#[async_trait]
impl TrailApi for FakeTrails {
    async fn create_trail(&self, params: &TrailParams) -> Result<TrailInfo, ApiError> {
        let mut state = self.begin("create_trail")?;
        if state.trails.contains_key(&params.name) {
            return Err(ApiError::from_response(
                400,
                &json!({
                    "code": "TrailAlreadyExistsException",
                    "message": format!("Trail {} already exists", params.name)
                }),
            ));
        }
        state.trails.insert(params.name.clone(), params.clone());
        Ok(TrailInfo {
            trail_arn: self.arn(&params.name),
        })
    }

    async fn update_trail(&self, params: &TrailParams) -> Result<TrailInfo, ApiError> {
        let mut state = self.begin("update_trail")?;
        let stored = state
            .trails
            .get_mut(&params.name)
            .ok_or_else(|| trail_not_found(&params.name))?;
        *stored = params.clone();
        Ok(TrailInfo {
            trail_arn: self.arn(&params.name),
        })
    }

    async fn get_trail(&self, name: &str) -> Result<TrailInfo, ApiError> {
        let state = self.begin("get_trail")?;
        if !state.trails.contains_key(name) {
            return Err(trail_not_found(name));
        }
        Ok(TrailInfo {
            trail_arn: self.arn(name),
        })
    }

    async fn delete_trail(&self, name: &str) -> Result<(), ApiError> {
        let mut state = self.begin("delete_trail")?;
        state.logging.remove(name);
        state
            .trails
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| trail_not_found(name))
    }

    async fn start_logging(&self, name: &str) -> Result<(), ApiError> {
        let mut state = self.begin("start_logging")?;
        if !state.trails.contains_key(name) {
            return Err(trail_not_found(name));
        }
        state.logging.insert(name.to_string());
        Ok(())
    }
}

// =========================================================================
// Templates, time and the connector
// =========================================================================

/// Template store backed by a map of key to raw template text.
#[derive(Debug, Default)]
pub struct StaticTemplates {
    templates: Mutex<HashMap<String, String>>,
}

impl StaticTemplates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, raw: impl Into<String>) {
        lock(&self.templates).insert(key.into(), raw.into());
    }
}

#[async_trait]
impl TemplateStore for StaticTemplates {
    async fn fetch(&self, key: &str) -> Result<String, ApiError> {
        lock(&self.templates).get(key).cloned().ok_or_else(|| {
            ApiError::new(
                ApiErrorKind::NotFound,
                404,
                "NoSuchKey",
                format!("The specified key does not exist: {}", key),
            )
        })
    }
}

/// A clock stopped at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        let (secs, nanos) = FIXED_TIMESTAMP;
        Self(DateTime::from_timestamp(secs, nanos).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A sleeper that returns immediately and records what it was asked to do.
#[derive(Debug, Default)]
pub struct NoopSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl NoopSleeper {
    /// Number of sleeps requested.
    pub fn sleeps(&self) -> usize {
        lock(&self.slept).len()
    }

    /// Total time that would have been slept.
    pub fn total(&self) -> Duration {
        lock(&self.slept).iter().sum()
    }
}

#[async_trait]
impl Sleeper for NoopSleeper {
    async fn sleep(&self, duration: Duration) {
        lock(&self.slept).push(duration);
    }
}

/// A connector handing out the same fakes for every session.
#[derive(Debug, Default)]
pub struct StaticConnector {
    pub sumo: Arc<FakeSumo>,
    pub trails: Arc<FakeTrails>,
    pub templates: Arc<StaticTemplates>,
    sessions: Mutex<Vec<SumoConfig>>,
    regions: Mutex<Vec<String>>,
}

impl StaticConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credentials of every Sumo session opened so far.
    pub fn sessions(&self) -> Vec<SumoConfig> {
        lock(&self.sessions).clone()
    }

    /// Regions of every CloudTrail session opened so far.
    pub fn regions(&self) -> Vec<String> {
        lock(&self.regions).clone()
    }
}

impl Connector for StaticConnector {
    fn sumo(&self, config: &SumoConfig) -> Result<Arc<dyn SumoApi>, ResourceError> {
        lock(&self.sessions).push(config.clone());
        Ok(self.sumo.clone())
    }

    fn cloudtrail(&self, config: &AwsConfig) -> Result<Arc<dyn TrailApi>, ResourceError> {
        lock(&self.regions).push(config.region.clone());
        Ok(self.trails.clone())
    }

    fn templates(&self) -> Arc<dyn TemplateStore> {
        self.templates.clone()
    }
}

// =========================================================================
// Harness
// =========================================================================

/// Credentials accepted by every fake session.
pub fn sumo_credentials() -> Map<String, Value> {
    let mut creds = Map::new();
    creds.insert("SumoAccessID".to_string(), json!("suTESTACCESSID"));
    creds.insert("SumoAccessKey".to_string(), json!("test-access-key"));
    creds.insert("SumoDeployment".to_string(), json!("us1"));
    creds
}

/// Add [`sumo_credentials`] to a JSON object of resource properties.
pub fn with_sumo_credentials(props: Value) -> Value {
    let mut merged = sumo_credentials();
    if let Value::Object(extra) = props {
        merged.extend(extra);
    }
    Value::Object(merged)
}

/// A test harness that runs lifecycle events through the dispatcher against
/// in-memory fakes.
///
/// Uses the built-in registry, a [`FixedClock`], a [`NoopSleeper`] and the
/// default AWS region.
pub struct ResourceTester {
    registry: Arc<ResourceRegistry>,
    connector: Arc<StaticConnector>,
    sleeper: Arc<NoopSleeper>,
    poll: PollOptions,
}

impl Default for ResourceTester {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceTester {
    /// Create a tester with the built-in resource types.
    pub fn new() -> Self {
        Self::with_registry(ResourceRegistry::builtin())
    }

    /// Create a tester over a custom registry.
    pub fn with_registry(registry: ResourceRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            connector: Arc::new(StaticConnector::new()),
            sleeper: Arc::new(NoopSleeper::default()),
            poll: PollOptions::default(),
        }
    }

    /// Override the job polling options.
    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn sumo(&self) -> &FakeSumo {
        &self.connector.sumo
    }

    pub fn trails(&self) -> &FakeTrails {
        &self.connector.trails
    }

    pub fn templates(&self) -> &StaticTemplates {
        &self.connector.templates
    }

    pub fn connector(&self) -> &StaticConnector {
        &self.connector
    }

    pub fn sleeper(&self) -> &NoopSleeper {
        &self.sleeper
    }

    /// The handler context the dispatcher runs with.
    pub fn context(&self) -> HandlerContext {
        HandlerContext::new(self.connector.clone())
            .with_clock(Arc::new(FixedClock::default()))
            .with_sleeper(self.sleeper.clone())
            .with_poll_options(self.poll.clone())
            .with_aws(AwsConfig::default())
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.registry.clone(), self.context())
    }

    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    /// Dispatch a prepared event.
    pub async fn dispatch(
        &self,
        event: &LifecycleEvent,
    ) -> Result<LifecycleResponse, ResourceError> {
        self.dispatcher().dispatch(event).await
    }

    /// Dispatch a Create.
    pub async fn create(
        &self,
        resource_type: &str,
        props: Value,
    ) -> Result<LifecycleResponse, ResourceError> {
        let event = LifecycleEvent::new(RequestKind::Create, resource_type, into_map(props)?);
        self.dispatch(&event).await
    }

    /// Dispatch an Update of the instance identified by `physical_id`.
    pub async fn update(
        &self,
        resource_type: &str,
        physical_id: &str,
        props: Value,
    ) -> Result<LifecycleResponse, ResourceError> {
        let event = LifecycleEvent::new(RequestKind::Update, resource_type, into_map(props)?)
            .with_physical_id(physical_id);
        self.dispatch(&event).await
    }

    /// Dispatch a Delete of the instance identified by `physical_id`.
    pub async fn delete(
        &self,
        resource_type: &str,
        physical_id: &str,
        props: Value,
    ) -> Result<LifecycleResponse, ResourceError> {
        let event = LifecycleEvent::new(RequestKind::Delete, resource_type, into_map(props)?)
            .with_physical_id(physical_id);
        self.dispatch(&event).await
    }

    /// Run a full lifecycle: create, then update, then delete.
    ///
    /// Returns the update response.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_props: Value,
        updated_props: Value,
    ) -> Result<LifecycleResponse, ResourceError> {
        let created = self.create(resource_type, initial_props).await?;

        let updated = self
            .update(
                resource_type,
                &created.physical_resource_id,
                updated_props.clone(),
            )
            .await?;

        self.delete(resource_type, &updated.physical_resource_id, updated_props)
            .await?;

        Ok(updated)
    }
}

fn into_map(props: Value) -> Result<Map<String, Value>, ResourceError> {
    match props {
        Value::Object(map) => Ok(map),
        other => Err(ResourceError::InvalidRequest(format!(
            "resource properties must be an object, got {}",
            other
        ))),
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();

    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain at least one error.
///
/// # Panics
///
/// Panics if there are no error diagnostics.
pub fn assert_has_errors(diagnostics: &[Diagnostic]) {
    let has_errors = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error));

    assert!(has_errors, "Expected at least one error, but got none");
}

/// Assert that diagnostics contain an error with the given summary substring.
///
/// # Panics
///
/// Panics if no error diagnostic contains the given substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let has_matching_error = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));

    assert!(
        has_matching_error,
        "Expected an error containing '{}', but no matching error found. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

/// Assert that a dispatch failed with a remote error carrying `code`.
///
/// # Panics
///
/// Panics if the result is `Ok` or the error did not come from the remote API.
pub fn assert_api_error<T: std::fmt::Debug>(result: &Result<T, ResourceError>, code: &str) {
    match result {
        Err(ResourceError::Api(err)) => assert_eq!(
            err.code, code,
            "Expected remote error code '{}', got '{}'",
            code, err.code
        ),
        other => panic!("Expected remote error '{}', got {:?}", code, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_sumo_collector_collision() {
        let sumo = FakeSumo::new();
        let collector = Collector {
            name: "CloudTrailCollector".to_string(),
            collector_type: Some("Hosted".to_string()),
            ..Default::default()
        };
        let created = sumo.create_collector(&collector).await.unwrap();
        assert!(created.id.is_some());

        let err = sumo.create_collector(&collector).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Collision);
        assert_eq!(sumo.calls("create_collector"), 2);
        assert_eq!(sumo.collector_count(), 1);
    }

    #[tokio::test]
    async fn test_fake_sumo_etag_check() {
        let sumo = FakeSumo::new();
        let id = sumo.seed_collector("c", "Hosted");
        let Versioned { mut value, etag } = sumo.collector(&id).await.unwrap();
        value.description = Some("first".to_string());
        sumo.update_collector(&value, &etag).await.unwrap();

        let err = sumo.update_collector(&value, &etag).await.unwrap_err();
        assert_eq!(err.status, 412);
    }

    #[tokio::test]
    async fn test_fake_sumo_scripted_failure() {
        let sumo = FakeSumo::new();
        sumo.fail_next(
            "personal_folder",
            ApiError::new(ApiErrorKind::Other, 500, "internal", "boom"),
        );
        assert!(sumo.personal_folder().await.is_err());
        assert!(sumo.personal_folder().await.is_ok());
        assert_eq!(sumo.calls("personal_folder"), 2);
    }

    #[tokio::test]
    async fn test_fake_sumo_folder_collision_names_existing_id() {
        let sumo = FakeSumo::new();
        let personal = sumo.personal_folder_id();
        let existing = sumo.seed_folder("Apps", &personal);

        let err = sumo.create_folder("Apps", "", &personal).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Collision);
        assert!(err.message.contains(&format!("ContentId({})", existing)));
    }

    #[tokio::test]
    async fn test_fake_trails() {
        let trails = FakeTrails::default();
        let params = TrailParams {
            name: "sumo-trail".to_string(),
            ..Default::default()
        };
        let info = trails.create_trail(&params).await.unwrap();
        assert_eq!(
            info.trail_arn,
            "arn:aws:cloudtrail:us-east-1:123456789012:trail/sumo-trail"
        );
        trails.start_logging("sumo-trail").await.unwrap();
        assert!(trails.is_logging("sumo-trail"));

        trails.delete_trail("sumo-trail").await.unwrap();
        let err = trails.delete_trail("sumo-trail").await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::NotFound);
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::default();
        assert_eq!(
            clock.now().format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
            "2024-03-05 14:30:15.123456"
        );
    }

    #[tokio::test]
    async fn test_noop_sleeper() {
        let sleeper = NoopSleeper::default();
        sleeper.sleep(Duration::from_secs(5)).await;
        sleeper.sleep(Duration::from_secs(5)).await;
        assert_eq!(sleeper.sleeps(), 2);
        assert_eq!(sleeper.total(), Duration::from_secs(10));
    }

    #[test]
    fn test_with_sumo_credentials() {
        let props = with_sumo_credentials(json!({"CollectorName": "c"}));
        assert_eq!(props["SumoDeployment"], "us1");
        assert_eq!(props["CollectorName"], "c");
    }

    #[test]
    fn test_assert_no_errors_passes() {
        assert_no_errors(&[]);
        assert_no_errors(&[Diagnostic::warning("just a warning")]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("an error")]);
    }

    #[test]
    fn test_assert_has_errors_passes() {
        assert_has_errors(&[Diagnostic::error("an error")]);
    }

    #[test]
    #[should_panic(expected = "Expected at least one error")]
    fn test_assert_has_errors_fails() {
        assert_has_errors(&[]);
    }

    #[test]
    fn test_assert_error_contains_passes() {
        let diags = vec![Diagnostic::error("Missing required attribute 'CollectorName'")];
        assert_error_contains(&diags, "CollectorName");
    }

    #[test]
    #[should_panic(expected = "Expected an error containing")]
    fn test_assert_error_contains_fails() {
        let diags = vec![Diagnostic::error("some other error")];
        assert_error_contains(&diags, "CollectorName");
    }

    #[test]
    fn test_assert_api_error() {
        let result: Result<(), ResourceError> = Err(ResourceError::Api(ApiError::new(
            ApiErrorKind::Other,
            400,
            "bad.request",
            "nope",
        )));
        assert_api_error(&result, "bad.request");
    }
}
