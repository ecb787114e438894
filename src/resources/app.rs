//! Prebuilt dashboard apps.
//!
//! An app is installed one of two ways:
//!
//! - **Install API** when an `AppId` is given. The catalog installs the app
//!   into a destination folder as a server-side job; the created folder id
//!   is decoded from the job's final status message.
//! - **Import API** otherwise. The app's exported template is fetched,
//!   rendered with the caller's source tokens and imported into the personal
//!   folder, again as a job.
//!
//! Apps flagged enterprise-only are gated on an entitlement probe first.
//! The physical id is the app folder id; update replaces the folder.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::{
    delete_target, previous_remote_id, require_remote_id, HandlerContext, Resource,
    ResourceHandler,
};
use crate::api::template::add_time_suffix;
use crate::api::{
    render_template, template_key, ApiErrorKind, AppApi, AppInstallRequest, ContentApi, FolderApi,
    SearchApi, SearchJobRequest, SumoApi, TemplateStore,
};
use crate::config::{PollOptions, SumoConfig};
use crate::error::ResourceError;
use crate::poll::{decode_folder_id, poll_job, Clock, Sleeper};
use crate::protocol::{create_or_adopt, delete_if_requested};
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::types::{CallResult, EntityKind, LifecycleEvent, Properties};

/// Registry key.
pub const NAME: &str = "App";

/// Output attribute carrying the installed app's folder name.
pub const APP_FOLDER_NAME: &str = "APP_FOLDER_NAME";

/// Apps that require an Enterprise or Trial account.
pub const ENTERPRISE_ONLY_APPS: &[&str] = &[
    "Amazon GuardDuty Benchmark",
    "Global Intelligence for AWS CloudTrail",
];

/// Apps whose name contains this are grouped under a dated parent folder.
const QUICKSTART_MARKER: &str = "Amazon QuickStart";

const QUICKSTART_FOLDER_PREFIX: &str = "SumoLogic Amazon QuickStart Apps ";

const QUICKSTART_FOLDER_DESCRIPTION: &str =
    "This folder contains all the apps created as a part of SumoLogic Amazon QuickStart Apps.";

/// Longest folder description the content API accepts.
const MAX_FOLDER_DESCRIPTION: usize = 255;

/// Search window of the entitlement probe, in milliseconds.
const PROBE_WINDOW_MS: i64 = 5 * 60 * 1000;

/// Benchmark lookups only succeed on Enterprise and Trial accounts.
const ENTITLEMENT_QUERY: &str = r#"guardduty*
                | "IAMUser" as targetresource
                | "2" as sev
                | "UserPermissions" as threatName
                | "Recon" as threatPurpose
                | benchmark percentage as global_percent from guardduty on threatpurpose=threatPurpose, threatname=threatName, severity=sev, resource=targetresource"#;

pub fn schema() -> Schema {
    Schema::new()
        .with_description("A prebuilt app installed into the content library")
        .with_sumo_credentials()
        .with_attribute("AppName", Attribute::required_string())
        .with_attribute(
            "AppId",
            Attribute::optional_string()
                .with_description("Catalog id; without it the app is imported from its template"),
        )
        .with_attribute(
            "AppSources",
            Attribute::new(
                AttributeType::map(AttributeType::String),
                AttributeFlags::optional(),
            )
            .with_description("Template token to source expression"),
        )
        .with_remove_on_delete()
}

pub fn factory(
    ctx: &HandlerContext,
    props: &Properties<'_>,
) -> Result<Box<dyn ResourceHandler>, ResourceError> {
    let api = ctx.connector.sumo(&SumoConfig::from_properties(props)?)?;
    Ok(Box::new(AppResource::new(
        api,
        ctx.connector.templates(),
        ctx.clock.clone(),
        ctx.sleeper.clone(),
        ctx.poll.clone(),
    )))
}

/// Everything the app handler needs from a Sumo Logic session.
pub trait AppBackend: FolderApi + ContentApi + AppApi + SearchApi {}

impl<T: ?Sized + FolderApi + ContentApi + AppApi + SearchApi> AppBackend for T {}

#[derive(Debug, Clone, PartialEq)]
pub struct AppParams {
    pub app_folder_id: Option<String>,
    pub app_id: Option<String>,
    pub app_name: String,
    pub app_sources: Map<String, Value>,
    pub remove_on_delete_stack: bool,
}

pub struct AppResource<C: ?Sized + AppBackend = dyn SumoApi> {
    api: Arc<C>,
    templates: Arc<dyn TemplateStore>,
    clock: Arc<dyn Clock>,
    sleeper: Arc<dyn Sleeper>,
    poll: PollOptions,
}

fn content_id_pattern() -> &'static Regex {
    static CONTENT_ID: OnceLock<Regex> = OnceLock::new();
    CONTENT_ID.get_or_init(|| Regex::new(r"ContentId\((\d+)").expect("static pattern"))
}

/// Id of the existing content named in a duplicate-content error message.
pub fn decode_content_id(message: &str) -> Result<String, ResourceError> {
    content_id_pattern()
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|id| id.as_str().to_string())
        .ok_or_else(|| {
            ResourceError::Decode(format!("cannot find content id in '{}'", message))
        })
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl<C: ?Sized + AppBackend> AppResource<C> {
    pub fn new(
        api: Arc<C>,
        templates: Arc<dyn TemplateStore>,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
        poll: PollOptions,
    ) -> Self {
        Self {
            api,
            templates,
            clock,
            sleeper,
            poll,
        }
    }

    /// Whether the account may install enterprise-only apps.
    ///
    /// Runs a benchmark search over the last five minutes. Pending errors on
    /// the job, or a 403 from the search API, mean the account is not
    /// entitled. Any other failure propagates.
    pub async fn is_enterprise_or_trial_account(&self) -> Result<bool, ResourceError> {
        let to = self.clock.now().timestamp() * 1000;
        let request = SearchJobRequest {
            query: ENTITLEMENT_QUERY.to_string(),
            from: to - PROBE_WINDOW_MS,
            to,
        };

        let status = match self.api.create_search_job(&request).await {
            Ok(job) => self.api.search_job_status(&job.id).await,
            Err(err) => Err(err),
        };

        match status {
            Ok(status) => {
                info!(
                    state = %status.state,
                    pending_errors = status.pending_errors.len(),
                    "Entitlement probe finished"
                );
                Ok(status.pending_errors.is_empty())
            },
            Err(err) if err.is_forbidden() => {
                info!(code = %err.code, "Entitlement probe forbidden");
                Ok(false)
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn ensure_entitled(&self, app_name: &str) -> Result<(), ResourceError> {
        if ENTERPRISE_ONLY_APPS.contains(&app_name)
            && !self.is_enterprise_or_trial_account().await?
        {
            return Err(ResourceError::NotEntitled(app_name.to_string()));
        }
        Ok(())
    }

    /// The dated QuickStart parent folder, created on first use.
    async fn quickstart_folder(&self) -> Result<String, ResourceError> {
        let personal = self.api.personal_folder().await?;
        let name = format!(
            "{}{}",
            QUICKSTART_FOLDER_PREFIX,
            self.clock.now().format("%d-%m-%Y")
        );

        let folder_id = create_or_adopt(
            EntityKind::Folder,
            &name,
            async {
                self.api
                    .create_folder(&name, QUICKSTART_FOLDER_DESCRIPTION, &personal.id)
                    .await
                    .map(|folder| folder.id)
            },
            || {
                let existing = personal
                    .children
                    .iter()
                    .find(|child| child.name == name)
                    .map(|child| child.id.clone());
                async move { Ok(existing) }
            },
        )
        .await?
        .into_inner();

        Ok(folder_id)
    }

    async fn create_by_install(
        &self,
        app_id: &str,
        params: &AppParams,
    ) -> Result<CallResult, ResourceError> {
        self.ensure_entitled(&params.app_name).await?;

        let destination_folder_id = if params.app_name.contains(QUICKSTART_MARKER) {
            self.quickstart_folder().await?
        } else {
            self.api.personal_folder().await?.id
        };

        let request = AppInstallRequest {
            name: format!(
                "{}{}",
                params.app_name,
                self.clock.now().format("_%d-%b-%Y_%H:%M:%S%.6f")
            ),
            description: params.app_name.clone(),
            data_source_values: params.app_sources.clone(),
            destination_folder_id,
        };

        let job = self.api.install_app(app_id, &request).await?;
        let report = poll_job(&job.id, &self.poll, self.sleeper.as_ref(), || {
            self.api.install_status(&job.id)
        })
        .await?;
        let app_folder_id = decode_folder_id(&report)?;

        info!(
            app = %params.app_name,
            app_folder_id = %app_folder_id,
            parent_folder_id = %request.destination_folder_id,
            job_id = %job.id,
            "Installed app"
        );
        Ok(CallResult::new(app_folder_id).with_attribute(APP_FOLDER_NAME, request.name))
    }

    /// Pre-create the folder the import lands in, adopting an existing one.
    async fn app_folder(
        &self,
        name: &str,
        content: &Value,
        parent_id: &str,
    ) -> Result<String, ResourceError> {
        let description = content
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let description = truncate_chars(description, MAX_FOLDER_DESCRIPTION);

        match self.api.create_folder(name, description, parent_id).await {
            Ok(folder) => Ok(folder.id),
            Err(err) if err.kind == ApiErrorKind::Collision => {
                warn!(folder = name, "App folder already exists, reusing it");
                decode_content_id(&err.message)
            },
            Err(err) => Err(err.into()),
        }
    }

    async fn create_by_import(&self, params: &AppParams) -> Result<CallResult, ResourceError> {
        self.ensure_entitled(&params.app_name).await?;

        let raw = self.templates.fetch(&template_key(&params.app_name)).await?;
        let mut content = render_template(&raw, &params.app_sources)?;
        add_time_suffix(&mut content, self.clock.now())?;
        let content_name = content
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let personal = self.api.personal_folder().await?;
        let app_folder_id = self.app_folder(&content_name, &content, &personal.id).await?;

        let job = self.api.import_content(&personal.id, &content, true).await?;
        poll_job(&job.id, &self.poll, self.sleeper.as_ref(), || {
            self.api.import_status(&personal.id, &job.id)
        })
        .await?;

        info!(
            app = %params.app_name,
            app_folder_id = %app_folder_id,
            personal_folder_id = %personal.id,
            job_id = %job.id,
            "Imported app"
        );
        Ok(CallResult::new(app_folder_id).with_attribute(APP_FOLDER_NAME, content_name))
    }

    async fn remove_folder(&self, folder_id: &str, remove: bool) -> Result<(), ResourceError> {
        delete_if_requested(EntityKind::Folder, folder_id, remove, || {
            self.api.delete_folder(folder_id)
        })
        .await
    }
}

#[async_trait]
impl<C: ?Sized + AppBackend> Resource for AppResource<C> {
    type Params = AppParams;

    fn extract_params(&self, event: &LifecycleEvent) -> Result<AppParams, ResourceError> {
        let props = event.properties();
        Ok(AppParams {
            app_folder_id: previous_remote_id(event)?,
            app_id: props.string("AppId").filter(|id| !id.is_empty()),
            app_name: props.string("AppName").unwrap_or_default(),
            app_sources: props.object("AppSources").cloned().unwrap_or_default(),
            remove_on_delete_stack: props.remove_on_delete_stack(false),
        })
    }

    async fn create(&self, params: &AppParams) -> Result<CallResult, ResourceError> {
        match &params.app_id {
            Some(app_id) => self.create_by_install(app_id, params).await,
            None => self.create_by_import(params).await,
        }
    }

    async fn update(&self, params: &AppParams) -> Result<CallResult, ResourceError> {
        let old_folder_id = require_remote_id(&params.app_folder_id, NAME)?;
        self.remove_folder(&old_folder_id, true).await?;
        let result = self.create(params).await?;
        info!(
            old_folder_id = %old_folder_id,
            app_folder_id = %result.physical_id,
            "Replaced app folder"
        );
        Ok(result)
    }

    async fn delete(&self, params: &AppParams) -> Result<(), ResourceError> {
        let Some(folder_id) = delete_target(&params.app_folder_id, NAME) else {
            return Ok(());
        };
        self.remove_folder(folder_id, params.remove_on_delete_stack)
            .await
    }
}
