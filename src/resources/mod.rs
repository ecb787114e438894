//! Resource handlers, one per remote entity kind.
//!
//! A handler implements [`Resource`]: it turns an event's property bag into
//! typed parameters and runs the matching lifecycle method. The dispatcher
//! only sees the type-erased [`ResourceHandler`], which every [`Resource`]
//! gets for free.
//!
//! Handlers are built per dispatch by a [`HandlerFactory`] that reads
//! credentials from the properties and opens the remote sessions it needs
//! through the [`HandlerContext`]'s connector.

pub mod app;
pub mod collector;
pub mod connection;
pub mod source;
pub mod trail;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::api::Connector;
use crate::config::{AwsConfig, PollOptions};
use crate::error::ResourceError;
use crate::poll::{Clock, Sleeper, SystemClock, TokioSleeper};
use crate::types::{CallResult, LifecycleEvent, Properties, RequestKind};

pub use app::AppResource;
pub use collector::CollectorResource;
pub use connection::ConnectionResource;
pub use source::{AwsSourceResource, HttpSourceResource};
pub use trail::TrailResource;

/// The uniform contract every resource type implements.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Typed call arguments extracted from the event.
    type Params: fmt::Debug + Send + Sync;

    /// Turn the event's property bag (and previous physical id) into parameters.
    fn extract_params(&self, event: &LifecycleEvent) -> Result<Self::Params, ResourceError>;

    /// Create the remote object, adopting an existing one with the same name.
    async fn create(&self, params: &Self::Params) -> Result<CallResult, ResourceError>;

    /// Update the existing remote object.
    async fn update(&self, params: &Self::Params) -> Result<CallResult, ResourceError>;

    /// Delete the remote object, if the caller asked for it.
    async fn delete(&self, params: &Self::Params) -> Result<(), ResourceError>;
}

/// Type-erased handler the dispatcher drives.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Run the lifecycle method named by the event.
    ///
    /// Returns `None` for deletes, which produce no output.
    async fn handle(&self, event: &LifecycleEvent) -> Result<Option<CallResult>, ResourceError>;
}

#[async_trait]
impl<R: Resource> ResourceHandler for R {
    async fn handle(&self, event: &LifecycleEvent) -> Result<Option<CallResult>, ResourceError> {
        let params = self.extract_params(event)?;
        tracing::debug!(?params, "Extracted parameters");
        match event.request_kind {
            RequestKind::Create => self.create(&params).await.map(Some),
            RequestKind::Update => self.update(&params).await.map(Some),
            RequestKind::Delete => self.delete(&params).await.map(|()| None),
        }
    }
}

/// Builds a handler for one dispatch.
pub type HandlerFactory =
    fn(&HandlerContext, &Properties<'_>) -> Result<Box<dyn ResourceHandler>, ResourceError>;

/// Everything a factory may need to build a handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub connector: Arc<dyn Connector>,
    pub clock: Arc<dyn Clock>,
    pub sleeper: Arc<dyn Sleeper>,
    pub poll: PollOptions,
    pub aws: AwsConfig,
}

impl HandlerContext {
    /// A context with the system clock, tokio sleeps, default polling and
    /// the AWS region from the environment.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            poll: PollOptions::default(),
            aws: AwsConfig::from_env(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_aws(mut self, aws: AwsConfig) -> Self {
        self.aws = aws;
        self
    }
}

impl fmt::Debug for HandlerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerContext")
            .field("poll", &self.poll)
            .field("aws", &self.aws)
            .finish_non_exhaustive()
    }
}

/// The remote id carried in the event's physical id.
///
/// A Delete with a malformed physical id cannot refer to anything this crate
/// created, so it resolves to `None` and the delete becomes a no-op. Other
/// request kinds fail.
pub(crate) fn previous_remote_id(event: &LifecycleEvent) -> Result<Option<String>, ResourceError> {
    match event.remote_id() {
        Err(err) if event.request_kind == RequestKind::Delete => {
            tracing::warn!(error = %err, "Ignoring malformed physical resource id on delete");
            Ok(None)
        },
        other => other,
    }
}

/// Skip a delete that has no remote id to act on.
pub(crate) fn delete_target<'a>(remote_id: &'a Option<String>, resource: &str) -> Option<&'a str> {
    if remote_id.is_none() {
        tracing::warn!(resource, "No physical resource id, nothing to delete");
    }
    remote_id.as_deref()
}

/// Remote id for an update, which cannot proceed without one.
pub(crate) fn require_remote_id(
    remote_id: &Option<String>,
    resource: &str,
) -> Result<String, ResourceError> {
    remote_id.clone().ok_or_else(|| {
        ResourceError::InvalidRequest(format!(
            "{} update requires a physical resource id from a previous create",
            resource
        ))
    })
}
