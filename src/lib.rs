//! Sumo Logic CloudFormation custom resources
//!
//! This crate implements the lifecycle handlers behind a set of CloudFormation
//! custom resource types that provision Sumo Logic collectors, sources,
//! webhook connections and apps, plus AWS CloudTrail trails.
//!
//! # Overview
//!
//! The crate provides:
//!
//! - **Dispatcher**: routes a [`LifecycleEvent`] to the handler registered for
//!   its resource type and shapes the [`LifecycleResponse`]
//! - **Registry**: the ordered table of resource types, each with a property
//!   [`Schema`] and a handler factory
//! - **Resource handlers**: one per remote entity kind, built on the
//!   [`Resource`] trait
//! - **Idempotent-create protocol**: creates that collide with an existing
//!   object of the same name adopt that object instead of failing
//! - **Job polling**: a bounded poller for server-side install and import jobs
//! - **Error types**: [`ResourceError`] and the remote [`ApiError`]
//! - **Logging**: integration with `tracing` for structured logging
//!
//! Transports are not part of this crate. Callers supply a [`Connector`] that
//! opens Sumo Logic and CloudTrail sessions and fetches app templates; the
//! [`testing`] module has in-memory ones.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sumo_cfn_resources::{
//!     init_logging, Connector, Dispatcher, HandlerContext, LifecycleEvent, ResourceRegistry,
//! };
//!
//! async fn handle(event: LifecycleEvent, connector: Arc<dyn Connector>) {
//!     init_logging();
//!
//!     let dispatcher = Dispatcher::new(ResourceRegistry::builtin(), HandlerContext::new(connector));
//!     match dispatcher.dispatch(&event).await {
//!         Ok(response) => { /* signal SUCCESS with response.data */ }
//!         Err(e) if e.is_retryable() => { /* let the orchestrator retry */ }
//!         Err(e) => { /* signal FAILED with e.message() */ }
//!     }
//! }
//! ```
//!
//! # Resource types
//!
//! | Registry key  | Remote object                              | Output attributes |
//! |---------------|--------------------------------------------|-------------------|
//! | `AWSTrail`    | CloudTrail trail                           | `TrailArn`        |
//! | `Collector`   | Hosted collector                           | `COLLECTOR_ID`    |
//! | `Connections` | Webhook connection                         | `CONNECTION_ID`   |
//! | `HTTPSource`  | HTTP source on a collector                 | `SUMO_ENDPOINT`   |
//! | `AWSSource`   | Polling AWS source (S3, CloudTrail, ...)   | `SUMO_ENDPOINT`   |
//! | `App`         | App installed into the content library     | `APP_FOLDER_NAME` |
//!
//! Every physical resource id has the form `<registry key>/<remote id>`.

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod poll;
pub mod protocol;
pub mod registry;
pub mod resources;
pub mod schema;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use api::{ApiError, ApiErrorKind, Connector};
pub use config::{AwsConfig, PollOptions, SumoConfig};
pub use dispatch::Dispatcher;
pub use error::ResourceError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use registry::{ResourceEntry, ResourceRegistry};
pub use resources::{HandlerContext, HandlerFactory, Resource, ResourceHandler};
pub use schema::Schema;
pub use types::{
    CallResult, LifecycleEvent, LifecycleResponse, PhysicalResourceId, Properties, RequestKind,
    CUSTOM_RESOURCE_PREFIX,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
