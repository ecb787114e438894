//! Lifecycle event and result types.
//!
//! These mirror the CloudFormation custom resource request and response
//! envelopes closely enough to deserialize them directly.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ResourceError;

/// Prefix CloudFormation puts in front of custom resource type names.
pub const CUSTOM_RESOURCE_PREFIX: &str = "Custom::";

/// The lifecycle stage a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "Create"),
            Self::Update => write!(f, "Update"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// Kinds of remote entity, used in logs and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Collector,
    Source,
    Connection,
    Folder,
    App,
    Trail,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Collector => "Collector",
            Self::Source => "Source",
            Self::Connection => "Connection",
            Self::Folder => "Folder",
            Self::App => "App",
            Self::Trail => "Trail",
        };
        f.write_str(name)
    }
}

/// An inbound lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    #[serde(rename = "RequestType")]
    pub request_kind: RequestKind,
    pub resource_type: String,
    #[serde(default)]
    pub resource_properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical_resource_id: Option<String>,
}

impl LifecycleEvent {
    /// Create a new event with no physical id.
    pub fn new(
        request_kind: RequestKind,
        resource_type: impl Into<String>,
        resource_properties: Map<String, Value>,
    ) -> Self {
        Self {
            request_kind,
            resource_type: resource_type.into(),
            resource_properties,
            physical_resource_id: None,
            logical_resource_id: None,
        }
    }

    /// Set the physical id carried from a previous invocation.
    pub fn with_physical_id(mut self, physical_id: impl Into<String>) -> Self {
        self.physical_resource_id = Some(physical_id.into());
        self
    }

    /// Set the logical id of the resource in the template.
    pub fn with_logical_id(mut self, logical_id: impl Into<String>) -> Self {
        self.logical_resource_id = Some(logical_id.into());
        self
    }

    /// The registry key: the resource type without the `Custom::` prefix.
    pub fn type_name(&self) -> &str {
        self.resource_type
            .strip_prefix(CUSTOM_RESOURCE_PREFIX)
            .unwrap_or(&self.resource_type)
    }

    /// A typed view over the property bag.
    pub fn properties(&self) -> Properties<'_> {
        Properties::new(&self.resource_properties)
    }

    /// The remote id encoded in the physical id, if there is one.
    pub fn remote_id(&self) -> Result<Option<String>, ResourceError> {
        self.physical_resource_id
            .as_deref()
            .map(|raw| raw.parse::<PhysicalResourceId>().map(PhysicalResourceId::into_remote_id))
            .transpose()
    }
}

/// The orchestrator's handle for a managed object: `"<prefix>/<remote id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicalResourceId {
    prefix: String,
    remote_id: String,
}

impl PhysicalResourceId {
    pub fn new(prefix: impl Into<String>, remote_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            remote_id: remote_id.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    pub fn into_remote_id(self) -> String {
        self.remote_id
    }
}

impl FromStr for PhysicalResourceId {
    type Err = ResourceError;

    /// Splits at the first `/`; the remote id may itself contain `/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((prefix, remote_id)) if !remote_id.is_empty() => Ok(Self::new(prefix, remote_id)),
            _ => Err(ResourceError::InvalidRequest(format!(
                "physical resource id '{}' is not of the form <prefix>/<id>",
                s
            ))),
        }
    }
}

impl fmt::Display for PhysicalResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.remote_id)
    }
}

/// What a create or update returns: output attributes plus the remote id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResult {
    pub output_attributes: BTreeMap<String, String>,
    pub physical_id: String,
}

impl CallResult {
    /// A result with no output attributes.
    pub fn new(physical_id: impl Into<String>) -> Self {
        Self {
            output_attributes: BTreeMap::new(),
            physical_id: physical_id.into(),
        }
    }

    /// Add an output attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.output_attributes.insert(name.into(), value.into());
        self
    }

    /// Look up an output attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.output_attributes.get(name).map(String::as_str)
    }
}

/// What the dispatcher hands back to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleResponse {
    pub data: BTreeMap<String, String>,
    pub physical_resource_id: String,
}

/// Read-only accessors over a resource property bag.
#[derive(Debug, Clone, Copy)]
pub struct Properties<'a> {
    inner: &'a Map<String, Value>,
}

impl<'a> Properties<'a> {
    pub fn new(inner: &'a Map<String, Value>) -> Self {
        Self { inner }
    }

    /// Raw value for a key.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.inner.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// String value for a key; absent, null and non-string values are `None`.
    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.inner.get(key).and_then(Value::as_str)
    }

    /// Owned string value for a key.
    pub fn string(&self, key: &str) -> Option<String> {
        self.str(key).map(str::to_string)
    }

    /// String value that must be present and non-empty.
    pub fn require_str(&self, key: &str) -> Result<&'a str, ResourceError> {
        self.str(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ResourceError::missing_property(key))
    }

    /// Boolean-like value.
    ///
    /// CloudFormation passes every scalar as a string. An absent key is
    /// `None`; `"true"` or JSON `true` is `Some(true)`; any other present
    /// value, `null` included, is `Some(false)`.
    pub fn bool_like(&self, key: &str) -> Option<bool> {
        self.inner.get(key).map(|value| match value {
            Value::Bool(b) => *b,
            Value::String(s) => s == "true",
            _ => false,
        })
    }

    /// JSON object value for a key.
    pub fn object(&self, key: &str) -> Option<&'a Map<String, Value>> {
        self.inner.get(key).and_then(Value::as_object)
    }

    /// JSON array value for a key.
    pub fn list(&self, key: &str) -> Option<&'a Vec<Value>> {
        self.inner.get(key).and_then(Value::as_array)
    }

    /// The `RemoveOnDeleteStack` flag, with a handler-specific default.
    pub fn remove_on_delete_stack(&self, default: bool) -> bool {
        self.bool_like("RemoveOnDeleteStack").unwrap_or(default)
    }

    /// The underlying map.
    pub fn as_map(&self) -> &'a Map<String, Value> {
        self.inner
    }
}
