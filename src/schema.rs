//! Schema types for describing resource properties.
//!
//! Every registered resource type declares the shape of its
//! `ResourceProperties`. The dispatcher validates incoming properties against
//! it before any remote call is made, and uses the `sensitive` flag to keep
//! secrets out of the logs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Placeholder logged in place of sensitive property values.
pub const REDACTED: &str = "<redacted>";

/// The type of a property value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// A string value.
    String,
    /// A boolean, or any scalar standing in for one (only `"true"` reads as true).
    BoolLike,
    /// A list of values of a single type.
    List(Box<AttributeType>),
    /// A map from string keys to values of a single type.
    Map(Box<AttributeType>),
    /// Any value (use sparingly).
    Dynamic,
}

impl AttributeType {
    /// Create a list type.
    pub fn list(element_type: AttributeType) -> Self {
        Self::List(Box::new(element_type))
    }

    /// Create a map type.
    pub fn map(element_type: AttributeType) -> Self {
        Self::Map(Box::new(element_type))
    }
}

/// Describes how a property can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The property must be present and non-null.
    pub required: bool,
    /// The property may be omitted.
    pub optional: bool,
    /// The property is a secret and is never logged.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Create flags for a required property.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional property.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Mark the property as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Describes a single property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// The type of the property.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Flags describing how the property can be used.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description of the property.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Attribute {
    /// Create a new attribute with the given type and flags.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
        }
    }

    /// Create a required string attribute.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Create an optional string attribute.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// Create an optional boolean-like attribute.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::BoolLike, AttributeFlags::optional())
    }

    /// Set the description for this attribute.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark this attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// Schema for the properties of one resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schema {
    /// Human-readable description of the resource type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared properties. Undeclared properties are passed through unchecked.
    #[serde(default)]
    pub attributes: BTreeMap<String, Attribute>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute to the schema.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Set the description for this schema.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add the credential properties every Sumo Logic resource carries.
    pub fn with_sumo_credentials(self) -> Self {
        self.with_attribute("SumoAccessID", Attribute::required_string())
            .with_attribute("SumoAccessKey", Attribute::required_string().sensitive())
            .with_attribute("SumoDeployment", Attribute::required_string())
    }

    /// Add the optional `RemoveOnDeleteStack` flag.
    pub fn with_remove_on_delete(self) -> Self {
        self.with_attribute(
            "RemoveOnDeleteStack",
            Attribute::optional_bool()
                .with_description("Delete the remote object when the stack is deleted"),
        )
    }

    /// Copy of the properties with sensitive values replaced by [`REDACTED`].
    pub fn redact(&self, props: &Map<String, Value>) -> Map<String, Value> {
        props
            .iter()
            .map(|(key, value)| {
                let sensitive = self
                    .attributes
                    .get(key)
                    .is_some_and(|attr| attr.flags.sensitive);
                let value = if sensitive {
                    Value::String(REDACTED.to_string())
                } else {
                    value.clone()
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message produced by property validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The property path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the property path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic blocks the operation.
    pub fn is_error(&self) -> bool {
        matches!(self.severity, DiagnosticSeverity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_attribute_type_constructors() {
        let list = AttributeType::list(AttributeType::String);
        assert!(matches!(list, AttributeType::List(_)));

        let map = AttributeType::map(AttributeType::Dynamic);
        assert!(matches!(map, AttributeType::Map(_)));
    }

    #[test]
    fn test_attribute_flags() {
        let required = AttributeFlags::required();
        assert!(required.required);
        assert!(!required.optional);

        let sensitive = AttributeFlags::optional().sensitive();
        assert!(sensitive.optional);
        assert!(sensitive.sensitive);
    }

    #[test]
    fn test_schema_builder() {
        let schema = Schema::new()
            .with_description("A hosted collector")
            .with_sumo_credentials()
            .with_attribute("CollectorName", Attribute::required_string())
            .with_remove_on_delete();

        assert!(schema.attributes.contains_key("CollectorName"));
        assert!(schema.attributes["SumoAccessKey"].flags.sensitive);
        assert_eq!(
            schema.attributes["RemoveOnDeleteStack"].attr_type,
            AttributeType::BoolLike
        );
    }

    #[test]
    fn test_redact() {
        let schema = Schema::new().with_sumo_credentials();
        let props = json!({
            "SumoAccessID": "suABCDEF",
            "SumoAccessKey": "very-secret",
            "CollectorName": "CloudTrailCollector"
        });
        let redacted = schema.redact(props.as_object().unwrap());
        assert_eq!(redacted["SumoAccessKey"], REDACTED);
        assert_eq!(redacted["SumoAccessID"], "suABCDEF");
        assert_eq!(redacted["CollectorName"], "CloudTrailCollector");
    }

    #[test]
    fn test_diagnostic() {
        let err = Diagnostic::error("Invalid configuration")
            .with_detail("Expected string, got number")
            .with_attribute("CollectorName");

        assert!(err.is_error());
        assert_eq!(err.summary, "Invalid configuration");
        assert_eq!(err.detail, Some("Expected string, got number".to_string()));
        assert_eq!(err.attribute, Some("CollectorName".to_string()));
        assert!(!Diagnostic::warning("just a warning").is_error());
    }
}
