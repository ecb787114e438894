//! Property validation against a resource [`Schema`].
//!
//! # Example
//!
//! ```
//! use sumo_cfn_resources::schema::{Attribute, Schema};
//! use sumo_cfn_resources::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::new()
//!     .with_attribute("CollectorName", Attribute::required_string())
//!     .with_attribute("RemoveOnDeleteStack", Attribute::optional_bool());
//!
//! let props = json!({"CollectorName": "CloudTrailCollector", "RemoveOnDeleteStack": "true"});
//! assert!(validate(&schema, &props).is_empty());
//!
//! let props = json!({"RemoveOnDeleteStack": "yes please"});
//! let diagnostics = validate(&schema, &props);
//! assert_eq!(diagnostics.len(), 2);
//! ```

use serde_json::Value;

use crate::schema::{Attribute, AttributeType, Diagnostic, DiagnosticSeverity, Schema};

/// Validate a property bag against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the properties are valid.
///
/// # Validation Rules
///
/// - Required properties must be present and non-null
/// - Optional properties may be absent or null
/// - Property types must match the schema
/// - `BoolLike` properties must be a scalar; anything but `"true"`/`true` reads as false
/// - Undeclared properties are ignored
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let obj = match value {
        Value::Object(map) => map,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value))),
            );
            return diagnostics;
        },
    };

    for (name, attr) in &schema.attributes {
        validate_attribute(attr, obj.get(name), name, &mut diagnostics);
    }

    diagnostics
}

/// Validate properties, returning Ok if valid or Err with the error diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let errors: Vec<_> = validate(schema, value)
        .into_iter()
        .filter(Diagnostic::is_error)
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check if properties are valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate_result(schema, value).is_ok()
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => validate_attribute_type(&attr.attr_type, v, path, diagnostics),
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        // Any scalar normalises: "true" and `true` are true, the rest false.
        AttributeType::BoolLike => {
            if value.is_array() || value.is_object() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) => {
            if let Some(arr) = value.as_array() {
                for (i, elem) in arr.iter().enumerate() {
                    let elem_path = format!("{}.{}", path, i);
                    validate_attribute_type(element_type, elem, &elem_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "list", value));
            }
        },
        AttributeType::Map(value_type) => {
            if let Some(obj) = value.as_object() {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            } else {
                diagnostics.push(type_error(path, "map", value));
            }
        },
        AttributeType::Dynamic => {},
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic {
        severity: DiagnosticSeverity::Error,
        summary: format!("Invalid type for attribute '{}'", path),
        detail: Some(format!(
            "Expected {}, got {}",
            expected,
            value_type_name(got)
        )),
        attribute: Some(path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, AttributeFlags, Schema};
    use serde_json::json;

    #[test]
    fn test_validate_required_string() {
        let schema = Schema::new().with_attribute("CollectorName", Attribute::required_string());

        // Valid
        let diagnostics = validate(&schema, &json!({"CollectorName": "CloudTrailCollector"}));
        assert!(diagnostics.is_empty());

        // Missing required
        let diagnostics = validate(&schema, &json!({}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("CollectorName".to_string()));

        // Null value
        let diagnostics = validate(&schema, &json!({"CollectorName": null}));
        assert_eq!(diagnostics.len(), 1);

        // Wrong type
        let diagnostics = validate(&schema, &json!({"CollectorName": 42}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].detail.as_deref(), Some("Expected string, got number"));
    }

    #[test]
    fn test_validate_optional_attribute() {
        let schema = Schema::new().with_attribute("Description", Attribute::optional_string());

        assert!(validate(&schema, &json!({})).is_empty());
        assert!(validate(&schema, &json!({"Description": null})).is_empty());
        assert!(validate(&schema, &json!({"Description": "hosted"})).is_empty());
    }

    #[test]
    fn test_validate_bool_like() {
        let schema = Schema::new().with_attribute("IsMultiRegionTrail", Attribute::optional_bool());

        assert!(validate(&schema, &json!({"IsMultiRegionTrail": "true"})).is_empty());
        assert!(validate(&schema, &json!({"IsMultiRegionTrail": "false"})).is_empty());
        assert!(validate(&schema, &json!({"IsMultiRegionTrail": true})).is_empty());
        assert!(validate(&schema, &json!({"IsMultiRegionTrail": "True"})).is_empty());
        assert!(validate(&schema, &json!({"IsMultiRegionTrail": "yes"})).is_empty());
        assert!(validate(&schema, &json!({"IsMultiRegionTrail": 1})).is_empty());

        let diagnostics = validate(&schema, &json!({"IsMultiRegionTrail": ["true"]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].detail.as_deref(), Some("Expected bool, got array"));

        let diagnostics = validate(&schema, &json!({"IsMultiRegionTrail": {"value": true}}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_validate_list() {
        let schema = Schema::new().with_attribute(
            "filters",
            Attribute::new(
                AttributeType::list(AttributeType::map(AttributeType::Dynamic)),
                AttributeFlags::optional(),
            ),
        );

        assert!(validate(
            &schema,
            &json!({"filters": [{"filterType": "Exclude", "regexp": ".*DEBUG.*"}]})
        )
        .is_empty());

        let diagnostics = validate(&schema, &json!({"filters": ["not-an-object"]}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("filters.0".to_string()));

        let diagnostics = validate(&schema, &json!({"filters": "nope"}));
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn test_validate_map() {
        let schema = Schema::new().with_attribute(
            "AppSources",
            Attribute::new(
                AttributeType::map(AttributeType::String),
                AttributeFlags::optional(),
            ),
        );

        assert!(validate(
            &schema,
            &json!({"AppSources": {"logsrc": "_sourceCategory=Labs/AWS/CloudTrail"}})
        )
        .is_empty());

        let diagnostics = validate(&schema, &json!({"AppSources": {"logsrc": 1}}));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute, Some("AppSources.logsrc".to_string()));
    }

    #[test]
    fn test_validate_multiple_errors() {
        let schema = Schema::new()
            .with_attribute("CollectorId", Attribute::required_string())
            .with_attribute("SourceName", Attribute::required_string())
            .with_attribute("RemoveOnDeleteStack", Attribute::optional_bool());

        let diagnostics = validate(&schema, &json!({"RemoveOnDeleteStack": "maybe"}));
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_undeclared_properties_ignored() {
        let schema = Schema::new().with_attribute("TrailName", Attribute::required_string());
        assert!(validate(&schema, &json!({"TrailName": "t", "ServiceToken": "arn:..."})).is_empty());
    }

    #[test]
    fn test_validate_root_not_object() {
        let schema = Schema::new();
        let diagnostics = validate(&schema, &json!([1, 2]));
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].detail.as_deref(), Some("Got array"));
    }

    #[test]
    fn test_is_valid_helper() {
        let schema = Schema::new().with_attribute("TrailName", Attribute::required_string());
        assert!(is_valid(&schema, &json!({"TrailName": "sumo-trail"})));
        assert!(!is_valid(&schema, &json!({})));
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = Schema::new().with_attribute("TrailName", Attribute::required_string());
        assert!(validate_result(&schema, &json!({"TrailName": "sumo-trail"})).is_ok());

        let err = validate_result(&schema, &json!({})).unwrap_err();
        assert_eq!(err.len(), 1);
    }
}
