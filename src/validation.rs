//! Schema validation helpers.
//!
//! Validates a `serde_json::Value` against a [`Schema`] and reports problems
//! as [`Diagnostic`]s. Resource configuration goes through here before it is
//! turned into a typed spec, so a missing `name` never reaches the API.
//!
//! # Example
//!
//! ```
//! use hemmer_provider_dune::schema::{Attribute, Schema};
//! use hemmer_provider_dune::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("query_id", Attribute::required_identifier());
//!
//! assert!(validate(&schema, &json!({"name": "mv1", "query_id": 10})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "mv1", "query_id": null}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("query_id".to_string()));
//! ```

use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};
use serde_json::Value;

/// Validate a JSON value against a schema.
///
/// Returns a list of diagnostics for any validation errors found.
/// An empty list means the value is valid.
///
/// # Validation Rules
///
/// - Required attributes must be present, non-null and, for strings, non-empty
/// - Optional attributes may be absent or null
/// - Computed-only attributes are skipped (provider sets these)
/// - Attribute types must match the schema
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

    // Stable ordering keeps error messages deterministic.
    let mut names: Vec<&String> = schema.attributes.keys().collect();
    names.sort();

    for name in names {
        let attr = &schema.attributes[name];
        validate_attribute(attr, obj.get(name.as_str()), name, &mut diagnostics);
    }

    diagnostics
}

/// Validate a JSON value against a schema, returning Ok if valid or Err with diagnostics.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Check if a JSON value is valid against a schema.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

/// Validate and fold any error diagnostics into a [`ProviderError::Validation`].
pub fn ensure_valid(schema: &Schema, value: &Value) -> Result<(), ProviderError> {
    validate_result(schema, value).map_err(|diagnostics| {
        let summaries: Vec<String> = diagnostics.into_iter().map(|d| d.summary).collect();
        ProviderError::Validation(summaries.join("; "))
    })
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // Skip computed-only attributes (provider sets these)
    if attr.flags.computed && !attr.flags.optional && !attr.flags.required {
        return;
    }

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
        Some(Value::String(s)) if s.is_empty() && attr.flags.required => {
            diagnostics.push(
                Diagnostic::error(format!("Required attribute '{}' is empty", path))
                    .with_attribute(path),
            );
        },
        Some(v) => {
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
        },
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
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::Identifier => {
            if !(value.is_string() || is_int64(value)) {
                diagnostics.push(type_error(path, "string or integer identifier", value));
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

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.is_u64(),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, value: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(value)))
        .with_attribute(path)
}
