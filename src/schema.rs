//! Schema types for describing provider and resource structure.
//!
//! Schemas describe the shape of the provider configuration and of each
//! resource kind. The resolver and the upsert executor rely on them to reject
//! incomplete configuration before any request reaches the API.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Value type accepted for an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    /// JSON string.
    String,
    /// JSON integer within `i64`/`u64` range.
    Int64,
    /// JSON boolean.
    Bool,
    /// A remote identifier, accepted as either a string or an integer.
    Identifier,
    /// Anything; only used for provider-computed blobs.
    Dynamic,
}

/// Who sets an attribute, and whether it is secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// Configuration must provide it.
    pub required: bool,
    /// Configuration may provide it.
    pub optional: bool,
    /// The provider fills it in.
    pub computed: bool,
    /// Redacted in plans and logs.
    pub sensitive: bool,
}

impl AttributeFlags {
    const fn with(required: bool, optional: bool, computed: bool) -> Self {
        Self {
            required,
            optional,
            computed,
            sensitive: false,
        }
    }

    /// Must be set in configuration.
    pub const fn required() -> Self {
        Self::with(true, false, false)
    }

    /// May be set in configuration.
    pub const fn optional() -> Self {
        Self::with(false, true, false)
    }

    /// Set by the provider only, never by configuration.
    pub const fn computed() -> Self {
        Self::with(false, false, true)
    }

    /// May be set in configuration; filled in by the provider otherwise.
    pub const fn optional_computed() -> Self {
        Self::with(false, true, true)
    }

    /// Hide the value from plans and logs.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// One named field of a resource or of the provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Accepted value type.
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    /// Who sets it.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Shown in generated documentation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default value applied when the attribute is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

impl Attribute {
    /// An attribute with no description or default.
    pub fn new(attr_type: AttributeType, flags: AttributeFlags) -> Self {
        Self {
            attr_type,
            flags,
            description: None,
            default: None,
        }
    }

    /// Required string.
    pub fn required_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::required())
    }

    /// Optional string.
    pub fn optional_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::optional())
    }

    /// String set by the provider.
    pub fn computed_string() -> Self {
        Self::new(AttributeType::String, AttributeFlags::computed())
    }

    /// Optional integer.
    pub fn optional_int64() -> Self {
        Self::new(AttributeType::Int64, AttributeFlags::optional())
    }

    /// Optional boolean.
    pub fn optional_bool() -> Self {
        Self::new(AttributeType::Bool, AttributeFlags::optional())
    }

    /// Required remote id.
    pub fn required_identifier() -> Self {
        Self::new(AttributeType::Identifier, AttributeFlags::required())
    }

    /// Remote id that configuration may pin and the provider otherwise assigns.
    pub fn optional_computed_identifier() -> Self {
        Self::new(AttributeType::Identifier, AttributeFlags::optional_computed())
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach the value assumed when the attribute is absent.
    pub fn with_default(mut self, default: serde_json::Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Redact this attribute.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }
}

/// Schema for a resource or for the provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Schema {
    /// Schema version recorded alongside state.
    #[serde(default)]
    pub version: u64,
    /// Attributes keyed by JSON field name.
    #[serde(default)]
    pub attributes: HashMap<String, Attribute>,
    /// What the resource is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Schema {
    /// An empty schema at `version`.
    pub fn new(version: u64) -> Self {
        Self {
            version,
            attributes: HashMap::new(),
            description: None,
        }
    }

    /// An empty schema at version 0.
    pub fn v0() -> Self {
        Self::new(0)
    }

    /// Add or replace an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, attr: Attribute) -> Self {
        self.attributes.insert(name.into(), attr);
        self
    }

    /// Attach a description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// A copy of this schema with every required attribute made optional.
    ///
    /// Type checks still apply; only presence is no longer enforced.
    pub fn relaxed(&self) -> Self {
        let mut schema = self.clone();
        for attr in schema.attributes.values_mut() {
            if attr.flags.required {
                attr.flags.required = false;
                attr.flags.optional = true;
            }
        }
        schema
    }
}

/// Schemas for the provider configuration and each resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProviderSchema {
    /// The provider configuration block.
    #[serde(default)]
    pub provider: Schema,
    /// Resource schemas keyed by type name, e.g. `dune_query`.
    #[serde(default)]
    pub resources: HashMap<String, Schema>,
}

impl ProviderSchema {
    /// No provider attributes and no resources.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the provider configuration schema.
    pub fn with_provider_config(mut self, schema: Schema) -> Self {
        self.provider = schema;
        self
    }

    /// Register a resource type.
    pub fn with_resource(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.resources.insert(name.into(), schema);
        self
    }
}

/// How serious a [`Diagnostic`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// The operation failed.
    Error,
    /// The operation went ahead but something looks wrong.
    Warning,
}

/// A problem reported back to the engine, optionally tied to an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Error or warning.
    pub severity: DiagnosticSeverity,
    /// One-line description.
    pub summary: String,
    /// Longer explanation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Offending attribute, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    fn new(severity: DiagnosticSeverity, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// A diagnostic that fails the operation.
    pub fn error(summary: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, summary)
    }

    /// A diagnostic reported alongside a successful operation.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, summary)
    }

    /// Attach a longer explanation.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Point at the offending attribute.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}
