//! Desired-state descriptions of the resources this provider manages.
//!
//! Specs are built either directly or from the JSON configuration the engine
//! hands over, and are not modified once an operation receives them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::types::{QueryId, ResourceKind};
use crate::validation::ensure_valid;

/// Refresh tier used when a view does not name one.
pub const DEFAULT_PERFORMANCE: &str = "medium";

/// Desired state of a saved query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Display name of the query.
    pub name: Option<String>,
    /// SQL text.
    pub query_sql: Option<String>,
    /// Whether the query is private to its owner.
    #[serde(default)]
    pub is_private: bool,
    /// Id of an existing query to adopt instead of creating one.
    pub query_id: Option<QueryId>,
}

/// The fields of a [`QuerySpec`] that a create call needs, confirmed present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDraft<'a> {
    /// Display name of the query.
    pub name: &'a str,
    /// SQL text.
    pub query_sql: &'a str,
    /// Whether the query is private to its owner.
    pub is_private: bool,
}

impl QuerySpec {
    /// A query to be created with the given name and SQL.
    pub fn new(name: impl Into<String>, query_sql: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            query_sql: Some(query_sql.into()),
            is_private: false,
            query_id: None,
        }
    }

    /// Adopt an existing query id. Values meaning "no id" are ignored.
    pub fn with_query_id(mut self, raw: &str) -> Self {
        self.query_id = QueryId::explicit(raw);
        self
    }

    /// Set query privacy.
    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    /// Schema of a `dune_query` resource.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("A saved Dune query")
            .with_attribute("name", Attribute::required_string())
            .with_attribute("query_sql", Attribute::required_string())
            .with_attribute(
                "is_private",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute(
                "query_id",
                Attribute::optional_computed_identifier()
                    .with_description("Existing query to adopt; set by the provider on create"),
            )
            .with_attribute("mode", Attribute::computed_string())
    }

    /// Build from resource configuration.
    ///
    /// When an explicit id is present only attribute types are checked: the
    /// body is never sent, so a missing name or SQL is not an error.
    pub fn from_config(config: &Value) -> Result<Self, ProviderError> {
        let query_id = config.get("query_id").and_then(QueryId::from_json);
        let schema = Self::schema();
        if query_id.is_some() {
            ensure_valid(&schema.relaxed(), config)?;
        } else {
            ensure_valid(&schema, config)?;
        }

        Ok(Self {
            name: string_field(config, "name"),
            query_sql: string_field(config, "query_sql"),
            is_private: config
                .get("is_private")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            query_id,
        })
    }

    /// Confirm the create-time fields are present and non-empty.
    pub fn draft(&self) -> Result<QueryDraft<'_>, ProviderError> {
        let name = require_str(self.name.as_deref(), "name")?;
        let query_sql = require_str(self.query_sql.as_deref(), "query_sql")?;
        Ok(QueryDraft {
            name,
            query_sql,
            is_private: self.is_private,
        })
    }
}

/// Desired state of a materialized view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedViewSpec {
    /// Short view name; the remote qualifies it with namespace and team.
    pub name: String,
    /// Query the view materializes.
    pub query_id: QueryId,
    /// Refresh schedule.
    pub cron_expression: String,
    /// Refresh performance tier.
    pub performance: String,
    /// Whether the view is private.
    pub is_private: bool,
}

impl MaterializedViewSpec {
    /// A view of `query_id` refreshed on `cron_expression`.
    pub fn new(
        name: impl Into<String>,
        query_id: QueryId,
        cron_expression: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            query_id,
            cron_expression: cron_expression.into(),
            performance: DEFAULT_PERFORMANCE.to_string(),
            is_private: false,
        }
    }

    /// Set the performance tier.
    pub fn with_performance(mut self, performance: impl Into<String>) -> Self {
        self.performance = performance.into();
        self
    }

    /// Set view privacy.
    pub fn with_private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    /// Schema of a `dune_materialized_view` resource.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("A scheduled materialized view of a Dune query")
            .with_attribute("name", Attribute::required_string())
            .with_attribute("query_id", Attribute::required_identifier())
            .with_attribute("cron_expression", Attribute::required_string())
            .with_attribute(
                "performance",
                Attribute::optional_string().with_default(json!(DEFAULT_PERFORMANCE)),
            )
            .with_attribute(
                "is_private",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute("full_name", Attribute::computed_string())
            .with_attribute("execution_id", Attribute::computed_string())
            .with_attribute(
                "drift",
                Attribute::new(AttributeType::Dynamic, AttributeFlags::computed())
                    .with_description("Result of the last drift check"),
            )
    }

    /// Build from resource configuration.
    pub fn from_config(config: &Value) -> Result<Self, ProviderError> {
        ensure_valid(&Self::schema(), config)?;

        let query_id = config
            .get("query_id")
            .and_then(QueryId::from_json)
            .ok_or_else(|| {
                ProviderError::Validation("Attribute 'query_id' must be a non-zero id".to_string())
            })?;

        Ok(Self {
            name: string_field(config, "name").unwrap_or_default(),
            query_id,
            cron_expression: string_field(config, "cron_expression").unwrap_or_default(),
            performance: string_field(config, "performance")
                .unwrap_or_else(|| DEFAULT_PERFORMANCE.to_string()),
            is_private: config
                .get("is_private")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        })
    }

    /// Confirm the upsert-time fields are present and non-empty.
    pub fn validate(&self) -> Result<(), ProviderError> {
        require_str(Some(&self.name), "name")?;
        require_str(Some(&self.cron_expression), "cron_expression")?;
        Ok(())
    }

    /// Desired values of the fields a read could be compared against.
    ///
    /// The name is the lookup key and is not part of the comparison.
    pub fn desired_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("query_id".to_string(), json!(self.query_id.as_str()));
        fields.insert("cron_expression".to_string(), json!(self.cron_expression));
        fields.insert("performance".to_string(), json!(self.performance));
        fields.insert("is_private".to_string(), json!(self.is_private));
        fields
    }
}

/// Desired state of any managed resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSpec {
    /// A saved query.
    Query(QuerySpec),
    /// A materialized view.
    MaterializedView(MaterializedViewSpec),
}

impl ResourceSpec {
    /// Build a spec of the given kind from resource configuration.
    pub fn from_config(kind: ResourceKind, config: &Value) -> Result<Self, ProviderError> {
        match kind {
            ResourceKind::Query => QuerySpec::from_config(config).map(Self::Query),
            ResourceKind::MaterializedView => {
                MaterializedViewSpec::from_config(config).map(Self::MaterializedView)
            },
        }
    }

    /// The kind of resource described.
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Query(_) => ResourceKind::Query,
            Self::MaterializedView(_) => ResourceKind::MaterializedView,
        }
    }

    /// Schema for a resource kind.
    pub fn schema_for(kind: ResourceKind) -> Schema {
        match kind {
            ResourceKind::Query => QuerySpec::schema(),
            ResourceKind::MaterializedView => MaterializedViewSpec::schema(),
        }
    }
}

fn string_field(config: &Value, name: &str) -> Option<String> {
    config.get(name).and_then(Value::as_str).map(str::to_string)
}

fn require_str<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, ProviderError> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ProviderError::Validation(format!(
            "Missing required attribute '{}'",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_from_config() {
        let spec = QuerySpec::from_config(&json!({"name": "Rev", "query_sql": "select 1"})).unwrap();
        assert_eq!(spec.name.as_deref(), Some("Rev"));
        assert!(!spec.is_private);
        assert!(spec.query_id.is_none());
    }

    #[test]
    fn test_query_from_config_requires_body_without_id() {
        let err = QuerySpec::from_config(&json!({"name": "Rev"})).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.message().contains("query_sql"));

        let err = QuerySpec::from_config(&json!({"name": "Rev", "query_sql": null})).unwrap_err();
        assert!(err.message().contains("query_sql"));
    }

    #[test]
    fn test_query_from_config_with_explicit_id_relaxes_presence() {
        let spec = QuerySpec::from_config(&json!({"query_id": "42"})).unwrap();
        assert_eq!(spec.query_id, QueryId::explicit("42"));

        // Types are still checked.
        let err = QuerySpec::from_config(&json!({"query_id": "42", "name": 7})).unwrap_err();
        assert!(err.message().contains("name"));
    }

    #[test]
    fn test_query_zero_id_is_not_explicit() {
        let err = QuerySpec::from_config(&json!({"query_id": 0})).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));

        let spec = QuerySpec::new("Rev", "select 1").with_query_id("null");
        assert!(spec.query_id.is_none());
    }

    #[test]
    fn test_query_draft() {
        let spec = QuerySpec::new("Rev", "select 1").with_private(true);
        let draft = spec.draft().unwrap();
        assert_eq!(draft.name, "Rev");
        assert_eq!(draft.query_sql, "select 1");
        assert!(draft.is_private);

        let spec = QuerySpec {
            name: Some("Rev".to_string()),
            query_sql: Some(String::new()),
            is_private: false,
            query_id: None,
        };
        assert!(matches!(spec.draft(), Err(ProviderError::Validation(_))));
    }

    #[test]
    fn test_view_from_config_defaults() {
        let spec = MaterializedViewSpec::from_config(&json!({
            "name": "mv1",
            "query_id": 10,
            "cron_expression": "0 * * * *"
        }))
        .unwrap();

        assert_eq!(spec.query_id.as_str(), "10");
        assert_eq!(spec.performance, DEFAULT_PERFORMANCE);
        assert!(!spec.is_private);
    }

    #[test]
    fn test_view_from_config_requires_fields() {
        let err = MaterializedViewSpec::from_config(&json!({"name": "mv1", "query_id": 10}))
            .unwrap_err();
        assert!(err.message().contains("cron_expression"));

        let err = MaterializedViewSpec::from_config(&json!({
            "name": "mv1",
            "query_id": "0",
            "cron_expression": "0 * * * *"
        }))
        .unwrap_err();
        assert!(err.message().contains("query_id"));
    }

    #[test]
    fn test_view_validate_rejects_empty_fields() {
        let spec = MaterializedViewSpec::new("mv1", QueryId::explicit("10").unwrap(), "");
        let err = spec.validate().unwrap_err();
        assert!(err.message().contains("cron_expression"));
    }

    #[test]
    fn test_view_desired_fields() {
        let spec = MaterializedViewSpec::new("mv1", QueryId::explicit("10").unwrap(), "0 * * * *")
            .with_performance("large");
        let fields = spec.desired_fields();
        assert_eq!(fields["query_id"], json!("10"));
        assert_eq!(fields["performance"], json!("large"));
        assert!(!fields.contains_key("name"));
    }

    #[test]
    fn test_resource_spec_dispatch() {
        let spec = ResourceSpec::from_config(
            ResourceKind::MaterializedView,
            &json!({"name": "mv1", "query_id": 10, "cron_expression": "0 * * * *"}),
        )
        .unwrap();
        assert_eq!(spec.kind(), ResourceKind::MaterializedView);

        let spec = ResourceSpec::from_config(ResourceKind::Query, &json!({"query_id": 42})).unwrap();
        assert_eq!(spec.kind(), ResourceKind::Query);
    }
}
