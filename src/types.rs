//! Core value types shared by the resolver, executor and drift detector.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Canonical identifier of a Dune query.
///
/// The API hands ids out as integers in some replies and strings in others;
/// both collapse into this type at the boundary. The inner string is kept
/// exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(String);

impl QueryId {
    /// Interpret a caller-supplied id.
    ///
    /// Returns `None` for the values that mean "no id": the empty string,
    /// `"null"` and `"0"`. Anything else is returned unchanged.
    pub fn explicit(raw: &str) -> Option<Self> {
        match raw {
            "" | "null" | "0" => None,
            _ => Some(Self(raw.to_string())),
        }
    }

    /// Read an id from a JSON string or integer, applying the same "no id"
    /// rules as [`QueryId::explicit`].
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Self::explicit(s),
            Value::Number(n) if n.is_i64() || n.is_u64() => Self::explicit(&n.to_string()),
            _ => None,
        }
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wire representation: an integer when the id is a canonical decimal,
    /// else a string. `"007"` stays a string so nothing is lost.
    pub fn to_wire(&self) -> Value {
        match self.0.parse::<u64>() {
            Ok(n) if n.to_string() == self.0 => json!(n),
            _ => json!(self.0),
        }
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kinds of resource this provider manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A saved SQL query.
    Query,
    /// A scheduled, precomputed result of a query.
    MaterializedView,
}

impl ResourceKind {
    /// Resource type name used in provider schemas.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::Query => "dune_query",
            Self::MaterializedView => "dune_materialized_view",
        }
    }

    /// Look up a kind by its resource type name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "dune_query" => Some(Self::Query),
            "dune_materialized_view" => Some(Self::MaterializedView),
            _ => None,
        }
    }
}

/// How a reconciliation was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// An explicit id was reused without contacting the API.
    Existing,
    /// A new remote resource was created.
    Created,
    /// The remote upsert was applied; the API decided create vs update.
    Updated,
}

impl Mode {
    /// Lowercase name as it appears in state.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::Created => "created",
            Self::Updated => "updated",
        }
    }
}

/// Outcome of a successful create, upsert or identity reuse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    /// Kind of the reconciled resource.
    pub kind: ResourceKind,
    /// Query id for queries, view name for materialized views.
    pub id: String,
    /// How the result was reached.
    pub mode: Mode,
    /// Refresh execution started by an upsert, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// Fully qualified view name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl ReconciliationResult {
    /// A query resolved from an explicit id.
    pub fn existing_query(id: &QueryId) -> Self {
        Self {
            kind: ResourceKind::Query,
            id: id.as_str().to_string(),
            mode: Mode::Existing,
            execution_id: None,
            full_name: None,
        }
    }

    /// A query the API just created.
    pub fn created_query(id: &QueryId) -> Self {
        Self {
            mode: Mode::Created,
            ..Self::existing_query(id)
        }
    }

    /// A materialized view after an upsert.
    pub fn upserted_view(
        name: impl Into<String>,
        full_name: Option<String>,
        execution_id: Option<String>,
    ) -> Self {
        Self {
            kind: ResourceKind::MaterializedView,
            id: name.into(),
            mode: Mode::Updated,
            execution_id,
            full_name,
        }
    }

    /// Whether the upsert reported an implicit refresh.
    pub fn refresh_triggered(&self) -> bool {
        self.execution_id.is_some()
    }

    /// Render the state handed back to the plan/apply engine.
    ///
    /// Queries: `{"query_id": "..", "mode": ".."}`.
    /// Views: `{"name", "full_name", "updated": "true", "execution_id"?}`.
    pub fn to_state(&self) -> Value {
        match self.kind {
            ResourceKind::Query => json!({
                "query_id": self.id,
                "mode": self.mode.as_str(),
            }),
            ResourceKind::MaterializedView => {
                let mut state = Map::new();
                state.insert("name".to_string(), json!(self.id));
                if let Some(full_name) = &self.full_name {
                    state.insert("full_name".to_string(), json!(full_name));
                }
                state.insert("updated".to_string(), json!("true"));
                if let Some(execution_id) = &self.execution_id {
                    state.insert("execution_id".to_string(), json!(execution_id));
                }
                Value::Object(state)
            },
        }
    }
}

/// A normalized read of a remote resource. Never persisted here.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RemoteResource {
    /// Remote identity (the view name for materialized views).
    pub id: String,
    /// The fields the read endpoint actually returned, nulls removed.
    pub observable_fields: Map<String, Value>,
}

impl RemoteResource {
    /// Build from a read reply body, dropping null fields.
    pub fn from_body(id: impl Into<String>, body: &Value) -> Self {
        let observable_fields = body
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter(|(_, v)| !v.is_null())
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: id.into(),
            observable_fields,
        }
    }

    /// Look up an observed field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.observable_fields.get(name)
    }
}

/// A difference between desired and observed value of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The attribute name.
    pub path: String,
    /// The value currently observed remotely.
    pub before: Option<Value>,
    /// The desired value.
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// Classification of a drift check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    /// The read endpoint reports the resource does not exist.
    Missing,
    /// Nothing could be compared: no credential, or the read exposed none of
    /// the desired fields.
    Skip,
    /// Every observable field matches.
    Ok,
    /// At least one observable field differs.
    Drift,
}

/// Result of comparing desired state with an observed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Overall classification.
    pub status: DriftStatus,
    /// Desired fields that were compared against the read.
    pub verified_fields: BTreeSet<String>,
    /// Desired fields the read endpoint did not expose.
    pub unverifiable_fields: BTreeSet<String>,
    /// Observable fields whose values differ.
    pub changes: Vec<AttributeChange>,
    /// Human-readable summary naming desired and actual values.
    pub message: String,
}

impl DriftReport {
    /// A report with no comparisons performed.
    pub fn skip(unverifiable_fields: BTreeSet<String>, message: impl Into<String>) -> Self {
        Self {
            status: DriftStatus::Skip,
            verified_fields: BTreeSet::new(),
            unverifiable_fields,
            changes: Vec::new(),
            message: message.into(),
        }
    }

    /// A report for a resource the API says does not exist.
    pub fn missing(message: impl Into<String>) -> Self {
        Self {
            status: DriftStatus::Missing,
            verified_fields: BTreeSet::new(),
            unverifiable_fields: BTreeSet::new(),
            changes: Vec::new(),
            message: message.into(),
        }
    }

    /// Whether the remote state needs attention.
    pub fn needs_apply(&self) -> bool {
        matches!(self.status, DriftStatus::Missing | DriftStatus::Drift)
    }

    /// Serialize into state JSON.
    pub fn to_state(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
