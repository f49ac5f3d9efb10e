//! Drift detection for materialized views.
//!
//! The read endpoint returns less than the upsert accepts; schedule and
//! performance settings are write-only today. A field is compared only when
//! the read actually returned it. Every other desired field is reported as
//! unverifiable, so an `ok` never vouches for something nobody looked at. A
//! read that exposes none of the desired fields is a `skip`.

use std::collections::BTreeSet;
use std::future::Future;

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::Credential;
use crate::error::ProviderError;
use crate::normalize::ReadReply;
use crate::resource::MaterializedViewSpec;
use crate::types::{AttributeChange, DriftReport, DriftStatus, QueryId, RemoteResource};

/// The desired values a drift check compares against.
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredView {
    /// View name used for the read.
    pub name: String,
    /// Desired field values, keyed by API field name.
    pub fields: Map<String, Value>,
}

impl DesiredView {
    /// A desired view with no fields yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Map::new(),
        }
    }

    /// Only the bound query is expected.
    pub fn expecting_query(name: impl Into<String>, query_id: &QueryId) -> Self {
        Self::new(name).with_field("query_id", Value::String(query_id.as_str().to_string()))
    }

    /// Add a desired field.
    pub fn with_field(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    fn field_names(&self) -> BTreeSet<String> {
        self.fields.keys().cloned().collect()
    }
}

impl From<&MaterializedViewSpec> for DesiredView {
    fn from(spec: &MaterializedViewSpec) -> Self {
        Self {
            name: spec.name.clone(),
            fields: spec.desired_fields(),
        }
    }
}

/// Check a view for drift.
///
/// Without a credential nothing is fetched and the report is `skip`. A
/// failed read is returned as the error it is; in particular a transport
/// failure never turns into `missing`.
pub async fn check_drift<F, Fut>(
    credential: Option<&Credential>,
    desired: &DesiredView,
    fetch: F,
) -> Result<DriftReport, ProviderError>
where
    F: FnOnce(Credential) -> Fut,
    Fut: Future<Output = Result<ReadReply, ProviderError>>,
{
    let Some(credential) = credential else {
        debug!(name = %desired.name, "no credential, drift check skipped");
        return Ok(DriftReport::skip(
            desired.field_names(),
            format!(
                "drift check for materialized view '{}' skipped: no api_key configured",
                desired.name
            ),
        ));
    };

    match fetch(credential.clone()).await? {
        ReadReply::NotFound(reason) => {
            info!(name = %desired.name, "materialized view not found");
            Ok(DriftReport::missing(format!(
                "materialized view '{}' not found: {}",
                desired.name, reason
            )))
        },
        ReadReply::Found(remote) => Ok(compare(desired, &remote)),
    }
}

/// Compare desired fields against an observed snapshot.
pub fn compare(desired: &DesiredView, remote: &RemoteResource) -> DriftReport {
    let mut verified_fields = BTreeSet::new();
    let mut unverifiable_fields = BTreeSet::new();
    let mut changes = Vec::new();

    for (field, want) in &desired.fields {
        match remote.field(field) {
            None => {
                unverifiable_fields.insert(field.clone());
            },
            Some(actual) => {
                verified_fields.insert(field.clone());
                if !values_match(field, want, actual) {
                    changes.push(AttributeChange::modified(
                        field.clone(),
                        actual.clone(),
                        want.clone(),
                    ));
                }
            },
        }
    }

    if verified_fields.is_empty() {
        info!(name = %desired.name, "read returned no comparable fields, drift check skipped");
        return DriftReport::skip(
            unverifiable_fields.clone(),
            format!(
                "drift check for materialized view '{}' skipped: not observable via read API: {}",
                desired.name,
                join_or_none(&unverifiable_fields)
            ),
        );
    }

    let status = if changes.is_empty() {
        DriftStatus::Ok
    } else {
        DriftStatus::Drift
    };

    let mut message = match status {
        DriftStatus::Drift => {
            let diffs: Vec<String> = changes
                .iter()
                .map(|c| {
                    format!(
                        "{} desired {}, actual {}",
                        c.path,
                        display_value(c.after.as_ref()),
                        display_value(c.before.as_ref())
                    )
                })
                .collect();
            format!(
                "materialized view '{}' has drifted: {}",
                desired.name,
                diffs.join("; ")
            )
        },
        _ => format!(
            "materialized view '{}' matches desired {}",
            desired.name,
            join_or_none(&verified_fields)
        ),
    };
    if !unverifiable_fields.is_empty() {
        message.push_str(&format!(
            "; not observable via read API: {}",
            join_or_none(&unverifiable_fields)
        ));
    }

    info!(name = %desired.name, status = ?status, "drift check complete");
    DriftReport {
        status,
        verified_fields,
        unverifiable_fields,
        changes,
        message,
    }
}

fn values_match(field: &str, want: &Value, actual: &Value) -> bool {
    if field == "query_id" {
        return QueryId::from_json(want) == QueryId::from_json(actual);
    }
    want == actual
}

fn display_value(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "<none>".to_string(),
    }
}

fn join_or_none(fields: &BTreeSet<String>) -> String {
    if fields.is_empty() {
        "(no fields)".to_string()
    } else {
        fields.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}
