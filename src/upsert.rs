//! Create and upsert calls.
//!
//! Each function validates its inputs, checks for a credential and then makes
//! exactly one request. Nothing here retries: a create that timed out may
//! still have succeeded remotely, and sending it again would make a second
//! query.

use tracing::{info, instrument};

use crate::client::{ApiTransport, CreateQueryRequest, UpsertMaterializedViewRequest};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::normalize::{extract_query_id, extract_upsert};
use crate::resource::{MaterializedViewSpec, QueryDraft};
use crate::types::ReconciliationResult;

/// Create a query from a validated draft.
#[instrument(skip_all, fields(name = draft.name))]
pub async fn create_query<T>(
    transport: &T,
    config: &ProviderConfig,
    draft: QueryDraft<'_>,
) -> Result<ReconciliationResult, ProviderError>
where
    T: ApiTransport + ?Sized,
{
    let credential = config.require_credential("create a query")?;

    let request = CreateQueryRequest {
        name: draft.name.to_string(),
        query_sql: draft.query_sql.to_string(),
        is_private: draft.is_private,
    };
    let response = transport.create_query(credential, &request).await?;
    let id = extract_query_id(&response)?;

    info!(query_id = %id, "query created");
    Ok(ReconciliationResult::created_query(&id))
}

/// Upsert a materialized view.
///
/// The API decides whether this creates a view or updates the one already
/// bound to `query_id`; that decision is not mirrored here. A conflict with a
/// view owned by another query comes back as [`ProviderError::RemoteRejected`]
/// and is not retried under a different identity.
#[instrument(skip_all, fields(name = %spec.name, query_id = %spec.query_id))]
pub async fn upsert_materialized_view<T>(
    transport: &T,
    config: &ProviderConfig,
    spec: &MaterializedViewSpec,
) -> Result<ReconciliationResult, ProviderError>
where
    T: ApiTransport + ?Sized,
{
    spec.validate()?;
    let credential = config.require_credential("upsert a materialized view")?;

    let request = UpsertMaterializedViewRequest {
        name: spec.name.clone(),
        query_id: spec.query_id.to_wire(),
        cron_expression: spec.cron_expression.clone(),
        performance: spec.performance.clone(),
        is_private: spec.is_private,
    };
    let response = transport.upsert_materialized_view(credential, &request).await?;
    let reply = extract_upsert(&response)?;

    let full_name = reply
        .full_name
        .or_else(|| config.qualified_view_name(&spec.name));

    info!(
        full_name = full_name.as_deref().unwrap_or("<unknown>"),
        refresh_triggered = reply.execution_id.is_some(),
        "materialized view upserted"
    );
    Ok(ReconciliationResult::upserted_view(
        spec.name.clone(),
        full_name,
        reply.execution_id,
    ))
}
