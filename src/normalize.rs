//! Canonical field extraction from API replies.
//!
//! The API is not consistent about where it puts things. Each reply is
//! checked in a fixed order: an explicit error payload first, then the HTTP
//! status, then each known shape of the field being looked for. A reply that
//! matches none of them becomes a typed error, never a silent `None`.

use serde_json::Value;

use crate::client::{sanitize_for_log, ApiResponse};
use crate::error::ProviderError;
use crate::types::{QueryId, RemoteResource};

/// Where a create-query reply may carry the new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdShape {
    /// `{"query_id": 99}`
    TopLevel,
    /// `{"base": {"query_id": 99}}`
    Wrapped,
}

impl IdShape {
    /// Shapes in the order they are tried.
    pub const PRIORITY: [IdShape; 2] = [IdShape::TopLevel, IdShape::Wrapped];

    fn locate(self, body: &Value) -> Option<&Value> {
        match self {
            IdShape::TopLevel => body.get("query_id"),
            IdShape::Wrapped => body.get("base")?.get("query_id"),
        }
    }
}

/// The explicit error message of a reply, if it carries one.
///
/// `{"error": "msg"}` yields `msg` unchanged. An object payload yields its
/// `message` field, or the whole payload as JSON when it has none.
pub fn error_message(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null => None,
        Value::String(msg) => Some(msg.clone()),
        other => Some(
            other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

/// Fail on an error payload or a non-2xx status.
fn reject_unsuccessful(response: &ApiResponse) -> Result<(), ProviderError> {
    if let Some(msg) = error_message(&response.body) {
        return Err(ProviderError::RemoteRejected(msg));
    }
    if !response.is_success() {
        return Err(ProviderError::RemoteRejected(format!(
            "HTTP {}: {}",
            response.status,
            body_snippet(&response.body)
        )));
    }
    Ok(())
}

fn body_snippet(body: &Value) -> String {
    match body {
        Value::String(text) => sanitize_for_log(text),
        other => sanitize_for_log(&other.to_string()),
    }
}

/// Extract the id from a create-query reply.
pub fn extract_query_id(response: &ApiResponse) -> Result<QueryId, ProviderError> {
    reject_unsuccessful(response)?;

    IdShape::PRIORITY
        .iter()
        .find_map(|shape| shape.locate(&response.body).and_then(QueryId::from_json))
        .ok_or_else(|| {
            ProviderError::MissingIdentifier(format!(
                "no query_id in create response: {}",
                body_snippet(&response.body)
            ))
        })
}

/// Fields of interest in an upsert reply.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpsertReply {
    /// Fully qualified view name, when the API reported it.
    pub full_name: Option<String>,
    /// Refresh execution started by the upsert.
    pub execution_id: Option<String>,
}

/// Extract full name and execution id from an upsert reply.
pub fn extract_upsert(response: &ApiResponse) -> Result<UpsertReply, ProviderError> {
    reject_unsuccessful(response)?;

    let body = &response.body;
    Ok(UpsertReply {
        full_name: ["full_name", "name"]
            .iter()
            .find_map(|key| non_empty_text(body.get(*key))),
        execution_id: non_empty_text(body.get("execution_id")),
    })
}

fn non_empty_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Outcome of a view read that reached the API.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadReply {
    /// The view exists; these are the fields the API returned.
    Found(RemoteResource),
    /// The API said the view does not exist.
    NotFound(String),
}

/// Interpret a read reply.
///
/// HTTP 404, or an error payload mentioning "not found", is an explicit
/// not-found. Any other error payload is a rejection.
pub fn interpret_read(name: &str, response: &ApiResponse) -> Result<ReadReply, ProviderError> {
    let message = error_message(&response.body);

    if response.is_not_found() {
        return Ok(ReadReply::NotFound(
            message.unwrap_or_else(|| format!("materialized view '{}' not found", name)),
        ));
    }
    if let Some(msg) = message {
        if msg.to_ascii_lowercase().contains("not found") {
            return Ok(ReadReply::NotFound(msg));
        }
        return Err(ProviderError::RemoteRejected(msg));
    }
    reject_unsuccessful(response)?;

    if !response.body.is_object() {
        return Err(ProviderError::MissingIdentifier(format!(
            "read of materialized view '{}' returned no fields: {}",
            name,
            body_snippet(&response.body)
        )));
    }
    Ok(ReadReply::Found(RemoteResource::from_body(name, &response.body)))
}
