//! HTTP access to the Dune REST API.
//!
//! [`ApiTransport`] is the seam the reconciler calls through. [`DuneClient`]
//! implements it with reqwest; tests substitute a recording fake. A transport
//! only moves bytes: any HTTP status comes back as an [`ApiResponse`], and
//! `Err` is reserved for requests that never produced a response.

use std::fmt;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{Credential, ProviderConfig};
use crate::error::ProviderError;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "X-Dune-Api-Key";

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Truncate a body for logs and error messages.
pub(crate) fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Status and body of an API reply.
///
/// Bodies that are not JSON are kept as a JSON string so nothing is lost.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Parsed body.
    pub body: Value,
}

impl ApiResponse {
    /// Create a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// A 200 response with the given body.
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the status is 404.
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    fn from_text(status: u16, text: &str) -> Self {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        };
        Self { status, body }
    }
}

/// Body of a create-query call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateQueryRequest {
    /// Display name.
    pub name: String,
    /// SQL text.
    pub query_sql: String,
    /// Privacy flag.
    pub is_private: bool,
}

/// Body of an upsert-materialized-view call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpsertMaterializedViewRequest {
    /// Short view name.
    pub name: String,
    /// Query id in wire form (integer when numeric).
    pub query_id: Value,
    /// Refresh schedule.
    pub cron_expression: String,
    /// Refresh performance tier.
    pub performance: String,
    /// Privacy flag.
    pub is_private: bool,
}

/// The three API calls the reconciler makes.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    /// Create a query. Not idempotent.
    async fn create_query(
        &self,
        credential: &Credential,
        request: &CreateQueryRequest,
    ) -> Result<ApiResponse, ProviderError>;

    /// Create or update the view bound to the request's query id.
    async fn upsert_materialized_view(
        &self,
        credential: &Credential,
        request: &UpsertMaterializedViewRequest,
    ) -> Result<ApiResponse, ProviderError>;

    /// Read a view by name. Idempotent.
    async fn get_materialized_view(
        &self,
        credential: &Credential,
        name: &str,
    ) -> Result<ApiResponse, ProviderError>;
}

/// reqwest-backed [`ApiTransport`].
#[derive(Clone)]
pub struct DuneClient {
    client: Client,
    base_url: String,
}

impl fmt::Debug for DuneClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuneClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl DuneClient {
    /// Create a client for the configured base URL and timeout.
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let mut builder =
            Client::builder().user_agent(concat!("hemmer-provider-dune/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            ProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    /// The base URL requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<ApiResponse, ProviderError> {
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), body = %sanitize_for_log(&text), "API returned error status");
        }

        Ok(ApiResponse::from_text(status.as_u16(), &text))
    }
}

#[async_trait]
impl ApiTransport for DuneClient {
    async fn create_query(
        &self,
        credential: &Credential,
        request: &CreateQueryRequest,
    ) -> Result<ApiResponse, ProviderError> {
        let url = self.url("query");
        debug!("POST {}", url);
        self.send(
            self.client
                .post(&url)
                .header(API_KEY_HEADER, credential.expose())
                .json(request),
        )
        .await
    }

    async fn upsert_materialized_view(
        &self,
        credential: &Credential,
        request: &UpsertMaterializedViewRequest,
    ) -> Result<ApiResponse, ProviderError> {
        let url = self.url("materialized-views");
        debug!("POST {}", url);
        self.send(
            self.client
                .post(&url)
                .header(API_KEY_HEADER, credential.expose())
                .json(request),
        )
        .await
    }

    async fn get_materialized_view(
        &self,
        credential: &Credential,
        name: &str,
    ) -> Result<ApiResponse, ProviderError> {
        let url = self.url(&format!("materialized-views/{}", urlencoding::encode(name)));
        debug!("GET {}", url);
        self.send(
            self.client
                .get(&url)
                .header(API_KEY_HEADER, credential.expose()),
        )
        .await
    }
}
