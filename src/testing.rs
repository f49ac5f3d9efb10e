//! Testing utilities for the Dune provider.
//!
//! [`RecordingTransport`] stands in for the HTTP client: it replays scripted
//! responses and counts every call, which is how the "no request was made"
//! guarantees are checked. [`ProviderTester`] drives a [`ProviderService`]
//! without an engine around it.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use hemmer_provider_dune::client::ApiResponse;
//! use hemmer_provider_dune::testing::RecordingTransport;
//! use hemmer_provider_dune::{ProviderConfig, QuerySpec, Reconciler};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let transport = Arc::new(
//!     RecordingTransport::new().with_create_response(Ok(ApiResponse::ok(json!({"query_id": 99})))),
//! );
//! let reconciler = Reconciler::new(ProviderConfig::new().with_api_key("key"), transport.clone());
//!
//! let result = reconciler
//!     .resolve_or_create_query(&QuerySpec::new("Rev", "select 1"))
//!     .await
//!     .unwrap();
//! assert_eq!(result.id, "99");
//! assert_eq!(transport.create_calls(), 1);
//! # });
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::client::{ApiResponse, ApiTransport, CreateQueryRequest, UpsertMaterializedViewRequest};
use crate::config::Credential;
use crate::error::ProviderError;
use crate::provider::ProviderService;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::types::DriftStatus;

type Scripted = Mutex<VecDeque<Result<ApiResponse, ProviderError>>>;

/// A fake [`ApiTransport`] replaying scripted responses in order.
///
/// When a queue runs dry the call fails with a transport error.
#[derive(Default)]
pub struct RecordingTransport {
    create_responses: Scripted,
    upsert_responses: Scripted,
    read_responses: Scripted,
    create_calls: AtomicUsize,
    upsert_calls: AtomicUsize,
    read_calls: AtomicUsize,
    create_requests: Mutex<Vec<CreateQueryRequest>>,
    upsert_requests: Mutex<Vec<UpsertMaterializedViewRequest>>,
    read_names: Mutex<Vec<String>>,
}

impl RecordingTransport {
    /// A transport with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next create-query call.
    pub fn with_create_response(self, response: Result<ApiResponse, ProviderError>) -> Self {
        push(&self.create_responses, response);
        self
    }

    /// Queue a reply for the next upsert call.
    pub fn with_upsert_response(self, response: Result<ApiResponse, ProviderError>) -> Self {
        push(&self.upsert_responses, response);
        self
    }

    /// Queue a reply for the next view read.
    pub fn with_read_response(self, response: Result<ApiResponse, ProviderError>) -> Self {
        push(&self.read_responses, response);
        self
    }

    /// Number of create-query calls made.
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of upsert calls made.
    pub fn upsert_calls(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    /// Number of view reads made.
    pub fn read_calls(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    /// Number of calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.create_calls() + self.upsert_calls() + self.read_calls()
    }

    /// The most recent create-query body.
    pub fn last_create_request(&self) -> Option<CreateQueryRequest> {
        lock(&self.create_requests).last().cloned()
    }

    /// The most recent upsert body.
    pub fn last_upsert_request(&self) -> Option<UpsertMaterializedViewRequest> {
        lock(&self.upsert_requests).last().cloned()
    }

    /// Names of every view read, in order.
    pub fn read_names(&self) -> Vec<String> {
        lock(&self.read_names).clone()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn push(queue: &Scripted, response: Result<ApiResponse, ProviderError>) {
    lock(queue).push_back(response);
}

fn pop(queue: &Scripted, call: &str) -> Result<ApiResponse, ProviderError> {
    lock(queue).pop_front().unwrap_or_else(|| {
        Err(ProviderError::Transport(format!(
            "no scripted response for {}",
            call
        )))
    })
}

#[async_trait]
impl ApiTransport for RecordingTransport {
    async fn create_query(
        &self,
        _credential: &Credential,
        request: &CreateQueryRequest,
    ) -> Result<ApiResponse, ProviderError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.create_requests).push(request.clone());
        pop(&self.create_responses, "create_query")
    }

    async fn upsert_materialized_view(
        &self,
        _credential: &Credential,
        request: &UpsertMaterializedViewRequest,
    ) -> Result<ApiResponse, ProviderError> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.upsert_requests).push(request.clone());
        pop(&self.upsert_responses, "upsert_materialized_view")
    }

    async fn get_materialized_view(
        &self,
        _credential: &Credential,
        name: &str,
    ) -> Result<ApiResponse, ProviderError> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.read_names).push(name.to_string());
        pop(&self.read_responses, "get_materialized_view")
    }
}

/// A test harness for provider implementations.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource types.
    pub fn resource_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.provider.schema().resources.keys().cloned().collect();
        types.sort();
        types
    }

    /// Configure the provider, failing on any error diagnostic.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate resource configuration, failing on any error diagnostic.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Create a resource.
    pub async fn create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, config).await
    }

    /// Read a resource.
    pub async fn read(&self, resource_type: &str, state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, state).await
    }

    /// Update a resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Validate, create, then read back: the first apply of a resource.
    pub async fn lifecycle_create(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Value, TestError> {
        self.validate_resource_config(resource_type, config.clone())
            .await?;
        Ok(self.create(resource_type, config).await?)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that some error diagnostic mentions `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic contains the substring.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let found = diagnostics
        .iter()
        .filter(|d| d.is_error())
        .any(|d| d.summary.contains(substring));
    assert!(
        found,
        "Expected an error containing '{}', got: {:?}",
        substring,
        diagnostics.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert the drift status recorded in a view state.
///
/// # Panics
///
/// Panics if the state has no drift report or its status differs.
pub fn assert_drift_status(state: &Value, expected: DriftStatus) {
    let actual = state
        .get("drift")
        .and_then(|d| d.get("status"))
        .cloned()
        .unwrap_or(Value::Null);
    let expected_value = serde_json::to_value(expected).unwrap_or(Value::Null);
    assert_eq!(
        actual, expected_value,
        "Expected drift status {:?}, state was {}",
        expected, state
    );
}
