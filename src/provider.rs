//! The provider surface the engine talks to.
//!
//! [`ProviderService`] is the JSON-in, JSON-out contract between the
//! plan/apply engine and a provider. [`DuneProvider`] implements it by
//! turning resource configuration into typed specs and handing them to a
//! [`Reconciler`].

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{ApiTransport, DuneClient};
use crate::config::ProviderConfig;
use crate::drift::DesiredView;
use crate::error::ProviderError;
use crate::reconciler::Reconciler;
use crate::resource::{MaterializedViewSpec, QuerySpec, ResourceSpec};
use crate::schema::{Diagnostic, ProviderSchema};
use crate::types::{QueryId, ResourceKind};
use crate::validation;

/// Trait that provider implementations must implement.
///
/// # Example
///
/// ```
/// use hemmer_provider_dune::{ProviderError, ProviderService};
/// use hemmer_provider_dune::schema::{Attribute, Diagnostic, ProviderSchema, Schema};
///
/// struct EchoProvider;
///
/// #[hemmer_provider_dune::async_trait]
/// impl ProviderService for EchoProvider {
///     fn schema(&self) -> ProviderSchema {
///         ProviderSchema::new()
///             .with_resource("echo", Schema::v0().with_attribute("name", Attribute::required_string()))
///     }
///
///     async fn configure(&self, _config: serde_json::Value) -> Result<Vec<Diagnostic>, ProviderError> {
///         Ok(vec![])
///     }
///
///     async fn create(&self, _t: &str, planned: serde_json::Value) -> Result<serde_json::Value, ProviderError> {
///         Ok(planned)
///     }
///
///     async fn read(&self, _t: &str, current: serde_json::Value) -> Result<serde_json::Value, ProviderError> {
///         Ok(current)
///     }
///
///     async fn update(
///         &self,
///         _t: &str,
///         _prior: serde_json::Value,
///         planned: serde_json::Value,
///     ) -> Result<serde_json::Value, ProviderError> {
///         Ok(planned)
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait ProviderService: Send + Sync + 'static {
    // =========================================================================
    // Schema
    // =========================================================================

    /// Return the provider's schema including all resources.
    fn schema(&self) -> ProviderSchema;

    // =========================================================================
    // Provider Lifecycle
    // =========================================================================

    /// Validate the provider configuration before configuring.
    /// By default, this checks the configuration against the provider schema.
    async fn validate_provider_config(
        &self,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&self.schema().provider, &config))
    }

    /// Configure the provider with credentials and settings.
    /// Returns diagnostics (errors and warnings).
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError>;

    // =========================================================================
    // Resource Operations
    // =========================================================================

    /// Validate a resource's configuration before planning.
    /// By default, this checks the configuration against the resource schema.
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.schema();
        let resource_schema = schema
            .resources
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))?;
        Ok(validation::validate(resource_schema, &config))
    }

    /// Create a new resource.
    async fn create(&self, resource_type: &str, planned_state: Value)
        -> Result<Value, ProviderError>;

    /// Read the current state of a resource.
    async fn read(&self, resource_type: &str, current_state: Value)
        -> Result<Value, ProviderError>;

    /// Update an existing resource.
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError>;

    /// Delete a resource.
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let _ = current_state;
        Err(ProviderError::Unimplemented(format!(
            "delete is not supported for resource type: {}",
            resource_type
        )))
    }
}

enum TransportSource {
    Http,
    Fixed(Arc<dyn ApiTransport>),
}

impl TransportSource {
    fn transport_for(
        &self,
        config: &ProviderConfig,
    ) -> Result<Arc<dyn ApiTransport>, ProviderError> {
        match self {
            TransportSource::Http => {
                let client: Arc<dyn ApiTransport> = Arc::new(DuneClient::new(config)?);
                Ok(client)
            },
            TransportSource::Fixed(transport) => Ok(Arc::clone(transport)),
        }
    }
}

/// The Dune provider: `dune_query` and `dune_materialized_view` resources.
///
/// `configure` swaps in a fresh [`Reconciler`]; operations already running
/// finish against the configuration they started with.
pub struct DuneProvider {
    source: TransportSource,
    reconciler: RwLock<Reconciler>,
}

impl DuneProvider {
    /// A provider speaking HTTP, starting from the given configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let source = TransportSource::Http;
        let transport = source.transport_for(&config)?;
        Ok(Self {
            source,
            reconciler: RwLock::new(Reconciler::new(config, transport)),
        })
    }

    /// A provider sending every request through `transport`.
    pub fn with_transport(config: ProviderConfig, transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            source: TransportSource::Fixed(Arc::clone(&transport)),
            reconciler: RwLock::new(Reconciler::new(config, transport)),
        }
    }

    /// The configuration currently in effect.
    pub async fn config(&self) -> ProviderConfig {
        self.reconciler.read().await.config().clone()
    }

    async fn reconciler(&self) -> Reconciler {
        self.reconciler.read().await.clone()
    }
}

fn resource_kind(resource_type: &str) -> Result<ResourceKind, ProviderError> {
    ResourceKind::from_type_name(resource_type)
        .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
}

/// Overlay computed fields onto a copy of the planned state.
fn merge_state(base: &Value, computed: Value) -> Value {
    let mut state = match base {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };
    if let Value::Object(fields) = computed {
        state.extend(fields);
    }
    Value::Object(state)
}

/// Keep the query id recorded by an earlier apply when the plan drops it.
fn carry_query_id(prior_state: &Value, mut planned_state: Value) -> Value {
    let planned_has_id = planned_state
        .get("query_id")
        .and_then(QueryId::from_json)
        .is_some();
    if planned_has_id {
        return planned_state;
    }
    let prior_id = prior_state.get("query_id").and_then(QueryId::from_json);
    if let (Some(id), Value::Object(map)) = (prior_id, &mut planned_state) {
        debug!(query_id = %id, "reusing query id from prior state");
        map.insert("query_id".to_string(), Value::String(id.as_str().to_string()));
    }
    planned_state
}

#[async_trait::async_trait]
impl ProviderService for DuneProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new()
            .with_provider_config(ProviderConfig::schema())
            .with_resource(ResourceKind::Query.type_name(), QuerySpec::schema())
            .with_resource(
                ResourceKind::MaterializedView.type_name(),
                MaterializedViewSpec::schema(),
            )
    }

    #[instrument(skip_all, name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = self.validate_provider_config(config.clone()).await?;
        if diagnostics.iter().any(Diagnostic::is_error) {
            warn!(diagnostics = diagnostics.len(), "configure completed with errors");
            return Ok(diagnostics);
        }

        let parsed = match ProviderConfig::from_value(&config) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = %e, "configure rejected provider config");
                return Ok(vec![e.into()]);
            },
        };
        let transport = self.source.transport_for(&parsed)?;
        let mut diagnostics = diagnostics;
        if parsed.credential().is_none() {
            diagnostics.push(
                Diagnostic::warning("No api_key configured")
                    .with_detail("Drift checks will be skipped and changes will fail")
                    .with_attribute("api_key"),
            );
        }

        *self.reconciler.write().await = Reconciler::new(parsed, transport);
        info!("configure completed");
        Ok(diagnostics)
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let kind = resource_kind(resource_type)?;
        let mut schema = ResourceSpec::schema_for(kind);
        // An adopted query never sends its body, so only types are checked.
        if kind == ResourceKind::Query
            && config.get("query_id").and_then(QueryId::from_json).is_some()
        {
            schema = schema.relaxed();
        }
        Ok(validation::validate(&schema, &config))
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let kind = resource_kind(resource_type)?;
        let spec = ResourceSpec::from_config(kind, &planned_state)?;
        let result = self
            .reconciler()
            .await
            .reconcile(&spec)
            .await
            .inspect_err(|e| error!(error = %e, "create failed"))?;
        info!(id = %result.id, mode = result.mode.as_str(), "create completed");
        Ok(merge_state(&planned_state, result.to_state()))
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        match resource_kind(resource_type)? {
            ResourceKind::Query => {
                debug!("queries have no read endpoint, state kept as recorded");
                Ok(current_state)
            },
            ResourceKind::MaterializedView => {
                let spec = MaterializedViewSpec::from_config(&current_state)?;
                let report = self
                    .reconciler()
                    .await
                    .verify_materialized_view(&DesiredView::from(&spec))
                    .await?;
                if report.needs_apply() {
                    warn!(status = ?report.status, message = %report.message, "materialized view needs apply");
                }
                let mut drift = Map::new();
                drift.insert("drift".to_string(), report.to_state());
                Ok(merge_state(&current_state, Value::Object(drift)))
            },
        }
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let kind = resource_kind(resource_type)?;
        let planned_state = match kind {
            ResourceKind::Query => carry_query_id(&prior_state, planned_state),
            ResourceKind::MaterializedView => planned_state,
        };
        let spec = ResourceSpec::from_config(kind, &planned_state)?;
        let result = self
            .reconciler()
            .await
            .reconcile(&spec)
            .await
            .inspect_err(|e| error!(error = %e, "update failed"))?;
        info!(id = %result.id, mode = result.mode.as_str(), "update completed");
        Ok(merge_state(&planned_state, result.to_state()))
    }
}
