//! The reconciliation entry points.
//!
//! A [`Reconciler`] owns an injected [`ProviderConfig`] and an
//! [`ApiTransport`]. It holds no other state, so one instance can serve many
//! independent resources concurrently. Operations against the same resource
//! must still be serialized by the caller.

use std::sync::Arc;

use tracing::{error, instrument, warn};

use crate::client::{ApiTransport, DuneClient};
use crate::config::{Credential, ProviderConfig};
use crate::drift::{check_drift, DesiredView};
use crate::error::ProviderError;
use crate::normalize::{interpret_read, ReadReply};
use crate::resolver::{resolve_identity, Identity};
use crate::resource::{MaterializedViewSpec, QuerySpec, ResourceSpec};
use crate::types::{DriftReport, ReconciliationResult};
use crate::upsert;

/// Reconciles desired resources against the Dune API.
pub struct Reconciler<T: ApiTransport + ?Sized = dyn ApiTransport> {
    config: ProviderConfig,
    transport: Arc<T>,
}

impl<T: ApiTransport + ?Sized> Clone for Reconciler<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl Reconciler<DuneClient> {
    /// A reconciler talking HTTP to the configured API.
    pub fn connect(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = DuneClient::new(&config)?;
        Ok(Self::new(config, Arc::new(client)))
    }
}

impl<T: ApiTransport + ?Sized> Reconciler<T> {
    /// A reconciler using the given transport.
    pub fn new(config: ProviderConfig, transport: Arc<T>) -> Self {
        Self { config, transport }
    }

    /// The injected configuration.
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// The transport requests go through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Adopt the query's explicit id, or create it exactly once.
    #[instrument(skip_all, fields(name = spec.name.as_deref().unwrap_or("")))]
    pub async fn resolve_or_create_query(
        &self,
        spec: &QuerySpec,
    ) -> Result<ReconciliationResult, ProviderError> {
        match resolve_identity(spec)? {
            Identity::Existing(result) => Ok(result),
            Identity::Create(draft) => upsert::create_query(self.transport.as_ref(), &self.config, draft)
                .await
                .inspect_err(|e| error!(error = %e, "query create failed")),
        }
    }

    /// Upsert a materialized view.
    #[instrument(skip_all, fields(name = %spec.name))]
    pub async fn upsert_materialized_view(
        &self,
        spec: &MaterializedViewSpec,
    ) -> Result<ReconciliationResult, ProviderError> {
        upsert::upsert_materialized_view(self.transport.as_ref(), &self.config, spec)
            .await
            .inspect_err(|e| error!(error = %e, "materialized view upsert failed"))
    }

    /// Reconcile any resource spec.
    ///
    /// One resource per call. Whether a failure should stop a batch is the
    /// caller's decision.
    pub async fn reconcile(
        &self,
        spec: &ResourceSpec,
    ) -> Result<ReconciliationResult, ProviderError> {
        match spec {
            ResourceSpec::Query(query) => self.resolve_or_create_query(query).await,
            ResourceSpec::MaterializedView(view) => self.upsert_materialized_view(view).await,
        }
    }

    /// Compare a view's desired fields with what the API reports.
    #[instrument(skip_all, fields(name = %desired.name))]
    pub async fn verify_materialized_view(
        &self,
        desired: &DesiredView,
    ) -> Result<DriftReport, ProviderError> {
        check_drift(self.config.credential(), desired, |credential| async move {
            self.read_view(&credential, &desired.name).await
        })
        .await
    }

    /// Read a view, retrying transport failures only.
    async fn read_view(
        &self,
        credential: &Credential,
        name: &str,
    ) -> Result<ReadReply, ProviderError> {
        let mut attempt: u32 = 0;
        loop {
            match self.transport.get_materialized_view(credential, name).await {
                Ok(response) => return interpret_read(name, &response),
                Err(e) if e.is_retryable() && attempt < self.config.read_retries => {
                    attempt += 1;
                    warn!(
                        error = %e,
                        attempt,
                        max_retries = self.config.read_retries,
                        "materialized view read failed, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff()).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}
