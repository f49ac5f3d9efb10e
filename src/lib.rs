//! Hemmer provider for Dune saved queries and materialized views.
//!
//! The provider converges two kinds of remote resources toward a declared
//! state, and it does so without duplicates:
//!
//! - **`dune_query`**: a saved SQL query. A spec carrying an explicit
//!   `query_id` is adopted with no request at all; otherwise the query is
//!   created exactly once.
//! - **`dune_materialized_view`**: a scheduled view of a query, written with a
//!   single upsert keyed by name and checked for drift on read.
//!
//! # Overview
//!
//! - [`Reconciler`]: the core operations, bound to a [`ProviderConfig`] and an
//!   [`ApiTransport`](client::ApiTransport)
//! - [`DuneProvider`]: the [`ProviderService`] implementation the engine calls
//! - [`normalize`]: tolerant parsing of API responses into typed results
//! - [`drift`]: field-by-field comparison that reports what it could not see
//! - [`testing`]: a recording transport and a provider test harness
//!
//! # Quick Start
//!
//! ```no_run
//! use hemmer_provider_dune::{ProviderConfig, QuerySpec, Reconciler};
//!
//! # async fn run() -> Result<(), hemmer_provider_dune::ProviderError> {
//! hemmer_provider_dune::init_logging();
//!
//! let config = ProviderConfig::new().with_api_key("dune-api-key").with_team("analytics");
//! let reconciler = Reconciler::connect(config)?;
//!
//! let result = reconciler
//!     .resolve_or_create_query(&QuerySpec::new("Daily volume", "select 1"))
//!     .await?;
//! tracing::info!(query_id = %result.id, mode = result.mode.as_str(), "query ready");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod drift;
pub mod error;
pub mod logging;
pub mod normalize;
pub mod provider;
pub mod reconciler;
pub mod resolver;
pub mod resource;
pub mod schema;
pub mod testing;
pub mod types;
pub mod upsert;
pub mod validation;

// Re-export main types at crate root
pub use client::{ApiResponse, ApiTransport, DuneClient};
pub use config::{Credential, ProviderConfig};
pub use drift::{check_drift, DesiredView};
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::{DuneProvider, ProviderService};
pub use reconciler::Reconciler;
pub use resource::{MaterializedViewSpec, QuerySpec, ResourceSpec};
pub use schema::ProviderSchema;
pub use types::{
    AttributeChange, DriftReport, DriftStatus, Mode, QueryId, ReconciliationResult,
    RemoteResource, ResourceKind,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
