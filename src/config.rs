//! Provider configuration.
//!
//! Everything the core needs from its surroundings arrives in a
//! [`ProviderConfig`], including the API credential. Nothing here reads the
//! process environment; acquiring the key is the caller's job.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;
use crate::schema::{Attribute, Schema};
use crate::validation::ensure_valid;

/// Default base URL of the Dune REST API.
pub const DEFAULT_API_URL: &str = "https://api.dune.com/api/v1";

/// Default namespace used when building fully qualified view names.
pub const DEFAULT_NAMESPACE: &str = "dune";

/// A Dune API key. Its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw API key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The raw key, for the request header only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_read_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// Configuration injected into the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key. Absent means read-only drift checks are skipped and
    /// mutations fail with a credential error.
    #[serde(default)]
    pub api_key: Option<Credential>,
    /// Base URL of the REST API.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Namespace prefix of fully qualified view names.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Team handle owning the views.
    #[serde(default)]
    pub team: Option<String>,
    /// Extra attempts for idempotent reads after a transport failure.
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,
    /// Delay between read attempts, in milliseconds.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Per-request timeout in seconds. Unset means no client-side timeout.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            namespace: default_namespace(),
            team: None,
            read_retries: default_read_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            request_timeout_secs: None,
        }
    }
}

impl ProviderConfig {
    /// Create a configuration with default values and no credential.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the provider configuration block handed over by the engine.
    pub fn from_value(config: &Value) -> Result<Self, ProviderError> {
        if config.is_null() {
            return Ok(Self::default());
        }
        ensure_valid(&Self::schema(), config)
            .map_err(|e| ProviderError::Configuration(e.message().to_string()))?;

        // Null means "use the default", which serde only does for absent keys.
        let mut fields = config.as_object().cloned().unwrap_or_default();
        fields.retain(|_, value| !value.is_null());
        Ok(serde_json::from_value(Value::Object(fields))?)
    }

    /// Schema of the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_description("Dune provider configuration")
            .with_attribute(
                "api_key",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Dune API key"),
            )
            .with_attribute(
                "api_url",
                Attribute::optional_string().with_default(Value::String(default_api_url())),
            )
            .with_attribute(
                "namespace",
                Attribute::optional_string().with_default(Value::String(default_namespace())),
            )
            .with_attribute(
                "team",
                Attribute::optional_string().with_description("Team owning materialized views"),
            )
            .with_attribute("read_retries", Attribute::optional_int64())
            .with_attribute("retry_backoff_ms", Attribute::optional_int64())
            .with_attribute("request_timeout_secs", Attribute::optional_int64())
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(Credential::new(key));
        self
    }

    /// Set the base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the team handle.
    pub fn with_team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    /// Set the number of extra read attempts.
    pub fn with_read_retries(mut self, retries: u32) -> Self {
        self.read_retries = retries;
        self
    }

    /// Set the delay between read attempts.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// The usable credential, if any. An empty key counts as none.
    pub fn credential(&self) -> Option<&Credential> {
        self.api_key.as_ref().filter(|c| !c.expose().is_empty())
    }

    /// The credential, or a [`ProviderError::Credential`] naming the operation.
    pub fn require_credential(&self, operation: &str) -> Result<&Credential, ProviderError> {
        self.credential().ok_or_else(|| {
            ProviderError::Credential(format!("api_key is required to {}", operation))
        })
    }

    /// Delay between read attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Client-side request timeout, if configured.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Fully qualified name of a view, when enough is configured to build one.
    pub fn qualified_view_name(&self, name: &str) -> Option<String> {
        self.team
            .as_deref()
            .filter(|team| !team.is_empty())
            .map(|team| format!("{}.{}.{}", self.namespace, team, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = ProviderConfig::new();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.namespace, "dune");
        assert_eq!(config.read_retries, 2);
        assert!(config.credential().is_none());
        assert!(config.request_timeout().is_none());
    }

    #[test]
    fn test_from_value() {
        let config = ProviderConfig::from_value(&json!({
            "api_key": "secret",
            "team": "team",
            "read_retries": 0,
        }))
        .unwrap();

        assert_eq!(config.credential().unwrap().expose(), "secret");
        assert_eq!(config.team.as_deref(), Some("team"));
        assert_eq!(config.read_retries, 0);
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_null_fields_take_defaults() {
        let config =
            ProviderConfig::from_value(&json!({"api_url": null, "namespace": null})).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn test_from_null_is_default() {
        assert_eq!(
            ProviderConfig::from_value(&Value::Null).unwrap(),
            ProviderConfig::default()
        );
    }

    #[test]
    fn test_from_value_rejects_bad_types() {
        let err = ProviderConfig::from_value(&json!({"read_retries": "many"})).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.message().contains("read_retries"));
    }

    #[test]
    fn test_empty_key_is_no_credential() {
        let config = ProviderConfig::new().with_api_key("");
        assert!(config.credential().is_none());

        let err = config.require_credential("create a query").unwrap_err();
        assert!(matches!(err, ProviderError::Credential(_)));
        assert!(err.message().contains("create a query"));
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let config = ProviderConfig::new().with_api_key("super-secret");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("Credential(***)"));
    }

    #[test]
    fn test_retry_backoff_saturates() {
        let config = ProviderConfig::new().with_retry_backoff(Duration::MAX);
        assert_eq!(config.retry_backoff_ms, u64::MAX);

        let config = ProviderConfig::new().with_retry_backoff(Duration::from_millis(250));
        assert_eq!(config.retry_backoff(), Duration::from_millis(250));
    }

    #[test]
    fn test_qualified_view_name() {
        let config = ProviderConfig::new().with_team("team");
        assert_eq!(
            config.qualified_view_name("mv1"),
            Some("dune.team.mv1".to_string())
        );
        assert_eq!(ProviderConfig::new().qualified_view_name("mv1"), None);
        assert_eq!(
            ProviderConfig::new().with_team("").qualified_view_name("mv1"),
            None
        );
    }
}
