//! Error types for the Dune provider.

use std::borrow::Cow;

use thiserror::Error;

use crate::schema::Diagnostic;

/// Errors that can occur while reconciling Dune resources.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required field is missing or null. Raised before any network call.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A credentialed operation was attempted without an API key.
    #[error("Credential error: {0}")]
    Credential(String),

    /// The remote API returned an explicit error payload.
    ///
    /// The message is carried through unmodified; see [`ProviderError::message`].
    #[error("Remote rejected request: {0}")]
    RemoteRejected(String),

    /// A success-shaped response did not carry a recognized identifier.
    #[error("Missing identifier: {0}")]
    MissingIdentifier(String),

    /// The request never produced a response (connection, timeout, body read).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation not implemented for this resource type.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ProviderError {
    /// The error message without the variant prefix.
    ///
    /// For [`ProviderError::RemoteRejected`] this is exactly the message the
    /// remote API returned. For [`ProviderError::Serialization`] it is serde's
    /// own description of the failure.
    pub fn message(&self) -> Cow<'_, str> {
        match self {
            Self::Validation(msg)
            | Self::Credential(msg)
            | Self::RemoteRejected(msg)
            | Self::MissingIdentifier(msg)
            | Self::Transport(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::Unimplemented(msg) => Cow::Borrowed(msg),
            Self::Serialization(err) => Cow::Owned(err.to_string()),
        }
    }

    /// Stable snake_case tag for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Credential(_) => "credential",
            Self::RemoteRejected(_) => "remote_rejected",
            Self::MissingIdentifier(_) => "missing_identifier",
            Self::Transport(_) => "transport",
            Self::Configuration(_) => "configuration",
            Self::UnknownResource(_) => "unknown_resource",
            Self::Serialization(_) => "serialization",
            Self::Unimplemented(_) => "unimplemented",
        }
    }

    /// Whether an idempotent read may be retried after this error.
    ///
    /// Only transport-level failures qualify. An error payload from the API
    /// is an answer, not a failure to get one.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

impl From<ProviderError> for Diagnostic {
    fn from(err: ProviderError) -> Self {
        Diagnostic::error(err.to_string()).with_detail(format!("kind: {}", err.kind()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DiagnosticSeverity;

    #[test]
    fn test_error_display() {
        let err = ProviderError::Validation("Missing required attribute 'name'".to_string());
        assert_eq!(
            format!("{}", err),
            "Validation error: Missing required attribute 'name'"
        );

        let err = ProviderError::Credential("api_key is not configured".to_string());
        assert_eq!(
            format!("{}", err),
            "Credential error: api_key is not configured"
        );

        let err = ProviderError::UnknownResource("dune_dashboard".to_string());
        assert_eq!(format!("{}", err), "Unknown resource type: dune_dashboard");
    }

    #[test]
    fn test_remote_rejected_message_is_verbatim() {
        let remote = "Materialized view already exists for a different query";
        let err = ProviderError::RemoteRejected(remote.to_string());
        assert_eq!(err.message(), remote);
        assert!(err.to_string().ends_with(remote));
    }

    #[test]
    fn test_serialization_message_keeps_serde_reason() {
        let serde_err = serde_json::from_str::<u32>("-1").unwrap_err();
        let reason = serde_err.to_string();
        let err = ProviderError::from(serde_err);

        assert_eq!(err.message(), reason.as_str());
        assert!(err.to_string().ends_with(&reason));
    }

    #[test]
    fn test_only_transport_is_retryable() {
        assert!(ProviderError::Transport("connection reset".to_string()).is_retryable());
        assert!(!ProviderError::RemoteRejected("boom".to_string()).is_retryable());
        assert!(!ProviderError::MissingIdentifier("{}".to_string()).is_retryable());
        assert!(!ProviderError::Credential("none".to_string()).is_retryable());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(ProviderError::Validation(String::new()).kind(), "validation");
        assert_eq!(
            ProviderError::RemoteRejected(String::new()).kind(),
            "remote_rejected"
        );
        assert_eq!(
            ProviderError::MissingIdentifier(String::new()).kind(),
            "missing_identifier"
        );
        assert_eq!(ProviderError::Transport(String::new()).kind(), "transport");
    }

    #[test]
    fn test_error_to_diagnostic() {
        let diag: Diagnostic = ProviderError::Transport("dns failure".to_string()).into();
        assert_eq!(diag.severity, DiagnosticSeverity::Error);
        assert_eq!(diag.summary, "Transport error: dns failure");
        assert_eq!(diag.detail, Some("kind: transport".to_string()));
    }
}
