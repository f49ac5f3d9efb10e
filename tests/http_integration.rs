//! Integration tests for the Dune HTTP client using wiremock
//!
//! These tests drive the reconciler through the real reqwest transport
//! against mocked endpoints, checking request shapes, call counts and the
//! handling of error statuses.

use std::time::Duration;

use hemmer_provider_dune::{
    DesiredView, DriftStatus, DuneClient, MaterializedViewSpec, Mode, ProviderConfig,
    ProviderError, QueryId, QuerySpec, Reconciler,
};
use serde_json::json;
use wiremock::matchers::{any, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API_KEY: &str = "test-key";

fn config_for(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new()
        .with_api_url(server.uri())
        .with_api_key(API_KEY)
        .with_team("team")
        .with_retry_backoff(Duration::from_millis(1))
}

fn reconciler(config: ProviderConfig) -> Reconciler<DuneClient> {
    Reconciler::connect(config).expect("client should build")
}

fn view(query_id: &str) -> MaterializedViewSpec {
    MaterializedViewSpec::new("mv1", QueryId::explicit(query_id).unwrap(), "0 * * * *")
}

/// Query identity resolution and creation
mod query_tests {
    use super::*;

    /// An explicit id is adopted without touching the API
    #[tokio::test]
    async fn test_explicit_id_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let result = reconciler(config_for(&server))
            .resolve_or_create_query(&QuerySpec::new("Rev", "select 1").with_query_id("42"))
            .await
            .unwrap();

        assert_eq!(result.to_state(), json!({"query_id": "42", "mode": "existing"}));
    }

    /// Without an id the query is created with one authenticated POST
    #[tokio::test]
    async fn test_create_sends_one_authenticated_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("X-Dune-Api-Key", API_KEY))
            .and(body_json(json!({
                "name": "Rev",
                "query_sql": "select 1",
                "is_private": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query_id": 99})))
            .expect(1)
            .mount(&server)
            .await;

        let result = reconciler(config_for(&server))
            .resolve_or_create_query(&QuerySpec::new("Rev", "select 1"))
            .await
            .unwrap();

        assert_eq!(result.to_state(), json!({"query_id": "99", "mode": "created"}));
    }

    /// The id may come back wrapped in a `base` object
    #[tokio::test]
    async fn test_create_accepts_wrapped_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"base": {"query_id": 7}})),
            )
            .mount(&server)
            .await;

        let result = reconciler(config_for(&server))
            .resolve_or_create_query(&QuerySpec::new("Rev", "select 1"))
            .await
            .unwrap();

        assert_eq!(result.id, "7");
        assert_eq!(result.mode, Mode::Created);
    }

    /// A success reply without an id is an error, not a created query
    #[tokio::test]
    async fn test_create_without_id_in_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let err = reconciler(config_for(&server))
            .resolve_or_create_query(&QuerySpec::new("Rev", "select 1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::MissingIdentifier(_)));
    }

    /// Error payloads surface verbatim and are not retried
    #[tokio::test]
    async fn test_create_error_payload_is_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "query_sql is invalid"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = reconciler(config_for(&server))
            .resolve_or_create_query(&QuerySpec::new("Rev", "select"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RemoteRejected(_)));
        assert_eq!(err.message(), "query_sql is invalid");
    }

    /// Non-JSON error bodies are kept in the message
    #[tokio::test]
    async fn test_create_plain_text_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .respond_with(ResponseTemplate::new(502).set_body_string("Bad Gateway"))
            .mount(&server)
            .await;

        let err = reconciler(config_for(&server))
            .resolve_or_create_query(&QuerySpec::new("Rev", "select 1"))
            .await
            .unwrap_err();

        assert_eq!(err.message(), "HTTP 502: Bad Gateway");
    }

    /// No credential means no request
    #[tokio::test]
    async fn test_create_without_credential() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = ProviderConfig::new().with_api_url(server.uri());
        let err = reconciler(config)
            .resolve_or_create_query(&QuerySpec::new("Rev", "select 1"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Credential(_)));
    }
}

/// Materialized view upserts
mod upsert_tests {
    use super::*;

    /// The upsert sends a numeric query id and reports the refresh
    #[tokio::test]
    async fn test_upsert_view() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/materialized-views"))
            .and(header("X-Dune-Api-Key", API_KEY))
            .and(body_json(json!({
                "name": "mv1",
                "query_id": 10,
                "cron_expression": "0 * * * *",
                "performance": "medium",
                "is_private": false
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"name": "dune.team.mv1", "execution_id": "abc"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let result = reconciler(config_for(&server))
            .upsert_materialized_view(&view("10"))
            .await
            .unwrap();

        assert_eq!(
            result.to_state(),
            json!({
                "name": "mv1",
                "full_name": "dune.team.mv1",
                "updated": "true",
                "execution_id": "abc"
            })
        );
    }

    /// A name conflict is reported once and not retried
    #[tokio::test]
    async fn test_upsert_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/materialized-views"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(json!({"error": {"message": "name taken by query 77"}})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = reconciler(config_for(&server))
            .upsert_materialized_view(&view("10"))
            .await
            .unwrap_err();

        assert_eq!(err.message(), "name taken by query 77");
    }
}

/// Drift detection against the read endpoint
mod drift_tests {
    use super::*;

    /// A bound-query mismatch is drift citing both ids
    #[tokio::test]
    async fn test_query_id_drift() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/materialized-views/mv1"))
            .and(header("X-Dune-Api-Key", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query_id": 99})))
            .expect(1)
            .mount(&server)
            .await;

        let desired = DesiredView::expecting_query("mv1", &QueryId::explicit("10").unwrap());
        let report = reconciler(config_for(&server))
            .verify_materialized_view(&desired)
            .await
            .unwrap();

        assert_eq!(report.status, DriftStatus::Drift);
        assert!(report.message.contains("10"));
        assert!(report.message.contains("99"));
    }

    /// Fields the read omits are listed, never assumed to match
    #[tokio::test]
    async fn test_unobserved_fields_listed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/materialized-views/mv1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": "dune.team.mv1", "query_id": 10})),
            )
            .mount(&server)
            .await;

        let report = reconciler(config_for(&server))
            .verify_materialized_view(&DesiredView::from(&view("10")))
            .await
            .unwrap();

        assert_eq!(report.status, DriftStatus::Ok);
        assert!(report.unverifiable_fields.contains("cron_expression"));
        assert!(report.message.contains("not observable via read API"));
    }

    /// No credential means skip, with no request sent
    #[tokio::test]
    async fn test_skip_without_credential() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let config = ProviderConfig::new().with_api_url(server.uri());
        let report = reconciler(config)
            .verify_materialized_view(&DesiredView::from(&view("10")))
            .await
            .unwrap();

        assert_eq!(report.status, DriftStatus::Skip);
    }

    /// 404 is missing
    #[tokio::test]
    async fn test_404_is_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/materialized-views/mv1"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let report = reconciler(config_for(&server))
            .verify_materialized_view(&DesiredView::from(&view("10")))
            .await
            .unwrap();

        assert_eq!(report.status, DriftStatus::Missing);
        assert!(report.needs_apply());
    }

    /// A server error payload is a rejection, read exactly once
    #[tokio::test]
    async fn test_500_is_not_missing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/materialized-views/mv1"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": "internal"})))
            .expect(1)
            .mount(&server)
            .await;

        let err = reconciler(config_for(&server))
            .verify_materialized_view(&DesiredView::from(&view("10")))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RemoteRejected(_)));
    }

    /// View names are percent-encoded in the path
    #[tokio::test]
    async fn test_view_name_is_encoded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/materialized-views/daily%20volume"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"query_id": 10})))
            .expect(1)
            .mount(&server)
            .await;

        let desired = DesiredView::expecting_query("daily volume", &QueryId::explicit("10").unwrap());
        let report = reconciler(config_for(&server))
            .verify_materialized_view(&desired)
            .await
            .unwrap();

        assert_eq!(report.status, DriftStatus::Ok);
    }

    /// An unreachable API is a transport failure, never missing
    #[tokio::test]
    async fn test_unreachable_api_is_transport_error() {
        let config = ProviderConfig::new()
            .with_api_url("http://127.0.0.1:1")
            .with_api_key(API_KEY)
            .with_read_retries(1)
            .with_retry_backoff(Duration::from_millis(1));

        let err = reconciler(config)
            .verify_materialized_view(&DesiredView::from(&view("10")))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Transport(_)));
        assert!(err.is_retryable());
    }
}
