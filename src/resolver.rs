//! Identity resolution for queries.
//!
//! A query spec that carries an explicit id is adopted as-is: no request is
//! made and the id is not checked against the API. This is the common path
//! on every run after the first, and it is what keeps a query from being
//! created twice.

use tracing::debug;

use crate::error::ProviderError;
use crate::resource::{QueryDraft, QuerySpec};
use crate::types::ReconciliationResult;

/// What to do with a query spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity<'a> {
    /// The spec names an existing query; nothing to send.
    Existing(ReconciliationResult),
    /// No usable id; the draft holds the validated create-time fields.
    Create(QueryDraft<'a>),
}

/// Decide whether a query already has a remote identity.
///
/// Fails with [`ProviderError::Validation`] when there is no id and the
/// name or SQL is missing.
pub fn resolve_identity(spec: &QuerySpec) -> Result<Identity<'_>, ProviderError> {
    if let Some(id) = &spec.query_id {
        debug!(query_id = %id, "reusing explicit query id");
        return Ok(Identity::Existing(ReconciliationResult::existing_query(id)));
    }

    let draft = spec.draft()?;
    debug!(name = draft.name, "no explicit query id, query will be created");
    Ok(Identity::Create(draft))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Mode;

    #[test]
    fn test_explicit_id_short_circuits() {
        let spec = QuerySpec::new("Rev", "select 1").with_query_id("42");
        match resolve_identity(&spec).unwrap() {
            Identity::Existing(result) => {
                assert_eq!(result.id, "42");
                assert_eq!(result.mode, Mode::Existing);
            },
            other => panic!("expected existing, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_id_skips_body_validation() {
        let spec = QuerySpec {
            name: None,
            query_sql: None,
            is_private: false,
            query_id: crate::types::QueryId::explicit("42"),
        };
        assert!(matches!(
            resolve_identity(&spec).unwrap(),
            Identity::Existing(_)
        ));
    }

    #[test]
    fn test_absent_ids_fall_through_to_create() {
        for raw in ["", "0", "null"] {
            let spec = QuerySpec::new("Rev", "select 1").with_query_id(raw);
            assert!(
                matches!(resolve_identity(&spec).unwrap(), Identity::Create(_)),
                "id {:?} should not be reused",
                raw
            );
        }
    }

    #[test]
    fn test_missing_fields_fail_validation() {
        let spec = QuerySpec {
            name: Some("Rev".to_string()),
            query_sql: None,
            is_private: false,
            query_id: None,
        };
        let err = resolve_identity(&spec).unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
        assert!(err.message().contains("query_sql"));
    }
}
