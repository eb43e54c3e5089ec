//! Diagnostic error types for the supply graph.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so callers know exactly what went wrong
//! and how to fix it.
//!
//! The error policy is two-tier: the store is a correctness boundary and
//! surfaces these errors directly, while the ingestion and deduplication
//! pipelines catch them per record and accumulate them as strings in their
//! result objects instead of aborting a batch.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the supply graph.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum SupplyGraphError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ingest(#[from] IngestError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("{subject} validation failed: {messages}")]
    #[diagnostic(
        code(sg::store::validation),
        help(
            "One or more registered validation rules rejected the record. \
             Fix the listed fields, or pass `validate = false` only if the \
             input has already been normalized upstream."
        )
    )]
    Validation { subject: String, messages: String },

    #[error("entity already exists: {id}")]
    #[diagnostic(
        code(sg::store::already_exists),
        help(
            "An entity with this id is already in the store. Use \
             `update_entity` or `upsert_entity` to modify it, or delete it first."
        )
    )]
    AlreadyExists { id: String },

    #[error("entity not found: {id}")]
    #[diagnostic(
        code(sg::store::not_found),
        help("No entity with this id exists in the store. Verify the id is correct.")
    )]
    NotFound { id: String },

    #[error("relation endpoint not found: {missing} (relation {source_id} -> {target_id})")]
    #[diagnostic(
        code(sg::store::unknown_endpoint),
        help(
            "Both endpoints of a relation must reference entities already \
             present in the store. Create the missing entity first."
        )
    )]
    UnknownEndpoint {
        source_id: String,
        target_id: String,
        missing: String,
    },

    #[error("relation already exists: {source_id} -{kind}-> {target_id}")]
    #[diagnostic(
        code(sg::store::duplicate_relation),
        help(
            "A pair of endpoints may carry at most one relation per kind. \
             Delete the existing relation before creating a replacement."
        )
    )]
    DuplicateRelation {
        source_id: String,
        target_id: String,
        kind: String,
    },
}

// ---------------------------------------------------------------------------
// Merge errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum MergeError {
    #[error("merge requires at least 2 entities, got {count}")]
    #[diagnostic(
        code(sg::merge::too_few),
        help("Pass at least two entity ids to `merge_entities`.")
    )]
    TooFewEntities { count: usize },

    #[error("cannot merge: entity not found: {id}")]
    #[diagnostic(
        code(sg::merge::not_found),
        help("Every id passed to `merge_entities` must exist in the store.")
    )]
    EntityNotFound { id: String },
}

// ---------------------------------------------------------------------------
// Ingestion errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("unknown entity type key: {key}")]
    #[diagnostic(
        code(sg::ingest::unknown_kind),
        help(
            "Sync payloads are keyed by entity type. Valid keys are the \
             snake_case kind names (e.g. `product`, `risk_tag`) or their \
             plural forms (e.g. `products`)."
        )
    )]
    UnknownEntityKind { key: String },

    #[error("record missing required `id` field")]
    #[diagnostic(
        code(sg::ingest::missing_id),
        help("Every ingested record must carry a non-empty string `id`.")
    )]
    MissingId,
}

/// Convenience alias for functions returning supply-graph results.
pub type SgResult<T> = std::result::Result<T, SupplyGraphError>;

/// Alias for store-level operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_to_top_level() {
        let err = StoreError::NotFound { id: "p1".into() };
        let top: SupplyGraphError = err.into();
        assert!(matches!(top, SupplyGraphError::Store(StoreError::NotFound { .. })));
    }

    #[test]
    fn merge_error_converts_to_top_level() {
        let err = MergeError::TooFewEntities { count: 1 };
        let top: SupplyGraphError = err.into();
        assert!(matches!(
            top,
            SupplyGraphError::Merge(MergeError::TooFewEntities { .. })
        ));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = StoreError::DuplicateRelation {
            source_id: "p1".into(),
            target_id: "b1".into(),
            kind: "has_brand".into(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("p1"));
        assert!(msg.contains("has_brand"));
    }
}
