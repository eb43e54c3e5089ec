//! Read-only query operations over a [`GraphStore`].
//!
//! Everything here is a linear scan or an index lookup plus a filter; nothing
//! mutates the store. Query results borrow from the store and follow its
//! iteration order (entity id order).

use serde_json::Value;

use crate::confidence::relation_confidence;

use super::store::GraphStore;
use super::{Direction, Entity, EntityKind, Properties, Relation, RelationKind};

/// All entities of a kind, via the type index.
pub fn query_by_type(store: &GraphStore, kind: EntityKind) -> Vec<&Entity> {
    store
        .ids_of_kind(kind)
        .into_iter()
        .filter_map(|id| store.get_entity(&id))
        .collect()
}

fn candidates<'a>(
    store: &'a GraphStore,
    kind: Option<EntityKind>,
) -> impl Iterator<Item = &'a Entity> {
    store.entities().filter(move |e| match kind {
        Some(k) => e.kind == k,
        None => true,
    })
}

/// Entities whose property `key` equals `value` exactly.
pub fn query_by_property<'a>(
    store: &'a GraphStore,
    kind: Option<EntityKind>,
    key: &str,
    value: &Value,
) -> Vec<&'a Entity> {
    candidates(store, kind)
        .filter(|e| e.properties.get(key) == Some(value))
        .collect()
}

/// Multi-property query with AND (`match_all`) or OR semantics.
pub fn query_by_properties<'a>(
    store: &'a GraphStore,
    kind: Option<EntityKind>,
    filters: &Properties,
    match_all: bool,
) -> Vec<&'a Entity> {
    if filters.is_empty() {
        return candidates(store, kind).collect();
    }
    candidates(store, kind)
        .filter(|e| {
            let mut matches = filters
                .iter()
                .map(|(k, v)| e.properties.get(k) == Some(v));
            if match_all {
                matches.all(|m| m)
            } else {
                matches.any(|m| m)
            }
        })
        .collect()
}

/// Numeric view of a property value. Accepts JSON numbers and strings that
/// parse as numbers; anything else has no numeric view.
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Entities whose property `key` has a numeric value within `[min, max]`.
///
/// Either bound may be open. Entities whose value is missing or non-numeric
/// are silently excluded rather than treated as an error.
pub fn query_by_property_range<'a>(
    store: &'a GraphStore,
    kind: Option<EntityKind>,
    key: &str,
    min: Option<f64>,
    max: Option<f64>,
) -> Vec<&'a Entity> {
    candidates(store, kind)
        .filter(|e| {
            let Some(v) = e.properties.get(key).and_then(numeric) else {
                return false;
            };
            min.is_none_or(|lo| v >= lo) && max.is_none_or(|hi| v <= hi)
        })
        .collect()
}

/// Case-insensitive substring search over entity names and descriptions,
/// optionally restricted to a set of kinds (empty means all kinds).
pub fn search<'a>(store: &'a GraphStore, text: &str, kinds: &[EntityKind]) -> Vec<&'a Entity> {
    let needle = text.to_lowercase();
    store
        .entities()
        .filter(|e| kinds.is_empty() || kinds.contains(&e.kind))
        .filter(|e| {
            e.name().to_lowercase().contains(&needle)
                || e.description()
                    .is_some_and(|d| d.to_lowercase().contains(&needle))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Relation-constrained queries
// ---------------------------------------------------------------------------

/// A relation triple pattern where `None` means "any".
#[derive(Debug, Clone, Default)]
pub struct RelationPattern {
    /// Required source id, or any.
    pub source_id: Option<String>,
    /// Required relation kind, or any.
    pub kind: Option<RelationKind>,
    /// Required target id, or any.
    pub target_id: Option<String>,
}

impl RelationPattern {
    /// Whether a relation satisfies this pattern.
    pub fn matches(&self, relation: &Relation) -> bool {
        self.source_id
            .as_deref()
            .is_none_or(|s| relation.source_id == s)
            && self.kind.is_none_or(|k| relation.kind == k)
            && self
                .target_id
                .as_deref()
                .is_none_or(|t| relation.target_id == t)
    }
}

/// Entities of a kind whose total degree is at least `min_relations`, subject
/// to every `required` pattern having at least one match.
///
/// The required-pattern check is a global existence check over the whole
/// graph, not scoped to the candidate entity: a candidate qualifies as long
/// as *some* relation anywhere matches each pattern. Callers that need the
/// pattern satisfied by the candidate's own incident relations should use
/// [`query_entities_matching_pattern`] instead.
pub fn query_with_relations<'a>(
    store: &'a GraphStore,
    kind: Option<EntityKind>,
    required: &[RelationPattern],
    min_relations: usize,
) -> Vec<&'a Entity> {
    // Global check, evaluated once for the whole query.
    let patterns_hold = required
        .iter()
        .all(|p| store.relations().any(|r| p.matches(r)));
    if !patterns_hold {
        return Vec::new();
    }
    candidates(store, kind)
        .filter(|e| store.outgoing(&e.id).len() + store.incoming(&e.id).len() >= min_relations)
        .collect()
}

/// One incident-relation requirement for [`query_entities_matching_pattern`].
#[derive(Debug, Clone, Copy)]
pub struct RelationSpec {
    /// Relation kind the candidate must carry.
    pub kind: RelationKind,
    /// Required kind of the entity on the other end, or any.
    pub other_kind: Option<EntityKind>,
    /// Which incident edges of the candidate may satisfy the requirement.
    pub direction: Direction,
}

fn spec_satisfied(store: &GraphStore, entity_id: &str, spec: &RelationSpec) -> bool {
    let other_matches = |other_id: &str| match spec.other_kind {
        Some(k) => store.get_entity(other_id).is_some_and(|e| e.kind == k),
        None => true,
    };
    let out = || {
        store
            .outgoing(entity_id)
            .iter()
            .any(|r| r.kind == spec.kind && other_matches(&r.target_id))
    };
    let inc = || {
        store
            .incoming(entity_id)
            .iter()
            .any(|r| r.kind == spec.kind && other_matches(&r.source_id))
    };
    match spec.direction {
        Direction::Out => out(),
        Direction::In => inc(),
        Direction::Both => out() || inc(),
    }
}

/// Entities of `kind` where every [`RelationSpec`] is satisfied by the
/// candidate's own incident relations and every property filter matches.
///
/// This is the entity-scoped counterpart of [`query_with_relations`].
pub fn query_entities_matching_pattern<'a>(
    store: &'a GraphStore,
    kind: EntityKind,
    required_relations: &[RelationSpec],
    property_filters: Option<&Properties>,
) -> Vec<&'a Entity> {
    query_by_type(store, kind)
        .into_iter()
        .filter(|e| {
            property_filters.is_none_or(|filters| {
                filters.iter().all(|(k, v)| e.properties.get(k) == Some(v))
            })
        })
        .filter(|e| {
            required_relations
                .iter()
                .all(|spec| spec_satisfied(store, &e.id, spec))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Advanced search
// ---------------------------------------------------------------------------

/// Incident-relation requirement for [`advanced_search`].
#[derive(Debug, Clone, Copy)]
pub struct RequiredRelation {
    /// Relation kind the candidate must carry (in either direction).
    pub kind: RelationKind,
    /// Minimum confidence of at least one matching relation.
    pub min_confidence: f64,
}

/// Filter set for [`advanced_search`]. An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    /// Restrict to these kinds; empty means all kinds.
    pub kinds: Vec<EntityKind>,
    /// Exact-match property filters (AND semantics).
    pub property_filters: Properties,
    /// Require an incident relation of a kind at a minimum confidence.
    pub required_relation: Option<RequiredRelation>,
}

fn text_matches(entity: &Entity, needle: &str) -> bool {
    if entity.name().to_lowercase().contains(needle) {
        return true;
    }
    entity.properties.values().any(|v| {
        v.as_str()
            .is_some_and(|s| s.to_lowercase().contains(needle))
    })
}

/// Combined free-text, property, kind, and relation-confidence search.
///
/// The text matches the entity name or any string property,
/// case-insensitively. The relation requirement is satisfied when any of the
/// candidate's incident relations of the required kind scores at or above the
/// confidence threshold.
pub fn advanced_search<'a>(
    store: &'a GraphStore,
    text: Option<&str>,
    filter: &SearchFilter,
) -> Vec<&'a Entity> {
    let needle = text.map(str::to_lowercase);
    store
        .entities()
        .filter(|e| filter.kinds.is_empty() || filter.kinds.contains(&e.kind))
        .filter(|e| needle.as_deref().is_none_or(|n| text_matches(e, n)))
        .filter(|e| {
            filter
                .property_filters
                .iter()
                .all(|(k, v)| e.properties.get(k) == Some(v))
        })
        .filter(|e| {
            let Some(req) = filter.required_relation else {
                return true;
            };
            store
                .outgoing(&e.id)
                .into_iter()
                .chain(store.incoming(&e.id))
                .filter(|r| r.kind == req.kind)
                .any(|r| relation_confidence(store, r) >= req.min_confidence)
        })
        .collect()
}
