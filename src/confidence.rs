//! Heuristic confidence and similarity scoring.
//!
//! Both scores are deterministic heuristics, not learned models. The relation
//! confidence blends a fixed base score with a per-kind weight table, then
//! adds small bonuses for property completeness and reciprocity. Entity
//! similarity combines name similarity, shared property keys, and a same-kind
//! bonus. Reproducibility depends on the exact weight table and blend ratios,
//! so changes here change every consumer (advanced search thresholds,
//! duplicate detection).

use std::collections::BTreeSet;

use crate::graph::store::GraphStore;
use crate::graph::{Entity, Relation, RelationKind};
use crate::ingest::normalize::normalize_name;

/// Static reliability weight per relation kind.
///
/// Structural facts (SKU, brand, risk assignments) score high; loose
/// associations score low.
pub fn kind_weight(kind: RelationKind) -> f64 {
    match kind {
        RelationKind::HasSku | RelationKind::HasBrand | RelationKind::HasRisk => 0.9,
        RelationKind::BelongsTo
        | RelationKind::ProvidesService
        | RelationKind::HasIntent
        | RelationKind::HasSlot => 0.8,
        RelationKind::Supplies
        | RelationKind::Sells
        | RelationKind::Offers
        | RelationKind::AvailableIn
        | RelationKind::OperatesIn => 0.7,
        RelationKind::GovernedBy => 0.6,
        RelationKind::SimilarTo => 0.5,
        RelationKind::RelatedTo => 0.4,
    }
}

/// Confidence score for a relation, in `[0, 1]`.
///
/// Base score 0.5 blended 60/40 with the kind weight, +0.02 per property
/// (capped at +0.1), +0.1 when a reverse relation of the same kind exists
/// between the swapped endpoints.
pub fn relation_confidence(store: &GraphStore, relation: &Relation) -> f64 {
    let mut score = 0.5 * 0.6 + kind_weight(relation.kind) * 0.4;

    if !relation.properties.is_empty() {
        score += (relation.properties.len() as f64 * 0.02).min(0.1);
    }

    let has_reverse = store
        .find_relation(&relation.target_id, &relation.source_id, relation.kind)
        .is_some();
    if has_reverse {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}

/// All relations scoring at or above `threshold`, with their confidence,
/// sorted descending by score.
pub fn high_confidence_relations(
    store: &GraphStore,
    threshold: f64,
) -> Vec<(&Relation, f64)> {
    let mut scored: Vec<(&Relation, f64)> = store
        .relations()
        .map(|r| (r, relation_confidence(store, r)))
        .filter(|(_, c)| *c >= threshold)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored
}

// ---------------------------------------------------------------------------
// Entity similarity
// ---------------------------------------------------------------------------

fn jaccard(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

fn name_similarity(a: &Entity, b: &Entity) -> f64 {
    let name_a = normalize_name(a.name());
    let name_b = normalize_name(b.name());
    if name_a == name_b {
        return 1.0;
    }
    if !name_a.is_empty() && !name_b.is_empty() && (name_a.contains(&name_b) || name_b.contains(&name_a)) {
        return 0.8;
    }
    let tokens_a: BTreeSet<&str> = name_a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = name_b.split_whitespace().collect();
    jaccard(&tokens_a, &tokens_b)
}

/// Similarity score between two entities, in `[0, 1]`.
///
/// Identical ids score 1.0 exactly. Otherwise the score is
/// `0.6 * name + 0.2 * property_key_jaccard + 0.2 * same_kind`, where the
/// name component is 1.0 for equal normalized names, 0.8 for containment,
/// and token-set Jaccard otherwise.
pub fn entity_similarity(a: &Entity, b: &Entity) -> f64 {
    if a.id == b.id {
        return 1.0;
    }

    let keys_a: BTreeSet<&str> = a.properties.keys().map(String::as_str).collect();
    let keys_b: BTreeSet<&str> = b.properties.keys().map(String::as_str).collect();

    let mut score = 0.6 * name_similarity(a, b) + 0.2 * jaccard(&keys_a, &keys_b);
    if a.kind == b.kind {
        score += 0.2;
    }
    score.clamp(0.0, 1.0)
}

/// Rank every other entity by structural similarity to `id`, descending,
/// truncated to `max_results`.
///
/// Uses a broader signal set than [`entity_similarity`]: shared incident
/// relation kinds per direction and shared property keys, with a same-kind
/// bonus. An unknown id yields an empty list, and zero-scoring entities are
/// omitted.
pub fn find_similar_entities<'a>(
    store: &'a GraphStore,
    id: &str,
    max_results: usize,
) -> Vec<(&'a Entity, f64)> {
    let Some(target) = store.get_entity(id) else {
        return Vec::new();
    };

    let relation_kinds = |eid: &str, outgoing: bool| -> BTreeSet<&'static str> {
        let relations = if outgoing {
            store.outgoing(eid)
        } else {
            store.incoming(eid)
        };
        relations.iter().map(|r| r.kind.as_str()).collect()
    };

    let target_out = relation_kinds(id, true);
    let target_in = relation_kinds(id, false);
    let target_keys: BTreeSet<&str> = target.properties.keys().map(String::as_str).collect();

    let mut scored: Vec<(&Entity, f64)> = store
        .entities()
        .filter(|e| e.id != id)
        .filter_map(|e| {
            let mut score = 0.0;
            if e.kind == target.kind {
                score += 0.3;
            }
            score += 0.3 * jaccard(&target_out, &relation_kinds(&e.id, true));
            score += 0.2 * jaccard(&target_in, &relation_kinds(&e.id, false));

            let keys: BTreeSet<&str> = e.properties.keys().map(String::as_str).collect();
            score += 0.2 * jaccard(&target_keys, &keys);

            let score = score.clamp(0.0, 1.0);
            (score > 0.0).then_some((e, score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(max_results);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EntityKind;

    fn product(id: &str, name: &str) -> Entity {
        Entity::new(id, EntityKind::Product).with_property("name", name)
    }

    #[test]
    fn confidence_reflects_kind_weight() {
        let mut store = GraphStore::new();
        store.create_entity(product("p1", "iPhone"), false).unwrap();
        store
            .create_entity(Entity::new("b1", EntityKind::Brand), false)
            .unwrap();
        store
            .create_relation(Relation::new("p1", "b1", RelationKind::HasBrand), true)
            .unwrap();
        store
            .create_relation(Relation::new("p1", "b1", RelationKind::RelatedTo), true)
            .unwrap();

        let brand = store.find_relation("p1", "b1", RelationKind::HasBrand).unwrap();
        let related = store.find_relation("p1", "b1", RelationKind::RelatedTo).unwrap();

        let c_brand = relation_confidence(&store, brand);
        let c_related = relation_confidence(&store, related);
        assert!(c_brand >= 0.5);
        assert!(c_brand > c_related);
        // 0.5 * 0.6 + 0.9 * 0.4, no properties, no reverse.
        assert!((c_brand - 0.66).abs() < 1e-9);
    }

    #[test]
    fn reverse_relation_bonus() {
        let mut store = GraphStore::new();
        store.create_entity(product("a", "A"), false).unwrap();
        store.create_entity(product("b", "B"), false).unwrap();
        store
            .create_relation(Relation::new("a", "b", RelationKind::SimilarTo), true)
            .unwrap();

        let base = {
            let r = store.find_relation("a", "b", RelationKind::SimilarTo).unwrap();
            relation_confidence(&store, r)
        };

        store
            .create_relation(Relation::new("b", "a", RelationKind::SimilarTo), true)
            .unwrap();
        let r = store.find_relation("a", "b", RelationKind::SimilarTo).unwrap();
        let boosted = relation_confidence(&store, r);
        assert!((boosted - base - 0.1).abs() < 1e-9);
    }

    #[test]
    fn confidence_bounded_for_all_kinds() {
        let mut store = GraphStore::new();
        store.create_entity(product("a", "A"), false).unwrap();
        store.create_entity(product("b", "B"), false).unwrap();
        for kind in RelationKind::ALL {
            let r = Relation::new("a", "b", kind)
                .with_property("w1", 1)
                .with_property("w2", 2)
                .with_property("w3", 3)
                .with_property("w4", 4)
                .with_property("w5", 5)
                .with_property("w6", 6);
            store.create_relation(r, true).unwrap();
            store
                .create_relation(Relation::new("b", "a", kind), true)
                .unwrap();
            let r = store.find_relation("a", "b", kind).unwrap();
            let c = relation_confidence(&store, r);
            assert!((0.0..=1.0).contains(&c), "{kind}: {c}");
        }
    }

    #[test]
    fn high_confidence_sorted_descending() {
        let mut store = GraphStore::new();
        store.create_entity(product("p1", "iPhone"), false).unwrap();
        store
            .create_entity(Entity::new("b1", EntityKind::Brand), false)
            .unwrap();
        store
            .create_relation(Relation::new("p1", "b1", RelationKind::HasBrand), true)
            .unwrap();
        store
            .create_relation(Relation::new("p1", "b1", RelationKind::GovernedBy), true)
            .unwrap();
        store
            .create_relation(Relation::new("p1", "b1", RelationKind::RelatedTo), true)
            .unwrap();

        let high = high_confidence_relations(&store, 0.5);
        assert_eq!(high.len(), 2); // related_to scores 0.46
        assert!(high[0].1 >= high[1].1);
        assert_eq!(high[0].0.kind, RelationKind::HasBrand);
    }

    #[test]
    fn similarity_identical_properties() {
        let a = product("product_1", "iPhone 15").with_property("price", 999.99);
        let b = product("product_2", "iPhone 15").with_property("price", 999.99);
        assert!((entity_similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn similarity_reflexive() {
        let a = product("x", "whatever");
        assert!((entity_similarity(&a, &a) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn similarity_same_name_different_kind() {
        let a = product("p", "iPhone 15");
        let b = Entity::new("s", EntityKind::Sku).with_property("name", "iPhone 15");
        // 0.6 * 1.0 + 0.2 * 1.0 + 0.0
        assert!((entity_similarity(&a, &b) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn similarity_substring_names() {
        let a = product("p1", "iPhone 15");
        let b = product("p2", "iPhone 15 Pro");
        // 0.6 * 0.8 + 0.2 * 1.0 + 0.2
        assert!((entity_similarity(&a, &b) - 0.88).abs() < 1e-9);
    }

    #[test]
    fn similarity_disjoint_names() {
        let a = product("p1", "iPhone");
        let b = product("p2", "Galaxy");
        // 0.6 * 0.0 + 0.2 * 1.0 + 0.2
        assert!((entity_similarity(&a, &b) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn similarity_case_insensitive_names() {
        let a = product("p1", "iphone 15");
        let b = product("p2", "iPhone 15");
        assert!(entity_similarity(&a, &b) >= 0.8);
    }

    #[test]
    fn similar_entities_shares_structure() {
        let mut store = GraphStore::new();
        for (id, kind) in [
            ("product_1", EntityKind::Product),
            ("product_2", EntityKind::Product),
            ("brand_1", EntityKind::Brand),
            ("category_1", EntityKind::Category),
        ] {
            store.create_entity(Entity::new(id, kind), false).unwrap();
        }
        for source in ["product_1", "product_2"] {
            store
                .create_relation(Relation::new(source, "brand_1", RelationKind::HasBrand), true)
                .unwrap();
            store
                .create_relation(
                    Relation::new(source, "category_1", RelationKind::BelongsTo),
                    true,
                )
                .unwrap();
        }

        let similar = find_similar_entities(&store, "product_1", 5);
        assert!(!similar.is_empty());
        let ids: Vec<_> = similar.iter().map(|(e, _)| e.id.as_str()).collect();
        assert!(ids.contains(&"product_2"));
        assert!(!ids.contains(&"product_1"));
        assert_eq!(similar[0].0.id, "product_2");
    }

    #[test]
    fn similar_entities_unknown_id() {
        let store = GraphStore::new();
        assert!(find_similar_entities(&store, "nonexistent", 5).is_empty());
    }
}
