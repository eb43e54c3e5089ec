//! Aggregate statistics and degree-based rankings.
//!
//! The result structs are `Serialize` so a reporting layer can emit them as
//! JSON without re-aggregating.

use std::collections::BTreeMap;

use serde::Serialize;

use super::store::GraphStore;
use super::traverse::get_degree;
use super::{Entity, EntityKind, RelationKind};

/// Entity counts per kind. Kinds with no entities are omitted.
pub fn count_by_type(store: &GraphStore) -> BTreeMap<EntityKind, usize> {
    EntityKind::ALL
        .iter()
        .filter_map(|&kind| {
            let n = store.count(Some(kind));
            (n > 0).then_some((kind, n))
        })
        .collect()
}

/// Entities ranked by total incident relation count, descending.
///
/// Ties keep store iteration order; that order is an implementation detail,
/// not a guaranteed tie-break.
pub fn get_entities_with_most_relations<'a>(
    store: &'a GraphStore,
    kind: Option<EntityKind>,
    limit: usize,
) -> Vec<(&'a Entity, usize)> {
    let mut ranked: Vec<(&Entity, usize)> = store
        .entities()
        .filter(|e| kind.is_none_or(|k| e.kind == k))
        .map(|e| (e, get_degree(store, &e.id)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(limit);
    ranked
}

/// Whole-graph statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GraphStats {
    /// Total entity count.
    pub total_entities: usize,
    /// Total relation count.
    pub total_relations: usize,
    /// Entity counts keyed by kind wire name.
    pub entity_counts: BTreeMap<String, usize>,
    /// Relation counts keyed by kind wire name (zero-count kinds included).
    pub relation_counts: BTreeMap<String, usize>,
    /// Mean total degree over all entities; 0.0 for an empty graph.
    pub avg_degree: f64,
}

/// Compute whole-graph statistics.
pub fn get_graph_stats(store: &GraphStore) -> GraphStats {
    let total_entities = store.count(None);
    let total_relations = store.count_relations(None);

    let entity_counts = count_by_type(store)
        .into_iter()
        .map(|(k, n)| (k.as_str().to_string(), n))
        .collect();
    let relation_counts = RelationKind::ALL
        .iter()
        .map(|&k| (k.as_str().to_string(), store.count_relations(Some(k))))
        .collect();

    let avg_degree = if total_entities == 0 {
        0.0
    } else {
        // Every relation contributes one in-degree and one out-degree.
        (total_relations * 2) as f64 / total_entities as f64
    };

    GraphStats {
        total_entities,
        total_relations,
        entity_counts,
        relation_counts,
        avg_degree,
    }
}

/// Entity-centric statistics for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct EntityStatistics {
    /// Total entity count.
    pub total_entities: usize,
    /// Total relation count.
    pub total_relations: usize,
    /// Entity counts keyed by kind wire name.
    pub entities_by_type: BTreeMap<String, usize>,
    /// Relation counts keyed by kind wire name (zero-count kinds omitted).
    pub relations_by_type: BTreeMap<String, usize>,
    /// Mean incident relation count per entity; 0.0 for an empty graph.
    pub avg_relations_per_entity: f64,
    /// Number of entities with no incident relations at all.
    pub entities_with_no_relations: usize,
}

/// Compute entity-centric statistics.
pub fn get_entity_statistics(store: &GraphStore) -> EntityStatistics {
    let total_entities = store.count(None);
    let total_relations = store.count_relations(None);

    let entities_by_type = count_by_type(store)
        .into_iter()
        .map(|(k, n)| (k.as_str().to_string(), n))
        .collect();

    let mut relations_by_type: BTreeMap<String, usize> = BTreeMap::new();
    for r in store.relations() {
        *relations_by_type
            .entry(r.kind.as_str().to_string())
            .or_default() += 1;
    }

    let entities_with_no_relations = store
        .entities()
        .filter(|e| get_degree(store, &e.id) == 0)
        .count();

    let avg_relations_per_entity = if total_entities == 0 {
        0.0
    } else {
        (total_relations * 2) as f64 / total_entities as f64
    };

    EntityStatistics {
        total_entities,
        total_relations,
        entities_by_type,
        relations_by_type,
        avg_relations_per_entity,
        entities_with_no_relations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Relation;

    fn fixture() -> GraphStore {
        let mut store = GraphStore::new();
        for i in 1..=3 {
            store
                .create_entity(
                    Entity::new(format!("product_{i}"), EntityKind::Product),
                    false,
                )
                .unwrap();
        }
        store
            .create_entity(Entity::new("brand_1", EntityKind::Brand), false)
            .unwrap();
        store
            .create_entity(Entity::new("lonely", EntityKind::User), false)
            .unwrap();
        for i in 1..=3 {
            store
                .create_relation(
                    Relation::new(format!("product_{i}"), "brand_1", RelationKind::HasBrand),
                    true,
                )
                .unwrap();
        }
        store
    }

    #[test]
    fn counts_by_type() {
        let store = fixture();
        let counts = count_by_type(&store);
        assert_eq!(counts[&EntityKind::Product], 3);
        assert_eq!(counts[&EntityKind::Brand], 1);
        assert!(!counts.contains_key(&EntityKind::Sku));
    }

    #[test]
    fn most_relations_ranking() {
        let store = fixture();
        let top = get_entities_with_most_relations(&store, None, 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0.id, "brand_1");
        assert_eq!(top[0].1, 3);
        assert_eq!(top[1].1, 1);

        let products = get_entities_with_most_relations(&store, Some(EntityKind::Product), 10);
        assert_eq!(products.len(), 3);
        assert!(products.iter().all(|(_, d)| *d == 1));
    }

    #[test]
    fn graph_stats() {
        let store = fixture();
        let stats = get_graph_stats(&store);
        assert_eq!(stats.total_entities, 5);
        assert_eq!(stats.total_relations, 3);
        assert_eq!(stats.entity_counts["product"], 3);
        assert_eq!(stats.relation_counts["has_brand"], 3);
        assert_eq!(stats.relation_counts["has_sku"], 0);
        assert!((stats.avg_degree - 1.2).abs() < 1e-9);
    }

    #[test]
    fn entity_statistics() {
        let store = fixture();
        let stats = get_entity_statistics(&store);
        assert_eq!(stats.total_entities, 5);
        assert_eq!(stats.total_relations, 3);
        assert_eq!(stats.entities_by_type["product"], 3);
        assert_eq!(stats.relations_by_type["has_brand"], 3);
        assert!(!stats.relations_by_type.contains_key("has_sku"));
        assert_eq!(stats.entities_with_no_relations, 1);
        assert!(stats.avg_relations_per_entity > 0.0);
    }

    #[test]
    fn empty_graph_stats() {
        let store = GraphStore::new();
        let stats = get_graph_stats(&store);
        assert_eq!(stats.total_entities, 0);
        assert!((stats.avg_degree).abs() < f64::EPSILON);
    }
}
