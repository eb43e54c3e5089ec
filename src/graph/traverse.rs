//! Traversal primitives: neighbors, degrees, paths, and layered fan-out.
//!
//! Path results clone entities and relations out of the store so they stay
//! valid while the caller keeps mutating the graph.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use super::store::GraphStore;
use super::{Direction, Entity, GraphPath, Relation, RelationKind};

/// Distinct neighboring entities, optionally filtered by relation kind and
/// edge direction.
pub fn get_neighbors<'a>(
    store: &'a GraphStore,
    id: &str,
    kind: Option<RelationKind>,
    direction: Direction,
) -> Vec<&'a Entity> {
    let mut neighbor_ids = BTreeSet::new();

    if matches!(direction, Direction::Out | Direction::Both) {
        for r in store.outgoing(id) {
            if kind.is_none_or(|k| r.kind == k) {
                neighbor_ids.insert(r.target_id.clone());
            }
        }
    }
    if matches!(direction, Direction::In | Direction::Both) {
        for r in store.incoming(id) {
            if kind.is_none_or(|k| r.kind == k) {
                neighbor_ids.insert(r.source_id.clone());
            }
        }
    }

    neighbor_ids
        .iter()
        .filter_map(|nid| store.get_entity(nid))
        .collect()
}

/// Outgoing relations of an entity, optionally filtered by kind.
pub fn get_outgoing_relations<'a>(
    store: &'a GraphStore,
    id: &str,
    kind: Option<RelationKind>,
) -> Vec<&'a Relation> {
    store
        .outgoing(id)
        .into_iter()
        .filter(|r| kind.is_none_or(|k| r.kind == k))
        .collect()
}

/// Incoming relations of an entity, optionally filtered by kind.
pub fn get_incoming_relations<'a>(
    store: &'a GraphStore,
    id: &str,
    kind: Option<RelationKind>,
) -> Vec<&'a Relation> {
    store
        .incoming(id)
        .into_iter()
        .filter(|r| kind.is_none_or(|k| r.kind == k))
        .collect()
}

/// Number of incoming relations.
pub fn get_in_degree(store: &GraphStore, id: &str) -> usize {
    store.incoming(id).len()
}

/// Number of outgoing relations.
pub fn get_out_degree(store: &GraphStore, id: &str) -> usize {
    store.outgoing(id).len()
}

/// Total number of incident relations (in + out).
pub fn get_degree(store: &GraphStore, id: &str) -> usize {
    get_in_degree(store, id) + get_out_degree(store, id)
}

/// Enumerate every simple path from `source` to `target` following outgoing
/// edges, up to `max_length` edges.
///
/// Exhaustive DFS, exponential in branching factor. Callers bound
/// `max_length`; 5 or less is the intended range.
pub fn find_paths(
    store: &GraphStore,
    source_id: &str,
    target_id: &str,
    max_length: usize,
) -> Vec<GraphPath> {
    let (Some(source), Some(_)) = (store.get_entity(source_id), store.get_entity(target_id))
    else {
        return Vec::new();
    };

    let mut paths = Vec::new();
    let mut visited: HashSet<String> = HashSet::from([source_id.to_string()]);
    let mut entities = vec![source.clone()];
    let mut relations: Vec<Relation> = Vec::new();

    fn dfs(
        store: &GraphStore,
        current_id: &str,
        target_id: &str,
        max_length: usize,
        visited: &mut HashSet<String>,
        entities: &mut Vec<Entity>,
        relations: &mut Vec<Relation>,
        paths: &mut Vec<GraphPath>,
    ) {
        if current_id == target_id {
            paths.push(GraphPath {
                entities: entities.clone(),
                relations: relations.clone(),
            });
            return;
        }
        if relations.len() >= max_length {
            return;
        }
        for relation in store.outgoing(current_id) {
            if visited.contains(&relation.target_id) {
                continue;
            }
            // Edge targets always resolve; the store never holds dangling edges.
            let Some(next) = store.get_entity(&relation.target_id) else {
                continue;
            };
            let next_id = relation.target_id.clone();
            visited.insert(next_id.clone());
            entities.push(next.clone());
            relations.push(relation.clone());

            dfs(
                store, &next_id, target_id, max_length, visited, entities, relations, paths,
            );

            entities.pop();
            relations.pop();
            visited.remove(&next_id);
        }
    }

    dfs(
        store,
        source_id,
        target_id,
        max_length,
        &mut visited,
        &mut entities,
        &mut relations,
        &mut paths,
    );
    paths
}

/// Shortest path by edge count from `source` to `target`, following outgoing
/// edges only. BFS, so the first path found is shortest; weights are ignored.
///
/// Returns `None` when the target is unreachable within `max_length` hops.
pub fn find_shortest_path(
    store: &GraphStore,
    source_id: &str,
    target_id: &str,
    max_length: usize,
) -> Option<GraphPath> {
    if !store.has_entity(source_id) || !store.has_entity(target_id) {
        return None;
    }

    let mut queue: VecDeque<(String, Vec<Relation>)> =
        VecDeque::from([(source_id.to_string(), Vec::new())]);
    let mut visited: HashSet<String> = HashSet::from([source_id.to_string()]);

    while let Some((current_id, relations)) = queue.pop_front() {
        if relations.len() >= max_length {
            continue;
        }
        for relation in store.outgoing(&current_id) {
            if visited.contains(&relation.target_id) {
                continue;
            }
            let mut next_relations = relations.clone();
            next_relations.push(relation.clone());

            if relation.target_id == target_id {
                let mut entities = vec![store.get_entity(source_id)?.clone()];
                for r in &next_relations {
                    entities.push(store.get_entity(&r.target_id)?.clone());
                }
                return Some(GraphPath {
                    entities,
                    relations: next_relations,
                });
            }

            visited.insert(relation.target_id.clone());
            queue.push_back((relation.target_id.clone(), next_relations));
        }
    }
    None
}

/// Entities reachable from `id` within `max_distance` hops, layered by hop
/// distance (following edges in both directions), optionally restricted to a
/// set of relation kinds.
///
/// Returns a map `distance -> entities`; a missing start id yields an empty
/// map. Each entity appears only at its minimum distance.
pub fn get_connected_entities(
    store: &GraphStore,
    id: &str,
    max_distance: usize,
    kinds: Option<&[RelationKind]>,
) -> BTreeMap<usize, Vec<Entity>> {
    let mut layers: BTreeMap<usize, Vec<Entity>> = BTreeMap::new();
    if !store.has_entity(id) {
        return layers;
    }

    let kind_allowed =
        |k: RelationKind| kinds.is_none_or(|allowed| allowed.contains(&k));

    let mut visited: HashSet<String> = HashSet::from([id.to_string()]);
    let mut frontier: Vec<String> = vec![id.to_string()];

    for distance in 1..=max_distance {
        let mut next: Vec<String> = Vec::new();
        for current in &frontier {
            for r in store.outgoing(current) {
                if kind_allowed(r.kind) && visited.insert(r.target_id.clone()) {
                    next.push(r.target_id.clone());
                }
            }
            for r in store.incoming(current) {
                if kind_allowed(r.kind) && visited.insert(r.source_id.clone()) {
                    next.push(r.source_id.clone());
                }
            }
        }
        if next.is_empty() {
            break;
        }
        layers.insert(
            distance,
            next.iter()
                .filter_map(|nid| store.get_entity(nid).cloned())
                .collect(),
        );
        frontier = next;
    }
    layers
}
