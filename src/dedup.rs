//! Duplicate detection and safe entity merging.
//!
//! Detection is pairwise similarity scoring (O(n²) in candidate count, so
//! whole-graph passes should pre-filter by kind). Merging rewires every
//! relation touching a merged-away id onto the canonical entity before the
//! members are deleted, so referential integrity holds at every step.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, info};

use crate::confidence::entity_similarity;
use crate::error::MergeError;
use crate::graph::store::GraphStore;
use crate::graph::{Entity, EntityKind, Properties, Relation};

/// A group of entities believed to be the same real-world thing.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    /// Suggested survivor: the lexicographically smallest member id.
    pub canonical_id: String,
    /// All member ids, canonical included, in discovery order.
    pub members: Vec<String>,
}

impl DuplicateGroup {
    /// Number of members in the group.
    pub fn count(&self) -> usize {
        self.members.len()
    }
}

/// Pairwise duplicate detection over all entities of `kind` (or all
/// entities), grouping pairs that score at or above `threshold`.
///
/// When either member of a qualifying pair already belongs to a group, the
/// pair joins that group; otherwise a new group opens with the
/// lexicographically smaller id as canonical.
pub fn find_potential_duplicates(
    store: &GraphStore,
    kind: Option<EntityKind>,
    threshold: f64,
) -> Vec<DuplicateGroup> {
    let candidates: Vec<&Entity> = store
        .entities()
        .filter(|e| kind.is_none_or(|k| e.kind == k))
        .collect();

    let mut groups: Vec<DuplicateGroup> = Vec::new();
    let mut member_of: BTreeMap<String, usize> = BTreeMap::new();

    for i in 0..candidates.len() {
        for j in (i + 1)..candidates.len() {
            let (a, b) = (candidates[i], candidates[j]);
            if entity_similarity(a, b) < threshold {
                continue;
            }
            match (member_of.get(&a.id).copied(), member_of.get(&b.id).copied()) {
                (Some(g), _) => {
                    if !member_of.contains_key(&b.id) {
                        groups[g].members.push(b.id.clone());
                        member_of.insert(b.id.clone(), g);
                    }
                }
                (None, Some(g)) => {
                    groups[g].members.push(a.id.clone());
                    member_of.insert(a.id.clone(), g);
                }
                (None, None) => {
                    // Candidates are visited in id order, so a.id < b.id.
                    let g = groups.len();
                    groups.push(DuplicateGroup {
                        canonical_id: a.id.clone(),
                        members: vec![a.id.clone(), b.id.clone()],
                    });
                    member_of.insert(a.id.clone(), g);
                    member_of.insert(b.id.clone(), g);
                }
            }
        }
    }

    debug!(
        groups = groups.len(),
        threshold, "duplicate detection finished"
    );
    groups
}

/// Outcome of [`merge_entities`].
#[derive(Debug, Clone)]
pub struct MergeResult {
    /// The canonical entity after the merge.
    pub merged_entity: Entity,
    /// Ids that were merged away (canonical excluded).
    pub source_ids: Vec<String>,
    /// Incident relations that survived the merge (rewired or untouched).
    pub relations_preserved: usize,
    /// Incident relations dropped because both endpoints were merged.
    pub relations_removed: usize,
}

fn accumulate_property(properties: &mut Properties, key: &str, value: &Value) {
    match properties.get_mut(key) {
        None => {
            properties.insert(key.to_string(), value.clone());
        }
        Some(existing) if existing == value => {}
        Some(Value::Array(values)) => {
            if !values.contains(value) {
                values.push(value.clone());
            }
        }
        Some(existing) => {
            // Conflict: the field becomes a list of distinct values, with the
            // first-seen value keeping its position.
            let first = existing.clone();
            *existing = Value::Array(vec![first, value.clone()]);
        }
    }
}

/// Merge two or more entities into one canonical entity.
///
/// Canonical is `canonical_id` when given and listed, otherwise the first id.
/// With `preserve_properties` the canonical entity takes the union of all
/// members' properties; conflicting values accumulate into a list. Every
/// relation touching a merged-away id is rewritten to point at the canonical
/// id; relations whose endpoints were both merged away would become
/// self-loops and are dropped instead. The canonical entity's version is
/// bumped once.
pub fn merge_entities(
    store: &mut GraphStore,
    ids: &[&str],
    canonical_id: Option<&str>,
    preserve_properties: bool,
) -> Result<MergeResult, MergeError> {
    if ids.len() < 2 {
        return Err(MergeError::TooFewEntities { count: ids.len() });
    }
    let mut members = Vec::with_capacity(ids.len());
    for id in ids {
        let entity = store
            .get_entity(id)
            .ok_or_else(|| MergeError::EntityNotFound { id: id.to_string() })?;
        members.push(entity.clone());
    }

    let canonical = canonical_id
        .filter(|c| ids.contains(c))
        .unwrap_or(ids[0])
        .to_string();
    let merged_away: BTreeSet<&str> = ids
        .iter()
        .copied()
        .filter(|id| *id != canonical)
        .collect();

    // Snapshot every relation incident to any member, deduplicated by triple,
    // before any deletion cascades run.
    let mut incident: BTreeMap<(String, String, String), Relation> = BTreeMap::new();
    for id in ids {
        for r in store.outgoing(id).into_iter().chain(store.incoming(id)) {
            incident.insert(
                (
                    r.source_id.clone(),
                    r.target_id.clone(),
                    r.kind.as_str().to_string(),
                ),
                r.clone(),
            );
        }
    }

    // Plan the rewiring.
    let remap = |endpoint: &str| -> String {
        if merged_away.contains(endpoint) {
            canonical.clone()
        } else {
            endpoint.to_string()
        }
    };
    let mut preserved = 0usize;
    let mut removed = 0usize;
    let mut rewired: Vec<Relation> = Vec::new();
    for relation in incident.values() {
        let source = remap(&relation.source_id);
        let target = remap(&relation.target_id);
        if source == target {
            removed += 1;
            continue;
        }
        preserved += 1;
        if source != relation.source_id || target != relation.target_id {
            let mut r = relation.clone();
            r.source_id = source;
            r.target_id = target;
            rewired.push(r);
        }
    }

    // Merge properties onto the canonical entity, members in listed order.
    let mut merged = members
        .iter()
        .find(|e| e.id == canonical)
        .cloned()
        .unwrap_or_else(|| members[0].clone());
    if preserve_properties {
        for member in &members {
            if member.id == canonical {
                continue;
            }
            for (key, value) in &member.properties {
                accumulate_property(&mut merged.properties, key, value);
            }
        }
    }

    // Delete merged-away members (cascades their edges), then apply the
    // property merge and re-create the rewired edges.
    for id in &merged_away {
        store.delete_entity(id);
    }
    let merged_entity = store
        .update_entity(merged, false)
        .map_err(|_| MergeError::EntityNotFound { id: canonical.clone() })?;
    for relation in rewired {
        // Collapsed duplicates are fine: the triple already exists.
        let _ = store.create_relation(relation, false);
    }

    info!(
        canonical = %canonical,
        merged = merged_away.len(),
        preserved,
        removed,
        "merged entities"
    );
    Ok(MergeResult {
        merged_entity,
        source_ids: merged_away.into_iter().map(str::to_string).collect(),
        relations_preserved: preserved,
        relations_removed: removed,
    })
}

/// Outcome of a [`deduplicate`] pass.
#[derive(Debug, Default)]
pub struct DedupReport {
    /// One result per group merged.
    pub merges: Vec<MergeResult>,
    /// Per-group errors; a failed group does not abort the pass.
    pub errors: Vec<String>,
}

/// One-pass deduplication: detect groups, then merge each onto its canonical
/// id in discovery order.
///
/// A group whose members were already consumed by an earlier merge in the
/// same pass is skipped; there is no cross-group conflict resolution beyond
/// first-wins.
pub fn deduplicate(
    store: &mut GraphStore,
    threshold: f64,
    kind: Option<EntityKind>,
) -> DedupReport {
    let groups = find_potential_duplicates(store, kind, threshold);
    let mut report = DedupReport::default();
    let mut consumed: BTreeSet<String> = BTreeSet::new();

    for group in groups {
        if group.members.iter().any(|m| consumed.contains(m)) {
            continue;
        }
        let ids: Vec<&str> = group.members.iter().map(String::as_str).collect();
        match merge_entities(store, &ids, Some(&group.canonical_id), true) {
            Ok(result) => {
                consumed.extend(result.source_ids.iter().cloned());
                report.merges.push(result);
            }
            Err(e) => report.errors.push(format!(
                "failed to merge group with canonical {}: {e}",
                group.canonical_id
            )),
        }
    }
    report
}
