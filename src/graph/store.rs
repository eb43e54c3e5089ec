//! In-memory graph store with validated CRUD and a type index.
//!
//! Entities live in an ordered id map; relations live as edges of a
//! `StableDiGraph` whose node weights are entity ids. Stable indices mean
//! node removal never invalidates the id-to-index map, and `remove_node`
//! drops every incident edge, so deleting an entity cascades to its
//! relations and no dangling relation is ever observable.
//!
//! The store is single-threaded and synchronous. Callers that share it
//! across threads must synchronize around the whole store, since a cascade
//! delete touches the entity map, the edge set, and the type index together.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::EdgeRef;
use petgraph::Direction as PetDirection;

use crate::error::{StoreError, StoreResult};
use crate::validate::{EndpointStatus, Validator};

use super::{now_millis, Entity, EntityKind, GraphSnapshot, Relation, RelationKind};

/// Owns all entities and relations of the supply knowledge graph.
pub struct GraphStore {
    entities: BTreeMap<String, Entity>,
    graph: StableDiGraph<String, Relation>,
    node_index: HashMap<String, NodeIndex>,
    type_index: HashMap<EntityKind, BTreeSet<String>>,
    validator: Validator,
}

impl GraphStore {
    /// Create an empty store with the default validation rules.
    pub fn new() -> Self {
        Self::with_validator(Validator::new())
    }

    /// Create an empty store with a custom rule set.
    pub fn with_validator(validator: Validator) -> Self {
        Self {
            entities: BTreeMap::new(),
            graph: StableDiGraph::new(),
            node_index: HashMap::new(),
            type_index: HashMap::new(),
            validator,
        }
    }

    /// Access the validation rule registry, e.g. to add domain rules.
    pub fn validator_mut(&mut self) -> &mut Validator {
        &mut self.validator
    }

    fn endpoint_status(&self, relation: &Relation) -> EndpointStatus {
        EndpointStatus {
            source_exists: self.entities.contains_key(&relation.source_id),
            target_exists: self.entities.contains_key(&relation.target_id),
        }
    }

    // -----------------------------------------------------------------------
    // Entity CRUD
    // -----------------------------------------------------------------------

    /// Create a new entity.
    ///
    /// Fails with [`StoreError::AlreadyExists`] if the id is taken, and with
    /// [`StoreError::Validation`] when `validate` is set and a rule rejects
    /// the entity. Bulk paths that have already normalized their input pass
    /// `validate = false` as an explicit trust boundary.
    pub fn create_entity(&mut self, entity: Entity, validate: bool) -> StoreResult<Entity> {
        if validate {
            let errors = self.validator.validate_entity(&entity);
            if !errors.is_empty() {
                return Err(StoreError::Validation {
                    subject: "entity".into(),
                    messages: errors.join("; "),
                });
            }
        }
        if self.entities.contains_key(&entity.id) {
            return Err(StoreError::AlreadyExists {
                id: entity.id.clone(),
            });
        }

        let idx = self.graph.add_node(entity.id.clone());
        self.node_index.insert(entity.id.clone(), idx);
        self.type_index
            .entry(entity.kind)
            .or_default()
            .insert(entity.id.clone());
        self.entities.insert(entity.id.clone(), entity.clone());
        Ok(entity)
    }

    /// Look up an entity by id.
    pub fn get_entity(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Whether an entity with this id exists.
    pub fn has_entity(&self, id: &str) -> bool {
        self.entities.contains_key(id)
    }

    /// Replace an existing entity.
    ///
    /// Preserves `created_at`, bumps `version` by exactly one, and refreshes
    /// `updated_at`. Fails with [`StoreError::NotFound`] if the id is absent.
    pub fn update_entity(&mut self, entity: Entity, validate: bool) -> StoreResult<Entity> {
        if validate {
            let errors = self.validator.validate_entity(&entity);
            if !errors.is_empty() {
                return Err(StoreError::Validation {
                    subject: "entity".into(),
                    messages: errors.join("; "),
                });
            }
        }
        let existing = self
            .entities
            .get(&entity.id)
            .ok_or_else(|| StoreError::NotFound {
                id: entity.id.clone(),
            })?;

        let mut updated = entity;
        updated.version = existing.version + 1;
        updated.created_at = existing.created_at;
        updated.updated_at = now_millis();

        if updated.kind != existing.kind {
            let old_kind = existing.kind;
            if let Some(ids) = self.type_index.get_mut(&old_kind) {
                ids.remove(&updated.id);
            }
            self.type_index
                .entry(updated.kind)
                .or_default()
                .insert(updated.id.clone());
        }

        self.entities.insert(updated.id.clone(), updated.clone());
        Ok(updated)
    }

    /// Create the entity if absent, otherwise replace it.
    ///
    /// Returns the stored entity and whether it was newly created.
    pub fn upsert_entity(&mut self, entity: Entity, validate: bool) -> StoreResult<(Entity, bool)> {
        if self.entities.contains_key(&entity.id) {
            Ok((self.update_entity(entity, validate)?, false))
        } else {
            Ok((self.create_entity(entity, validate)?, true))
        }
    }

    /// Delete an entity and every relation touching it.
    ///
    /// Returns `false` when the id is absent. The incident-edge cascade is
    /// structural: removing the node removes its edges.
    pub fn delete_entity(&mut self, id: &str) -> bool {
        let Some(entity) = self.entities.remove(id) else {
            return false;
        };
        if let Some(idx) = self.node_index.remove(id) {
            self.graph.remove_node(idx);
        }
        if let Some(ids) = self.type_index.get_mut(&entity.kind) {
            ids.remove(id);
        }
        true
    }

    /// Create each entity in turn, failing fast on the first error.
    ///
    /// There is no rollback: entities created before a failure stay
    /// committed, consistent with the partial-success ingestion model.
    pub fn batch_create_entities(
        &mut self,
        entities: Vec<Entity>,
        validate: bool,
    ) -> StoreResult<Vec<Entity>> {
        entities
            .into_iter()
            .map(|e| self.create_entity(e, validate))
            .collect()
    }

    // -----------------------------------------------------------------------
    // Relation CRUD
    // -----------------------------------------------------------------------

    /// Create a new relation.
    ///
    /// Both endpoints must already exist ([`StoreError::UnknownEndpoint`]),
    /// and a pair of endpoints carries at most one relation per kind
    /// ([`StoreError::DuplicateRelation`]). These structural checks run even
    /// with `validate = false`; only rule checks (e.g. weight range) are
    /// skipped.
    pub fn create_relation(&mut self, relation: Relation, validate: bool) -> StoreResult<Relation> {
        let endpoints = self.endpoint_status(&relation);
        if validate {
            let errors = self.validator.validate_relation(&relation, endpoints);
            if !errors.is_empty() {
                return Err(StoreError::Validation {
                    subject: "relation".into(),
                    messages: errors.join("; "),
                });
            }
        }
        if !endpoints.source_exists {
            return Err(StoreError::UnknownEndpoint {
                source_id: relation.source_id.clone(),
                target_id: relation.target_id.clone(),
                missing: relation.source_id.clone(),
            });
        }
        if !endpoints.target_exists {
            return Err(StoreError::UnknownEndpoint {
                source_id: relation.source_id.clone(),
                target_id: relation.target_id.clone(),
                missing: relation.target_id.clone(),
            });
        }
        if self
            .find_relation(&relation.source_id, &relation.target_id, relation.kind)
            .is_some()
        {
            return Err(StoreError::DuplicateRelation {
                source_id: relation.source_id.clone(),
                target_id: relation.target_id.clone(),
                kind: relation.kind.as_str().into(),
            });
        }

        let src = self.node_index[&relation.source_id];
        let tgt = self.node_index[&relation.target_id];
        self.graph.add_edge(src, tgt, relation.clone());
        Ok(relation)
    }

    /// Create each relation in turn, failing fast on the first error.
    pub fn batch_create_relations(
        &mut self,
        relations: Vec<Relation>,
        validate: bool,
    ) -> StoreResult<Vec<Relation>> {
        relations
            .into_iter()
            .map(|r| self.create_relation(r, validate))
            .collect()
    }

    /// Delete the relation identified by its `(source, target, kind)` triple.
    ///
    /// Returns `false` when no such relation exists.
    pub fn delete_relation(&mut self, source_id: &str, target_id: &str, kind: RelationKind) -> bool {
        let (Some(&src), Some(&tgt)) = (
            self.node_index.get(source_id),
            self.node_index.get(target_id),
        ) else {
            return false;
        };
        let edge = self
            .graph
            .edges_connecting(src, tgt)
            .find(|e| e.weight().kind == kind)
            .map(|e| e.id());
        match edge {
            Some(id) => {
                self.graph.remove_edge(id);
                true
            }
            None => false,
        }
    }

    /// Look up the relation identified by its `(source, target, kind)` triple.
    pub fn find_relation(
        &self,
        source_id: &str,
        target_id: &str,
        kind: RelationKind,
    ) -> Option<&Relation> {
        let (&src, &tgt) = (
            self.node_index.get(source_id)?,
            self.node_index.get(target_id)?,
        );
        self.graph
            .edges_connecting(src, tgt)
            .map(|e| e.weight())
            .find(|r| r.kind == kind)
    }

    // -----------------------------------------------------------------------
    // Iteration & counts
    // -----------------------------------------------------------------------

    /// All entities, in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// All relations, in insertion order.
    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.graph.edge_weights()
    }

    /// Outgoing relations of an entity (unfiltered).
    pub fn outgoing(&self, id: &str) -> Vec<&Relation> {
        self.incident(id, PetDirection::Outgoing)
    }

    /// Incoming relations of an entity (unfiltered).
    pub fn incoming(&self, id: &str) -> Vec<&Relation> {
        self.incident(id, PetDirection::Incoming)
    }

    fn incident(&self, id: &str, direction: PetDirection) -> Vec<&Relation> {
        let Some(&idx) = self.node_index.get(id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, direction)
            .map(|e| e.weight())
            .collect()
    }

    /// Ids of all entities of a kind, in id order (index lookup, no scan).
    pub fn ids_of_kind(&self, kind: EntityKind) -> Vec<String> {
        self.type_index
            .get(&kind)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Count entities, optionally restricted to one kind.
    pub fn count(&self, kind: Option<EntityKind>) -> usize {
        match kind {
            Some(k) => self.type_index.get(&k).map_or(0, BTreeSet::len),
            None => self.entities.len(),
        }
    }

    /// Count relations, optionally restricted to one kind.
    pub fn count_relations(&self, kind: Option<RelationKind>) -> usize {
        match kind {
            Some(k) => self.relations().filter(|r| r.kind == k).count(),
            None => self.graph.edge_count(),
        }
    }

    // -----------------------------------------------------------------------
    // Bulk transfer
    // -----------------------------------------------------------------------

    /// Export the whole graph as a snapshot.
    pub fn export(&self) -> GraphSnapshot {
        GraphSnapshot {
            entities: self.entities.values().cloned().collect(),
            relations: self.relations().cloned().collect(),
            metadata: super::Properties::new(),
        }
    }

    /// Load a snapshot with upsert semantics.
    ///
    /// Existing entity ids are updated rather than duplicated; relations that
    /// reference missing endpoints or duplicate an existing triple are
    /// skipped. Validation is bypassed, mirroring the bulk-load trust
    /// boundary.
    pub fn load(&mut self, snapshot: GraphSnapshot) {
        for entity in snapshot.entities {
            if self.entities.contains_key(&entity.id) {
                // update_entity cannot fail with validate = false on a present id
                let _ = self.update_entity(entity, false);
            } else {
                let _ = self.create_entity(entity, false);
            }
        }
        for relation in snapshot.relations {
            let _ = self.create_relation(relation, false);
        }
    }

    /// Remove all entities and relations.
    pub fn clear(&mut self) {
        self.entities.clear();
        self.graph.clear();
        self.node_index.clear();
        self.type_index.clear();
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphStore")
            .field("entities", &self.entities.len())
            .field("relations", &self.graph.edge_count())
            .finish()
    }
}
