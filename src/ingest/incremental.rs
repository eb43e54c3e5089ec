//! Incremental updates with version tracking and a replayable change log.
//!
//! Every mutation made through these operations appends a [`ChangeRecord`],
//! so a consumer can replay or audit what a sync applied. Batch ingestion
//! deliberately does not write the log; only the incremental paths do.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{IngestError, SgResult};
use crate::graph::store::GraphStore;
use crate::graph::{now_millis, Entity, EntityKind, Properties, Relation, RelationKind};

use super::{IngestionPipeline, IngestionResult, Payload};

/// What a change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOp {
    Create,
    Update,
    Delete,
}

/// What a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedSubject {
    Entity(EntityKind),
    Relation(RelationKind),
}

/// One entry in the change log.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    pub op: ChangeOp,
    pub subject: ChangedSubject,
    /// Entity id, or `source->target` for relations.
    pub id: String,
    /// When the change was applied, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Version before the change; `None` on create.
    pub old_version: Option<u32>,
    /// Version after the change; `None` on delete.
    pub new_version: Option<u32>,
    /// Human-readable summary, e.g. the property keys an update touched.
    pub details: String,
}

impl ChangeRecord {
    fn new(
        op: ChangeOp,
        subject: ChangedSubject,
        id: impl Into<String>,
        old_version: Option<u32>,
        new_version: Option<u32>,
        details: impl Into<String>,
    ) -> Self {
        Self {
            op,
            subject,
            id: id.into(),
            timestamp: now_millis(),
            old_version,
            new_version,
            details: details.into(),
        }
    }
}

/// `changed: a, b` summary of the keys an update touched.
fn property_diff(old: &Properties, new: &Properties) -> String {
    let changed: Vec<&str> = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, _)| k.as_str())
        .chain(
            old.keys()
                .filter(|k| !new.contains_key(*k))
                .map(String::as_str),
        )
        .collect();
    if changed.is_empty() {
        String::from("no property changes")
    } else {
        format!("changed: {}", changed.join(", "))
    }
}

/// One relation upsert in a sync payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationUpdate {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "relation_type")]
    pub kind: RelationKind,
    #[serde(default)]
    pub properties: Properties,
}

/// Identifies a relation to delete in a sync payload.
#[derive(Debug, Clone, Deserialize)]
pub struct RelationKey {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "relation_type")]
    pub kind: RelationKind,
}

/// Per-kind entity changes in a sync payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntityChanges {
    #[serde(default)]
    pub upsert: Vec<Payload>,
    #[serde(default)]
    pub delete: Vec<String>,
}

/// Relation changes in a sync payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelationChanges {
    #[serde(default)]
    pub upsert: Vec<RelationUpdate>,
    #[serde(default)]
    pub delete: Vec<RelationKey>,
}

/// A full incremental sync payload, keyed by entity type name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncPayload {
    #[serde(default)]
    pub entities: BTreeMap<String, EntityChanges>,
    #[serde(default)]
    pub relations: Option<RelationChanges>,
}

impl IngestionPipeline {
    fn log(&mut self, record: ChangeRecord) {
        self.change_log.push(record);
    }

    /// Create or update a single entity and record the change.
    ///
    /// On update, `partial` merges the payload's properties over the existing
    /// ones (last write wins per key); otherwise the payload replaces the
    /// property map. Version bumps by one either way.
    pub fn incremental_update_entity(
        &mut self,
        store: &mut GraphStore,
        payload: &Payload,
        kind: EntityKind,
        partial: bool,
    ) -> SgResult<Entity> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .ok_or(IngestError::MissingId)?
            .to_string();

        let mut incoming = Entity::new(&id, kind);
        for (key, value) in payload {
            if key == "id" {
                continue;
            }
            incoming.properties.insert(key.clone(), value.clone());
        }

        match store.get_entity(&id).cloned() {
            None => {
                let created = store.create_entity(incoming, false)?;
                self.log(ChangeRecord::new(
                    ChangeOp::Create,
                    ChangedSubject::Entity(kind),
                    &id,
                    None,
                    Some(created.version),
                    format!("{} properties", created.properties.len()),
                ));
                Ok(created)
            }
            Some(existing) => {
                let old_version = existing.version;
                let old_props = existing.properties.clone();
                let mut next = incoming;
                if partial {
                    let mut merged = existing.properties;
                    merged.append(&mut next.properties);
                    next.properties = merged;
                }
                let updated = store.update_entity(next, false)?;
                self.log(ChangeRecord::new(
                    ChangeOp::Update,
                    ChangedSubject::Entity(kind),
                    &id,
                    Some(old_version),
                    Some(updated.version),
                    property_diff(&old_props, &updated.properties),
                ));
                Ok(updated)
            }
        }
    }

    /// Create or update relations keyed by `(source, target, kind)`, and
    /// record each change. An update replaces the relation in place: version
    /// increments and `created_at` is preserved.
    pub fn incremental_update_relations(
        &mut self,
        store: &mut GraphStore,
        updates: &[RelationUpdate],
    ) -> IngestionResult {
        let mut result = IngestionResult::default();

        for update in updates {
            let key = format!("{}->{}", update.source_id, update.target_id);
            let existing = store
                .find_relation(&update.source_id, &update.target_id, update.kind)
                .cloned();

            match existing {
                Some(previous) => {
                    store.delete_relation(&update.source_id, &update.target_id, update.kind);
                    let mut next = Relation::new(&update.source_id, &update.target_id, update.kind);
                    next.properties = update.properties.clone();
                    next.version = previous.version + 1;
                    next.created_at = previous.created_at;
                    next.updated_at = now_millis();

                    match store.create_relation(next, false) {
                        Ok(r) => {
                            result.updated += 1;
                            self.log(ChangeRecord::new(
                                ChangeOp::Update,
                                ChangedSubject::Relation(update.kind),
                                &key,
                                Some(previous.version),
                                Some(r.version),
                                property_diff(&previous.properties, &r.properties),
                            ));
                        }
                        Err(e) => result
                            .errors
                            .push(format!("error updating relation {key}: {e}")),
                    }
                }
                None => {
                    let mut next = Relation::new(&update.source_id, &update.target_id, update.kind);
                    next.properties = update.properties.clone();
                    match store.create_relation(next, false) {
                        Ok(r) => {
                            result.created += 1;
                            self.log(ChangeRecord::new(
                                ChangeOp::Create,
                                ChangedSubject::Relation(update.kind),
                                &key,
                                None,
                                Some(r.version),
                                format!("{} properties", r.properties.len()),
                            ));
                        }
                        Err(e) => result
                            .errors
                            .push(format!("error creating relation {key}: {e}")),
                    }
                }
            }
        }
        result
    }

    /// Delete an entity, recording one Delete change for the entity and one
    /// per incident relation removed by the cascade.
    pub fn delete_entity_cascade(&mut self, store: &mut GraphStore, id: &str) -> bool {
        let Some(entity) = store.get_entity(id).cloned() else {
            return false;
        };

        let incident: Vec<Relation> = store
            .outgoing(id)
            .into_iter()
            .chain(store.incoming(id))
            .cloned()
            .collect();

        let incident_count = incident.len();
        store.delete_entity(id);

        for relation in incident {
            self.log(ChangeRecord::new(
                ChangeOp::Delete,
                ChangedSubject::Relation(relation.kind),
                format!("{}->{}", relation.source_id, relation.target_id),
                Some(relation.version),
                None,
                format!("cascade from {id}"),
            ));
        }
        self.log(ChangeRecord::new(
            ChangeOp::Delete,
            ChangedSubject::Entity(entity.kind),
            id,
            Some(entity.version),
            None,
            format!("removed {incident_count} incident relations"),
        ));
        debug!(id, "entity deleted with cascade");
        true
    }

    /// Apply a keyed sync payload: per-type deletes, then upserts, then the
    /// optional relation block.
    ///
    /// With `since`, upserts for entities whose stored `updated_at` is not
    /// after `since` are skipped (nothing changed on our side since the
    /// cutoff, so re-applying would only churn versions). Unknown entity type
    /// keys fail the whole call; everything else is per-record best-effort.
    pub fn sync_incremental(
        &mut self,
        store: &mut GraphStore,
        payload: &SyncPayload,
        since: Option<u64>,
    ) -> SgResult<IngestionResult> {
        let mut result = IngestionResult::default();

        // Resolve all type keys up front so a typo fails before any mutation.
        let mut resolved: Vec<(EntityKind, &EntityChanges)> = Vec::new();
        for (key, changes) in &payload.entities {
            let kind = EntityKind::parse_key(key).ok_or_else(|| IngestError::UnknownEntityKind {
                key: key.clone(),
            })?;
            resolved.push((kind, changes));
        }

        for (kind, changes) in resolved {
            for id in &changes.delete {
                if self.delete_entity_cascade(store, id) {
                    result.deleted += 1;
                } else {
                    result.skipped += 1;
                }
            }

            for record in &changes.upsert {
                let id = record.get("id").and_then(Value::as_str).unwrap_or_default();
                if let Some(cutoff) = since {
                    if let Some(existing) = store.get_entity(id) {
                        if existing.updated_at <= cutoff {
                            result.skipped += 1;
                            continue;
                        }
                    }
                }
                let existed = store.has_entity(id);
                match self.incremental_update_entity(store, record, kind, false) {
                    Ok(_) if existed => result.updated += 1,
                    Ok(_) => result.created += 1,
                    Err(e) => result
                        .errors
                        .push(format!("error syncing {kind} {id}: {e}")),
                }
            }
        }

        if let Some(relations) = &payload.relations {
            for key in &relations.delete {
                if store.delete_relation(&key.source_id, &key.target_id, key.kind) {
                    result.deleted += 1;
                    self.log(ChangeRecord::new(
                        ChangeOp::Delete,
                        ChangedSubject::Relation(key.kind),
                        format!("{}->{}", key.source_id, key.target_id),
                        None,
                        None,
                        "deleted by sync",
                    ));
                } else {
                    result.skipped += 1;
                }
            }
            result.absorb(self.incremental_update_relations(store, &relations.upsert));
        }

        info!(
            created = result.created,
            updated = result.updated,
            deleted = result.deleted,
            skipped = result.skipped,
            errors = result.errors.len(),
            "incremental sync applied"
        );
        Ok(result)
    }

    /// Change records with `timestamp >= since`.
    pub fn get_changes_since(&self, since: u64) -> Vec<&ChangeRecord> {
        self.change_log
            .iter()
            .filter(|c| c.timestamp >= since)
            .collect()
    }

    /// The full change log, oldest first.
    pub fn change_log(&self) -> &[ChangeRecord] {
        &self.change_log
    }

    pub fn clear_change_log(&mut self) {
        self.change_log.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> Payload {
        value.as_object().cloned().expect("object payload")
    }

    #[test]
    fn create_then_partial_update() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();

        let created = pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"id": "p1", "name": "iPhone", "price": 999.99})),
                EntityKind::Product,
                true,
            )
            .unwrap();
        assert_eq!(created.version, 1);

        let updated = pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"id": "p1", "price": 899.99})),
                EntityKind::Product,
                true,
            )
            .unwrap();
        assert_eq!(updated.version, 2);
        // Partial merge keeps untouched keys.
        assert_eq!(updated.properties["name"], json!("iPhone"));
        assert_eq!(updated.properties["price"], json!(899.99));
    }

    #[test]
    fn full_update_replaces_properties() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();

        pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"id": "p1", "name": "iPhone", "color": "black"})),
                EntityKind::Product,
                false,
            )
            .unwrap();
        let updated = pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"id": "p1", "name": "iPhone 15"})),
                EntityKind::Product,
                false,
            )
            .unwrap();

        assert!(!updated.properties.contains_key("color"));
        assert_eq!(updated.properties["name"], json!("iPhone 15"));
    }

    #[test]
    fn missing_id_is_an_error() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();
        let err = pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"name": "no id"})),
                EntityKind::Product,
                true,
            )
            .unwrap_err();
        assert!(err.to_string().contains("id"));
    }

    #[test]
    fn change_log_tracks_versions() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();

        pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"id": "p1"})),
                EntityKind::Product,
                true,
            )
            .unwrap();
        pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"id": "p1", "price": 1})),
                EntityKind::Product,
                true,
            )
            .unwrap();

        let log = pipeline.change_log();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].op, ChangeOp::Create);
        assert_eq!(log[0].new_version, Some(1));
        assert_eq!(log[1].op, ChangeOp::Update);
        assert_eq!(log[1].old_version, Some(1));
        assert_eq!(log[1].new_version, Some(2));
        assert_eq!(log[1].details, "changed: price");

        pipeline.clear_change_log();
        assert!(pipeline.change_log().is_empty());
    }

    #[test]
    fn change_details_summarize_each_operation() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();

        pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"id": "p1", "name": "iPhone", "price": 999.99})),
                EntityKind::Product,
                true,
            )
            .unwrap();
        pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"id": "p1", "name": "iPhone", "price": 999.99})),
                EntityKind::Product,
                true,
            )
            .unwrap();
        pipeline
            .incremental_update_entity(
                &mut store,
                &payload(json!({"id": "b1", "name": "Apple"})),
                EntityKind::Brand,
                true,
            )
            .unwrap();
        store
            .create_relation(Relation::new("p1", "b1", RelationKind::HasBrand), true)
            .unwrap();
        pipeline.delete_entity_cascade(&mut store, "p1");

        let log = pipeline.change_log();
        assert_eq!(log[0].details, "2 properties");
        assert_eq!(log[1].details, "no property changes");
        assert_eq!(log[3].details, "cascade from p1");
        assert_eq!(log[4].details, "removed 1 incident relations");
    }

    #[test]
    fn changes_since_lower_bound_is_inclusive() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();

        for price in [1, 2, 3] {
            pipeline
                .incremental_update_entity(
                    &mut store,
                    &payload(json!({"id": "p1", "price": price})),
                    EntityKind::Product,
                    true,
                )
                .unwrap();
        }

        assert_eq!(pipeline.get_changes_since(0).len(), 3);

        // A record whose timestamp equals the bound is included.
        let last = pipeline.change_log().last().unwrap().timestamp;
        let tail = pipeline.get_changes_since(last);
        assert!(tail.iter().any(|c| c.new_version == Some(3)));
        assert!(tail.iter().all(|c| c.timestamp >= last));

        assert!(pipeline.get_changes_since(last + 1).is_empty());
    }

    #[test]
    fn relation_update_in_place() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();
        store
            .create_entity(Entity::new("a", EntityKind::Product), false)
            .unwrap();
        store
            .create_entity(Entity::new("b", EntityKind::Brand), false)
            .unwrap();

        let update = RelationUpdate {
            source_id: "a".into(),
            target_id: "b".into(),
            kind: RelationKind::HasBrand,
            properties: Properties::new(),
        };
        let result = pipeline.incremental_update_relations(&mut store, &[update.clone()]);
        assert_eq!(result.created, 1);

        let created_at = store
            .find_relation("a", "b", RelationKind::HasBrand)
            .unwrap()
            .created_at;

        let mut update = update;
        update.properties.insert("weight".into(), json!(0.9));
        let result = pipeline.incremental_update_relations(&mut store, &[update]);
        assert_eq!(result.updated, 1);

        let relation = store.find_relation("a", "b", RelationKind::HasBrand).unwrap();
        assert_eq!(relation.version, 2);
        assert_eq!(relation.created_at, created_at);
        assert!((relation.weight() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn relation_update_missing_endpoint_collected() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();
        let update = RelationUpdate {
            source_id: "ghost".into(),
            target_id: "also_ghost".into(),
            kind: RelationKind::RelatedTo,
            properties: Properties::new(),
        };
        let result = pipeline.incremental_update_relations(&mut store, &[update]);
        assert_eq!(result.created, 0);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn cascade_delete_emits_changes() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();
        store
            .create_entity(Entity::new("p1", EntityKind::Product), false)
            .unwrap();
        store
            .create_entity(Entity::new("b1", EntityKind::Brand), false)
            .unwrap();
        store
            .create_relation(Relation::new("p1", "b1", RelationKind::HasBrand), true)
            .unwrap();

        assert!(pipeline.delete_entity_cascade(&mut store, "b1"));
        assert!(!pipeline.delete_entity_cascade(&mut store, "b1"));

        let log = pipeline.change_log();
        assert_eq!(log.len(), 2);
        assert!(matches!(log[0].subject, ChangedSubject::Relation(RelationKind::HasBrand)));
        assert!(matches!(log[1].subject, ChangedSubject::Entity(EntityKind::Brand)));
        assert!(log.iter().all(|c| c.op == ChangeOp::Delete));
    }

    #[test]
    fn sync_applies_deletes_and_upserts() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();
        store
            .create_entity(Entity::new("old_product", EntityKind::Product), false)
            .unwrap();

        let sync: SyncPayload = serde_json::from_value(json!({
            "entities": {
                "products": {
                    "upsert": [{"id": "p1", "name": "iPhone"}],
                    "delete": ["old_product"],
                },
                "brands": {
                    "upsert": [{"id": "b1", "name": "Apple"}],
                },
            },
            "relations": {
                "upsert": [{
                    "source_id": "p1",
                    "target_id": "b1",
                    "relation_type": "has_brand",
                }],
            },
        }))
        .unwrap();

        let result = pipeline.sync_incremental(&mut store, &sync, None).unwrap();
        assert_eq!(result.created, 3); // p1, b1, and the relation
        assert_eq!(result.deleted, 1);
        assert!(result.errors.is_empty());

        assert!(!store.has_entity("old_product"));
        assert!(store.find_relation("p1", "b1", RelationKind::HasBrand).is_some());
    }

    #[test]
    fn sync_unknown_kind_fails_fast() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();
        let sync: SyncPayload = serde_json::from_value(json!({
            "entities": {"widgets": {"upsert": [{"id": "w1"}]}},
        }))
        .unwrap();

        assert!(pipeline.sync_incremental(&mut store, &sync, None).is_err());
        assert_eq!(store.count(None), 0);
    }

    #[test]
    fn sync_since_skips_unchanged() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();

        let sync: SyncPayload = serde_json::from_value(json!({
            "entities": {"products": {"upsert": [{"id": "p1", "name": "iPhone"}]}},
        }))
        .unwrap();

        pipeline.sync_incremental(&mut store, &sync, None).unwrap();
        let cutoff = now_millis() + 1;
        let log_len = pipeline.change_log().len();

        let second = pipeline
            .sync_incremental(&mut store, &sync, Some(cutoff))
            .unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(second.created + second.updated, 0);
        assert_eq!(pipeline.change_log().len(), log_len);
        assert_eq!(store.get_entity("p1").unwrap().version, 1);
    }

    #[test]
    fn sync_without_since_is_content_idempotent() {
        let mut store = GraphStore::new();
        let mut pipeline = IngestionPipeline::new();
        let sync: SyncPayload = serde_json::from_value(json!({
            "entities": {"products": {"upsert": [{"id": "p1", "name": "iPhone"}]}},
        }))
        .unwrap();

        pipeline.sync_incremental(&mut store, &sync, None).unwrap();
        let before = store.get_entity("p1").unwrap().properties.clone();
        pipeline.sync_incremental(&mut store, &sync, None).unwrap();
        let after = store.get_entity("p1").unwrap();

        assert_eq!(before, after.properties);
        assert_eq!(after.version, 2);
    }
}
