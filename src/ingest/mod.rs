//! Ingestion pipeline: normalization, batch load, and incremental sync.
//!
//! The pipeline is a best-effort batch processor layered over the store's
//! hard-error CRUD: per-record failures are collected into
//! [`IngestionResult::errors`] and never abort the batch. Only structural
//! problems, such as an unknown entity type key in a sync payload, fail fast.
//!
//! The pipeline holds no store of its own; callers pass the [`GraphStore`]
//! into each operation, so one pipeline can serve several graphs and tests
//! stay free of shared global state.

pub mod incremental;
pub mod normalize;

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::graph::store::GraphStore;
use crate::graph::{Entity, EntityKind, Relation, RelationKind};

use incremental::ChangeRecord;
use normalize::EntityNormalizer;

/// A raw ingestion record: one JSON object per entity.
pub type Payload = serde_json::Map<String, Value>;

/// Batch ingestion configuration.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Skip records whose id already exists instead of updating them.
    pub skip_duplicates: bool,
    /// Run names through the normalizer before storing.
    pub normalize_names: bool,
    /// Wire the relations implied by foreign-key-like payload fields.
    pub create_relations: bool,
    /// Records per processing chunk.
    pub batch_size: usize,
    /// Count what would happen without mutating the store.
    pub dry_run: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            skip_duplicates: true,
            normalize_names: true,
            create_relations: true,
            batch_size: 100,
            dry_run: false,
        }
    }
}

/// Aggregated outcome of an ingestion operation.
#[derive(Debug, Clone, Default)]
pub struct IngestionResult {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
    /// Per-record error descriptions; the batch itself never aborts.
    pub errors: Vec<String>,
}

impl IngestionResult {
    /// Fold another result into this one.
    pub fn absorb(&mut self, other: IngestionResult) {
        self.created += other.created;
        self.updated += other.updated;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

/// Full-schema payload for [`IngestionPipeline::ingest_full_schema`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SchemaData {
    #[serde(default)]
    pub categories: Vec<Payload>,
    #[serde(default)]
    pub brands: Vec<Payload>,
    #[serde(default)]
    pub suppliers: Vec<Payload>,
    #[serde(default)]
    pub merchants: Vec<Payload>,
    #[serde(default)]
    pub regions: Vec<Payload>,
    #[serde(default)]
    pub channels: Vec<Payload>,
    #[serde(default)]
    pub procedures: Vec<Payload>,
    #[serde(default)]
    pub slots: Vec<Payload>,
    #[serde(default)]
    pub intents: Vec<Payload>,
    #[serde(default)]
    pub products: Vec<Payload>,
    #[serde(default)]
    pub services: Vec<Payload>,
}

/// Batch and incremental ingestion over a [`GraphStore`].
#[derive(Debug, Default)]
pub struct IngestionPipeline {
    normalizer: EntityNormalizer,
    change_log: Vec<ChangeRecord>,
}

impl IngestionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_normalizer(normalizer: EntityNormalizer) -> Self {
        Self {
            normalizer,
            change_log: Vec::new(),
        }
    }

    pub fn normalizer(&self) -> &EntityNormalizer {
        &self.normalizer
    }

    fn payload_id(payload: &Payload) -> Option<&str> {
        payload.get("id").and_then(Value::as_str).filter(|s| !s.is_empty())
    }

    /// Build the typed entity for a payload: `name` falls back to the id and
    /// is optionally normalized; every other field becomes a property.
    fn entity_from_payload(
        &self,
        payload: &Payload,
        kind: EntityKind,
        config: &BatchConfig,
    ) -> Option<Entity> {
        let id = Self::payload_id(payload)?;
        let raw_name = payload
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(id);
        let name = if config.normalize_names {
            self.normalizer.normalize(raw_name)
        } else {
            raw_name.to_string()
        };

        let mut entity = Entity::new(id, kind).with_property("name", name);
        for (key, value) in payload {
            if key == "id" || key == "name" {
                continue;
            }
            entity.properties.insert(key.clone(), value.clone());
        }
        if kind == EntityKind::Slot {
            entity
                .properties
                .entry("slot_type".to_string())
                .or_insert_with(|| Value::from("string"));
            entity
                .properties
                .entry("required".to_string())
                .or_insert(Value::Bool(false));
        }
        Some(entity)
    }

    fn relation_target<'a>(payload: &'a Payload, field: &str) -> Option<&'a str> {
        payload.get(field).and_then(Value::as_str)
    }

    /// Wire the foreign-key-like fields of a payload into typed relations.
    /// Edges to missing targets are silently skipped.
    fn create_implied_relations(
        &self,
        store: &mut GraphStore,
        entity_id: &str,
        kind: EntityKind,
        payload: &Payload,
    ) {
        // (field, relation kind, entity is source?)
        let wiring: &[(&str, RelationKind, bool)] = match kind {
            EntityKind::Product => &[
                ("category", RelationKind::BelongsTo, true),
                ("brand", RelationKind::HasBrand, true),
                ("sku", RelationKind::HasSku, true),
                ("supplier", RelationKind::Supplies, false),
                ("merchant", RelationKind::Sells, false),
                ("region", RelationKind::AvailableIn, true),
                ("channel", RelationKind::AvailableIn, true),
            ],
            EntityKind::Service => &[
                ("category", RelationKind::BelongsTo, true),
                ("procedure", RelationKind::ProvidesService, false),
                ("merchant", RelationKind::Offers, false),
                ("region", RelationKind::AvailableIn, true),
            ],
            _ => &[],
        };

        for &(field, relation_kind, entity_is_source) in wiring {
            let Some(other) = Self::relation_target(payload, field) else {
                continue;
            };
            let relation = if entity_is_source {
                Relation::new(entity_id, other, relation_kind)
            } else {
                Relation::new(other, entity_id, relation_kind)
            };
            if store.create_relation(relation, false).is_err() {
                debug!(entity = entity_id, field, "skipped relation to missing target");
            }
        }

        // List-valued wiring: a service's intents, an intent's slots.
        let list_wiring: &[(&str, RelationKind)] = match kind {
            EntityKind::Service => &[("intents", RelationKind::HasIntent)],
            EntityKind::Intent => &[("slots", RelationKind::HasSlot)],
            _ => &[],
        };
        for &(field, relation_kind) in list_wiring {
            let Some(targets) = payload.get(field).and_then(Value::as_array) else {
                continue;
            };
            for target in targets.iter().filter_map(Value::as_str) {
                let relation = Relation::new(entity_id, target, relation_kind);
                if store.create_relation(relation, false).is_err() {
                    debug!(entity = entity_id, field, target, "skipped relation to missing target");
                }
            }
        }
    }

    fn ingest_record(
        &self,
        store: &mut GraphStore,
        payload: &Payload,
        kind: EntityKind,
        config: &BatchConfig,
        result: &mut IngestionResult,
    ) {
        let Some(entity) = self.entity_from_payload(payload, kind, config) else {
            result
                .errors
                .push(format!("{kind} record missing required `id` field"));
            return;
        };

        if config.skip_duplicates && store.has_entity(&entity.id) {
            result.skipped += 1;
            return;
        }

        let entity_id = entity.id.clone();
        match store.upsert_entity(entity, false) {
            Ok((_, true)) => result.created += 1,
            Ok((_, false)) => result.updated += 1,
            Err(e) => {
                result
                    .errors
                    .push(format!("error ingesting {kind} {entity_id}: {e}"));
                return;
            }
        }

        if config.create_relations {
            self.create_implied_relations(store, &entity_id, kind, payload);
        }
    }

    /// Ingest a batch of records of one entity kind.
    ///
    /// With `dry_run` the store is left untouched and the result only counts
    /// what a real run would create or skip.
    pub fn ingest_batch(
        &self,
        store: &mut GraphStore,
        records: &[Payload],
        kind: EntityKind,
        config: &BatchConfig,
    ) -> IngestionResult {
        let mut result = IngestionResult::default();

        if config.dry_run {
            for payload in records {
                match Self::payload_id(payload) {
                    None => result
                        .errors
                        .push(format!("{kind} record missing required `id` field")),
                    Some(id) if store.has_entity(id) => result.skipped += 1,
                    Some(_) => result.created += 1,
                }
            }
            return result;
        }

        for chunk in records.chunks(config.batch_size.max(1)) {
            for payload in chunk {
                self.ingest_record(store, payload, kind, config, &mut result);
            }
        }

        if !result.errors.is_empty() {
            warn!(
                kind = %kind,
                errors = result.errors.len(),
                "batch ingestion finished with record errors"
            );
        }
        debug!(
            kind = %kind,
            created = result.created,
            updated = result.updated,
            skipped = result.skipped,
            "batch ingested"
        );
        result
    }

    /// Ingest a full schema in dependency order, so that foreign-key fields
    /// always resolve against already-created targets: referenced kinds
    /// first, then products and services last.
    pub fn ingest_full_schema(
        &self,
        store: &mut GraphStore,
        data: &SchemaData,
        config: &BatchConfig,
    ) -> IngestionResult {
        let order: [(&Vec<Payload>, EntityKind); 11] = [
            (&data.categories, EntityKind::Category),
            (&data.brands, EntityKind::Brand),
            (&data.suppliers, EntityKind::Supplier),
            (&data.merchants, EntityKind::Merchant),
            (&data.regions, EntityKind::Region),
            (&data.channels, EntityKind::Channel),
            (&data.procedures, EntityKind::Procedure),
            (&data.slots, EntityKind::Slot),
            (&data.intents, EntityKind::Intent),
            (&data.products, EntityKind::Product),
            (&data.services, EntityKind::Service),
        ];

        let mut result = IngestionResult::default();
        for (records, kind) in order {
            if !records.is_empty() {
                result.absorb(self.ingest_batch(store, records, kind, config));
            }
        }
        result
    }

    /// Group a batch of entities by normalized dedup key, flagging keys that
    /// collide within the batch or with an entity already in the store.
    ///
    /// A within-batch collision lists every colliding id; a collision against
    /// the store lists only the batch entity's id. `extra_fields` tighten the
    /// key beyond kind and name, e.g. `&["brand"]`.
    pub fn find_batch_duplicates(
        &self,
        store: &GraphStore,
        entities: &[Entity],
        extra_fields: &[&str],
    ) -> BTreeMap<String, Vec<String>> {
        let existing_keys: BTreeSet<String> = store
            .entities()
            .map(|e| self.normalizer.normalized_key(e, extra_fields))
            .collect();

        let mut duplicates: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut seen: BTreeMap<String, &str> = BTreeMap::new();

        for entity in entities {
            let key = self.normalizer.normalized_key(entity, extra_fields);
            if let Some(first) = seen.get(&key) {
                let group = duplicates.entry(key).or_default();
                if group.is_empty() {
                    group.push((*first).to_string());
                }
                group.push(entity.id.clone());
            } else {
                seen.insert(key.clone(), entity.id.as_str());
                if existing_keys.contains(&key) {
                    duplicates.entry(key).or_default().push(entity.id.clone());
                }
            }
        }
        duplicates
    }
}
