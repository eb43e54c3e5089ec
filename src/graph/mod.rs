//! Supply knowledge graph: data model, store, queries, and traversal.
//!
//! The graph stores typed entities (products, brands, merchants, ...) connected
//! by typed, weighted, directed relations. The [`store::GraphStore`] owns all
//! entities and relations; [`query`], [`traverse`], and [`analytics`] are
//! read-only consumers built on top of it.

pub mod analytics;
pub mod query;
pub mod store;
pub mod traverse;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered property map carried by entities and relations.
pub type Properties = BTreeMap<String, Value>;

/// Milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Entity types in the supply knowledge graph.
///
/// Covers e-commerce products and suppliers, mini-program services,
/// geography/policy, risk tags, and users. The set is closed: adding a kind
/// is a source change, which keeps every `match` over kinds exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Product,
    Sku,
    Brand,
    Category,
    Merchant,
    Supplier,
    Service,
    Procedure,
    Intent,
    Slot,
    Channel,
    Region,
    Policy,
    RiskTag,
    User,
}

impl EntityKind {
    /// All entity kinds, for iteration.
    pub const ALL: [EntityKind; 15] = [
        EntityKind::Product,
        EntityKind::Sku,
        EntityKind::Brand,
        EntityKind::Category,
        EntityKind::Merchant,
        EntityKind::Supplier,
        EntityKind::Service,
        EntityKind::Procedure,
        EntityKind::Intent,
        EntityKind::Slot,
        EntityKind::Channel,
        EntityKind::Region,
        EntityKind::Policy,
        EntityKind::RiskTag,
        EntityKind::User,
    ];

    /// Snake-case wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Sku => "sku",
            EntityKind::Brand => "brand",
            EntityKind::Category => "category",
            EntityKind::Merchant => "merchant",
            EntityKind::Supplier => "supplier",
            EntityKind::Service => "service",
            EntityKind::Procedure => "procedure",
            EntityKind::Intent => "intent",
            EntityKind::Slot => "slot",
            EntityKind::Channel => "channel",
            EntityKind::Region => "region",
            EntityKind::Policy => "policy",
            EntityKind::RiskTag => "risk_tag",
            EntityKind::User => "user",
        }
    }

    /// Parse a payload type key. Accepts the snake_case kind name or its
    /// plural form (`"product"` or `"products"`).
    pub fn parse_key(key: &str) -> Option<EntityKind> {
        let singular = match key {
            "categories" => "category",
            "policies" => "policy",
            other => other.strip_suffix('s').unwrap_or(other),
        };
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == key || k.as_str() == singular)
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation types in the supply knowledge graph.
///
/// Directed, not required to be acyclic. A pair of endpoints may carry at
/// most one relation per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    /// Product -> SKU.
    HasSku,
    /// Product -> Brand.
    HasBrand,
    /// Product/Service -> Category.
    BelongsTo,
    /// Supplier -> Product.
    Supplies,
    /// Merchant -> Product.
    Sells,
    /// Merchant/Supplier -> Service.
    Offers,
    /// Procedure -> Service.
    ProvidesService,
    /// Service -> Intent.
    HasIntent,
    /// Intent -> Slot.
    HasSlot,
    /// Product/Service -> Channel/Region.
    AvailableIn,
    /// Merchant/Supplier -> Region.
    OperatesIn,
    /// Product/Service -> Policy.
    GovernedBy,
    /// Product/Supplier -> RiskTag.
    HasRisk,
    /// Generic similarity edge.
    SimilarTo,
    /// Generic association edge.
    RelatedTo,
}

impl RelationKind {
    /// All relation kinds, for iteration.
    pub const ALL: [RelationKind; 15] = [
        RelationKind::HasSku,
        RelationKind::HasBrand,
        RelationKind::BelongsTo,
        RelationKind::Supplies,
        RelationKind::Sells,
        RelationKind::Offers,
        RelationKind::ProvidesService,
        RelationKind::HasIntent,
        RelationKind::HasSlot,
        RelationKind::AvailableIn,
        RelationKind::OperatesIn,
        RelationKind::GovernedBy,
        RelationKind::HasRisk,
        RelationKind::SimilarTo,
        RelationKind::RelatedTo,
    ];

    /// Snake-case wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::HasSku => "has_sku",
            RelationKind::HasBrand => "has_brand",
            RelationKind::BelongsTo => "belongs_to",
            RelationKind::Supplies => "supplies",
            RelationKind::Sells => "sells",
            RelationKind::Offers => "offers",
            RelationKind::ProvidesService => "provides_service",
            RelationKind::HasIntent => "has_intent",
            RelationKind::HasSlot => "has_slot",
            RelationKind::AvailableIn => "available_in",
            RelationKind::OperatesIn => "operates_in",
            RelationKind::GovernedBy => "governed_by",
            RelationKind::HasRisk => "has_risk",
            RelationKind::SimilarTo => "similar_to",
            RelationKind::RelatedTo => "related_to",
        }
    }
}

impl std::fmt::Display for RelationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge direction filter for traversal operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Incoming edges only.
    In,
    /// Outgoing edges only.
    Out,
    /// Both directions.
    Both,
}

// ---------------------------------------------------------------------------
// Entity & Relation
// ---------------------------------------------------------------------------

fn default_version() -> u32 {
    1
}

/// A typed node in the supply knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique, caller-assigned identifier.
    pub id: String,
    /// Entity kind.
    #[serde(rename = "type")]
    pub kind: EntityKind,
    /// Free-form properties; `name` and `description` are conventional keys.
    #[serde(default)]
    pub properties: Properties,
    /// Starts at 1 and increments on every successful update.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Creation time, milliseconds since the UNIX epoch.
    #[serde(default)]
    pub created_at: u64,
    /// Last update time, milliseconds since the UNIX epoch.
    #[serde(default)]
    pub updated_at: u64,
}

impl Entity {
    /// Create a new entity with version 1 and current timestamps.
    pub fn new(id: impl Into<String>, kind: EntityKind) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            kind,
            properties: Properties::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a property, builder style.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Display name: the `name` property, falling back to the id.
    pub fn name(&self) -> &str {
        self.properties
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&self.id)
    }

    /// The `description` property, if present and a string.
    pub fn description(&self) -> Option<&str> {
        self.properties.get("description").and_then(Value::as_str)
    }
}

/// A typed, weighted, directed edge between two entity ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Source entity id.
    pub source_id: String,
    /// Target entity id.
    pub target_id: String,
    /// Relation kind.
    #[serde(rename = "relation_type")]
    pub kind: RelationKind,
    /// Free-form properties; `weight` is a conventional key in [0, 1].
    #[serde(default)]
    pub properties: Properties,
    /// Starts at 1 and increments on every in-place update.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Creation time, milliseconds since the UNIX epoch.
    #[serde(default)]
    pub created_at: u64,
    /// Last update time, milliseconds since the UNIX epoch.
    #[serde(default)]
    pub updated_at: u64,
}

impl Relation {
    /// Create a new relation with version 1 and current timestamps.
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: RelationKind,
    ) -> Self {
        let now = now_millis();
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            properties: Properties::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set a property, builder style.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Set the `weight` property, builder style.
    pub fn with_weight(self, weight: f64) -> Self {
        self.with_property("weight", weight)
    }

    /// Edge weight: the `weight` property, defaulting to 1.0 when absent.
    pub fn weight(&self) -> f64 {
        self.properties
            .get("weight")
            .and_then(Value::as_f64)
            .unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// Snapshot & path containers
// ---------------------------------------------------------------------------

/// Bulk snapshot container for export/import.
///
/// Used only for transfer; never mutated in place. Persistence, if any, is
/// the caller's responsibility (e.g. `serde_json::to_writer` on this type).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// All entities in the snapshot.
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// All relations in the snapshot.
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Free-form snapshot metadata.
    #[serde(default)]
    pub metadata: Properties,
}

/// A path through the graph: a contiguous chain of relations and the
/// entities they connect (including the start entity).
#[derive(Debug, Clone)]
pub struct GraphPath {
    /// Entities along the path, start first.
    pub entities: Vec<Entity>,
    /// Relations along the path, in traversal order.
    pub relations: Vec<Relation>,
}

impl GraphPath {
    /// Path length in edges.
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// True when the path has no edges.
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Sum of relation weights along the path.
    pub fn total_weight(&self) -> f64 {
        self.relations.iter().map(Relation::weight).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_name_falls_back_to_id() {
        let e = Entity::new("p1", EntityKind::Product);
        assert_eq!(e.name(), "p1");

        let e = e.with_property("name", "iPhone");
        assert_eq!(e.name(), "iPhone");
    }

    #[test]
    fn relation_weight_defaults_to_one() {
        let r = Relation::new("a", "b", RelationKind::RelatedTo);
        assert!((r.weight() - 1.0).abs() < f64::EPSILON);

        let r = r.with_weight(0.4);
        assert!((r.weight() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn kind_wire_names_round_trip() {
        for kind in EntityKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: EntityKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
        let rt: RelationKind = serde_json::from_str("\"has_sku\"").unwrap();
        assert_eq!(rt, RelationKind::HasSku);
    }

    #[test]
    fn parse_key_accepts_plural() {
        assert_eq!(EntityKind::parse_key("product"), Some(EntityKind::Product));
        assert_eq!(EntityKind::parse_key("products"), Some(EntityKind::Product));
        assert_eq!(EntityKind::parse_key("categories"), Some(EntityKind::Category));
        assert_eq!(EntityKind::parse_key("policies"), Some(EntityKind::Policy));
        assert_eq!(EntityKind::parse_key("sku"), Some(EntityKind::Sku));
        assert_eq!(EntityKind::parse_key("risk_tags"), Some(EntityKind::RiskTag));
        assert_eq!(EntityKind::parse_key("unknown"), None);
    }

    #[test]
    fn snapshot_serializes_with_wire_shape() {
        let snapshot = GraphSnapshot {
            entities: vec![Entity::new("p1", EntityKind::Product).with_property("name", "iPhone")],
            relations: vec![Relation::new("p1", "b1", RelationKind::HasBrand)],
            metadata: Properties::new(),
        };
        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["entities"][0]["type"], json!("product"));
        assert_eq!(value["relations"][0]["relation_type"], json!("has_brand"));
    }

    #[test]
    fn path_totals() {
        let path = GraphPath {
            entities: vec![
                Entity::new("a", EntityKind::Product),
                Entity::new("b", EntityKind::Brand),
            ],
            relations: vec![Relation::new("a", "b", RelationKind::HasBrand).with_weight(0.5)],
        };
        assert_eq!(path.len(), 1);
        assert!((path.total_weight() - 0.5).abs() < f64::EPSILON);
    }
}
