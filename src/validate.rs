//! Pluggable validation rules checked on entity and relation mutations.
//!
//! A rule pairs a name with a predicate and a failure message. The validator
//! runs every registered rule and returns the list of failed messages (empty
//! means valid); it never short-circuits, so a caller sees all problems at
//! once. Kind validity needs no rule here: the kind enums are closed, so an
//! unrecognized kind is rejected at the serde boundary before a record ever
//! reaches the store.

use crate::graph::{Entity, EntityKind, Relation};

/// Endpoint existence, computed by the store and fed to relation rules.
#[derive(Debug, Clone, Copy)]
pub struct EndpointStatus {
    /// Whether the source entity exists in the store.
    pub source_exists: bool,
    /// Whether the target entity exists in the store.
    pub target_exists: bool,
}

type EntityCheck = Box<dyn Fn(&Entity) -> bool + Send + Sync>;
type RelationCheck = Box<dyn Fn(&Relation, EndpointStatus) -> bool + Send + Sync>;

/// A named validation rule for entities.
pub struct EntityRule {
    /// Rule identifier, prefixed to failure messages.
    pub name: &'static str,
    /// Message reported when the check fails.
    pub message: &'static str,
    check: EntityCheck,
}

/// A named validation rule for relations.
pub struct RelationRule {
    /// Rule identifier, prefixed to failure messages.
    pub name: &'static str,
    /// Message reported when the check fails.
    pub message: &'static str,
    check: RelationCheck,
}

/// Rule registry run by the store on every validated mutation.
pub struct Validator {
    entity_rules: Vec<EntityRule>,
    relation_rules: Vec<RelationRule>,
}

impl Validator {
    /// Validator with the default rule set.
    pub fn new() -> Self {
        let mut v = Self {
            entity_rules: Vec::new(),
            relation_rules: Vec::new(),
        };

        v.register_entity_rule(
            "entity_has_id",
            "entity id cannot be empty",
            |e| !e.id.trim().is_empty(),
        );
        v.register_entity_rule(
            "slot_has_slot_type",
            "slot entities require a `slot_type` property",
            |e| e.kind != EntityKind::Slot || e.properties.contains_key("slot_type"),
        );

        v.register_relation_rule(
            "relation_endpoints_exist",
            "relation references non-existent entities",
            |_, endpoints| endpoints.source_exists && endpoints.target_exists,
        );
        v.register_relation_rule(
            "weight_in_valid_range",
            "relation weight must be between 0 and 1",
            |r, _| (0.0..=1.0).contains(&r.weight()),
        );

        v
    }

    /// Register an additional entity rule.
    pub fn register_entity_rule(
        &mut self,
        name: &'static str,
        message: &'static str,
        check: impl Fn(&Entity) -> bool + Send + Sync + 'static,
    ) {
        self.entity_rules.push(EntityRule {
            name,
            message,
            check: Box::new(check),
        });
    }

    /// Register an additional relation rule.
    pub fn register_relation_rule(
        &mut self,
        name: &'static str,
        message: &'static str,
        check: impl Fn(&Relation, EndpointStatus) -> bool + Send + Sync + 'static,
    ) {
        self.relation_rules.push(RelationRule {
            name,
            message,
            check: Box::new(check),
        });
    }

    /// Run all entity rules. Returns failed rule messages; empty means valid.
    pub fn validate_entity(&self, entity: &Entity) -> Vec<String> {
        self.entity_rules
            .iter()
            .filter(|rule| !(rule.check)(entity))
            .map(|rule| format!("{}: {}", rule.name, rule.message))
            .collect()
    }

    /// Run all relation rules. Returns failed rule messages; empty means valid.
    pub fn validate_relation(&self, relation: &Relation, endpoints: EndpointStatus) -> Vec<String> {
        self.relation_rules
            .iter()
            .filter(|rule| !(rule.check)(relation, endpoints))
            .map(|rule| format!("{}: {}", rule.name, rule.message))
            .collect()
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("entity_rules", &self.entity_rules.len())
            .field("relation_rules", &self.relation_rules.len())
            .finish()
    }
}
