//! # supply-graph
//!
//! An embedded, in-process knowledge graph for a supply/e-commerce domain:
//! typed entities (products, brands, merchants, suppliers, services, intents,
//! policies, risk tags) connected by typed, weighted, directed relations.
//!
//! ## Architecture
//!
//! - **Graph core** (`graph`): the data model and the petgraph-backed
//!   [`graph::store::GraphStore`], plus query, traversal, and analytics
//! - **Validation** (`validate`): pluggable rule engine run on validated CRUD
//! - **Confidence & similarity** (`confidence`): deterministic heuristics for
//!   edge confidence and entity similarity
//! - **Deduplication** (`dedup`): duplicate detection and safe entity merging
//! - **Ingestion** (`ingest`): normalization, dependency-ordered batch load,
//!   incremental sync with versioning and a change log
//!
//! The store is single-threaded and synchronous; persistence is the caller's
//! concern via [`graph::store::GraphStore::export`] and `load`.
//!
//! ## Library usage
//!
//! ```
//! use supply_graph::graph::store::GraphStore;
//! use supply_graph::graph::{Entity, EntityKind, Relation, RelationKind};
//! use supply_graph::graph::query::query_by_type;
//!
//! let mut store = GraphStore::new();
//! store
//!     .create_entity(Entity::new("p1", EntityKind::Product).with_property("name", "iPhone"), true)
//!     .unwrap();
//! store
//!     .create_entity(Entity::new("b1", EntityKind::Brand).with_property("name", "Apple"), true)
//!     .unwrap();
//! store
//!     .create_relation(Relation::new("p1", "b1", RelationKind::HasBrand), true)
//!     .unwrap();
//!
//! assert_eq!(query_by_type(&store, EntityKind::Product).len(), 1);
//! ```

pub mod confidence;
pub mod dedup;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod validate;

pub use error::{IngestError, MergeError, SgResult, StoreError, SupplyGraphError};
pub use graph::store::GraphStore;
pub use graph::{Entity, EntityKind, GraphPath, GraphSnapshot, Relation, RelationKind};
pub use ingest::{BatchConfig, IngestionPipeline, IngestionResult};
