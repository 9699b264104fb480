//! Medgraph Graph Store Layer
//!
//! One interface for every read and write against the disease/symptom graph:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        GRAPH STORE                           │
//! ├──────────────────────────────────────────────────────────────┤
//! │                                                              │
//! │  ┌──────────┐      ┌──────────────┐      ┌──────────────┐    │
//! │  │  Ingest  │─────►│              │─────►│  Neo4jStore  │    │
//! │  │ (merges) │      │  GraphStore  │      │ (bolt/neo4rs)│    │
//! │  └──────────┘      │    trait     │      └──────────────┘    │
//! │                    │              │                          │
//! │  ┌──────────┐      │              │      ┌──────────────┐    │
//! │  │    QA    │─────►│              │─────►│ MemoryStore  │    │
//! │  │ (reads)  │      └──────────────┘      │ (tests/demo) │    │
//! │  └──────────┘                            └──────────────┘    │
//! │                                                              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Identity merges**: nodes are keyed on their normalized `name`, edges on
//!   the (disease, symptom) pair. Every write is an upsert.
//! - **Idempotent schema**: `ensure_schema` can run any number of times.
//! - **Explicit reset**: wiping the graph is its own operation.
//! - **Typed failures**: [`StoreError::is_retryable`] separates transient
//!   failures from rejected statements.

mod cypher;
pub mod memory;
pub mod neo4j;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use memory::MemoryStore;
pub use neo4j::{GraphDialect, Neo4jConfig, Neo4jStore};

// ============================================================================
// Vocabulary
// ============================================================================

pub const LABEL_DISEASE: &str = "Disease";
pub const LABEL_SYMPTOM: &str = "Symptom";
/// Wire name of the Disease → Symptom relationship.
pub const REL_HAS_SYMPTOM: &str = "HAS_SYMPTOM";

/// Property names carried by both node kinds.
pub const NODE_PROPERTIES: [&str; 4] = ["name", "aliases", "description", "website"];

/// One result row: column name → value.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Disease,
    Symptom,
}

impl NodeKind {
    pub fn label(self) -> &'static str {
        match self {
            NodeKind::Disease => LABEL_DISEASE,
            NodeKind::Symptom => LABEL_SYMPTOM,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Optional descriptive attributes for a node.
///
/// Only non-empty values are ever written, so a merge never blanks out an
/// attribute that an earlier source already set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAttributes {
    pub aliases: Option<String>,
    pub description: Option<String>,
    pub website: Option<String>,
}

impl NodeAttributes {
    /// `(property, value)` pairs whose value is non-empty after trimming.
    pub fn present(&self) -> Vec<(&'static str, &str)> {
        [
            ("aliases", self.aliases.as_deref()),
            ("description", self.description.as_deref()),
            ("website", self.website.as_deref()),
        ]
        .into_iter()
        .filter_map(|(key, value)| {
            let value = value?.trim();
            (!value.is_empty()).then_some((key, value))
        })
        .collect()
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphCounts {
    pub diseases: u64,
    pub symptoms: u64,
    pub has_symptom: u64,
}

/// Labels currently known to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSet {
    pub node_labels: Vec<String>,
    pub relationship_types: Vec<String>,
}

impl LabelSet {
    pub fn has_node_label(&self, label: &str) -> bool {
        self.node_labels.iter().any(|l| l == label)
    }

    pub fn has_relationship_type(&self, rel: &str) -> bool {
        self.relationship_types.iter().any(|r| r == rel)
    }
}

/// Outcome of [`GraphStore::ensure_schema`].
///
/// Labels or constraints that were already present land in `existing`;
/// that is a success, not a conflict to surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to connect to graph store at {uri}: {message}")]
    Connect { uri: String, message: String },
    #[error("graph store rejected statement: {0}")]
    Statement(String),
    #[error("transient graph store failure: {0}")]
    Transient(String),
    #[error("graph store call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("statement not supported by the in-memory store: {0}")]
    Unsupported(String),
    #[error("graph store runtime error: {0}")]
    Runtime(String),
}

impl StoreError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Transient(_) | StoreError::Timeout(_))
    }
}

// ============================================================================
// Store interface
// ============================================================================

/// A persisted disease/symptom graph.
///
/// Every method is synchronous from the caller's side. Implementations own
/// whatever runtime or pooling they need and release sessions before
/// returning, on success and on error.
pub trait GraphStore {
    /// Establish the `Disease`/`Symptom` labels with unique `name`, plus the
    /// `HAS_SYMPTOM` relationship label. Safe to call repeatedly.
    fn ensure_schema(&self) -> Result<SchemaReport, StoreError>;

    /// Delete every node and relationship.
    fn reset(&self) -> Result<(), StoreError>;

    /// Upsert a node keyed on `name`, then set any non-empty attributes.
    fn merge_node(
        &self,
        kind: NodeKind,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<(), StoreError>;

    /// Upsert the `HAS_SYMPTOM` edge, merging either endpoint if absent.
    fn merge_has_symptom(&self, disease: &str, symptom: &str) -> Result<(), StoreError>;

    fn counts(&self) -> Result<GraphCounts, StoreError>;

    /// Up to `limit` (disease, symptom) pairs.
    fn sample_pairs(&self, limit: usize) -> Result<Vec<(String, String)>, StoreError>;

    /// Live node labels and relationship types.
    fn labels(&self) -> Result<LabelSet, StoreError>;

    /// Run a read query and return its rows in order.
    fn run_query(&self, statement: &str) -> Result<Vec<Record>, StoreError>;
}

impl<S: GraphStore + ?Sized> GraphStore for &S {
    fn ensure_schema(&self) -> Result<SchemaReport, StoreError> {
        (**self).ensure_schema()
    }

    fn reset(&self) -> Result<(), StoreError> {
        (**self).reset()
    }

    fn merge_node(
        &self,
        kind: NodeKind,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<(), StoreError> {
        (**self).merge_node(kind, name, attributes)
    }

    fn merge_has_symptom(&self, disease: &str, symptom: &str) -> Result<(), StoreError> {
        (**self).merge_has_symptom(disease, symptom)
    }

    fn counts(&self) -> Result<GraphCounts, StoreError> {
        (**self).counts()
    }

    fn sample_pairs(&self, limit: usize) -> Result<Vec<(String, String)>, StoreError> {
        (**self).sample_pairs(limit)
    }

    fn labels(&self) -> Result<LabelSet, StoreError> {
        (**self).labels()
    }

    fn run_query(&self, statement: &str) -> Result<Vec<Record>, StoreError> {
        (**self).run_query(statement)
    }
}
