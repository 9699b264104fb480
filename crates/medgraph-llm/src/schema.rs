//! Live schema description for query translation.

use medgraph_storage::{
    GraphCounts, GraphStore, LabelSet, LABEL_DISEASE, LABEL_SYMPTOM, NODE_PROPERTIES, REL_HAS_SYMPTOM,
};
use std::fmt::Write as _;
use tracing::warn;

/// Stand-in schema text when the store cannot be introspected.
pub const DEGRADED_SCHEMA_TEXT: &str =
    "Schema unavailable (introspection failed); use only Disease, Symptom and HAS_SYMPTOM if unsure.";

#[derive(Debug, Clone, PartialEq)]
pub struct SchemaContext {
    /// `None` when introspection failed or found no node labels.
    pub labels: Option<LabelSet>,
    pub counts: Option<GraphCounts>,
    pub text: String,
}

impl SchemaContext {
    pub fn degraded() -> Self {
        Self {
            labels: None,
            counts: None,
            text: DEGRADED_SCHEMA_TEXT.to_string(),
        }
    }

    /// Degraded contexts cannot ground a query's vocabulary.
    pub fn is_degraded(&self) -> bool {
        self.labels.is_none()
    }
}

pub struct SchemaIntrospector<'a, S: GraphStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: GraphStore + ?Sized> SchemaIntrospector<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Read the store's current labels and counts. Never fails: a store that
    /// cannot answer yields a degraded context.
    pub fn introspect(&self) -> SchemaContext {
        let labels = match self.store.labels() {
            Ok(labels) if !labels.node_labels.is_empty() => labels,
            Ok(_) => {
                warn!("graph has no node labels; using placeholder schema");
                return SchemaContext::degraded();
            }
            Err(e) => {
                warn!("schema introspection failed: {e}");
                return SchemaContext::degraded();
            }
        };
        let counts = match self.store.counts() {
            Ok(counts) => Some(counts),
            Err(e) => {
                warn!("graph counts unavailable: {e}");
                None
            }
        };
        let text = render_schema(&labels, counts.as_ref());
        SchemaContext {
            labels: Some(labels),
            counts,
            text,
        }
    }
}

pub fn render_schema(labels: &LabelSet, counts: Option<&GraphCounts>) -> String {
    let mut out = String::from("Node labels:\n");
    for label in &labels.node_labels {
        if label == LABEL_DISEASE || label == LABEL_SYMPTOM {
            let _ = writeln!(out, "  - {label} (properties: {})", NODE_PROPERTIES.join(", "));
        } else {
            let _ = writeln!(out, "  - {label}");
        }
    }

    out.push_str("Relationship types:\n");
    if labels.relationship_types.is_empty() {
        out.push_str("  (none)\n");
    }
    for rel in &labels.relationship_types {
        if rel == REL_HAS_SYMPTOM {
            let _ = writeln!(out, "  - {rel}: (:{LABEL_DISEASE})-[:{rel}]->(:{LABEL_SYMPTOM})");
        } else {
            let _ = writeln!(out, "  - {rel}");
        }
    }

    if let Some(c) = counts {
        out.push_str("Statistics:\n");
        let _ = writeln!(out, "  - {} {LABEL_DISEASE} nodes", c.diseases);
        let _ = writeln!(out, "  - {} {LABEL_SYMPTOM} nodes", c.symptoms);
        let _ = writeln!(out, "  - {} {REL_HAS_SYMPTOM} relationships", c.has_symptom);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use medgraph_storage::{MemoryStore, NodeAttributes, NodeKind};

    #[test]
    fn introspects_populated_store() {
        let store = MemoryStore::new();
        store.merge_has_symptom("糖尿病", "多饮").unwrap();

        let ctx = SchemaIntrospector::new(&store).introspect();
        assert!(!ctx.is_degraded());
        assert!(ctx.text.contains("Disease (properties: name, aliases, description, website)"));
        assert!(ctx.text.contains("HAS_SYMPTOM: (:Disease)-[:HAS_SYMPTOM]->(:Symptom)"));
        assert!(ctx.text.contains("1 HAS_SYMPTOM relationships"));
    }

    #[test]
    fn store_without_labels_is_degraded() {
        let store = MemoryStore::new();
        let ctx = SchemaIntrospector::new(&store).introspect();
        assert!(ctx.is_degraded());
        assert_eq!(ctx.text, DEGRADED_SCHEMA_TEXT);
    }

    #[test]
    fn rendering_lists_only_present_vocabulary() {
        let store = MemoryStore::new();
        store
            .merge_node(NodeKind::Disease, "感冒", &NodeAttributes::default())
            .unwrap();
        let ctx = SchemaIntrospector::new(&store).introspect();
        let labels = ctx.labels.unwrap();
        assert!(labels.has_node_label("Disease"));
        assert!(!labels.has_node_label("Symptom"));
        assert!(ctx.text.contains("Relationship types:\n  (none)"));
    }
}
