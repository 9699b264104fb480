//! In-memory graph store.
//!
//! Deterministic stand-in for the bolt store: identical merge semantics,
//! sorted iteration, and a small read-query subset (see [`crate::cypher`]).

use crate::cypher::{self, Direction, NodePattern, Pattern, ReadQuery};
use crate::{
    GraphCounts, GraphStore, LabelSet, NodeAttributes, NodeKind, Record, SchemaReport,
    StoreError, LABEL_DISEASE, LABEL_SYMPTOM, REL_HAS_SYMPTOM,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
struct GraphState {
    diseases: BTreeMap<String, NodeAttributes>,
    symptoms: BTreeMap<String, NodeAttributes>,
    has_symptom: BTreeSet<(String, String)>,
    schema: BTreeSet<String>,
}

impl GraphState {
    fn nodes(&self, kind: NodeKind) -> &BTreeMap<String, NodeAttributes> {
        match kind {
            NodeKind::Disease => &self.diseases,
            NodeKind::Symptom => &self.symptoms,
        }
    }

    fn nodes_mut(&mut self, kind: NodeKind) -> &mut BTreeMap<String, NodeAttributes> {
        match kind {
            NodeKind::Disease => &mut self.diseases,
            NodeKind::Symptom => &mut self.symptoms,
        }
    }

    fn property(&self, node: &(NodeKind, String), property: &str) -> Option<String> {
        let (kind, name) = node;
        if property == "name" {
            return Some(name.clone());
        }
        let attrs = self.nodes(*kind).get(name)?;
        match property {
            "aliases" => attrs.aliases.clone(),
            "description" => attrs.description.clone(),
            "website" => attrs.website.clone(),
            _ => None,
        }
    }

    fn node_value(&self, node: &(NodeKind, String)) -> Value {
        let mut obj = serde_json::Map::new();
        for prop in crate::NODE_PROPERTIES {
            if let Some(v) = self.property(node, prop) {
                obj.insert(prop.to_string(), Value::String(v));
            }
        }
        Value::Object(obj)
    }
}

type Binding = Vec<(String, (NodeKind, String))>;

/// Thread-safe in-memory [`GraphStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<GraphState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes stored on a node, if it exists.
    pub fn node(&self, kind: NodeKind, name: &str) -> Option<NodeAttributes> {
        self.state.read().nodes(kind).get(name).cloned()
    }

    pub fn has_edge(&self, disease: &str, symptom: &str) -> bool {
        self.state
            .read()
            .has_symptom
            .contains(&(disease.to_string(), symptom.to_string()))
    }

    /// Names of every node of `kind`, sorted.
    pub fn names(&self, kind: NodeKind) -> Vec<String> {
        self.state.read().nodes(kind).keys().cloned().collect()
    }

    fn evaluate(&self, query: &ReadQuery) -> Result<Vec<Record>, StoreError> {
        let state = self.state.read();

        let candidates: Vec<Binding> = match &query.pattern {
            Pattern::Node(node) => [NodeKind::Disease, NodeKind::Symptom]
                .into_iter()
                .filter(|kind| label_matches(node, *kind))
                .flat_map(|kind| {
                    state
                        .nodes(kind)
                        .keys()
                        .map(move |name| bind(node, kind, name))
                        .collect::<Vec<_>>()
                })
                .collect(),
            Pattern::Path {
                left,
                rel_type,
                direction,
                right,
            } => {
                if rel_type.as_deref().is_some_and(|r| r != REL_HAS_SYMPTOM) {
                    Vec::new()
                } else {
                    let mut out = Vec::new();
                    for (disease, symptom) in &state.has_symptom {
                        let forward = [
                            (NodeKind::Disease, disease.as_str()),
                            (NodeKind::Symptom, symptom.as_str()),
                        ];
                        let backward = [forward[1], forward[0]];
                        let orientations = match direction {
                            Direction::Outgoing => vec![forward],
                            Direction::Incoming => vec![backward],
                            Direction::Either => vec![forward, backward],
                        };
                        for [(lk, ln), (rk, rn)] in orientations {
                            if label_matches(left, lk) && label_matches(right, rk) {
                                let mut binding = bind(left, lk, ln);
                                binding.extend(bind(right, rk, rn));
                                out.push(binding);
                            }
                        }
                    }
                    out
                }
            }
        };

        let inline: Vec<(&NodePattern, usize)> = match &query.pattern {
            Pattern::Node(n) => vec![(n, 0)],
            Pattern::Path { left, right, .. } => vec![(left, 0), (right, 1)],
        };

        let mut rows: Vec<Record> = Vec::new();
        'candidates: for binding in candidates {
            for (pattern, slot) in &inline {
                let node = &binding[*slot].1;
                for (key, expected) in &pattern.properties {
                    if state.property(node, key).as_deref() != Some(expected.as_str()) {
                        continue 'candidates;
                    }
                }
            }

            for cond in &query.conditions {
                let node = lookup(&binding, &cond.var)?;
                match state.property(node, &cond.property) {
                    Some(actual) if cond.op.holds(&actual, &cond.value) => {}
                    _ => continue 'candidates,
                }
            }

            let mut record = Record::new();
            for proj in &query.projections {
                let node = lookup(&binding, &proj.var)?;
                let value = match &proj.property {
                    Some(prop) => state
                        .property(node, prop)
                        .map(Value::String)
                        .unwrap_or(Value::Null),
                    None => state.node_value(node),
                };
                record.insert(proj.column.clone(), value);
            }

            if query.distinct && rows.contains(&record) {
                continue;
            }
            rows.push(record);
            if query.limit.is_some_and(|limit| rows.len() >= limit) {
                break;
            }
        }

        Ok(rows)
    }
}

fn label_matches(pattern: &NodePattern, kind: NodeKind) -> bool {
    pattern.label.as_deref().map_or(true, |l| l == kind.label())
}

fn bind(pattern: &NodePattern, kind: NodeKind, name: &str) -> Binding {
    // Anonymous nodes still occupy a slot so inline properties can be checked.
    let var = pattern.var.clone().unwrap_or_default();
    vec![(var, (kind, name.to_string()))]
}

fn lookup<'a>(binding: &'a Binding, var: &str) -> Result<&'a (NodeKind, String), StoreError> {
    binding
        .iter()
        .find(|(v, _)| !v.is_empty() && v == var)
        .map(|(_, node)| node)
        .ok_or_else(|| StoreError::Statement(format!("variable `{var}` not defined")))
}

impl GraphStore for MemoryStore {
    fn ensure_schema(&self) -> Result<SchemaReport, StoreError> {
        let mut state = self.state.write();
        let mut report = SchemaReport::default();
        for label in [LABEL_DISEASE, LABEL_SYMPTOM, REL_HAS_SYMPTOM] {
            if state.schema.insert(label.to_string()) {
                report.created.push(label.to_string());
            } else {
                report.existing.push(label.to_string());
            }
        }
        Ok(report)
    }

    fn reset(&self) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.diseases.clear();
        state.symptoms.clear();
        state.has_symptom.clear();
        Ok(())
    }

    fn merge_node(
        &self,
        kind: NodeKind,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let entry = state.nodes_mut(kind).entry(name.to_string()).or_default();
        for (key, value) in attributes.present() {
            let slot = match key {
                "aliases" => &mut entry.aliases,
                "description" => &mut entry.description,
                _ => &mut entry.website,
            };
            *slot = Some(value.to_string());
        }
        Ok(())
    }

    fn merge_has_symptom(&self, disease: &str, symptom: &str) -> Result<(), StoreError> {
        let mut state = self.state.write();
        state.diseases.entry(disease.to_string()).or_default();
        state.symptoms.entry(symptom.to_string()).or_default();
        state
            .has_symptom
            .insert((disease.to_string(), symptom.to_string()));
        Ok(())
    }

    fn counts(&self) -> Result<GraphCounts, StoreError> {
        let state = self.state.read();
        Ok(GraphCounts {
            diseases: state.diseases.len() as u64,
            symptoms: state.symptoms.len() as u64,
            has_symptom: state.has_symptom.len() as u64,
        })
    }

    fn sample_pairs(&self, limit: usize) -> Result<Vec<(String, String)>, StoreError> {
        Ok(self
            .state
            .read()
            .has_symptom
            .iter()
            .take(limit)
            .cloned()
            .collect())
    }

    fn labels(&self) -> Result<LabelSet, StoreError> {
        let state = self.state.read();
        let mut labels = LabelSet::default();
        for kind in [NodeKind::Disease, NodeKind::Symptom] {
            if !state.nodes(kind).is_empty() || state.schema.contains(kind.label()) {
                labels.node_labels.push(kind.label().to_string());
            }
        }
        if !state.has_symptom.is_empty() || state.schema.contains(REL_HAS_SYMPTOM) {
            labels.relationship_types.push(REL_HAS_SYMPTOM.to_string());
        }
        Ok(labels)
    }

    fn run_query(&self, statement: &str) -> Result<Vec<Record>, StoreError> {
        let query = cypher::parse(statement)?;
        self.evaluate(&query)
    }
}
