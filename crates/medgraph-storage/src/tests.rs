//! Behavioural tests for the graph store contract, run against MemoryStore

use super::*;
use proptest::prelude::*;
use serde_json::json;

/// Helper: a store holding two diseases sharing one symptom
fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.ensure_schema().unwrap();
    for (disease, symptom) in [
        ("糖尿病", "多饮"),
        ("糖尿病", "多尿"),
        ("感冒", "发热"),
        ("流感", "发热"),
    ] {
        store
            .merge_node(NodeKind::Disease, disease, &NodeAttributes::default())
            .unwrap();
        store
            .merge_node(NodeKind::Symptom, symptom, &NodeAttributes::default())
            .unwrap();
        store.merge_has_symptom(disease, symptom).unwrap();
    }
    store
}

#[test]
fn test_schema_init_is_idempotent() {
    let store = MemoryStore::new();

    let first = store.ensure_schema().unwrap();
    assert_eq!(first.created.len(), 3);
    assert!(first.existing.is_empty());

    let second = store.ensure_schema().unwrap();
    assert!(second.created.is_empty());
    assert_eq!(
        second.existing,
        vec![LABEL_DISEASE, LABEL_SYMPTOM, REL_HAS_SYMPTOM]
    );
}

#[test]
fn test_schema_init_does_not_reset() {
    let store = seeded_store();
    store.ensure_schema().unwrap();
    assert_eq!(store.counts().unwrap().diseases, 3);
}

#[test]
fn test_reset_clears_graph_but_keeps_labels() {
    let store = seeded_store();
    store.reset().unwrap();

    assert_eq!(store.counts().unwrap(), GraphCounts::default());
    let labels = store.labels().unwrap();
    assert!(labels.has_node_label(LABEL_DISEASE));
    assert!(labels.has_relationship_type(REL_HAS_SYMPTOM));
}

#[test]
fn test_merges_are_keyed_on_name() {
    let store = seeded_store();
    let before = store.counts().unwrap();

    store
        .merge_node(NodeKind::Disease, "糖尿病", &NodeAttributes::default())
        .unwrap();
    store.merge_has_symptom("糖尿病", "多饮").unwrap();

    assert_eq!(store.counts().unwrap(), before);
    assert_eq!(
        before,
        GraphCounts {
            diseases: 3,
            symptoms: 3,
            has_symptom: 4
        }
    );
}

#[test]
fn test_attributes_never_blank_out() {
    let store = MemoryStore::new();
    let attrs = NodeAttributes {
        aliases: Some("消渴症".to_string()),
        description: Some("代谢性疾病".to_string()),
        website: None,
    };
    store.merge_node(NodeKind::Disease, "糖尿病", &attrs).unwrap();

    let blank = NodeAttributes {
        aliases: Some("   ".to_string()),
        description: None,
        website: Some("https://example.org/tnb".to_string()),
    };
    store.merge_node(NodeKind::Disease, "糖尿病", &blank).unwrap();

    let stored = store.node(NodeKind::Disease, "糖尿病").unwrap();
    assert_eq!(stored.aliases.as_deref(), Some("消渴症"));
    assert_eq!(stored.description.as_deref(), Some("代谢性疾病"));
    assert_eq!(stored.website.as_deref(), Some("https://example.org/tnb"));
}

#[test]
fn test_edge_merge_creates_missing_endpoints() {
    let store = MemoryStore::new();
    store.merge_has_symptom("哮喘", "喘息").unwrap();

    assert!(store.node(NodeKind::Disease, "哮喘").is_some());
    assert!(store.node(NodeKind::Symptom, "喘息").is_some());
    assert!(store.has_edge("哮喘", "喘息"));
}

#[test]
fn test_labels_reflect_content() {
    let store = MemoryStore::new();
    assert_eq!(store.labels().unwrap(), LabelSet::default());

    let store = seeded_store();
    let labels = store.labels().unwrap();
    assert_eq!(labels.node_labels, vec!["Disease", "Symptom"]);
    assert_eq!(labels.relationship_types, vec!["HAS_SYMPTOM"]);
}

#[test]
fn test_sample_pairs_respects_limit() {
    let store = seeded_store();
    let pairs = store.sample_pairs(2).unwrap();
    assert_eq!(pairs.len(), 2);
    assert!(store.sample_pairs(0).unwrap().is_empty());
}

#[test]
fn test_contains_query_returns_symptoms_in_order() {
    let store = seeded_store();
    let rows = store
        .run_query(
            "MATCH (d:Disease)-[:HAS_SYMPTOM]->(s:Symptom) WHERE d.name CONTAINS '糖尿' RETURN s.name AS symptom LIMIT 20",
        )
        .unwrap();

    assert_eq!(
        rows,
        vec![
            json!({"symptom": "多尿"}).as_object().unwrap().clone(),
            json!({"symptom": "多饮"}).as_object().unwrap().clone(),
        ]
    );
}

#[test]
fn test_reverse_query_with_inline_name() {
    let store = seeded_store();
    let rows = store
        .run_query("MATCH (s:Symptom {name: '发热'})<-[:HAS_SYMPTOM]-(d:Disease) RETURN d.name")
        .unwrap();

    let names: Vec<&str> = rows
        .iter()
        .map(|r| r["d.name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["感冒", "流感"]);
}

#[test]
fn test_distinct_and_limit() {
    let store = seeded_store();
    let rows = store
        .run_query("MATCH (d:Disease)-[:HAS_SYMPTOM]->(s:Symptom) RETURN DISTINCT s.name AS s")
        .unwrap();
    assert_eq!(rows.len(), 3);

    let rows = store
        .run_query("MATCH (d:Disease)-[:HAS_SYMPTOM]->(s:Symptom) RETURN s.name LIMIT 1")
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[test]
fn test_unknown_label_matches_nothing() {
    let store = seeded_store();
    let rows = store
        .run_query("MATCH (d:Illness)-[:HAS_SYMPTOM]->(s:Symptom) RETURN s.name")
        .unwrap();
    assert!(rows.is_empty());

    let rows = store
        .run_query("MATCH (d:Disease)-[:CAUSES]->(s:Symptom) RETURN s.name")
        .unwrap();
    assert!(rows.is_empty());
}

#[test]
fn test_whole_node_projection() {
    let store = MemoryStore::new();
    let attrs = NodeAttributes {
        aliases: Some("头疼".to_string()),
        ..Default::default()
    };
    store.merge_node(NodeKind::Symptom, "头痛", &attrs).unwrap();

    let rows = store
        .run_query("MATCH (s:Symptom) WHERE s.name = '头痛' RETURN s")
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["s"], json!({"name": "头痛", "aliases": "头疼"}));
}

#[test]
fn test_undefined_variable_is_a_statement_error() {
    let store = seeded_store();
    let err = store
        .run_query("MATCH (d:Disease) RETURN x.name")
        .unwrap_err();
    assert!(matches!(err, StoreError::Statement(_)));
    assert!(!err.is_retryable());
}

#[test]
fn test_unsupported_statement() {
    let store = seeded_store();
    let err = store.run_query("MATCH (n) DETACH DELETE n").unwrap_err();
    assert!(matches!(err, StoreError::Unsupported(_)));
}

#[test]
fn test_retryable_classification() {
    assert!(StoreError::Transient("deadlock".into()).is_retryable());
    assert!(StoreError::Timeout(std::time::Duration::from_secs(1)).is_retryable());
    assert!(!StoreError::Statement("bad".into()).is_retryable());
}

proptest! {
    #[test]
    fn prop_repeated_merges_do_not_grow_graph(
        pairs in proptest::collection::vec(("[a-e]{1,3}", "[v-z]{1,3}"), 0..20),
        repeats in 1usize..4,
    ) {
        let store = MemoryStore::new();
        for _ in 0..repeats {
            for (d, s) in &pairs {
                store.merge_node(NodeKind::Disease, d, &NodeAttributes::default()).unwrap();
                store.merge_node(NodeKind::Symptom, s, &NodeAttributes::default()).unwrap();
                store.merge_has_symptom(d, s).unwrap();
            }
        }

        let distinct_pairs: std::collections::BTreeSet<_> = pairs.iter().collect();
        let distinct_d: std::collections::BTreeSet<_> = pairs.iter().map(|(d, _)| d).collect();
        let counts = store.counts().unwrap();
        prop_assert_eq!(counts.has_symptom as usize, distinct_pairs.len());
        prop_assert_eq!(counts.diseases as usize, distinct_d.len());
    }
}
