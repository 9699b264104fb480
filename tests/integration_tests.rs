//! Workspace integration tests: CSV data directory → graph → question answering
//!
//! Everything runs against `MemoryStore`; the LLM is a local stand-in that
//! returns a fixed query and answers by listing the records it was given.

use medgraph_ingest_csv::{verify, GraphMergeBuilder, IngestOptions, IngestSource, SourceKind};
use medgraph_llm::{
    default_exemplars, Completion, CompletionRequest, LlmError, QaOptions, QaPipeline, TextGenerator, Usage,
    NO_INFORMATION_REPLY, QUERY_TEMPERATURE,
};
use medgraph_storage::{GraphCounts, GraphStore, MemoryStore, NodeKind};
use std::cell::Cell;
use std::time::Duration;
use tempfile::TempDir;

const SYMPTOMS: &str = "\u{feff}症状名称,描述,别名
多饮,饮水量明显增多,烦渴
胸痛,胸部疼痛不适,
";

const DISEASES: &str = "疾病名称,别名,描述,网址,相关症状1,相关症状2,症状描述
糖尿病,消渴症,代谢性疾病,https://example.org/tnb,多饮,多尿,三多一少
高血压,,,,头晕,,血压升高
";

const DETAILS: &str = "疾病名称,典型症状
冠心病,头晕、胸痛、乏力
糖尿病,多饮，体重下降
";

/// Data directory in the conventional layout; the disease catalog is GBK.
fn data_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("symptoms.csv"), SYMPTOMS).unwrap();
    let (gbk, _, _) = encoding_rs::GBK.encode(DISEASES);
    std::fs::write(dir.path().join("diseases.csv"), gbk).unwrap();
    std::fs::write(dir.path().join("disease_details.csv"), DETAILS).unwrap();
    dir
}

fn options() -> IngestOptions {
    IngestOptions {
        retry_backoff: Duration::ZERO,
        ..IngestOptions::default()
    }
}

fn imported_store(dir: &TempDir) -> MemoryStore {
    let store = MemoryStore::new();
    store.ensure_schema().unwrap();
    GraphMergeBuilder::new(&store, options()).ingest_all(&IngestSource::from_data_dir(dir.path()));
    store
}

struct EchoGenerator {
    query: String,
    calls: Cell<usize>,
}

impl EchoGenerator {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            calls: Cell::new(0),
        }
    }
}

impl TextGenerator for EchoGenerator {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.calls.set(self.calls.get() + 1);
        let text = if request.temperature == Some(QUERY_TEMPERATURE) {
            self.query.clone()
        } else {
            let body = &request.messages.last().unwrap().content;
            let start = body.find('[').unwrap();
            let end = body.rfind(']').unwrap();
            let rows: Vec<serde_json::Value> = serde_json::from_str(&body[start..=end]).unwrap();
            let values: Vec<String> = rows
                .iter()
                .filter_map(|r| r.as_object())
                .flat_map(|r| r.values())
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            values.join("、")
        };
        Ok(Completion {
            text,
            model: "echo".to_string(),
            usage: Usage::default(),
        })
    }

    fn model(&self) -> &str {
        "echo"
    }
}

#[test]
fn test_data_dir_import_builds_expected_graph() {
    let dir = data_dir();
    let store = MemoryStore::new();
    store.ensure_schema().unwrap();
    let report = GraphMergeBuilder::new(&store, options()).ingest_all(&IngestSource::from_data_dir(dir.path()));

    assert!(report.unreadable.is_empty(), "{:?}", report.unreadable);
    let kinds: Vec<SourceKind> = report.sources.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![SourceKind::SymptomCatalog, SourceKind::DiseaseCatalog, SourceKind::DiseaseDetails]
    );
    assert_eq!(report.sources[0].encoding, "UTF-8");
    assert_eq!(report.sources[1].encoding, "GBK");

    assert_eq!(
        store.counts().unwrap(),
        GraphCounts {
            diseases: 3,
            symptoms: 6,
            has_symptom: 7,
        }
    );
    assert!(!store.names(NodeKind::Symptom).iter().any(|s| s.contains("三多一少")));

    let summary = verify(&store, Some(&report), 3).unwrap();
    assert!(summary.is_clean(), "{:?}", summary.warnings);
    assert_eq!(summary.samples.len(), 3);
}

#[test]
fn test_symptom_attributes_survive_later_edges() {
    let dir = data_dir();
    let store = imported_store(&dir);

    let thirst = store.node(NodeKind::Symptom, "多饮").unwrap();
    assert_eq!(thirst.description.as_deref(), Some("饮水量明显增多"));
    assert_eq!(thirst.aliases.as_deref(), Some("烦渴"));

    let diabetes = store.node(NodeKind::Disease, "糖尿病").unwrap();
    assert_eq!(diabetes.aliases.as_deref(), Some("消渴症"));
    assert_eq!(diabetes.website.as_deref(), Some("https://example.org/tnb"));
}

#[test]
fn test_reimport_is_a_no_op() {
    let dir = data_dir();
    let store = imported_store(&dir);
    let before = store.counts().unwrap();

    let report = GraphMergeBuilder::new(&store, options()).ingest_all(&IngestSource::from_data_dir(dir.path()));

    assert_eq!(store.counts().unwrap(), before);
    assert_eq!(report.failure_count(), 0);
}

#[test]
fn test_exemplar_queries_run_on_imported_graph() {
    let dir = data_dir();
    let store = imported_store(&dir);
    for exemplar in default_exemplars() {
        store
            .run_query(&exemplar.query)
            .unwrap_or_else(|e| panic!("{}: {e}", exemplar.query));
    }
}

#[test]
fn test_question_answered_from_imported_data() {
    let dir = data_dir();
    let store = imported_store(&dir);
    let generator = EchoGenerator::new(&default_exemplars()[0].query);
    let pipeline = QaPipeline::new(&store, &generator, QaOptions::default());

    let outcome = pipeline.ask("糖尿病有哪些症状？");

    assert!(outcome.is_answered(), "{:?}", outcome.error);
    assert_eq!(outcome.total_records, 3);
    let answer = outcome.answer.unwrap();
    for symptom in ["多饮", "多尿", "体重下降"] {
        assert!(answer.contains(symptom), "{answer}");
    }
    assert!(!answer.contains("头晕"));
    assert_eq!(generator.calls.get(), 2);
}

#[test]
fn test_reverse_question_and_missing_disease() {
    let dir = data_dir();
    let store = imported_store(&dir);

    let generator = EchoGenerator::new(&default_exemplars()[1].query);
    let outcome = QaPipeline::new(&store, &generator, QaOptions::default()).ask("哪些疾病会引起头晕？");
    let answer = outcome.answer.unwrap();
    assert!(answer.contains("冠心病") && answer.contains("高血压"), "{answer}");

    let generator = EchoGenerator::new(
        "MATCH (d:Disease)-[:HAS_SYMPTOM]->(s:Symptom) WHERE d.name CONTAINS '肺炎' RETURN s.name AS symptom LIMIT 20",
    );
    let outcome = QaPipeline::new(&store, &generator, QaOptions::default()).ask("肺炎有哪些症状？");
    assert_eq!(outcome.answer.as_deref(), Some(NO_INFORMATION_REPLY));
    assert_eq!(generator.calls.get(), 1);
}
