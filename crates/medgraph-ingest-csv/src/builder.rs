//! Graph merge builder
//!
//! Every source kind funnels into the same three upserts:
//!
//! ```text
//! row ──► normalize identity ──► MERGE (Disease|Symptom {name})
//!     └─► split symptom cells ──► MERGE (Symptom {name}) ──► MERGE (d)-[:HAS_SYMPTOM]->(s)
//! ```
//!
//! Nothing is cached between rows or files; each merge is idempotent on its
//! own, so file order and row interleaving do not change the final graph.
//! A failed write is recorded and skipped, never fatal.

use crate::columns::{ColumnMap, HeaderSynonyms, SemanticField};
use crate::normalize::{normalize_name, split_symptoms};
use crate::reader::{read_source, SourceRow, SourceTable};
use crate::IngestError;
use chrono::{DateTime, Utc};
use medgraph_storage::{GraphStore, NodeAttributes, NodeKind, StoreError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

// ============================================================================
// Sources
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// One disease per row, symptoms spread over discrete columns.
    DiseaseCatalog,
    /// One disease per row, symptoms joined in a single field.
    DiseaseDetails,
    /// One symptom per row with descriptive attributes, no edges.
    SymptomCatalog,
}

impl SourceKind {
    /// Field that identifies the row's node.
    pub fn identity_field(self) -> SemanticField {
        match self {
            SourceKind::DiseaseCatalog | SourceKind::DiseaseDetails => SemanticField::DiseaseName,
            SourceKind::SymptomCatalog => SemanticField::SymptomName,
        }
    }

    /// Header the reader requires when picking an encoding. A details file
    /// is only worth reading if it carries the symptom field.
    pub fn primary_field(self) -> SemanticField {
        match self {
            SourceKind::DiseaseDetails => SemanticField::TypicalSymptoms,
            SourceKind::DiseaseCatalog | SourceKind::SymptomCatalog => self.identity_field(),
        }
    }

    pub fn node_kind(self) -> NodeKind {
        match self {
            SourceKind::DiseaseCatalog | SourceKind::DiseaseDetails => NodeKind::Disease,
            SourceKind::SymptomCatalog => NodeKind::Symptom,
        }
    }

    /// Semantic fields resolved for this kind of file.
    pub fn fields(self) -> &'static [SemanticField] {
        match self {
            SourceKind::DiseaseCatalog => &[
                SemanticField::DiseaseName,
                SemanticField::Aliases,
                SemanticField::Description,
                SemanticField::Website,
            ],
            SourceKind::DiseaseDetails => {
                &[SemanticField::DiseaseName, SemanticField::TypicalSymptoms]
            }
            SourceKind::SymptomCatalog => &[
                SemanticField::SymptomName,
                SemanticField::Aliases,
                SemanticField::Description,
                SemanticField::Website,
            ],
        }
    }

    /// Conventional file name inside a data directory.
    pub fn default_file_name(self) -> &'static str {
        match self {
            SourceKind::DiseaseCatalog => "diseases.csv",
            SourceKind::DiseaseDetails => "disease_details.csv",
            SourceKind::SymptomCatalog => "symptoms.csv",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSource {
    pub kind: SourceKind,
    pub path: PathBuf,
}

impl IngestSource {
    pub fn new(kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// The three conventional files of `dir`, symptom catalog first so that
    /// symptom attributes are present before edges reference them.
    pub fn from_data_dir(dir: &Path) -> Vec<Self> {
        [
            SourceKind::SymptomCatalog,
            SourceKind::DiseaseCatalog,
            SourceKind::DiseaseDetails,
        ]
        .into_iter()
        .map(|kind| Self::new(kind, dir.join(kind.default_file_name())))
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Log progress every N rows. `0` disables progress lines.
    pub progress_every: usize,
    /// Extra attempts for retryable store failures.
    pub max_write_retries: u32,
    /// Linear backoff step between attempts.
    pub retry_backoff: Duration,
    pub synonyms: HeaderSynonyms,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            progress_every: 100,
            max_write_retries: 2,
            retry_backoff: Duration::from_millis(200),
            synonyms: HeaderSynonyms::default(),
        }
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MergeItem {
    Node { kind: NodeKind, name: String },
    Edge { disease: String, symptom: String },
}

/// A write that failed after retries and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeFailure {
    pub line: u64,
    pub item: MergeItem,
    pub error: String,
    pub retryable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOutcome {
    Merged,
    /// The identity field was missing or blank.
    Skipped,
    /// The row's own node could not be written; nothing else was attempted.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceReport {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub encoding: String,
    pub rows_seen: usize,
    pub rows_merged: usize,
    pub rows_skipped: usize,
    pub rows_failed: usize,
    pub malformed_rows: usize,
    pub node_merges: usize,
    pub edge_merges: usize,
    pub failures: Vec<MergeFailure>,
}

impl SourceReport {
    fn new(kind: SourceKind, table: &SourceTable) -> Self {
        Self {
            path: table.path.clone(),
            kind,
            encoding: table.encoding.to_string(),
            rows_seen: 0,
            rows_merged: 0,
            rows_skipped: 0,
            rows_failed: 0,
            malformed_rows: table.malformed_rows,
            node_merges: 0,
            edge_merges: 0,
            failures: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadableSource {
    pub path: PathBuf,
    pub kind: SourceKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: Vec<SourceReport>,
    pub unreadable: Vec<UnreadableSource>,
}

impl IngestReport {
    pub fn rows_seen(&self) -> usize {
        self.sources.iter().map(|s| s.rows_seen).sum()
    }

    pub fn rows_merged(&self) -> usize {
        self.sources.iter().map(|s| s.rows_merged).sum()
    }

    pub fn edge_merges(&self) -> usize {
        self.sources.iter().map(|s| s.edge_merges).sum()
    }

    /// Rows merged from disease catalogs and disease details.
    pub fn disease_rows_merged(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| s.kind.node_kind() == NodeKind::Disease)
            .map(|s| s.rows_merged)
            .sum()
    }

    pub fn failure_count(&self) -> usize {
        self.sources.iter().map(|s| s.failures.len()).sum()
    }
}

// ============================================================================
// Builder
// ============================================================================

pub struct GraphMergeBuilder<'a, S: GraphStore + ?Sized> {
    store: &'a S,
    options: IngestOptions,
}

impl<'a, S: GraphStore + ?Sized> GraphMergeBuilder<'a, S> {
    pub fn new(store: &'a S, options: IngestOptions) -> Self {
        Self { store, options }
    }

    /// Ingest every source in order. Unreadable sources are recorded and
    /// skipped; the run itself never fails.
    pub fn ingest_all(&self, sources: &[IngestSource]) -> IngestReport {
        let started_at = Utc::now();
        let mut reports = Vec::new();
        let mut unreadable = Vec::new();

        for source in sources {
            match self.ingest_source(source) {
                Ok(report) => reports.push(report),
                Err(IngestError::SourceUnreadable { path, reason }) => {
                    warn!(path = %path.display(), %reason, "skipping unreadable source");
                    unreadable.push(UnreadableSource {
                        path,
                        kind: source.kind,
                        reason,
                    });
                }
            }
        }

        IngestReport {
            started_at,
            finished_at: Utc::now(),
            sources: reports,
            unreadable,
        }
    }

    pub fn ingest_source(&self, source: &IngestSource) -> Result<SourceReport, IngestError> {
        let table = read_source(
            &source.path,
            source.kind.primary_field(),
            &self.options.synonyms,
        )?;
        Ok(self.ingest_table(source.kind, &table))
    }

    pub fn ingest_table(&self, kind: SourceKind, table: &SourceTable) -> SourceReport {
        let columns = ColumnMap::resolve(&table.headers, &self.options.synonyms, kind.fields());
        info!(
            path = %table.path.display(),
            ?kind,
            encoding = table.encoding,
            rows = table.rows.len(),
            symptom_columns = ?columns.symptom_columns(),
            "ingesting source"
        );
        if kind == SourceKind::DiseaseDetails && columns.column(SemanticField::TypicalSymptoms).is_none() {
            warn!(path = %table.path.display(), "no symptom field; only diseases will be merged");
        }

        let mut report = SourceReport::new(kind, table);
        for row in &table.rows {
            report.rows_seen += 1;
            match self.merge_row(kind, &columns, row, &mut report) {
                RowOutcome::Merged => report.rows_merged += 1,
                RowOutcome::Skipped => report.rows_skipped += 1,
                RowOutcome::Failed => report.rows_failed += 1,
            }

            let every = self.options.progress_every;
            if every > 0 && report.rows_seen % every == 0 {
                info!(
                    path = %table.path.display(),
                    rows = report.rows_seen,
                    edges = report.edge_merges,
                    "progress"
                );
            }
        }

        info!(
            path = %table.path.display(),
            merged = report.rows_merged,
            skipped = report.rows_skipped,
            failures = report.failures.len(),
            "source done"
        );
        report
    }

    /// Merge one row: its node, then every extracted symptom and edge.
    pub fn merge_row(
        &self,
        kind: SourceKind,
        columns: &ColumnMap,
        row: &SourceRow,
        report: &mut SourceReport,
    ) -> RowOutcome {
        let identity = columns
            .column(kind.identity_field())
            .and_then(|c| row.get(c))
            .and_then(normalize_name);
        let Some(name) = identity else {
            debug!(line = row.line, "row has no identity; skipped");
            return RowOutcome::Skipped;
        };

        let attributes = match kind {
            SourceKind::DiseaseDetails => NodeAttributes::default(),
            SourceKind::DiseaseCatalog | SourceKind::SymptomCatalog => NodeAttributes {
                aliases: cell(columns, row, SemanticField::Aliases),
                description: cell(columns, row, SemanticField::Description),
                website: cell(columns, row, SemanticField::Website),
            },
        };

        let node_kind = kind.node_kind();
        let item = MergeItem::Node {
            kind: node_kind,
            name: name.clone(),
        };
        if !self.write(row.line, item, report, || {
            self.store.merge_node(node_kind, &name, &attributes)
        }) {
            return RowOutcome::Failed;
        }

        for symptom in symptoms_of(kind, columns, row) {
            let item = MergeItem::Node {
                kind: NodeKind::Symptom,
                name: symptom.clone(),
            };
            if !self.write(row.line, item, report, || {
                self.store
                    .merge_node(NodeKind::Symptom, &symptom, &NodeAttributes::default())
            }) {
                continue;
            }

            let item = MergeItem::Edge {
                disease: name.clone(),
                symptom: symptom.clone(),
            };
            if self.write(row.line, item, report, || {
                self.store.merge_has_symptom(&name, &symptom)
            }) {
                report.edge_merges += 1;
            }
        }

        RowOutcome::Merged
    }

    /// Run one write with retries. Returns whether it eventually succeeded;
    /// on failure the item is recorded in `report`.
    fn write<F>(&self, line: u64, item: MergeItem, report: &mut SourceReport, op: F) -> bool
    where
        F: Fn() -> Result<(), StoreError>,
    {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(()) => {
                    if matches!(item, MergeItem::Node { .. }) {
                        report.node_merges += 1;
                    }
                    return true;
                }
                Err(e) if e.is_retryable() && attempt < self.options.max_write_retries => {
                    attempt += 1;
                    debug!(line, attempt, error = %e, "retrying write");
                    std::thread::sleep(self.options.retry_backoff * attempt);
                }
                Err(e) => {
                    warn!(line, ?item, error = %e, "write failed; skipping item");
                    report.failures.push(MergeFailure {
                        line,
                        item,
                        retryable: e.is_retryable(),
                        error: e.to_string(),
                    });
                    return false;
                }
            }
        }
    }
}

fn cell(columns: &ColumnMap, row: &SourceRow, field: SemanticField) -> Option<String> {
    columns
        .column(field)
        .and_then(|c| row.get(c))
        .and_then(normalize_name)
}

/// Symptom names extracted from a row, in column order, de-duplicated.
fn symptoms_of(kind: SourceKind, columns: &ColumnMap, row: &SourceRow) -> Vec<String> {
    let cells: Vec<&str> = match kind {
        SourceKind::SymptomCatalog => Vec::new(),
        SourceKind::DiseaseDetails => columns
            .column(SemanticField::TypicalSymptoms)
            .and_then(|c| row.get(c))
            .into_iter()
            .collect(),
        SourceKind::DiseaseCatalog => columns
            .symptom_columns()
            .iter()
            .filter_map(|c| row.get(c))
            .collect(),
    };

    let mut out: Vec<String> = Vec::new();
    for cell in cells {
        for name in split_symptoms(cell) {
            if !out.contains(&name) {
                out.push(name);
            }
        }
    }
    out
}
