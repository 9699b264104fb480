//! CSV ingestion for medgraph
//!
//! Turns heterogeneous disease/symptom spreadsheets into identity merges:
//! - `reader`: encoding detection (UTF-8, GBK, GB18030) and row records
//! - `columns`: declarative header synonyms, resolved once per file
//! - `normalize`: the single name-normalization and splitting rule
//! - `builder`: per-row upserts with skip-and-continue failure handling
//! - `verify`: read-only post-ingestion summary

pub mod builder;
pub mod columns;
pub mod normalize;
pub mod reader;
pub mod verify;

use std::path::PathBuf;

pub use builder::{
    GraphMergeBuilder, IngestOptions, IngestReport, IngestSource, MergeFailure, MergeItem,
    RowOutcome, SourceKind, SourceReport, UnreadableSource,
};
pub use columns::{ColumnMap, HeaderSynonyms, SemanticField};
pub use normalize::{normalize_name, split_symptoms};
pub use reader::{read_source, SourceRow, SourceTable};
pub use verify::{verify, VerificationSummary, VerificationWarning};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The file could not be read, or no candidate encoding produced a
    /// header carrying the expected field.
    #[error("source {} is unreadable: {reason}", .path.display())]
    SourceUnreadable { path: PathBuf, reason: String },
}
