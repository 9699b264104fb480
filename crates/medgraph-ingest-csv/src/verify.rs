//! Post-ingestion verification. Read-only.

use crate::builder::IngestReport;
use medgraph_storage::{GraphCounts, GraphStore, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VerificationWarning {
    /// Disease rows were merged but the graph holds no Disease node.
    EmptyGraph { rows_merged: usize },
    /// Diseases exist but nothing links them to symptoms.
    NoRelationships,
    WriteFailures { count: usize },
    UnreadableSources { count: usize },
}

impl fmt::Display for VerificationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationWarning::EmptyGraph { rows_merged } => write!(
                f,
                "no Disease nodes after merging {rows_merged} disease rows; ingestion likely failed silently"
            ),
            VerificationWarning::NoRelationships => {
                write!(f, "Disease nodes exist but there are no HAS_SYMPTOM relationships")
            }
            VerificationWarning::WriteFailures { count } => {
                write!(f, "{count} writes failed and were skipped")
            }
            VerificationWarning::UnreadableSources { count } => {
                write!(f, "{count} sources could not be read")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub counts: GraphCounts,
    pub samples: Vec<(String, String)>,
    pub warnings: Vec<VerificationWarning>,
}

impl VerificationSummary {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Count the graph, sample a few pairs, and flag suspicious outcomes.
///
/// `report` is the import that just ran, if any. Without it only the graph
/// shape itself is checked.
pub fn verify<S: GraphStore + ?Sized>(
    store: &S,
    report: Option<&IngestReport>,
    samples: usize,
) -> Result<VerificationSummary, StoreError> {
    let counts = store.counts()?;
    let samples = store.sample_pairs(samples)?;
    let mut warnings = Vec::new();

    if let Some(report) = report {
        let rows_merged = report.disease_rows_merged();
        if counts.diseases == 0 && rows_merged > 0 {
            warnings.push(VerificationWarning::EmptyGraph { rows_merged });
        }
        let failures = report.failure_count();
        if failures > 0 {
            warnings.push(VerificationWarning::WriteFailures { count: failures });
        }
        if !report.unreadable.is_empty() {
            warnings.push(VerificationWarning::UnreadableSources {
                count: report.unreadable.len(),
            });
        }
    }
    if counts.diseases > 0 && counts.has_symptom == 0 {
        warnings.push(VerificationWarning::NoRelationships);
    }

    info!(
        diseases = counts.diseases,
        symptoms = counts.symptoms,
        has_symptom = counts.has_symptom,
        "verification counts"
    );
    for w in &warnings {
        warn!("{w}");
    }

    Ok(VerificationSummary {
        counts,
        samples,
        warnings,
    })
}
