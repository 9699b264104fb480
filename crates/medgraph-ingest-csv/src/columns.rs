//! Header synonym resolution
//!
//! Source files name the same semantic field differently (`疾病名称` vs
//! `Name`). The mapping lives in one declarative table and is resolved once
//! per file into a [`ColumnMap`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SemanticField {
    DiseaseName,
    SymptomName,
    TypicalSymptoms,
    Aliases,
    Description,
    Website,
}

impl SemanticField {
    pub const ALL: [SemanticField; 6] = [
        SemanticField::DiseaseName,
        SemanticField::SymptomName,
        SemanticField::TypicalSymptoms,
        SemanticField::Aliases,
        SemanticField::Description,
        SemanticField::Website,
    ];

    /// Accepted headers in priority order.
    pub fn default_headers(self) -> &'static [&'static str] {
        match self {
            SemanticField::DiseaseName => &["疾病名称", "Name", "name", "名称"],
            SemanticField::SymptomName => &["症状名称", "Name", "name", "名称"],
            SemanticField::TypicalSymptoms => &["典型症状", "Typical Symptoms", "症状"],
            SemanticField::Aliases => &["别名", "Aliases"],
            SemanticField::Description => &["描述", "Description"],
            SemanticField::Website => &["网址", "Website"],
        }
    }

    /// Fields that describe a node rather than list its symptoms.
    pub fn is_metadata(self) -> bool {
        !matches!(self, SemanticField::TypicalSymptoms)
    }
}

/// Substrings that mark a catalog column as symptom-bearing.
pub const SYMPTOM_COLUMN_MARKERS: [&str; 2] = ["症状", "symptom"];

/// Columns never treated as symptom-bearing, whatever their name suggests.
pub const DEFAULT_EXCLUDED_COLUMNS: [&str; 9] = [
    "疾病名称",
    "Name",
    "网址",
    "Website",
    "别名",
    "Aliases",
    "描述",
    "Description",
    "症状描述",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderSynonyms {
    table: BTreeMap<SemanticField, Vec<String>>,
    excluded: Vec<String>,
}

impl Default for HeaderSynonyms {
    fn default() -> Self {
        let table = SemanticField::ALL
            .into_iter()
            .map(|f| {
                let headers = f.default_headers().iter().map(|h| h.to_string()).collect();
                (f, headers)
            })
            .collect();
        Self {
            table,
            excluded: DEFAULT_EXCLUDED_COLUMNS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }
}

impl HeaderSynonyms {
    pub fn headers(&self, field: SemanticField) -> &[String] {
        self.table.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the accepted headers for one field.
    pub fn with_headers<I, S>(mut self, field: SemanticField, headers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .insert(field, headers.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude(mut self, header: impl Into<String>) -> Self {
        self.excluded.push(header.into());
        self
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// First accepted header for `field` present in `headers`.
    pub fn resolve(&self, field: SemanticField, headers: &[String]) -> Option<String> {
        self.headers(field)
            .iter()
            .find(|candidate| headers.iter().any(|h| h == *candidate))
            .cloned()
    }
}

/// Per-file resolution of semantic fields to concrete headers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMap {
    fields: BTreeMap<SemanticField, String>,
    symptom_columns: Vec<String>,
}

impl ColumnMap {
    /// Resolve `wanted` fields against a header row and collect every
    /// symptom-bearing column that is neither excluded nor already claimed by
    /// a metadata field.
    pub fn resolve(headers: &[String], synonyms: &HeaderSynonyms, wanted: &[SemanticField]) -> Self {
        let fields: BTreeMap<SemanticField, String> = wanted
            .iter()
            .filter_map(|f| synonyms.resolve(*f, headers).map(|h| (*f, h)))
            .collect();

        let claimed: Vec<&String> = fields
            .iter()
            .filter(|(f, _)| f.is_metadata())
            .map(|(_, h)| h)
            .collect();

        let symptom_columns = headers
            .iter()
            .filter(|h| is_symptom_header(h))
            .filter(|h| !synonyms.excluded().iter().any(|x| x == *h))
            .filter(|h| !claimed.contains(h))
            .cloned()
            .collect();

        Self {
            fields,
            symptom_columns,
        }
    }

    pub fn column(&self, field: SemanticField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn symptom_columns(&self) -> &[String] {
        &self.symptom_columns
    }
}

fn is_symptom_header(header: &str) -> bool {
    let lower = header.to_lowercase();
    SYMPTOM_COLUMN_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(hs: &[&str]) -> Vec<String> {
        hs.iter().map(|h| h.to_string()).collect()
    }

    const CATALOG: [SemanticField; 4] = [
        SemanticField::DiseaseName,
        SemanticField::Aliases,
        SemanticField::Description,
        SemanticField::Website,
    ];

    #[test]
    fn first_present_synonym_wins() {
        let syn = HeaderSynonyms::default();
        let hs = headers(&["name", "Name", "Typical Symptoms"]);
        assert_eq!(syn.resolve(SemanticField::DiseaseName, &hs).as_deref(), Some("Name"));
        assert_eq!(
            syn.resolve(SemanticField::TypicalSymptoms, &hs).as_deref(),
            Some("Typical Symptoms")
        );
        assert_eq!(syn.resolve(SemanticField::Website, &hs), None);
    }

    #[test]
    fn chinese_and_english_headers_resolve_to_same_field() {
        let syn = HeaderSynonyms::default();
        let zh = ColumnMap::resolve(&headers(&["疾病名称", "典型症状"]), &syn, &[SemanticField::DiseaseName]);
        let en = ColumnMap::resolve(&headers(&["Name", "Typical Symptoms"]), &syn, &[SemanticField::DiseaseName]);
        assert_eq!(zh.column(SemanticField::DiseaseName), Some("疾病名称"));
        assert_eq!(en.column(SemanticField::DiseaseName), Some("Name"));
    }

    #[test]
    fn symptom_description_column_is_excluded() {
        let syn = HeaderSynonyms::default();
        let map = ColumnMap::resolve(
            &headers(&["疾病名称", "症状1", "症状2", "症状描述", "网址"]),
            &syn,
            &CATALOG,
        );
        assert_eq!(map.symptom_columns(), &["症状1".to_string(), "症状2".to_string()]);
    }

    #[test]
    fn english_related_symptom_columns_are_detected() {
        let syn = HeaderSynonyms::default();
        let map = ColumnMap::resolve(
            &headers(&[
                "Name",
                "Website",
                "Related Symptom 1",
                "Related Symptom 2",
                "Description",
            ]),
            &syn,
            &CATALOG,
        );
        assert_eq!(
            map.symptom_columns(),
            &["Related Symptom 1".to_string(), "Related Symptom 2".to_string()]
        );
    }

    #[test]
    fn resolved_metadata_header_is_never_symptom_bearing() {
        let syn = HeaderSynonyms::default().with_headers(SemanticField::Description, ["症状说明"]);
        let map = ColumnMap::resolve(&headers(&["Name", "症状说明", "主要症状"]), &syn, &CATALOG);
        assert_eq!(map.column(SemanticField::Description), Some("症状说明"));
        assert_eq!(map.symptom_columns(), &["主要症状".to_string()]);
    }

    #[test]
    fn custom_exclusions_apply() {
        let syn = HeaderSynonyms::default().exclude("症状来源");
        let map = ColumnMap::resolve(&headers(&["Name", "症状来源", "症状"]), &syn, &CATALOG);
        assert_eq!(map.symptom_columns(), &["症状".to_string()]);
    }
}
