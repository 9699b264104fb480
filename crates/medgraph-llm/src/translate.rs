//! Question → Cypher translation.
//!
//! The model's reply is untrusted text. It is cleaned into a single bare
//! statement, then every label and relationship type it names is checked
//! against the live schema before anything touches the store.

use crate::llm::{CompletionRequest, LlmError, TextGenerator};
use crate::prompt::{default_exemplars, PromptBuilder, QueryExemplar};
use crate::schema::SchemaContext;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::debug;

pub const QUERY_TEMPERATURE: f32 = 0.0;

pub const QUERY_INSTRUCTIONS: &str = "You translate medical questions into one Cypher query over a disease-symptom knowledge graph.
Rules:
- Use only the node labels, relationship types and properties listed in the graph schema.
- Match names with CONTAINS instead of equality so partial names still match.
- End every query with LIMIT 20 or a smaller limit.
- Reply with the query alone, without explanation or markdown fences.";

/// Language tags accepted right after an opening code fence.
const FENCE_TAGS: [&str; 5] = ["cypher", "neo4j", "sql", "gql", "text"];

const LABEL_PREFIXES: [&str; 3] = ["cypher query:", "cypher:", "query:"];

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error(transparent)]
    Generation(#[from] LlmError),
    #[error("model returned an empty query")]
    Empty,
    #[error("query references vocabulary outside the graph schema: {}", .unknown.join(", "))]
    Ungrounded { query: String, unknown: Vec<String> },
    #[error("invalid vocabulary pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl TranslateError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, TranslateError::Generation(e) if e.is_retryable())
    }
}

pub struct QueryTranslator<'g, G: TextGenerator + ?Sized> {
    generator: &'g G,
    exemplars: Vec<QueryExemplar>,
    max_tokens: Option<u32>,
}

impl<'g, G: TextGenerator + ?Sized> QueryTranslator<'g, G> {
    pub fn new(generator: &'g G) -> Self {
        Self {
            generator,
            exemplars: default_exemplars(),
            max_tokens: None,
        }
    }

    pub fn with_exemplars(mut self, exemplars: Vec<QueryExemplar>) -> Self {
        self.exemplars = exemplars;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn translate(&self, question: &str, schema: &SchemaContext) -> Result<String, TranslateError> {
        let messages = PromptBuilder::new(QUERY_INSTRUCTIONS)
            .schema(schema.text.clone())
            .exemplars(&self.exemplars)
            .question(question)
            .build();
        let request = CompletionRequest {
            messages,
            temperature: Some(QUERY_TEMPERATURE),
            max_tokens: self.max_tokens,
        };

        let completion = self.generator.complete(&request)?;
        let query = clean_query(&completion.text);
        if query.is_empty() {
            return Err(TranslateError::Empty);
        }

        if let Some(labels) = &schema.labels {
            let used = referenced_vocabulary(&query)?;
            let mut unknown: Vec<String> = used
                .node_labels
                .iter()
                .filter(|l| !labels.has_node_label(l))
                .cloned()
                .collect();
            unknown.extend(
                used.relationship_types
                    .iter()
                    .filter(|r| !labels.has_relationship_type(r))
                    .cloned(),
            );
            if !unknown.is_empty() {
                return Err(TranslateError::Ungrounded { query, unknown });
            }
        }

        debug!(%query, "translated question");
        Ok(query)
    }
}

/// Reduce a model reply to one bare statement.
///
/// - keeps only the first fenced block, dropping a known language tag
/// - drops a leading `Cypher:` / `Cypher Query:` / `Query:` label
/// - drops trailing semicolons
pub fn clean_query(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(open) = text.find("```") {
        let after = &text[open + 3..];
        let tag_len = after
            .bytes()
            .take_while(|b| b.is_ascii_alphanumeric())
            .count();
        let tag = after[..tag_len].to_ascii_lowercase();
        let body = if FENCE_TAGS.contains(&tag.as_str()) {
            &after[tag_len..]
        } else {
            after
        };
        text = match body.find("```") {
            Some(close) => &body[..close],
            None => body,
        }
        .trim();
    }

    for prefix in LABEL_PREFIXES {
        let matched = text
            .get(..prefix.len())
            .map_or(false, |head| head.eq_ignore_ascii_case(prefix));
        if matched {
            text = text[prefix.len()..].trim_start();
            break;
        }
    }

    text.trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Vocabulary {
    pub node_labels: BTreeSet<String>,
    pub relationship_types: BTreeSet<String>,
}

/// Labels and relationship types a query names: node patterns, relationship
/// patterns, and label tests such as `WHERE n:Disease` or `(n:Disease|Drug)`.
/// String literals and map keys are ignored.
pub fn referenced_vocabulary(query: &str) -> Result<Vocabulary, regex::Error> {
    let literal_re = Regex::new(r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*""#)?;
    let map_key_re = Regex::new(r"([{,])\s*`?\w+`?\s*:")?;
    let rel_re = Regex::new(r"\[\s*\w*\s*:\s*(`?\w+`?(?:\s*\|\s*:?\s*`?\w+`?)*)")?;
    // `(:A`, `(n:A`, `n:A`, with `:`, `|`, `&`, `!` and grouping in label expressions
    let label_re = Regex::new(
        r"(?:\(|\b\w+)\s*(:[(!\s]*`?\w+`?\)*(?:\s*[:|&][(!\s]*`?\w+`?\)*)*)",
    )?;

    let stripped = literal_re.replace_all(query, "''");
    let stripped = map_key_re.replace_all(&stripped, "$1");
    let mut vocab = Vocabulary::default();

    for cap in rel_re.captures_iter(&stripped) {
        vocab
            .relationship_types
            .extend(split_names(&cap[1], &['|']));
    }
    let without_rels = rel_re.replace_all(&stripped, "[");
    for cap in label_re.captures_iter(&without_rels) {
        vocab.node_labels.extend(split_names(&cap[1], &[':', '|', '&']));
    }
    Ok(vocab)
}

fn split_names<'a>(group: &'a str, seps: &'a [char]) -> impl Iterator<Item = String> + 'a {
    group
        .split(seps)
        .map(|s| {
            s.trim_matches(|c: char| matches!(c, '`' | ':' | '!' | '(' | ')') || c.is_whitespace())
                .to_string()
        })
        .filter(|s| !s.is_empty())
}
