//! Question answering over the medgraph knowledge graph
//!
//! ```text
//!  question ──► SchemaIntrospector ──► QueryTranslator ──► QueryExecutor ──► AnswerSynthesizer ──► answer
//!                  (live labels)        (LLM, temp 0.0)    (graph store)     (LLM, temp 0.5)
//! ```
//!
//! The LLM is untrusted: it proposes one Cypher statement, the store runs it,
//! and the answer is written only from the rows that came back. Empty results
//! never reach the LLM.

pub mod answer;
pub mod execute;
pub mod llm;
pub mod pipeline;
pub mod prompt;
pub mod schema;
pub mod translate;

pub use answer::{AnswerSynthesizer, ANSWER_TEMPERATURE, NO_INFORMATION_REPLY};
pub use execute::{truncate_records, QueryExecutor, DEFAULT_MAX_RECORDS};
pub use llm::providers::{ConfigError, LlmConfig, OpenAiClient};
pub use llm::{Completion, CompletionRequest, LlmError, Message, Role, TextGenerator, Usage};
pub use pipeline::{QaError, QaFailure, QaOptions, QaOutcome, QaPipeline, QuestionState};
pub use prompt::{default_exemplars, PromptBuilder, QueryExemplar};
pub use schema::{render_schema, SchemaContext, SchemaIntrospector, DEGRADED_SCHEMA_TEXT};
pub use translate::{
    clean_query, referenced_vocabulary, QueryTranslator, TranslateError, Vocabulary, QUERY_TEMPERATURE,
};
