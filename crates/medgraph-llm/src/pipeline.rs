//! Question lifecycle
//!
//! ```text
//! Received → Translating → Translated → Executing → Executed → Synthesizing → Answered
//!                 │                         │                      │
//!                 └──────────── Errored ◄───┴──────────────────────┘
//! ```
//!
//! Each question runs to a terminal state independently; one failure never
//! affects the next question.

use crate::answer::AnswerSynthesizer;
use crate::execute::{truncate_records, QueryExecutor, DEFAULT_MAX_RECORDS};
use crate::llm::{LlmError, TextGenerator};
use crate::prompt::{default_exemplars, QueryExemplar};
use crate::schema::SchemaIntrospector;
use crate::translate::{QueryTranslator, TranslateError};
use medgraph_storage::{GraphStore, Record, StoreError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionState {
    Received,
    Translating,
    Translated,
    Executing,
    Executed,
    Synthesizing,
    Answered,
    Errored,
}

impl QuestionState {
    pub fn can_transition_to(self, next: QuestionState) -> bool {
        use QuestionState::*;
        matches!(
            (self, next),
            (Received, Translating)
                | (Translating, Translated)
                | (Translated, Executing)
                | (Executing, Executed)
                | (Executed, Synthesizing)
                | (Synthesizing, Answered)
                | (Translating | Executing | Synthesizing, Errored)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, QuestionState::Answered | QuestionState::Errored)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QaError {
    #[error("translation failed: {0}")]
    TranslationFailed(#[source] TranslateError),
    #[error("query execution failed: {0}")]
    ExecutionFailed(#[source] StoreError),
    #[error("answer synthesis failed: {0}")]
    SynthesisFailed(#[source] LlmError),
}

impl QaError {
    pub fn kind(&self) -> &'static str {
        match self {
            QaError::TranslationFailed(_) => "translation_failed",
            QaError::ExecutionFailed(_) => "execution_failed",
            QaError::SynthesisFailed(_) => "synthesis_failed",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            QaError::TranslationFailed(e) => e.is_retryable(),
            QaError::ExecutionFailed(e) => e.is_retryable(),
            QaError::SynthesisFailed(e) => e.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QaFailure {
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
}

/// Everything one question went through, for display or JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct QaOutcome {
    pub question: String,
    /// Model that served the question's completions.
    pub model: String,
    pub state: QuestionState,
    pub transitions: Vec<QuestionState>,
    pub query: Option<String>,
    /// Records passed to synthesis, after truncation.
    pub records: Vec<Record>,
    pub total_records: usize,
    pub truncated: bool,
    pub answer: Option<String>,
    pub error: Option<QaFailure>,
}

impl QaOutcome {
    fn received(question: &str, model: &str) -> Self {
        Self {
            question: question.to_string(),
            model: model.to_string(),
            state: QuestionState::Received,
            transitions: vec![QuestionState::Received],
            query: None,
            records: Vec::new(),
            total_records: 0,
            truncated: false,
            answer: None,
            error: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.state == QuestionState::Answered
    }

    fn advance(&mut self, next: QuestionState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {:?} -> {:?}",
            self.state,
            next
        );
        self.state = next;
        self.transitions.push(next);
    }

    fn fail(mut self, err: QaError) -> Self {
        warn!(question = %self.question, kind = err.kind(), "question failed: {err}");
        self.error = Some(QaFailure {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        });
        self.advance(QuestionState::Errored);
        self
    }
}

#[derive(Debug, Clone)]
pub struct QaOptions {
    pub max_records: usize,
    pub max_tokens: Option<u32>,
}

impl Default for QaOptions {
    fn default() -> Self {
        Self {
            max_records: DEFAULT_MAX_RECORDS,
            max_tokens: None,
        }
    }
}

pub struct QaPipeline<'a, S: GraphStore + ?Sized, G: TextGenerator + ?Sized> {
    store: &'a S,
    generator: &'a G,
    exemplars: Vec<QueryExemplar>,
    options: QaOptions,
}

impl<'a, S: GraphStore + ?Sized, G: TextGenerator + ?Sized> QaPipeline<'a, S, G> {
    /// `options.max_records` is raised to at least 1; a zero cap would hand
    /// synthesis an empty context for a query that found rows.
    pub fn new(store: &'a S, generator: &'a G, options: QaOptions) -> Self {
        let options = QaOptions {
            max_records: options.max_records.max(1),
            ..options
        };
        Self {
            store,
            generator,
            exemplars: default_exemplars(),
            options,
        }
    }

    pub fn with_exemplars(mut self, exemplars: Vec<QueryExemplar>) -> Self {
        self.exemplars = exemplars;
        self
    }

    /// Answer one question. Failures are reported in the outcome, never raised.
    pub fn ask(&self, question: &str) -> QaOutcome {
        let mut outcome = QaOutcome::received(question, self.generator.model());

        outcome.advance(QuestionState::Translating);
        let schema = SchemaIntrospector::new(self.store).introspect();
        let translator = QueryTranslator::new(self.generator)
            .with_exemplars(self.exemplars.clone())
            .with_max_tokens(self.options.max_tokens);
        let query = match translator.translate(question, &schema) {
            Ok(query) => query,
            Err(e) => return outcome.fail(QaError::TranslationFailed(e)),
        };
        outcome.query = Some(query.clone());
        outcome.advance(QuestionState::Translated);

        outcome.advance(QuestionState::Executing);
        let records = match QueryExecutor::new(self.store).execute(&query) {
            Ok(records) => records,
            Err(e) => return outcome.fail(QaError::ExecutionFailed(e)),
        };
        outcome.total_records = records.len();
        let (records, truncated) = truncate_records(records, self.options.max_records);
        outcome.records = records;
        outcome.truncated = truncated;
        outcome.advance(QuestionState::Executed);

        outcome.advance(QuestionState::Synthesizing);
        let synthesizer = AnswerSynthesizer::new(self.generator).with_max_tokens(self.options.max_tokens);
        match synthesizer.synthesize(question, &outcome.records) {
            Ok(answer) => {
                outcome.answer = Some(answer);
                outcome.advance(QuestionState::Answered);
                info!(
                    records = outcome.total_records,
                    truncated = outcome.truncated,
                    "question answered"
                );
                outcome
            }
            Err(e) => outcome.fail(QaError::SynthesisFailed(e)),
        }
    }

    pub fn ask_all<I, Q>(&self, questions: I) -> Vec<QaOutcome>
    where
        I: IntoIterator<Item = Q>,
        Q: AsRef<str>,
    {
        questions.into_iter().map(|q| self.ask(q.as_ref())).collect()
    }
}
