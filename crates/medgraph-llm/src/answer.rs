//! Answer synthesis from query results.

use crate::llm::{CompletionRequest, LlmError, TextGenerator};
use crate::prompt::PromptBuilder;
use medgraph_storage::Record;
use tracing::debug;

pub const ANSWER_TEMPERATURE: f32 = 0.5;

/// Reply for questions whose query found nothing. The model is not consulted.
pub const NO_INFORMATION_REPLY: &str = "抱歉，数据库中没有找到相关信息。";

pub const ANSWER_INSTRUCTIONS: &str = "You are a medical knowledge assistant. Answer the user's question in Chinese using only the knowledge-graph query results provided. Do not add facts that the results do not contain. If the results only partly answer the question, say what they cover.";

pub struct AnswerSynthesizer<'g, G: TextGenerator + ?Sized> {
    generator: &'g G,
    max_tokens: Option<u32>,
}

impl<'g, G: TextGenerator + ?Sized> AnswerSynthesizer<'g, G> {
    pub fn new(generator: &'g G) -> Self {
        Self {
            generator,
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn synthesize(&self, question: &str, records: &[Record]) -> Result<String, LlmError> {
        if records.is_empty() {
            debug!("no records; using fixed reply");
            return Ok(NO_INFORMATION_REPLY.to_string());
        }

        let context = serde_json::to_string_pretty(records)
            .map_err(|e| LlmError::InvalidResponse(format!("failed to encode query results: {e}")))?;
        let messages = PromptBuilder::new(ANSWER_INSTRUCTIONS)
            .context(context)
            .question(question)
            .build();
        let request = CompletionRequest {
            messages,
            temperature: Some(ANSWER_TEMPERATURE),
            max_tokens: self.max_tokens,
        };

        let answer = self.generator.complete(&request)?.text.trim().to_string();
        if answer.is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(answer)
    }
}
