//! Prompt assembly.
//!
//! Instructions, schema, worked exemplars, query results and the user's
//! question are held as separate sections and only joined in [`PromptBuilder::build`].
//! Instructions go in the system message, each exemplar becomes a
//! user/assistant turn pair, and the remaining sections form the final user
//! message.

use crate::llm::Message;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryExemplar {
    pub question: String,
    pub query: String,
}

impl QueryExemplar {
    pub fn new(question: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            query: query.into(),
        }
    }
}

/// Question → query pairs steering the translator toward substring matching
/// and bounded result sets.
pub fn default_exemplars() -> Vec<QueryExemplar> {
    vec![
        QueryExemplar::new(
            "糖尿病有哪些症状？",
            "MATCH (d:Disease)-[:HAS_SYMPTOM]->(s:Symptom) WHERE d.name CONTAINS '糖尿病' RETURN s.name AS symptom LIMIT 20",
        ),
        QueryExemplar::new(
            "哪些疾病会引起头晕？",
            "MATCH (d:Disease)-[:HAS_SYMPTOM]->(s:Symptom) WHERE s.name CONTAINS '头晕' RETURN d.name AS disease LIMIT 20",
        ),
        QueryExemplar::new(
            "腰椎间盘突出的典型表现是什么",
            "MATCH (d:Disease)-[:HAS_SYMPTOM]->(s:Symptom) WHERE d.name CONTAINS '腰椎间盘突出' RETURN s.name AS symptom LIMIT 20",
        ),
        QueryExemplar::new(
            "感冒还有什么别的叫法？",
            "MATCH (d:Disease) WHERE d.name CONTAINS '感冒' RETURN d.name AS disease, d.aliases AS aliases LIMIT 20",
        ),
    ]
}

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    instructions: String,
    schema: Option<String>,
    exemplars: Vec<QueryExemplar>,
    context: Option<String>,
    question: String,
}

impl PromptBuilder {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            ..Self::default()
        }
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn exemplars(mut self, exemplars: &[QueryExemplar]) -> Self {
        self.exemplars = exemplars.to_vec();
        self
    }

    /// Query results the answer must be drawn from.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn question(mut self, question: impl Into<String>) -> Self {
        self.question = question.into();
        self
    }

    pub fn build(self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(2 + self.exemplars.len() * 2);
        messages.push(Message::system(self.instructions));

        for ex in &self.exemplars {
            messages.push(Message::user(ex.question.clone()));
            messages.push(Message::assistant(ex.query.clone()));
        }

        let mut user = String::new();
        if let Some(schema) = &self.schema {
            user.push_str("Graph schema:\n");
            user.push_str(schema.trim_end());
            user.push_str("\n\n");
        }
        if let Some(context) = &self.context {
            user.push_str("Query results:\n");
            user.push_str(context.trim_end());
            user.push_str("\n\n");
        }
        user.push_str("Question: ");
        user.push_str(self.question.trim());
        messages.push(Message::user(user));

        messages
    }
}
