use crate::models::{AnswerMode, ChunkMetadata, GeneratedAnswer};
use crate::traits::AnswerModel;
use std::collections::HashSet;
use std::fmt::Write;
use std::sync::Arc;

pub const NOT_CONFIGURED_ANSWER: &str = "Error: Gemini API Key is not configured.";
pub const GENERATION_FAILED_ANSWER: &str = "Error: Could not generate an answer from the AI model.";
pub const NO_CONTEXT_ANSWER: &str =
    "I could not find any relevant information in the provided documents to answer your question.";

const DOCTOR_PERSONA: &str = "You are an expert medical specialty assistant. Provide a concise, accurate, and evidence-based answer for a medical professional. Cite the sources provided.";
const PATIENT_PERSONA: &str = "You are a helpful medical assistant. Explain the following to a patient in simple, clear, and empathetic language. Do not use complex medical jargon. Focus on the main points.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RagPrompt {
    pub prompt: String,
    pub sources: String,
}

pub fn persona(mode: AnswerMode) -> &'static str {
    match mode {
        AnswerMode::Doctor => DOCTOR_PERSONA,
        AnswerMode::Patient => PATIENT_PERSONA,
    }
}

/// One `- {source} (Page {page})` line per distinct source page, in the order
/// they were first retrieved.
pub fn format_sources(retrieved: &[ChunkMetadata]) -> String {
    let mut seen = HashSet::new();
    let mut sources = String::new();

    for chunk in retrieved {
        let source_id = format!("{} (Page {})", chunk.source, chunk.page);
        if seen.insert(source_id.clone()) {
            let _ = writeln!(sources, "- {source_id}");
        }
    }

    sources
}

pub fn build_rag_prompt(query: &str, retrieved: &[ChunkMetadata], mode: AnswerMode) -> RagPrompt {
    let mut context = String::new();
    for (position, chunk) in retrieved.iter().enumerate() {
        let _ = write!(
            context,
            "\n--- Context {} (Source: {}, Page: {}) ---\n{}",
            position + 1,
            chunk.source,
            chunk.page,
            chunk.text
        );
    }

    let prompt = format!(
        "{persona}\n\n\
         You MUST answer the query using ONLY the provided context.\n\
         If the answer is not found in the context, state that clearly.\n\n\
         **QUERY:**\n{query}\n\n\
         **PROVIDED CONTEXT:**\n{context}\n\n\
         **ANSWER:**\n",
        persona = persona(mode),
    );

    RagPrompt {
        prompt,
        sources: format_sources(retrieved),
    }
}

/// Wraps the external answer model. Without a model (no credential) every
/// call answers with [`NOT_CONFIGURED_ANSWER`].
#[derive(Clone, Default)]
pub struct AnswerGenerator {
    model: Option<Arc<dyn AnswerModel>>,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn AnswerModel>) -> Self {
        Self { model: Some(model) }
    }

    pub fn unconfigured() -> Self {
        Self { model: None }
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    pub async fn generate_answer(
        &self,
        query: &str,
        retrieved: &[ChunkMetadata],
        mode: AnswerMode,
    ) -> GeneratedAnswer {
        let Some(model) = &self.model else {
            tracing::error!("answer model is not configured; set GEMINI_API_KEY");
            return GeneratedAnswer {
                answer: NOT_CONFIGURED_ANSWER.to_string(),
                sources: String::new(),
            };
        };

        let RagPrompt { prompt, sources } = build_rag_prompt(query, retrieved, mode);
        tracing::info!(model = model.name(), %mode, context_chunks = retrieved.len(), "generating answer");

        match model.complete(&prompt).await {
            Ok(answer) => GeneratedAnswer { answer, sources },
            Err(error) => {
                tracing::error!(%error, "answer generation failed");
                GeneratedAnswer {
                    answer: GENERATION_FAILED_ANSWER.to_string(),
                    sources,
                }
            }
        }
    }
}
