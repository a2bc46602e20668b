use crate::generator::{AnswerGenerator, NO_CONTEXT_ANSWER};
use crate::models::{AnswerMode, ChunkMetadata, GeneratedAnswer};
use crate::store::{VectorIndexStore, DEFAULT_TOP_K};
use crate::PipelineError;
use std::sync::Arc;

/// Retrieval followed by grounded generation, the request path behind the
/// HTTP API and the `ask` command.
pub struct RagPipeline {
    store: Arc<VectorIndexStore>,
    generator: AnswerGenerator,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(store: Arc<VectorIndexStore>, generator: AnswerGenerator) -> Self {
        Self {
            store,
            generator,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn store(&self) -> &Arc<VectorIndexStore> {
        &self.store
    }

    /// Embedding and index search are blocking, so they run off the async
    /// executor.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ChunkMetadata>, PipelineError> {
        let store = Arc::clone(&self.store);
        let query = query.to_string();
        let top_k = self.top_k;

        tokio::task::spawn_blocking(move || store.search_or_empty(&query, top_k))
            .await
            .map_err(|error| PipelineError::Blocking(error.to_string()))
    }

    pub async fn answer(&self, query: &str, mode: AnswerMode) -> Result<GeneratedAnswer, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        tracing::info!(%mode, "received query");
        let retrieved = self.retrieve(query).await?;
        if retrieved.is_empty() {
            return Ok(GeneratedAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: String::new(),
            });
        }

        Ok(self.generator.generate_answer(query, &retrieved, mode).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::models::Chunk;
    use crate::traits::AnswerModel;
    use crate::GenerationError;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct EchoModel;

    #[async_trait]
    impl AnswerModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            Ok(format!("echo:{}", prompt.len()))
        }
    }

    fn store_at(dir: &std::path::Path) -> Arc<VectorIndexStore> {
        Arc::new(VectorIndexStore::new(dir, Arc::new(CharacterNgramEmbedder::default())))
    }

    fn chunk(source: &str, page: u32, text: &str) -> Chunk {
        Chunk {
            text: text.to_string(),
            metadata: crate::models::ChunkMetadata::new(source, page, 0, text.to_string()),
        }
    }

    #[tokio::test]
    async fn missing_index_yields_no_context_answer() {
        let dir = tempdir().unwrap();
        let pipeline = RagPipeline::new(store_at(dir.path()), AnswerGenerator::new(Arc::new(EchoModel)));

        let answer = pipeline.answer("What is sepsis?", AnswerMode::Doctor).await.unwrap();
        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert_eq!(answer.sources, "");
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let dir = tempdir().unwrap();
        let pipeline = RagPipeline::new(store_at(dir.path()), AnswerGenerator::unconfigured());
        assert!(matches!(
            pipeline.answer("  ", AnswerMode::Doctor).await,
            Err(PipelineError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn retrieved_context_flows_into_generation() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());
        store
            .build(&[
                chunk("sepsis.pdf", 2, "Sepsis is life-threatening organ dysfunction."),
                chunk("asthma.pdf", 1, "Inhaled corticosteroids control asthma."),
            ])
            .unwrap();

        let pipeline =
            RagPipeline::new(store, AnswerGenerator::new(Arc::new(EchoModel))).with_top_k(1);
        let answer = pipeline
            .answer("Sepsis is life-threatening organ dysfunction.", AnswerMode::Patient)
            .await
            .unwrap();

        assert!(answer.answer.starts_with("echo:"));
        assert_eq!(answer.sources, "- sepsis.pdf (Page 2)\n");
    }

    #[tokio::test]
    async fn unconfigured_model_still_answers_with_fixed_error() {
        let dir = tempdir().unwrap();
        let store = store_at(dir.path());
        store.build(&[chunk("a.pdf", 1, "Paracetamol overdose harms the liver.")]).unwrap();

        let pipeline = RagPipeline::new(store, AnswerGenerator::unconfigured());
        let answer = pipeline.answer("paracetamol", AnswerMode::Doctor).await.unwrap();

        assert_eq!(answer.answer, crate::generator::NOT_CONFIGURED_ANSWER);
        assert_eq!(answer.sources, "");
    }
}
