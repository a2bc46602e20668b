use crate::GenerationError;
use async_trait::async_trait;

/// External language model that turns a fully built prompt into text.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError>;
}
