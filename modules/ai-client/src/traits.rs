use anyhow::Result;
use async_trait::async_trait;

/// Text embedding provider. Implemented by the OpenAI-compatible client;
/// mocked in tests that exercise the enrichment pipeline.
#[async_trait]
pub trait EmbedAgent: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;
}
