//! The `EmbeddingProvider` trait implemented by each embedding backend
//! (`embeddings_openai`, `embeddings_local`, `embeddings_fallback`,
//! `embeddings_batch`).

use async_trait::async_trait;

/// Turns text into a fixed-size vector for semantic search.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single piece of text.
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Embed a batch of texts. Implementations may call the underlying API
    /// once per batch rather than once per text.
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// The model name, stored alongside each chunk so a later model switch
    /// doesn't silently mix incompatible vectors.
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dimensions(&self) -> usize;

    /// Stable key identifying this provider+model+base_url combination,
    /// used to key the embedding cache.
    fn provider_key(&self) -> &str;
}
