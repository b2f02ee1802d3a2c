//! The `MemoryStore` trait implemented by `store_sqlite::SqliteMemoryStore`.

use async_trait::async_trait;

use crate::{
    schema::{ChunkRow, FileRow},
    search::SearchResult,
};

/// Persistence for tracked files, their chunks, and the embedding cache.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn upsert_file(&self, file: &FileRow) -> anyhow::Result<()>;
    async fn get_file(&self, path: &str) -> anyhow::Result<Option<FileRow>>;
    async fn delete_file(&self, path: &str) -> anyhow::Result<()>;
    async fn list_files(&self) -> anyhow::Result<Vec<FileRow>>;

    async fn upsert_chunks(&self, chunks: &[ChunkRow]) -> anyhow::Result<()>;
    async fn get_chunks_for_file(&self, path: &str) -> anyhow::Result<Vec<ChunkRow>>;
    async fn delete_chunks_for_file(&self, path: &str) -> anyhow::Result<()>;
    async fn get_chunk_by_id(&self, id: &str) -> anyhow::Result<Option<ChunkRow>>;

    async fn get_cached_embedding(&self, provider: &str, model: &str, hash: &str) -> anyhow::Result<Option<Vec<f32>>>;
    async fn put_cached_embedding(
        &self,
        provider: &str,
        model: &str,
        provider_key: &str,
        hash: &str,
        embedding: &[f32],
    ) -> anyhow::Result<()>;
    async fn count_cached_embeddings(&self) -> anyhow::Result<usize>;
    /// Evict the least-recently-updated cache entries until at most `keep` remain.
    async fn evict_embedding_cache(&self, keep: usize) -> anyhow::Result<usize>;

    async fn vector_search(&self, query_embedding: &[f32], limit: usize) -> anyhow::Result<Vec<SearchResult>>;
    async fn keyword_search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<SearchResult>>;
}
