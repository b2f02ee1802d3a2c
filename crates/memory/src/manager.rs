/// Memory manager: orchestrates file sync, chunking, embedding, and search.
use std::path::Path;

use {
    sha2::{Digest, Sha256},
    tracing::{debug, info, warn},
    walkdir::WalkDir,
};

use crate::{
    chunker::chunk_markdown,
    config::MemoryConfig,
    embeddings::EmbeddingProvider,
    schema::{ChunkRow, FileRow},
    search::{self, SearchResult},
    store::MemoryStore,
};

pub struct MemoryManager {
    config: MemoryConfig,
    store: Box<dyn MemoryStore>,
    embedder: Option<Box<dyn EmbeddingProvider>>,
}

/// Status info about the memory system.
#[derive(Debug, Clone)]
pub struct MemoryStatus {
    pub total_files: usize,
    pub total_chunks: usize,
    pub embedding_model: String,
    /// SQLite database file size in bytes (0 for in-memory DBs).
    pub db_size_bytes: u64,
}

impl MemoryStatus {
    /// Human-readable database size (e.g. "12.3 MB").
    pub fn db_size_display(&self) -> String {
        format_bytes(self.db_size_bytes)
    }
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{b} B"),
    }
}

impl MemoryManager {
    /// Create a memory manager with an embedding provider for hybrid (vector + keyword) search.
    pub fn new(
        config: MemoryConfig,
        store: Box<dyn MemoryStore>,
        embedder: Box<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            config,
            store,
            embedder: Some(embedder),
        }
    }

    /// Create a memory manager without embeddings. Keyword (FTS) search only.
    pub fn keyword_only(config: MemoryConfig, store: Box<dyn MemoryStore>) -> Self {
        Self {
            config,
            store,
            embedder: None,
        }
    }

    /// Whether this manager has an embedding provider for vector search.
    pub fn has_embeddings(&self) -> bool {
        self.embedder.is_some()
    }

    /// Get the citation mode for this manager.
    pub fn citation_mode(&self) -> crate::config::CitationMode {
        self.config.citations
    }

    /// Whether LLM reranking is enabled.
    pub fn llm_reranking_enabled(&self) -> bool {
        self.config.llm_reranking
    }

    /// Synchronize: walk configured directories, detect changed files, re-chunk and re-embed.
    pub async fn sync(&self) -> anyhow::Result<SyncReport> {
        let mut report = SyncReport::default();

        let mut discovered_paths = Vec::new();

        for dir in &self.config.memory_dirs {
            if !dir.exists() {
                debug!(?dir, "memory directory does not exist, skipping");
                continue;
            }

            for entry in WalkDir::new(dir).follow_links(true).into_iter().flatten() {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                if ext != "md" && ext != "markdown" {
                    continue;
                }

                let path_str = path.to_string_lossy().to_string();
                discovered_paths.push(path_str.clone());

                match self.sync_file(path, &path_str, &mut report).await {
                    Ok(changed) => {
                        if changed {
                            report.files_updated += 1;
                        } else {
                            report.files_unchanged += 1;
                        }
                    },
                    Err(e) => {
                        warn!(path = %path_str, error = %e, "failed to sync file");
                        report.errors += 1;
                    },
                }
            }
        }

        // Remove files no longer on disk.
        // Skip the full reconciliation when the DB file count matches the
        // discovered count and nothing was updated — the DB is already clean.
        let existing_files = self.store.list_files().await?;
        if existing_files.len() != discovered_paths.len() || report.files_updated > 0 {
            let discovered_set: std::collections::HashSet<&str> =
                discovered_paths.iter().map(|s| s.as_str()).collect();
            let mut removed_stale = 0usize;
            for file in existing_files {
                if !discovered_set.contains(file.path.as_str()) {
                    debug!(path = %file.path, "removing stale file from memory index");
                    self.store.delete_chunks_for_file(&file.path).await?;
                    self.store.delete_file(&file.path).await?;
                    report.files_removed += 1;
                    removed_stale += 1;
                }
            }
            if removed_stale > 0 {
                info!(
                    removed = removed_stale,
                    "memory: removed stale indexed files"
                );
            }
        }

        // LRU eviction on embedding cache
        let cache_count = self.store.count_cached_embeddings().await.unwrap_or(0);
        if cache_count > CACHE_MAX_ROWS {
            let evicted = self
                .store
                .evict_embedding_cache(CACHE_MAX_ROWS)
                .await
                .unwrap_or(0);
            if evicted > 0 {
                info!(evicted, "embedding cache: evicted old entries");
            }
        }

        Ok(report)
    }

    /// Sync a single file by path. Returns true if it was updated.
    pub async fn sync_path(&self, path: &Path) -> anyhow::Result<bool> {
        let path_str = path.to_string_lossy().to_string();
        let mut report = SyncReport::default();
        self.sync_file(path, &path_str, &mut report).await
    }

    /// Sync a single file. Returns true if it was updated. Accumulates cache stats in `report`.
    async fn sync_file(
        &self,
        path: &Path,
        path_str: &str,
        report: &mut SyncReport,
    ) -> anyhow::Result<bool> {
        let metadata = tokio::fs::metadata(path).await?;
        let mtime = metadata
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        let size = metadata.len() as i64;

        // Fast path: skip read+hash if mtime and size are unchanged.
        if let Some(existing) = self.store.get_file(path_str).await?
            && existing.mtime == mtime
            && existing.size == size
        {
            return Ok(false);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let hash = sha256_hex(&content);

        // Check if content hash is unchanged (mtime changed but content didn't).
        if let Some(existing) = self.store.get_file(path_str).await?
            && existing.hash == hash
        {
            // Update mtime so the fast path works next time.
            let file_row = FileRow {
                path: path_str.to_string(),
                source: existing.source,
                hash: existing.hash,
                mtime,
                size,
            };
            self.store.upsert_file(&file_row).await?;
            return Ok(false);
        }

        // Determine source from path
        let source = match path_str.contains("MEMORY") {
            true => "longterm",
            false => "daily",
        };

        // Update file record
        let file_row = FileRow {
            path: path_str.to_string(),
            source: source.to_string(),
            hash: hash.clone(),
            mtime,
            size,
        };
        self.store.upsert_file(&file_row).await?;

        // Chunk the content
        let raw_chunks =
            chunk_markdown(&content, self.config.chunk_size, self.config.chunk_overlap);

        // Delete old chunks
        self.store.delete_chunks_for_file(path_str).await?;

        // Generate embeddings (if provider available) and create chunk rows.
        let texts: Vec<String> = raw_chunks.iter().map(|c| c.text.clone()).collect();
        let chunk_hashes: Vec<String> = texts.iter().map(|t| sha256_hex(t)).collect();

        let (embeddings, model_name) = if let Some(ref embedder) = self.embedder {
            let provider_key = embedder.provider_key();
            let model = embedder.model_name();

            // Check cache for each chunk
            let mut cached: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
            for h in &chunk_hashes {
                let hit = self
                    .store
                    .get_cached_embedding(provider_key, model, h)
                    .await?;
                cached.push(hit);
            }

            // Collect indices of cache misses
            let miss_indices: Vec<usize> = cached
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_none())
                .map(|(i, _)| i)
                .collect();

            report.cache_hits += texts.len() - miss_indices.len();
            report.cache_misses += miss_indices.len();

            // Build embedding vec: cached hits + placeholder for misses
            let mut all_embeddings: Vec<Vec<f32>> =
                cached.into_iter().map(|c| c.unwrap_or_default()).collect();

            // Embed cache misses and store them
            if !miss_indices.is_empty() {
                let miss_texts: Vec<String> =
                    miss_indices.iter().map(|&i| texts[i].clone()).collect();
                let new_embs = embedder.embed_batch(&miss_texts).await?;

                for (idx, emb) in miss_indices.iter().zip(new_embs) {
                    self.store
                        .put_cached_embedding(
                            provider_key,
                            model,
                            provider_key,
                            &chunk_hashes[*idx],
                            &emb,
                        )
                        .await?;
                    all_embeddings[*idx] = emb;
                }
            }

            (Some(all_embeddings), model.to_string())
        } else {
            (None, String::new())
        };

        let chunk_rows: Vec<ChunkRow> = raw_chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let emb_blob = embeddings.as_ref().map(|embs| {
                    embs[i]
                        .iter()
                        .flat_map(|f| f.to_le_bytes())
                        .collect::<Vec<u8>>()
                });
                ChunkRow {
                    id: format!("{}:{}", path_str, i),
                    path: path_str.to_string(),
                    source: source.to_string(),
                    start_line: chunk.start_line as i64,
                    end_line: chunk.end_line as i64,
                    hash: chunk_hashes[i].clone(),
                    model: model_name.clone(),
                    text: chunk.text.clone(),
                    embedding: emb_blob,
                    updated_at: chrono_now(),
                }
            })
            .collect();

        self.store.upsert_chunks(&chunk_rows).await?;
        info!(path = %path_str, chunks = chunk_rows.len(), "synced file");

        Ok(true)
    }

    /// Search memory. Uses hybrid (vector + keyword) when embeddings are available,
    /// falls back to keyword-only search otherwise.
    pub async fn search(&self, query: &str, limit: usize) -> anyhow::Result<Vec<SearchResult>> {
        if let Some(ref embedder) = self.embedder {
            search::hybrid_search(
                self.store.as_ref(),
                embedder.as_ref(),
                query,
                limit,
                self.config.vector_weight,
                self.config.keyword_weight,
            )
            .await
        } else {
            search::keyword_only_search(self.store.as_ref(), query, limit).await
        }
    }

    /// Get a specific chunk by ID.
    pub async fn get_chunk(&self, id: &str) -> anyhow::Result<Option<ChunkRow>> {
        self.store.get_chunk_by_id(id).await
    }

    /// Get status information about the memory system.
    pub async fn status(&self) -> anyhow::Result<MemoryStatus> {
        let files = self.store.list_files().await?;
        let mut total_chunks = 0usize;
        for file in &files {
            let chunks = self.store.get_chunks_for_file(&file.path).await?;
            total_chunks += chunks.len();
        }
        let db_size_bytes = std::fs::metadata(&self.config.db_path)
            .map(|m| m.len())
            .unwrap_or(0);
        Ok(MemoryStatus {
            total_files: files.len(),
            total_chunks,
            embedding_model: self
                .embedder
                .as_ref()
                .map(|e| e.model_name().to_string())
                .unwrap_or_else(|| "none (keyword-only)".into()),
            db_size_bytes,
        })
    }
}

/// Sync report.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub files_updated: usize,
    pub files_unchanged: usize,
    pub files_removed: usize,
    pub errors: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
}

/// Maximum number of embedding cache rows before LRU eviction kicks in.
const CACHE_MAX_ROWS: usize = 50_000;

fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn chrono_now() -> String {
    // Simple ISO 8601 timestamp without chrono dependency
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", dur.as_secs())
}
