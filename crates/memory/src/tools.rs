/// Agent tools for memory search and retrieval.
use std::sync::Arc;

use {async_trait::async_trait, relaykit_agents::tool_registry::AgentTool, serde_json::json};

use crate::manager::MemoryManager;

/// Tool: search memory with a natural language query.
pub struct MemorySearchTool {
    manager: Arc<MemoryManager>,
}

impl MemorySearchTool {
    pub fn new(manager: Arc<MemoryManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl AgentTool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Search agent memory using hybrid vector + keyword search. Returns relevant chunks from daily logs and long-term memory files."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of results to return",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let query = params["query"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'query' parameter"))?;
        let limit = params["limit"].as_u64().unwrap_or(5) as usize;

        let results = self.manager.search(query, limit).await?;

        // Determine if we should include citations based on config and result set.
        let include_citations = crate::search::SearchResult::should_include_citations(
            &results,
            self.manager.citation_mode(),
        );

        let items: Vec<serde_json::Value> = results
            .iter()
            .map(|r| {
                let text = if include_citations {
                    r.text_with_citation()
                } else {
                    r.text.clone()
                };
                json!({
                    "chunk_id": r.chunk_id,
                    "path": r.path,
                    "source": r.source,
                    "start_line": r.start_line,
                    "end_line": r.end_line,
                    "score": r.score,
                    "text": text,
                    "citation": format!("{}#{}", r.path, r.start_line),
                })
            })
            .collect();

        Ok(json!({ "results": items, "citations_enabled": include_citations }))
    }
}

/// Tool: get a specific memory chunk by ID.
pub struct MemoryGetTool {
    manager: Arc<MemoryManager>,
}

impl MemoryGetTool {
    pub fn new(manager: Arc<MemoryManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl AgentTool for MemoryGetTool {
    fn name(&self) -> &str {
        "memory_get"
    }

    fn description(&self) -> &str {
        "Retrieve a specific memory chunk by its ID. Use this to get the full text of a chunk found via memory_search."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "chunk_id": {
                    "type": "string",
                    "description": "The chunk ID to retrieve"
                }
            },
            "required": ["chunk_id"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let chunk_id = params["chunk_id"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("missing 'chunk_id' parameter"))?;

        match self.manager.get_chunk(chunk_id).await? {
            Some(chunk) => Ok(json!({
                "chunk_id": chunk.id,
                "path": chunk.path,
                "source": chunk.source,
                "start_line": chunk.start_line,
                "end_line": chunk.end_line,
                "text": chunk.text,
            })),
            None => Ok(json!({
                "error": "chunk not found",
                "chunk_id": chunk_id,
            })),
        }
    }
}
