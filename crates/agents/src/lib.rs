//! LLM agent runtime: model selection, prompt building, tool execution, streaming.

/// Shared HTTP client for LLM providers.
///
/// All providers that don't need custom redirect/proxy settings should
/// reuse this client to share connection pools, DNS cache, and TLS sessions.
pub fn shared_http_client() -> &'static reqwest::Client {
    static CLIENT: std::sync::LazyLock<reqwest::Client> =
        std::sync::LazyLock::new(reqwest::Client::new);
    &CLIENT
}

pub mod model;
pub mod prompt;
pub mod provider_chain;
pub mod providers;
pub mod runner;
pub mod tool_registry;
