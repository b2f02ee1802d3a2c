//! The top-level configuration schema: `agents`, `gateway`, `channels`, and
//! `lanes`, matching the config table in the External Interfaces section.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration, loaded from `openclaw.{toml,yaml,json5}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenclawConfig {
    pub agents: AgentsConfig,
    pub gateway: GatewayConfig,
    pub channels: HashMap<String, ChannelConfig>,
    pub lanes: HashMap<String, LaneConfig>,
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    pub defaults: AgentDefaults,
    pub list: Vec<AgentOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentDefaults {
    pub model: String,
    pub workspace: String,
    pub context_management: ContextManagementConfig,
    pub sandbox: SandboxConfig,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-5".into(),
            workspace: String::new(),
            context_management: ContextManagementConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

/// Per-agent override; identified by `id` and merged over `defaults`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentOverride {
    pub id: String,
    pub model: Option<String>,
    pub workspace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextManagementConfig {
    pub enabled: bool,
    pub budget: BudgetConfig,
    pub rolling_summary: RollingSummaryConfig,
    pub semantic_history: SemanticHistoryConfig,
}

impl Default for ContextManagementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            budget: BudgetConfig::default(),
            rolling_summary: RollingSummaryConfig::default(),
            semantic_history: SemanticHistoryConfig::default(),
        }
    }
}

/// Ratios dividing the model's context window. Must sum to at most 1.0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BudgetConfig {
    pub system_prompt_ratio: f64,
    pub bootstrap_ratio: f64,
    pub history_ratio: f64,
    pub response_ratio: f64,
    pub min_response_tokens: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            system_prompt_ratio: 0.1,
            bootstrap_ratio: 0.1,
            history_ratio: 0.6,
            response_ratio: 0.2,
            min_response_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RollingSummaryConfig {
    pub enabled: bool,
    pub window_size: u32,
    pub summary_max_tokens: u32,
    pub trigger_threshold: f64,
}

impl Default for RollingSummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: 20,
            summary_max_tokens: 1024,
            trigger_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SemanticHistoryConfig {
    pub enabled: bool,
    pub max_retrieved_chunks: u32,
    pub min_relevance_score: f64,
}

impl Default for SemanticHistoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retrieved_chunks: 5,
            min_relevance_score: 0.3,
        }
    }
}

/// Sandbox mode: `host` runs every session directly, `non-main` sandboxes
/// everything except the primary session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SandboxMode {
    #[default]
    Host,
    NonMain,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    pub mode: SandboxMode,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    pub port: u16,
    pub bind: String,
    pub auth_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 18789,
            bind: "127.0.0.1".into(),
            auth_token: None,
        }
    }
}

/// `dmPolicy` governs whether DMs are accepted from arbitrary users or only
/// an allowlist.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DmPolicy {
    #[default]
    Open,
    AllowlistOnly,
    Closed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChannelConfig {
    pub dm_policy: DmPolicy,
    pub dm_history_limit: Option<u32>,
    pub dms: HashMap<String, DmOverride>,
    pub allowlist: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DmOverride {
    pub history_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LaneConfig {
    pub concurrency: u32,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self { concurrency: 1 }
    }
}

/// Per-model-provider settings, keyed by provider name (`"openai"`,
/// `"anthropic"`, ...). A provider with no entry is enabled by default and
/// falls back to its usual environment variable for credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, transparent)]
pub struct ProvidersConfig {
    pub entries: HashMap<String, ProviderEntry>,
}

impl ProvidersConfig {
    pub fn is_enabled(&self, provider: &str) -> bool {
        self.entries.get(provider).map(|e| e.enabled).unwrap_or(true)
    }

    pub fn get(&self, provider: &str) -> Option<&ProviderEntry> {
        self.entries.get(provider)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderEntry {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
}

impl Default for ProviderEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: None,
            base_url: None,
            model: None,
        }
    }
}
