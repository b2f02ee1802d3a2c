//! Declarative configuration: loading, validation, env substitution, and
//! hot-reload.
//!
//! Config files: `openclaw.toml`, `openclaw.yaml`, or `openclaw.json5`.
//! Searched in `./` then `~/.config/openclaw/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Context, Error, Result},
    loader::{ConfigStore, ReloadOutcome, config_dir, discover_and_load, find_or_default_config_path, load_config, save_config},
    schema::{
        AgentDefaults, AgentOverride, AgentsConfig, BudgetConfig, ChannelConfig, ContextManagementConfig, DmOverride,
        DmPolicy, GatewayConfig, LaneConfig, OpenclawConfig, RollingSummaryConfig, SandboxConfig, SandboxMode,
        SemanticHistoryConfig,
    },
    validate::validate,
};
