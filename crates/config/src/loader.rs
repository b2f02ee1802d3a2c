use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use tracing::{debug, warn};

use crate::{Error, Result, env_subst::substitute_env, schema::OpenclawConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["openclaw.toml", "openclaw.yaml", "openclaw.json5"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<OpenclawConfig> {
    let raw = std::fs::read_to_string(path)?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./openclaw.{toml,yaml,json5}` (project-local)
/// 2. `~/.config/openclaw/openclaw.{toml,yaml,json5}` (user-global)
///
/// Returns `OpenclawConfig::default()` if no config file is found.
pub fn discover_and_load() -> OpenclawConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    OpenclawConfig::default()
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    if let Some(dirs) = directories::ProjectDirs::from("", "", "openclaw") {
        let config_dir = dirs.config_dir();
        for name in CONFIG_FILENAMES {
            let p = config_dir.join(name);
            if p.exists() {
                return Some(p);
            }
        }
    }

    None
}

/// Returns the user-global config directory (`~/.config/openclaw/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "openclaw").map(|d| d.config_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    if let Some(path) = find_config_file() {
        return path;
    }
    config_dir().unwrap_or_else(|| PathBuf::from(".")).join("openclaw.toml")
}

/// Serialize `config` to TOML and write it to the user-global config path.
///
/// Creates parent directories if needed. Returns the path written to.
pub fn save_config(config: &OpenclawConfig) -> Result<PathBuf> {
    let path = find_or_default_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(config).map_err(|e| Error::message(format!("serialize config: {e}")))?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

fn parse_config(raw: &str, path: &Path) -> Result<OpenclawConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json5" | "json" => Ok(json5::from_str(raw)?),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

/// Outcome of a hot-reload attempt against the currently-loaded config.
#[derive(Debug, Clone, PartialEq)]
pub enum ReloadOutcome {
    /// The new config parsed and validated but is identical to the current one.
    Unchanged,
    /// The new config parsed, validated, and differs from the current one.
    Changed(OpenclawConfig),
    /// The new config failed to parse or validate; the previous config is retained.
    Invalid(String),
}

/// Holds the live config behind an atomically-swappable pointer and applies
/// reloads per the config reloader's contract: a valid, changed config is
/// swapped in and reported as `Changed`; an invalid one is rejected and the
/// previous config stays live.
pub struct ConfigStore {
    current: RwLock<Arc<OpenclawConfig>>,
}

impl ConfigStore {
    pub fn new(initial: OpenclawConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn get(&self) -> Arc<OpenclawConfig> {
        self.current.read().expect("config lock poisoned").clone()
    }

    /// Parse and validate `raw` (in the format implied by `path`'s extension),
    /// and swap it in if it's valid and different from the current config.
    pub fn reload(&self, raw: &str, path: &Path) -> ReloadOutcome {
        let substituted = substitute_env(raw);
        let parsed = match parse_config(&substituted, path) {
            Ok(cfg) => cfg,
            Err(e) => return ReloadOutcome::Invalid(e.to_string()),
        };
        if let Err(e) = crate::validate::validate(&parsed) {
            return ReloadOutcome::Invalid(e.to_string());
        }

        let current = self.get();
        if *current == parsed {
            return ReloadOutcome::Unchanged;
        }
        *self.current.write().expect("config lock poisoned") = Arc::new(parsed.clone());
        ReloadOutcome::Changed(parsed)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reload_detects_unchanged_config() {
        let store = ConfigStore::new(OpenclawConfig::default());
        let raw = toml::to_string(&OpenclawConfig::default()).unwrap();
        let outcome = store.reload(&raw, Path::new("openclaw.toml"));
        assert_eq!(outcome, ReloadOutcome::Unchanged);
    }

    #[test]
    fn reload_reports_changed_config() {
        let store = ConfigStore::new(OpenclawConfig::default());
        let raw = "[gateway]\nport = 9999\n";
        let outcome = store.reload(raw, Path::new("openclaw.toml"));
        match outcome {
            ReloadOutcome::Changed(cfg) => assert_eq!(cfg.gateway.port, 9999),
            other => panic!("expected Changed, got {other:?}"),
        }
        assert_eq!(store.get().gateway.port, 9999);
    }

    #[test]
    fn reload_rejects_invalid_config_and_keeps_previous() {
        let store = ConfigStore::new(OpenclawConfig::default());
        let raw = "not valid toml {{{";
        let outcome = store.reload(raw, Path::new("openclaw.toml"));
        assert!(matches!(outcome, ReloadOutcome::Invalid(_)));
        assert_eq!(store.get().gateway.port, 18789);
    }

    #[test]
    fn reload_rejects_config_failing_validation() {
        let store = ConfigStore::new(OpenclawConfig::default());
        let raw = "[lanes.default]\nconcurrency = 0\n";
        let outcome = store.reload(raw, Path::new("openclaw.toml"));
        assert!(matches!(outcome, ReloadOutcome::Invalid(_)));
    }
}
