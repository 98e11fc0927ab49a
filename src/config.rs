//! Runtime registry configuration.
//!
//! The global file lives at `~/.agent-runtime/runtimes.json`; a scope (a rig
//! or worker directory) may pin its own runtime in `.runtime/runtime.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::runtime::resume::RUNTIME_DIR;
use crate::runtime::{claude, codex, Delivery, Profile, Readiness, ReadinessStrategy};

pub const CONFIG_DIR: &str = ".agent-runtime";
pub const REGISTRY_FILE: &str = "runtimes.json";
pub const SCOPE_FILE: &str = "runtime.json";

/// Runtime used when nothing else selects one
pub const FALLBACK_RUNTIME: &str = claude::NAME;

/// Per-runtime overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeAdapterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<Readiness>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<Delivery>,
    /// Resume command template, e.g. `codex resume {session_id}`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<String>,
}

impl RuntimeAdapterConfig {
    /// Profile for `name`: the builtin one when it exists, otherwise one
    /// modelled on the builtin with the same readiness strategy.
    pub fn profile(&self, name: &str) -> Profile {
        let base = match name {
            claude::NAME => claude::profile(),
            codex::NAME => codex::profile(),
            _ => {
                let mut base = match self.ready {
                    Some(Readiness::Warmup) => codex::profile(),
                    _ => claude::profile(),
                };
                base.name = name.to_string();
                base.binary = name.to_string();
                base.process_names = Vec::new();
                base.resume_template = None;
                base.account_env = None;
                base
            }
        };
        self.apply(base)
    }

    pub fn apply(&self, mut profile: Profile) -> Profile {
        if let Some(bin) = self.bin.as_deref().filter(|b| !b.is_empty()) {
            profile.binary = bin.to_string();
        }
        if let Some(ready) = self.ready {
            if ready != profile.readiness.kind() {
                profile.readiness = match ready {
                    Readiness::Prompt => claude::profile().readiness,
                    Readiness::Warmup => ReadinessStrategy::Warmup { delay: codex::WARMUP },
                };
            }
        }
        if let Some(delivery) = self.delivery {
            // rpc has no transport here; keep it out of the accepted channels
            if delivery != Delivery::Rpc {
                if !profile.channels.contains(&delivery) {
                    profile.channels.push(delivery);
                }
                profile.default_delivery = delivery;
            }
        }
        if let Some(resume) = &self.resume {
            profile.resume_template = Some(resume.clone());
        }
        profile
    }
}

/// Contents of the global registry file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeRegistryConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub runtimes: BTreeMap<String, RuntimeAdapterConfig>,
}

impl RuntimeRegistryConfig {
    /// `~/.agent-runtime/runtimes.json`
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR)
            .join(REGISTRY_FILE)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), runtimes = config.runtimes.len(), "loaded runtime config");
        Ok(config)
    }

    /// Load `path`, treating a missing file as an empty configuration
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, content + "\n").map_err(io_err)
    }
}

/// Runtime pinned by one scope directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeOverride {
    #[serde(default)]
    pub runtime: String,
}

impl ScopeOverride {
    pub fn path(scope: &Path) -> PathBuf {
        scope.join(RUNTIME_DIR).join(SCOPE_FILE)
    }

    /// `Ok(None)` when the scope has no override file
    pub fn load(scope: &Path) -> Result<Option<Self>, ConfigError> {
        let path = Self::path(scope);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };
        let scoped: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        Ok(Some(scoped))
    }
}

/// Pick a runtime name: explicit, then the scope override, then the global
/// default, then claude. Blank values are skipped.
pub fn resolve_runtime_name(
    explicit: Option<&str>,
    scope: Option<&ScopeOverride>,
    config: &RuntimeRegistryConfig,
) -> String {
    explicit
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .or_else(|| scope.map(|s| s.runtime.trim()).filter(|n| !n.is_empty()))
        .or_else(|| config.default.as_deref().map(str::trim).filter(|n| !n.is_empty()))
        .unwrap_or(FALLBACK_RUNTIME)
        .to_string()
}
