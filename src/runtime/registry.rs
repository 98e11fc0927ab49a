use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::adapter::{Profile, TerminalRuntime};
use super::{claude, codex, AgentRuntime};
use crate::config::{RuntimeAdapterConfig, RuntimeRegistryConfig};
use crate::error::{Result, RuntimeError};
use crate::hooks::{HookSink, NoopSink};
use crate::tmux::TerminalBackend;

/// Builds an adapter bound to the given backend
pub type RuntimeFactory = Arc<dyn Fn(Arc<dyn TerminalBackend>) -> Box<dyn AgentRuntime> + Send + Sync>;

/// Name to factory map.
///
/// Owned by the composition root and passed to whoever resolves adapters;
/// safe to share between tasks.
#[derive(Default)]
pub struct Registry {
    factories: RwLock<HashMap<String, RuntimeFactory>>,
}

impl Registry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// `claude` and `codex` with their stock profiles
    pub fn with_builtins() -> Self {
        Self::from_config(&RuntimeRegistryConfig::default(), Arc::new(NoopSink))
    }

    /// Builtins plus every runtime named in `config`, overrides applied.
    /// Adapters built from this registry report lifecycle events to `hooks`.
    pub fn from_config(config: &RuntimeRegistryConfig, hooks: Arc<dyn HookSink>) -> Self {
        let registry = Self::new();
        let defaults = RuntimeAdapterConfig::default();
        for name in [claude::NAME, codex::NAME] {
            let overrides = config.runtimes.get(name).unwrap_or(&defaults);
            registry.register_profile(overrides.profile(name), hooks.clone());
        }
        for (name, overrides) in &config.runtimes {
            if name != claude::NAME && name != codex::NAME {
                registry.register_profile(overrides.profile(name), hooks.clone());
            }
        }
        registry
    }

    /// Install `factory` under `name`, replacing any previous one
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn(Arc<dyn TerminalBackend>) -> Box<dyn AgentRuntime> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories.insert(name.to_string(), Arc::new(factory)).is_some() {
            debug!(runtime = name, "replaced runtime factory");
        }
    }

    /// Register a [`TerminalRuntime`] for `profile` under the profile's name
    pub fn register_profile(&self, profile: Profile, hooks: Arc<dyn HookSink>) {
        let name = profile.name.clone();
        self.register(&name, move |backend| {
            Box::new(TerminalRuntime::new(profile.clone(), backend).with_hooks(hooks.clone()))
        });
    }

    /// Construct the adapter registered under `name`
    pub fn get(&self, name: &str, backend: Arc<dyn TerminalBackend>) -> Result<Box<dyn AgentRuntime>> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::NotRegistered(name.to_string()))?;
        Ok(factory(backend))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}
