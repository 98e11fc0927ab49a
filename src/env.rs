//! Canonical environment variables.
//!
//! Adapters may additionally export program-native names (for example an
//! account directory variable); code in this crate reads only these.

use std::path::Path;

pub const SESSION_ID: &str = "GT_SESSION_ID";
pub const ROLE: &str = "GT_ROLE";
pub const RIG: &str = "GT_RIG";
pub const WORKER: &str = "GT_WORKER";
pub const ACTOR: &str = "GT_ACTOR";
pub const WORKDIR: &str = "GT_WORKDIR";

/// Identity of the agent as described by its environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentEnv {
    pub session_id: String,
    pub role: String,
    pub rig: String,
    pub worker: String,
    pub actor: String,
    pub work_dir: String,
}

impl AgentEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).unwrap_or_default();
        Self {
            session_id: get(SESSION_ID),
            role: get(ROLE),
            rig: get(RIG),
            worker: get(WORKER),
            actor: get(ACTOR),
            work_dir: get(WORKDIR),
        }
    }

    /// Identity for a session being created
    pub fn for_session(session_id: &str, work_dir: &Path) -> Self {
        Self {
            session_id: session_id.to_string(),
            work_dir: work_dir.to_string_lossy().into_owned(),
            ..Self::from_env()
        }
    }

    /// Non-empty variables as `(name, value)` pairs
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        [
            (SESSION_ID, &self.session_id),
            (ROLE, &self.role),
            (RIG, &self.rig),
            (WORKER, &self.worker),
            (ACTOR, &self.actor),
            (WORKDIR, &self.work_dir),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (key, value.clone()))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_lookup_and_pairs() {
        let vars: HashMap<&str, &str> = [(ROLE, "polecat"), (RIG, "greenplace"), (ACTOR, "greenplace/toast")]
            .into_iter()
            .collect();
        let env = AgentEnv::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(env.role, "polecat");
        assert_eq!(env.session_id, "");
        assert_eq!(
            env.to_pairs(),
            vec![
                (ROLE, "polecat".to_string()),
                (RIG, "greenplace".to_string()),
                (ACTOR, "greenplace/toast".to_string()),
            ]
        );
    }
}
