mod client;
#[cfg(test)]
pub(crate) mod fake;
pub mod heuristics;

pub use client::TmuxClient;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::runtime::readiness::{deadline_after, next_tick, pause};

/// Poll interval used by the default foreground-command waits
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A tmux session as reported by `list-sessions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxSession {
    /// Session name
    pub name: String,
    /// Working directory of the active pane
    pub work_dir: String,
    /// Unix timestamp when session was created
    pub created_at: u64,
    /// Number of attached clients
    pub attached_clients: usize,
}

impl TmuxSession {
    pub fn new(name: String, work_dir: String) -> Self {
        Self {
            name,
            work_dir,
            created_at: 0,
            attached_clients: 0,
        }
    }
}

/// Primitives a runtime adapter needs from the terminal multiplexer.
///
/// Implementations report their own failures through `anyhow`; adapters wrap
/// them with the operation and session they were attempting.
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Create a detached session rooted at `work_dir` with extra environment
    async fn new_session(
        &self,
        name: &str,
        work_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<()>;

    async fn has_session(&self, name: &str) -> Result<bool>;

    async fn kill_session(&self, name: &str) -> Result<()>;

    /// Type `text` into the session without pressing Enter
    async fn send_literal(&self, name: &str, text: &str) -> Result<()>;

    /// Press Enter in the session
    async fn send_enter(&self, name: &str) -> Result<()>;

    /// Type a command line and press Enter in one call
    async fn send_line(&self, name: &str, line: &str) -> Result<()>;

    /// Names of all sessions known to the backend
    async fn list_sessions(&self) -> Result<Vec<String>>;

    /// Foreground command name of the session's active pane
    async fn pane_command(&self, name: &str) -> Result<String>;

    /// Working directory of the session's active pane
    async fn pane_work_dir(&self, name: &str) -> Result<String>;

    /// Last `lines` non-blank-tail lines of the active pane
    async fn capture_pane_lines(&self, name: &str, lines: usize) -> Result<Vec<String>>;

    /// Process id of the active pane, when the backend can tell
    async fn pane_pid(&self, _name: &str) -> Result<Option<u32>> {
        Ok(None)
    }

    /// Sessions whose pane directory equals `work_dir` exactly
    async fn find_sessions_by_work_dir(&self, work_dir: &str) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for name in self.list_sessions().await? {
            if self.pane_work_dir(&name).await? == work_dir {
                found.push(name);
            }
        }
        Ok(found)
    }

    /// Wait until the foreground command is something other than `exclude`
    async fn wait_for_command(
        &self,
        name: &str,
        exclude: &[&str],
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let deadline = deadline_after(timeout);
        loop {
            if let Ok(cmd) = self.pane_command(name).await {
                if !cmd.is_empty() && !heuristics::command_matches(&cmd, exclude) {
                    return Ok(());
                }
            }
            let Some(wait) = next_tick(deadline, COMMAND_POLL_INTERVAL) else {
                anyhow::bail!("timeout waiting for command in session {}", name);
            };
            if !pause(cancel, wait).await {
                anyhow::bail!("cancelled waiting for command in session {}", name);
            }
        }
    }

    /// Wait until the foreground command is a shell
    async fn wait_for_shell_ready(
        &self,
        name: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let deadline = deadline_after(timeout);
        loop {
            if let Ok(cmd) = self.pane_command(name).await {
                if heuristics::is_shell(&cmd) {
                    return Ok(());
                }
            }
            let Some(wait) = next_tick(deadline, COMMAND_POLL_INTERVAL) else {
                anyhow::bail!("timeout waiting for shell in session {}", name);
            };
            if !pause(cancel, wait).await {
                anyhow::bail!("cancelled waiting for shell in session {}", name);
            }
        }
    }
}
