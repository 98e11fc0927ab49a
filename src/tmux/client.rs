use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::{TerminalBackend, TmuxSession};

/// Client for interacting with tmux via CLI
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
}

impl TmuxClient {
    pub fn new() -> Self {
        Self {
            tmux_path: "tmux".to_string(),
        }
    }

    pub fn with_path(tmux_path: impl Into<String>) -> Self {
        Self {
            tmux_path: tmux_path.into(),
        }
    }

    /// Run tmux and return stdout, failing on a non-zero exit
    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.tmux_path)
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to execute tmux {}", args[0]))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("tmux {} failed: {}", args[0], stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Read a single format variable for the session's active pane
    async fn display(&self, name: &str, format: &str) -> Result<String> {
        let target = pane_target(name);
        let out = self.run(&["display-message", "-p", "-t", &target, format]).await?;
        Ok(out.trim_end_matches('\n').to_string())
    }

    /// List all tmux sessions with the directory of their active pane
    pub async fn list_session_details(&self) -> Result<Vec<TmuxSession>> {
        // Format: session_name|pane_current_path|session_created|session_attached
        let output = Command::new(&self.tmux_path)
            .args([
                "list-sessions",
                "-F",
                "#{session_name}|#{pane_current_path}|#{session_created}|#{session_attached}",
            ])
            .output()
            .await
            .context("Failed to execute tmux list-sessions")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("no sessions") {
                return Ok(Vec::new());
            }
            anyhow::bail!("tmux list-sessions failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_session_line).collect())
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new()
    }
}

/// `=name` stops tmux from prefix-matching another session
fn exact_target(name: &str) -> String {
    format!("={}", name)
}

/// Active pane of the exactly-named session
fn pane_target(name: &str) -> String {
    format!("={}:", name)
}

/// `send-keys` typing `text` verbatim. `--` ends option parsing so a
/// payload starting with `-` is not read as flags.
fn literal_keys_args(name: &str, text: &str) -> Vec<String> {
    vec![
        "send-keys".to_string(),
        "-t".to_string(),
        pane_target(name),
        "-l".to_string(),
        "--".to_string(),
        text.to_string(),
    ]
}

/// `send-keys` typing `line` followed by Enter
fn line_keys_args(name: &str, line: &str) -> Vec<String> {
    vec![
        "send-keys".to_string(),
        "-t".to_string(),
        pane_target(name),
        "--".to_string(),
        line.to_string(),
        "Enter".to_string(),
    ]
}

fn parse_session_line(line: &str) -> Option<TmuxSession> {
    let mut parts = line.splitn(4, '|');
    let name = parts.next()?.to_string();
    let work_dir = parts.next()?.to_string();
    if name.is_empty() {
        return None;
    }

    let mut session = TmuxSession::new(name, work_dir);
    session.created_at = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    session.attached_clients = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    Some(session)
}

/// Drop the blank rows below the cursor, then keep the last `lines`
fn tail_lines(content: &str, lines: usize) -> Vec<String> {
    let mut all: Vec<&str> = content.lines().collect();
    while all.last().is_some_and(|l| l.trim().is_empty()) {
        all.pop();
    }
    let start = all.len().saturating_sub(lines);
    all[start..].iter().map(|l| l.to_string()).collect()
}

#[async_trait]
impl TerminalBackend for TmuxClient {
    async fn new_session(
        &self,
        name: &str,
        work_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<()> {
        let mut args = vec![
            "new-session".to_string(),
            "-d".to_string(),
            "-s".to_string(),
            name.to_string(),
        ];
        if let Some(dir) = work_dir {
            args.push("-c".to_string());
            args.push(dir.to_string_lossy().into_owned());
        }
        let mut vars: Vec<_> = env.iter().collect();
        vars.sort();
        for (key, value) in vars {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&args)
            .await
            .with_context(|| format!("Failed to create session {}", name))?;
        Ok(())
    }

    async fn has_session(&self, name: &str) -> Result<bool> {
        let status = Command::new(&self.tmux_path)
            .args(["has-session", "-t", &exact_target(name)])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("Failed to execute tmux has-session")?;
        Ok(status.success())
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        self.run(&["kill-session", "-t", &exact_target(name)])
            .await
            .context("Failed to kill tmux session")?;
        Ok(())
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<()> {
        let args = literal_keys_args(name, text);
        self.run(&args.iter().map(String::as_str).collect::<Vec<_>>())
            .await?;
        Ok(())
    }

    async fn send_enter(&self, name: &str) -> Result<()> {
        self.run(&["send-keys", "-t", &pane_target(name), "Enter"])
            .await?;
        Ok(())
    }

    async fn send_line(&self, name: &str, line: &str) -> Result<()> {
        let args = line_keys_args(name, line);
        self.run(&args.iter().map(String::as_str).collect::<Vec<_>>())
            .await?;
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        Ok(self
            .list_session_details()
            .await?
            .into_iter()
            .map(|s| s.name)
            .collect())
    }

    async fn find_sessions_by_work_dir(&self, work_dir: &str) -> Result<Vec<String>> {
        Ok(self
            .list_session_details()
            .await?
            .into_iter()
            .filter(|s| s.work_dir == work_dir)
            .map(|s| s.name)
            .collect())
    }

    async fn pane_command(&self, name: &str) -> Result<String> {
        self.display(name, "#{pane_current_command}").await
    }

    async fn pane_work_dir(&self, name: &str) -> Result<String> {
        self.display(name, "#{pane_current_path}").await
    }

    async fn pane_pid(&self, name: &str) -> Result<Option<u32>> {
        let pid = self.display(name, "#{pane_pid}").await?;
        Ok(pid.trim().parse().ok())
    }

    async fn capture_pane_lines(&self, name: &str, lines: usize) -> Result<Vec<String>> {
        let start = format!("-{}", lines);
        let content = self
            .run(&["capture-pane", "-p", "-t", &pane_target(name), "-S", &start])
            .await
            .context("Failed to capture pane")?;
        Ok(tail_lines(&content, lines))
    }
}
