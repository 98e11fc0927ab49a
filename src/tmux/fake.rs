//! In-memory backend that records every call it receives.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use tokio::time::Instant;

use super::TerminalBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op {
    NewSession,
    HasSession,
    KillSession,
    SendLiteral,
    SendEnter,
    SendLine,
    ListSessions,
    PaneCommand,
    PaneWorkDir,
    PanePid,
    Capture,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub op: Op,
    pub session: String,
    pub arg: String,
    pub at: Instant,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct FakeSession {
    pub work_dir: String,
    pub command: String,
    pub pane: Vec<String>,
    pub pid: Option<u32>,
    pub env: HashMap<String, String>,
}

#[derive(Default)]
struct State {
    sessions: Vec<(String, FakeSession)>,
    calls: Vec<Call>,
    literal_failures: usize,
    enter_failures: usize,
    kill_fails: bool,
    queries_fail: bool,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(self, name: &str, session: FakeSession) -> Self {
        self.state
            .lock()
            .unwrap()
            .sessions
            .push((name.to_string(), session));
        self
    }

    pub fn shell_session(self, name: &str, work_dir: &str) -> Self {
        self.with_session(
            name,
            FakeSession {
                work_dir: work_dir.to_string(),
                command: "zsh".to_string(),
                ..Default::default()
            },
        )
    }

    pub fn set_pane(&self, name: &str, lines: &[&str]) {
        self.update(name, |s| s.pane = lines.iter().map(|l| l.to_string()).collect());
    }

    pub fn set_command(&self, name: &str, command: &str) {
        self.update(name, |s| s.command = command.to_string());
    }

    /// The next `n` literal sends fail
    pub fn fail_literal(&self, n: usize) {
        self.state.lock().unwrap().literal_failures = n;
    }

    /// The next `n` Enter presses fail
    pub fn fail_enter(&self, n: usize) {
        self.state.lock().unwrap().enter_failures = n;
    }

    pub fn fail_kill(&self) {
        self.state.lock().unwrap().kill_fails = true;
    }

    /// Session lookups and listings fail from now on
    pub fn fail_queries(&self) {
        self.state.lock().unwrap().queries_fail = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| c.op == op).count()
    }

    pub fn session(&self, name: &str) -> Option<FakeSession> {
        self.state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s.clone())
    }

    fn update(&self, name: &str, f: impl FnOnce(&mut FakeSession)) {
        let mut state = self.state.lock().unwrap();
        if let Some((_, session)) = state.sessions.iter_mut().find(|(n, _)| n == name) {
            f(session);
        }
    }

    fn record(&self, op: Op, session: &str, arg: &str) {
        self.state.lock().unwrap().calls.push(Call {
            op,
            session: session.to_string(),
            arg: arg.to_string(),
            at: Instant::now(),
        });
    }

    fn check_queries(&self) -> Result<()> {
        if self.state.lock().unwrap().queries_fail {
            anyhow::bail!("no server running");
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<FakeSession> {
        self.session(name)
            .ok_or_else(|| anyhow::anyhow!("can't find session: {}", name))
    }
}

#[async_trait]
impl TerminalBackend for FakeBackend {
    async fn new_session(
        &self,
        name: &str,
        work_dir: Option<&Path>,
        env: &HashMap<String, String>,
    ) -> Result<()> {
        self.record(Op::NewSession, name, "");
        let session = FakeSession {
            work_dir: work_dir
                .map(|d| d.to_string_lossy().into_owned())
                .unwrap_or_default(),
            command: "zsh".to_string(),
            env: env.clone(),
            ..Default::default()
        };
        self.state
            .lock()
            .unwrap()
            .sessions
            .push((name.to_string(), session));
        Ok(())
    }

    async fn has_session(&self, name: &str) -> Result<bool> {
        self.record(Op::HasSession, name, "");
        self.check_queries()?;
        Ok(self.session(name).is_some())
    }

    async fn kill_session(&self, name: &str) -> Result<()> {
        self.record(Op::KillSession, name, "");
        let mut state = self.state.lock().unwrap();
        if state.kill_fails {
            anyhow::bail!("kill-session refused");
        }
        let before = state.sessions.len();
        state.sessions.retain(|(n, _)| n != name);
        if state.sessions.len() == before {
            anyhow::bail!("can't find session: {}", name);
        }
        Ok(())
    }

    async fn send_literal(&self, name: &str, text: &str) -> Result<()> {
        self.record(Op::SendLiteral, name, text);
        let mut state = self.state.lock().unwrap();
        if state.literal_failures > 0 {
            state.literal_failures -= 1;
            anyhow::bail!("send-keys failed");
        }
        Ok(())
    }

    async fn send_enter(&self, name: &str) -> Result<()> {
        self.record(Op::SendEnter, name, "");
        let mut state = self.state.lock().unwrap();
        if state.enter_failures > 0 {
            state.enter_failures -= 1;
            anyhow::bail!("send-keys Enter failed");
        }
        Ok(())
    }

    /// The first word of `line` becomes the foreground command
    async fn send_line(&self, name: &str, line: &str) -> Result<()> {
        self.record(Op::SendLine, name, line);
        self.lookup(name)?;
        let program = line
            .split_whitespace()
            .next()
            .and_then(|word| Path::new(word).file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.set_command(name, &program);
        Ok(())
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        self.record(Op::ListSessions, "", "");
        self.check_queries()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .map(|(n, _)| n.clone())
            .collect())
    }

    async fn pane_command(&self, name: &str) -> Result<String> {
        self.record(Op::PaneCommand, name, "");
        self.check_queries()?;
        Ok(self.lookup(name)?.command)
    }

    async fn pane_work_dir(&self, name: &str) -> Result<String> {
        self.record(Op::PaneWorkDir, name, "");
        self.check_queries()?;
        Ok(self.lookup(name)?.work_dir)
    }

    async fn pane_pid(&self, name: &str) -> Result<Option<u32>> {
        self.record(Op::PanePid, name, "");
        Ok(self.lookup(name)?.pid)
    }

    async fn capture_pane_lines(&self, name: &str, lines: usize) -> Result<Vec<String>> {
        self.record(Op::Capture, name, "");
        let pane = self.lookup(name)?.pane;
        let start = pane.len().saturating_sub(lines);
        Ok(pane[start..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::heuristics::SUPPORTED_SHELLS;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_default_work_dir_lookup_is_exact() {
        let backend = FakeBackend::new()
            .shell_session("a", "/work/app")
            .shell_session("b", "/work/app/")
            .shell_session("c", "/Work/App");
        let found = backend.find_sessions_by_work_dir("/work/app").await.unwrap();
        assert_eq!(found, vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_command_sees_program_replace_shell() {
        let backend = FakeBackend::new().shell_session("a", "/w");
        let cancel = CancellationToken::new();
        let err = backend
            .wait_for_command("a", SUPPORTED_SHELLS, Duration::from_millis(300), &cancel)
            .await;
        assert!(err.is_err());

        backend.set_command("a", "node");
        backend
            .wait_for_command("a", SUPPORTED_SHELLS, Duration::from_millis(300), &cancel)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_accept_unbounded_timeout() {
        let backend = FakeBackend::new().shell_session("a", "/w");
        let cancel = CancellationToken::new();
        backend
            .wait_for_shell_ready("a", Duration::MAX, &cancel)
            .await
            .unwrap();
        backend.set_command("a", "claude");
        backend
            .wait_for_command("a", SUPPORTED_SHELLS, Duration::MAX, &cancel)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_shell_ready_honours_cancel() {
        let backend = FakeBackend::new().shell_session("a", "/w");
        backend.set_command("a", "codex");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let started = Instant::now();
        let result = backend
            .wait_for_shell_ready("a", Duration::from_secs(30), &cancel)
            .await;
        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_millis(150));
    }
}
