use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::delivery::{send_keystrokes, DeliveryPolicy};
use super::readiness::{warmup, ReadinessStrategy, ReadyOutcome};
use super::resume::{build_resume_command, read_session_id};
use super::types::{Delivery, Message, Mode, Readiness, SessionFilter, SessionHandle, StartOptions};
use super::AgentRuntime;
use crate::env::AgentEnv;
use crate::error::{Result, RuntimeError};
use crate::hooks::{HookEvent, HookEventKind, HookSink, NoopSink};
use crate::tmux::heuristics::{self, SUPPORTED_SHELLS};
use crate::tmux::TerminalBackend;

/// Everything that distinguishes one backing program from another
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    /// Program launched when the caller gives no explicit command
    pub binary: String,
    pub readiness: ReadinessStrategy,
    /// Channels accepted by `send_message`
    pub channels: Vec<Delivery>,
    /// Channel the CLI uses when none is requested
    pub default_delivery: Delivery,
    /// Foreground command names that mean the program is running
    pub process_names: Vec<String>,
    /// Resume command with `{runtime}` / `{session_id}` placeholders
    pub resume_template: Option<String>,
    /// Program-native variable that receives `StartOptions::account_dir`
    pub account_env: Option<String>,
    pub delivery: DeliveryPolicy,
    /// Bound for the shell to come up in a fresh or resumed session
    pub shell_timeout: Duration,
    /// Bound for the program to replace the shell after launch
    pub command_timeout: Duration,
}

impl Profile {
    /// Allow-list including the configured binary's file name
    fn running_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.process_names.iter().map(String::as_str).collect();
        if let Some(bin) = Path::new(&self.binary).file_name().and_then(|n| n.to_str()) {
            if !names.contains(&bin) {
                names.push(bin);
            }
        }
        names
    }
}

/// Runtime adapter for an interactive CLI hosted in a terminal session
pub struct TerminalRuntime {
    profile: Profile,
    backend: Option<Arc<dyn TerminalBackend>>,
    hooks: Arc<dyn HookSink>,
}

impl TerminalRuntime {
    pub fn new(profile: Profile, backend: Arc<dyn TerminalBackend>) -> Self {
        Self {
            profile,
            backend: Some(backend),
            hooks: Arc::new(NoopSink),
        }
    }

    /// An adapter with no backend; every operation fails with a configuration error
    pub fn unbound(profile: Profile) -> Self {
        Self {
            profile,
            backend: None,
            hooks: Arc::new(NoopSink),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn HookSink>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    fn backend(&self) -> Result<&dyn TerminalBackend> {
        self.backend
            .as_deref()
            .ok_or_else(|| RuntimeError::config(&self.profile.name, "no terminal backend bound"))
    }

    fn require_session_id<'a>(&self, session_id: &'a str) -> Result<&'a str> {
        if session_id.is_empty() {
            return Err(RuntimeError::config(&self.profile.name, "session id is required"));
        }
        Ok(session_id)
    }

    fn emit(&self, event: HookEvent) {
        if let Err(err) = self.hooks.emit(&event) {
            warn!(runtime = %self.profile.name, error = %err, "failed to emit hook event");
        }
    }

    /// Report a backend failure to hooks and hand it back
    fn failed(&self, err: RuntimeError, session: &str) -> RuntimeError {
        if let RuntimeError::Backend { op, .. } = &err {
            self.emit(
                HookEvent::new(HookEventKind::OnError, &self.profile.name, session)
                    .data("op", *op)
                    .data("error", error_chain(&err)),
            );
        }
        err
    }

    /// Event for an existing session, stamped with the handle's directory when known
    fn session_event(&self, kind: HookEventKind, handle: &SessionHandle) -> HookEvent {
        let event = HookEvent::new(kind, &self.profile.name, &handle.session_id);
        match &handle.work_dir {
            Some(dir) => event.workdir(dir.to_string_lossy()),
            None => event,
        }
    }

    async fn foreground_is_agent(&self, backend: &dyn TerminalBackend, session: &str) -> Result<bool> {
        let exists = backend
            .has_session(session)
            .await
            .map_err(|e| RuntimeError::backend("has-session", session, e))?;
        if !exists {
            return Ok(false);
        }
        let cmd = backend
            .pane_command(session)
            .await
            .map_err(|e| RuntimeError::backend("pane-command", session, e))?;
        let running = heuristics::command_matches(&cmd, &self.profile.running_names());
        debug!(session, command = %cmd, running, "foreground command");
        Ok(running)
    }

    /// Non-fatal: log and carry on when the program does not show up
    async fn wait_for_program(&self, backend: &dyn TerminalBackend, session: &str, cancel: &CancellationToken) {
        if let Err(err) = backend
            .wait_for_command(session, SUPPORTED_SHELLS, self.profile.command_timeout, cancel)
            .await
        {
            warn!(session, runtime = %self.profile.name, error = %err, "agent did not replace the shell");
        }
    }

    /// Readiness wait after a launch or resume; the flag is set only when confirmed.
    /// Never fails: an unconfirmed start is still a start.
    async fn await_start_ready(
        &self,
        backend: &dyn TerminalBackend,
        session: &str,
        cancel: &CancellationToken,
    ) -> (ReadyOutcome, bool) {
        match &self.profile.readiness {
            ReadinessStrategy::Prompt(probe) => {
                let outcome = probe.wait(backend, session, probe.start_timeout, cancel).await;
                (outcome, outcome.is_ready())
            }
            ReadinessStrategy::Warmup { delay } => {
                let outcome = warmup(*delay, cancel).await;
                if !outcome.is_ready() {
                    return (outcome, false);
                }
                let confirmed = match self.foreground_is_agent(backend, session).await {
                    Ok(running) => running,
                    Err(err) => {
                        warn!(session, error = %err, "could not confirm agent after warmup");
                        false
                    }
                };
                (outcome, confirmed)
            }
        }
    }

    async fn ensure_session(
        &self,
        backend: &dyn TerminalBackend,
        opts: &StartOptions,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let session = opts.session_id.as_str();
        let exists = backend
            .has_session(session)
            .await
            .map_err(|e| RuntimeError::backend("has-session", session, e))?;

        match (opts.mode, exists) {
            (_, true) => Ok(()),
            (Mode::Minimal, false) => Err(RuntimeError::SessionNotFound(session.to_string())),
            (Mode::Tmux, false) => {
                let env = self.session_env(opts);
                let work_dir = Some(opts.work_dir.as_path()).filter(|d| !d.as_os_str().is_empty());
                backend
                    .new_session(session, work_dir, &env)
                    .await
                    .map_err(|e| RuntimeError::backend("new-session", session, e))?;
                if let Err(err) = backend
                    .wait_for_shell_ready(session, self.profile.shell_timeout, cancel)
                    .await
                {
                    warn!(session, error = %err, "shell not ready in new session");
                }
                Ok(())
            }
        }
    }

    fn session_env(&self, opts: &StartOptions) -> HashMap<String, String> {
        let mut env: HashMap<String, String> = AgentEnv::for_session(&opts.session_id, &opts.work_dir)
            .to_pairs()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        if let (Some(var), Some(dir)) = (&self.profile.account_env, &opts.account_dir) {
            env.insert(var.clone(), dir.to_string_lossy().into_owned());
        }
        env.extend(opts.env.clone());
        env
    }
}

/// `err` followed by its chain of sources
fn error_chain(err: &RuntimeError) -> String {
    let mut text = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

#[async_trait]
impl AgentRuntime for TerminalRuntime {
    fn name(&self) -> &str {
        &self.profile.name
    }

    fn readiness(&self) -> Readiness {
        self.profile.readiness.kind()
    }

    fn supports(&self, delivery: Delivery) -> bool {
        self.profile.channels.contains(&delivery)
    }

    async fn start(&self, opts: StartOptions, cancel: &CancellationToken) -> Result<SessionHandle> {
        let backend = self.backend()?;
        let session = self.require_session_id(&opts.session_id)?.to_string();
        if opts.command.trim().is_empty() {
            return Err(RuntimeError::config(&self.profile.name, "launch command is required"));
        }
        if !opts.runtime_name.is_empty() && opts.runtime_name != self.profile.name {
            return Err(RuntimeError::config(
                &self.profile.name,
                format!("start requested for runtime {}", opts.runtime_name),
            ));
        }

        self.ensure_session(backend, &opts, cancel)
            .await
            .map_err(|e| self.failed(e, &session))?;
        backend
            .send_line(&session, &opts.command)
            .await
            .map_err(|e| self.failed(RuntimeError::backend("send-keys", &session, e), &session))?;
        let started_at = Utc::now();
        info!(session = %session, runtime = %self.profile.name, "agent launched");

        self.wait_for_program(backend, &session, cancel).await;
        let (outcome, confirmed) = self.await_start_ready(backend, &session, cancel).await;
        if !confirmed {
            warn!(session = %session, ?outcome, "readiness not confirmed at start");
        }

        let pid = backend.pane_pid(&session).await.ok().flatten();

        if let Some(prompt) = opts.initial_prompt.as_deref().filter(|p| !p.is_empty()) {
            if outcome.is_ready() {
                send_keystrokes(backend, &session, prompt, Message::DEFAULT_TIMEOUT, &self.profile.delivery, cancel)
                    .await
                    .map_err(|e| self.failed(e, &session))?;
            } else {
                warn!(session = %session, "skipping initial prompt, agent not ready");
            }
        }

        let handle = SessionHandle {
            runtime: self.profile.name.clone(),
            session_id: session.clone(),
            work_dir: Some(opts.work_dir.clone()),
            pid,
            started_at: Some(started_at),
            ready_at: confirmed.then(Utc::now),
        };
        self.emit(
            HookEvent::new(HookEventKind::SessionStart, &self.profile.name, &session)
                .workdir(opts.work_dir.to_string_lossy())
                .data("ready", confirmed),
        );
        Ok(handle)
    }

    async fn resume(&self, handle: &SessionHandle, cancel: &CancellationToken) -> Result<()> {
        let backend = self.backend()?;
        let session = self.require_session_id(&handle.session_id)?;

        let exists = backend
            .has_session(session)
            .await
            .map_err(|e| self.failed(RuntimeError::backend("has-session", session, e), session))?;
        if !exists {
            return Err(RuntimeError::SessionNotFound(session.to_string()));
        }
        if self.foreground_is_agent(backend, session).await.unwrap_or(false) {
            debug!(session, "agent already running, nothing to resume");
            return Ok(());
        }

        let work_dir = match &handle.work_dir {
            Some(dir) if !dir.as_os_str().is_empty() => dir.clone(),
            _ => backend
                .pane_work_dir(session)
                .await
                .map_err(|e| RuntimeError::backend("pane-work-dir", session, e))?
                .into(),
        };
        let agent_session = read_session_id(&work_dir)?;
        let template = self
            .profile
            .resume_template
            .as_deref()
            .ok_or_else(|| RuntimeError::config(&self.profile.name, "resume command unavailable"))?;
        let command = build_resume_command(&self.profile.name, template, &agent_session)?;

        backend
            .wait_for_shell_ready(session, self.profile.shell_timeout, cancel)
            .await
            .map_err(|e| self.failed(RuntimeError::backend("wait-shell", session, e), session))?;
        backend
            .send_line(session, &command)
            .await
            .map_err(|e| self.failed(RuntimeError::backend("send-keys", session, e), session))?;
        info!(session, runtime = %self.profile.name, agent_session = %agent_session, "agent resumed");

        self.wait_for_program(backend, session, cancel).await;
        let (outcome, confirmed) = self.await_start_ready(backend, session, cancel).await;
        if !confirmed {
            warn!(session, ?outcome, "readiness not confirmed after resume");
        }
        Ok(())
    }

    async fn send_message(
        &self,
        handle: &SessionHandle,
        msg: &Message,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let backend = self.backend()?;
        let session = self.require_session_id(&handle.session_id)?;
        if !self.supports(msg.delivery) {
            return Err(RuntimeError::unsupported(
                &self.profile.name,
                format!("{} delivery", msg.delivery),
            ));
        }

        send_keystrokes(backend, session, &msg.text, msg.timeout, &self.profile.delivery, cancel)
            .await
            .map_err(|e| self.failed(e, session))?;
        self.emit(
            self.session_event(HookEventKind::OnMessage, handle)
                .data("delivery", msg.delivery.as_str())
                .data("length", msg.text.chars().count()),
        );
        Ok(())
    }

    async fn stop(&self, handle: &SessionHandle, reason: &str) -> Result<()> {
        let backend = self.backend()?;
        let session = self.require_session_id(&handle.session_id)?;
        backend
            .kill_session(session)
            .await
            .map_err(|e| self.failed(RuntimeError::backend("kill-session", session, e), session))?;
        info!(session, runtime = %self.profile.name, reason, "session stopped");
        self.emit(self.session_event(HookEventKind::SessionStop, handle).data("reason", reason));
        Ok(())
    }

    async fn is_ready(&self, handle: &SessionHandle, cancel: &CancellationToken) -> Result<bool> {
        let backend = self.backend()?;
        let session = self.require_session_id(&handle.session_id)?;
        match &self.profile.readiness {
            ReadinessStrategy::Prompt(probe) => Ok(probe
                .wait(backend, session, probe.check_timeout, cancel)
                .await
                .is_ready()),
            ReadinessStrategy::Warmup { .. } => self
                .foreground_is_agent(backend, session)
                .await
                .map_err(|e| self.failed(e, session)),
        }
    }

    async fn detect_running(&self, handle: &SessionHandle) -> Result<bool> {
        let backend = self.backend()?;
        let session = self.require_session_id(&handle.session_id)?;
        self.foreground_is_agent(backend, session)
            .await
            .map_err(|e| self.failed(e, session))
    }

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionHandle>> {
        let backend = self.backend()?;
        if filter.runtime.as_deref().is_some_and(|r| r != self.profile.name) {
            return Ok(Vec::new());
        }

        // an empty directory means no directory filter
        let names = match filter.work_dir.as_deref().filter(|d| !d.is_empty()) {
            Some(dir) => backend
                .find_sessions_by_work_dir(dir)
                .await
                .map_err(|e| self.failed(RuntimeError::backend("find-sessions", dir, e), dir))?,
            None => backend
                .list_sessions()
                .await
                .map_err(|e| self.failed(RuntimeError::backend("list-sessions", "*", e), "*"))?,
        };

        Ok(names
            .into_iter()
            .filter(|name| !name.is_empty())
            .map(|name| SessionHandle::partial(self.profile.name.clone(), name))
            .collect())
    }
}
