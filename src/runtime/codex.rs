//! OpenAI Codex CLI.
//!
//! Codex prints no stable prompt marker, so startup waits out a fixed warmup
//! and then checks that codex (or its node wrapper) holds the pane.

use std::sync::Arc;
use std::time::Duration;

use super::adapter::{Profile, TerminalRuntime};
use super::delivery::DeliveryPolicy;
use super::readiness::ReadinessStrategy;
use super::types::Delivery;
use crate::tmux::TerminalBackend;

pub const NAME: &str = "codex";

pub const WARMUP: Duration = Duration::from_secs(5);

pub fn profile() -> Profile {
    Profile {
        name: NAME.to_string(),
        binary: "codex".to_string(),
        readiness: ReadinessStrategy::Warmup { delay: WARMUP },
        channels: vec![Delivery::Tmux, Delivery::Stdin],
        default_delivery: Delivery::Tmux,
        process_names: vec!["codex".to_string(), "node".to_string()],
        resume_template: Some("codex resume {session_id}".to_string()),
        account_env: Some("CODEX_HOME".to_string()),
        delivery: DeliveryPolicy::default(),
        shell_timeout: Duration::from_secs(5),
        command_timeout: Duration::from_secs(30),
    }
}

pub fn new(backend: Arc<dyn TerminalBackend>) -> TerminalRuntime {
    TerminalRuntime::new(profile(), backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::error::ErrorKind;
    use crate::runtime::resume::{RUNTIME_DIR, SESSION_ID_FILE};
    use crate::runtime::{AgentRuntime, Message, Mode, Readiness, SessionHandle, StartOptions};
    use crate::tmux::fake::{FakeBackend, Op};
    use tokio::time::Instant;
    use tokio_util::sync::CancellationToken;

    #[tokio::test(start_paused = true)]
    async fn test_start_waits_warmup_then_confirms() {
        let backend = Arc::new(FakeBackend::new());
        let runtime = new(backend.clone());

        let started = Instant::now();
        let handle = runtime
            .start(
                StartOptions::new("gt-codex", "codex --full-auto")
                    .work_dir("/town/greenplace")
                    .account_dir("/accounts/work")
                    .mode(Mode::Tmux),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(started.elapsed() >= WARMUP);
        assert!(handle.is_ready());

        let session = backend.session("gt-codex").unwrap();
        assert_eq!(session.work_dir, "/town/greenplace");
        assert_eq!(session.env.get("CODEX_HOME").map(String::as_str), Some("/accounts/work"));
        assert_eq!(session.env.get("GT_SESSION_ID").map(String::as_str), Some("gt-codex"));
        assert_eq!(backend.count(Op::NewSession), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_warmup_leaves_handle_unready() {
        let backend = Arc::new(FakeBackend::new().shell_session("gt-codex", "/w"));
        let runtime = new(backend.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let handle = runtime
            .start(StartOptions::new("gt-codex", "codex"), &cancel)
            .await
            .unwrap();
        assert!(started.elapsed() < WARMUP);
        assert!(!handle.is_ready());
        assert!(handle.started_at.is_some());
    }

    #[tokio::test]
    async fn test_minimal_mode_requires_existing_session() {
        let backend = Arc::new(FakeBackend::new());
        let runtime = new(backend.clone());

        let err = runtime
            .start(
                StartOptions::new("gt-codex", "codex").mode(Mode::Minimal),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(backend.count(Op::NewSession), 0);
        assert_eq!(backend.count(Op::SendLine), 0);
    }

    #[tokio::test]
    async fn test_is_ready_checks_foreground() {
        let backend = Arc::new(FakeBackend::new().shell_session("gt-codex", "/w"));
        let runtime = new(backend.clone());
        let handle = SessionHandle::partial(NAME, "gt-codex");
        assert_eq!(runtime.readiness(), Readiness::Warmup);

        assert!(!runtime.is_ready(&handle, &CancellationToken::new()).await.unwrap());
        backend.set_command("gt-codex", "codex");
        assert!(runtime.is_ready(&handle, &CancellationToken::new()).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stdin_delivery_is_accepted() {
        let backend = Arc::new(FakeBackend::new().shell_session("gt-codex", "/w"));
        let runtime = new(backend.clone());

        runtime
            .send_message(
                &SessionHandle::partial(NAME, "gt-codex"),
                &Message::new("run the tests").via(Delivery::Stdin),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(backend.ops(), vec![Op::SendLiteral, Op::SendEnter]);
        assert!(!runtime.supports(Delivery::Rpc));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_relaunches_from_session_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(RUNTIME_DIR)).unwrap();
        fs::write(dir.path().join(RUNTIME_DIR).join(SESSION_ID_FILE), "0199-abcd\n").unwrap();

        let work_dir = dir.path().to_string_lossy().into_owned();
        let backend = Arc::new(FakeBackend::new().shell_session("gt-codex", &work_dir));
        let runtime = new(backend.clone());

        runtime
            .resume(&SessionHandle::partial(NAME, "gt-codex"), &CancellationToken::new())
            .await
            .unwrap();
        let lines: Vec<String> = backend
            .calls()
            .into_iter()
            .filter(|c| c.op == Op::SendLine)
            .map(|c| c.arg)
            .collect();
        assert_eq!(lines, vec!["codex resume 0199-abcd".to_string()]);
        assert_eq!(backend.session("gt-codex").unwrap().command, "codex");
    }

    #[tokio::test]
    async fn test_resume_without_session_file_sends_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeBackend::new().shell_session("gt-codex", "/w"));
        let runtime = new(backend.clone());

        let handle = SessionHandle::partial(NAME, "gt-codex").with_work_dir(dir.path());
        let err = runtime
            .resume(&handle, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(backend.count(Op::SendLine), 0);
        assert_eq!(backend.count(Op::SendLiteral), 0);
    }

    #[tokio::test]
    async fn test_resume_is_noop_when_agent_running() {
        let backend = Arc::new(FakeBackend::new().shell_session("gt-codex", "/w"));
        backend.set_command("gt-codex", "node");
        let runtime = new(backend.clone());

        runtime
            .resume(&SessionHandle::partial(NAME, "gt-codex"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(backend.count(Op::SendLine), 0);
    }
}
