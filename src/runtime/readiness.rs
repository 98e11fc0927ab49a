//! Readiness detection.
//!
//! Readiness is inferred, never announced: either the program's prompt shows
//! up in captured pane text, or a fixed warmup elapses. Both waits run inline
//! on the calling task and stop early when the caller cancels.

use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::types::Readiness;
use crate::tmux::heuristics::PromptMatcher;
use crate::tmux::TerminalBackend;

/// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
pub async fn pause(cancel: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// `timeout` from now, or `None` when that lies past what `Instant` can hold
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Whether `deadline` has passed; no deadline never expires
pub fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Next sleep toward `deadline`, at most `interval`. `None` once it has passed.
pub fn next_tick(deadline: Option<Instant>, interval: Duration) -> Option<Duration> {
    match deadline {
        None => Some(interval),
        Some(d) => {
            let now = Instant::now();
            (now < d).then(|| interval.min(d - now))
        }
    }
}

/// Outcome of one readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    Ready,
    TimedOut,
    Cancelled,
}

impl ReadyOutcome {
    pub fn is_ready(self) -> bool {
        self == ReadyOutcome::Ready
    }
}

/// Parameters for the prompt-marker strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptProbe {
    pub matcher: PromptMatcher,
    /// Number of trailing pane lines inspected per poll
    pub lines: usize,
    pub poll_interval: Duration,
    /// Bound for an `is_ready` check
    pub check_timeout: Duration,
    /// Bound for the wait that follows a launch or resume
    pub start_timeout: Duration,
}

impl PromptProbe {
    pub fn new(matcher: PromptMatcher) -> Self {
        Self {
            matcher,
            lines: 10,
            poll_interval: Duration::from_millis(200),
            check_timeout: Duration::from_secs(2),
            start_timeout: Duration::from_secs(60),
        }
    }

    /// Poll the pane until a prompt line appears or `timeout` elapses.
    ///
    /// Capture failures count as "not yet" and are retried on the next tick.
    pub async fn wait(
        &self,
        backend: &dyn TerminalBackend,
        session: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> ReadyOutcome {
        let deadline = deadline_after(timeout);
        loop {
            match backend.capture_pane_lines(session, self.lines).await {
                Ok(lines) if self.matcher.find(&lines) => return ReadyOutcome::Ready,
                Ok(_) => {}
                Err(err) => debug!(session, error = %err, "pane capture failed"),
            }

            let Some(wait) = next_tick(deadline, self.poll_interval) else {
                return ReadyOutcome::TimedOut;
            };
            if !pause(cancel, wait).await {
                return ReadyOutcome::Cancelled;
            }
        }
    }
}

/// How an adapter waits for its program to accept input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessStrategy {
    Prompt(PromptProbe),
    /// Pair with a foreground-command check when certainty matters
    Warmup { delay: Duration },
}

impl ReadinessStrategy {
    pub fn kind(&self) -> Readiness {
        match self {
            ReadinessStrategy::Prompt(_) => Readiness::Prompt,
            ReadinessStrategy::Warmup { .. } => Readiness::Warmup,
        }
    }
}

/// Wait out a fixed warmup. Readiness is assumed, not observed.
pub async fn warmup(delay: Duration, cancel: &CancellationToken) -> ReadyOutcome {
    if pause(cancel, delay).await {
        ReadyOutcome::Ready
    } else {
        ReadyOutcome::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::fake::{FakeBackend, Op};

    fn probe() -> PromptProbe {
        PromptProbe::new(PromptMatcher::new([">"]))
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_found_on_first_poll() {
        let backend = FakeBackend::new().shell_session("a", "/w");
        backend.set_pane("a", &["building...", "> "]);
        let started = Instant::now();
        let outcome = probe()
            .wait(&backend, "a", Duration::from_secs(2), &CancellationToken::new())
            .await;
        assert_eq!(outcome, ReadyOutcome::Ready);
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(backend.count(Op::Capture), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_exact() {
        let backend = FakeBackend::new().shell_session("a", "/w");
        backend.set_pane("a", &["building...", "still building..."]);
        let started = Instant::now();
        let outcome = probe()
            .wait(&backend, "a", Duration::from_millis(1100), &CancellationToken::new())
            .await;
        assert_eq!(outcome, ReadyOutcome::TimedOut);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1100));
        assert!(elapsed < Duration::from_millis(1110));
        // t = 0, 200, ..., 1000, then the clipped final poll at 1100
        assert_eq!(backend.count(Op::Capture), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_errors_are_not_fatal() {
        let backend = FakeBackend::new();
        let outcome = probe()
            .wait(&backend, "missing", Duration::from_millis(400), &CancellationToken::new())
            .await;
        assert_eq!(outcome, ReadyOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let backend = FakeBackend::new().shell_session("a", "/w");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });
        let started = Instant::now();
        let outcome = probe().wait(&backend, "a", Duration::from_secs(60), &cancel).await;
        assert_eq!(outcome, ReadyOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_millis(700));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_timeout_keeps_polling() {
        let backend = FakeBackend::new().shell_session("a", "/w");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let outcome = probe().wait(&backend, "a", Duration::MAX, &cancel).await;
        assert_eq!(outcome, ReadyOutcome::Cancelled);
        assert!(backend.count(Op::Capture) >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_helpers() {
        assert_eq!(deadline_after(Duration::MAX), None);
        assert!(!expired(None));
        assert_eq!(next_tick(None, Duration::from_millis(200)), Some(Duration::from_millis(200)));

        let deadline = deadline_after(Duration::from_millis(50));
        assert_eq!(next_tick(deadline, Duration::from_millis(200)), Some(Duration::from_millis(50)));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(expired(deadline));
        assert_eq!(next_tick(deadline, Duration::from_millis(200)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_waits_full_delay() {
        let started = Instant::now();
        let outcome = warmup(Duration::from_secs(5), &CancellationToken::new()).await;
        assert!(outcome.is_ready());
        assert!(started.elapsed() >= Duration::from_secs(5));

        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(warmup(Duration::from_secs(5), &cancel).await, ReadyOutcome::Cancelled);
    }
}
