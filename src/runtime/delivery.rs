//! Terminal message delivery.
//!
//! Text is typed in literal mode, left to settle, then submitted with a
//! separate Enter. Sending both in one call lets the terminal interpret
//! newlines and key names inside the payload.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::readiness::{deadline_after, expired, pause};
use crate::error::{Result, RuntimeError};
use crate::tmux::TerminalBackend;

/// Delay between the literal text and the Enter press
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed(Duration),
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based)
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(retry.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// Bounded retry for delivery failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included; at least one is always made
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::Fixed(Duration::ZERO),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Exponential {
                initial: Duration::from_millis(250),
                max: Duration::from_secs(2),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub settle: Duration,
    pub retry: RetryPolicy,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            settle: DEFAULT_SETTLE,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Text,
    Enter,
}

/// Type `text` into `session` and submit it.
///
/// Only the step that failed is retried, so a failed Enter never re-types the
/// text. No new attempt starts once `timeout` has elapsed; cancellation is
/// observed between attempts only.
pub async fn send_keystrokes(
    backend: &dyn TerminalBackend,
    session: &str,
    text: &str,
    timeout: Duration,
    policy: &DeliveryPolicy,
    cancel: &CancellationToken,
) -> Result<()> {
    let deadline = deadline_after(timeout);
    let max_attempts = policy.retry.max_attempts.max(1);
    let mut step = Step::Text;
    let mut attempt = 1;

    loop {
        let result = match step {
            Step::Text => backend.send_literal(session, text).await,
            Step::Enter => backend.send_enter(session).await,
        };

        let err = match (step, result) {
            (Step::Text, Ok(())) => {
                tokio::time::sleep(policy.settle).await;
                step = Step::Enter;
                continue;
            }
            (Step::Enter, Ok(())) => {
                debug!(session, attempt, "message delivered");
                return Ok(());
            }
            (_, Err(err)) => err,
        };

        let op = match step {
            Step::Text => "send-keys",
            Step::Enter => "send-enter",
        };
        if attempt >= max_attempts || expired(deadline) {
            return Err(RuntimeError::backend(op, session, err));
        }

        let delay = policy.retry.backoff.delay(attempt);
        warn!(session, attempt, error = %err, ?delay, "{} failed, retrying", op);
        if !pause(cancel, delay).await {
            return Err(RuntimeError::Cancelled);
        }
        if expired(deadline) {
            return Err(RuntimeError::backend(op, session, err));
        }
        attempt += 1;
    }
}
