//! Runtime abstraction over interactive agent CLIs hosted in terminal sessions.
//!
//! A caller resolves an adapter by name from a [`Registry`], calls
//! [`AgentRuntime::start`], and drives the session through the returned
//! [`SessionHandle`]. Handles are snapshots; re-query to learn current state.

mod adapter;
pub mod claude;
pub mod codex;
pub mod delivery;
pub mod readiness;
mod registry;
pub mod resume;
mod types;

pub use adapter::{Profile, TerminalRuntime};
pub use delivery::{Backoff, DeliveryPolicy, RetryPolicy};
pub use readiness::{PromptProbe, ReadinessStrategy, ReadyOutcome};
pub use registry::{Registry, RuntimeFactory};
pub use types::{Delivery, Message, Mode, Readiness, SessionFilter, SessionHandle, StartOptions};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Lifecycle operations every runtime adapter provides.
///
/// Each operation validates its inputs before touching the backend. Two
/// concurrent `start` calls for one session id are not serialized here; the
/// owner of a session id must order its own calls.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    fn name(&self) -> &str;

    fn readiness(&self) -> Readiness;

    fn supports(&self, delivery: Delivery) -> bool;

    /// Launch the agent and run the readiness protocol.
    ///
    /// A readiness timeout is not an error; the handle's `ready_at` stays unset.
    async fn start(&self, opts: StartOptions, cancel: &CancellationToken) -> Result<SessionHandle>;

    /// Re-launch the agent in an existing session from its persisted id
    async fn resume(&self, handle: &SessionHandle, cancel: &CancellationToken) -> Result<()>;

    async fn send_message(
        &self,
        handle: &SessionHandle,
        msg: &Message,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn stop(&self, handle: &SessionHandle, reason: &str) -> Result<()>;

    /// `false` when readiness is not confirmed in time
    async fn is_ready(&self, handle: &SessionHandle, cancel: &CancellationToken) -> Result<bool>;

    /// Whether the agent is the session's foreground process
    async fn detect_running(&self, handle: &SessionHandle) -> Result<bool>;

    async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionHandle>>;
}
