//! Claude Code.
//!
//! Readiness is read off the pane: Claude draws its input box with a `>`
//! (newer builds `❯`) at the start of a line once it accepts input.

use std::sync::Arc;
use std::time::Duration;

use super::adapter::{Profile, TerminalRuntime};
use super::delivery::DeliveryPolicy;
use super::readiness::{PromptProbe, ReadinessStrategy};
use super::types::Delivery;
use crate::tmux::heuristics::PromptMatcher;
use crate::tmux::TerminalBackend;

pub const NAME: &str = "claude";

pub fn profile() -> Profile {
    Profile {
        name: NAME.to_string(),
        binary: "claude".to_string(),
        readiness: ReadinessStrategy::Prompt(PromptProbe::new(PromptMatcher::new([">", "❯"]))),
        channels: vec![Delivery::Tmux],
        default_delivery: Delivery::Tmux,
        process_names: vec!["claude".to_string(), "node".to_string()],
        resume_template: Some("claude --resume {session_id}".to_string()),
        account_env: Some("CLAUDE_CONFIG_DIR".to_string()),
        delivery: DeliveryPolicy::default(),
        shell_timeout: Duration::from_secs(5),
        command_timeout: Duration::from_secs(60),
    }
}

pub fn new(backend: Arc<dyn TerminalBackend>) -> TerminalRuntime {
    TerminalRuntime::new(profile(), backend)
}
