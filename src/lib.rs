//! Start, drive and supervise interactive AI coding agents hosted in tmux.
//!
//! Each backing program (Claude Code, Codex, ...) gets an adapter implementing
//! [`AgentRuntime`]; adapters are resolved by name from a [`Registry`] and
//! bound to a [`TerminalBackend`], normally [`TmuxClient`].

pub mod config;
pub mod env;
pub mod error;
pub mod hooks;
pub mod runtime;
pub mod tmux;

pub use error::{ConfigError, ErrorKind, Result, RuntimeError};
pub use runtime::{
    AgentRuntime, Delivery, Message, Mode, Readiness, Registry, SessionFilter, SessionHandle,
    StartOptions,
};
pub use tmux::{TerminalBackend, TmuxClient};
