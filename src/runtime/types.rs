use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the caller prepared the terminal for a launch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The session already exists; only the launch command is injected
    Minimal,
    /// The adapter creates the session when it is missing
    #[default]
    Tmux,
}

/// Transport used to inject a message into a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Stdin,
    #[default]
    Tmux,
    Rpc,
}

impl Delivery {
    pub fn as_str(self) -> &'static str {
        match self {
            Delivery::Stdin => "stdin",
            Delivery::Tmux => "tmux",
            Delivery::Rpc => "rpc",
        }
    }
}

impl fmt::Display for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Delivery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stdin" => Ok(Delivery::Stdin),
            "tmux" => Ok(Delivery::Tmux),
            "rpc" => Ok(Delivery::Rpc),
            other => Err(format!("unknown delivery channel: {}", other)),
        }
    }
}

/// How an adapter decides that a session accepts input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    /// Poll captured pane text for the program's prompt
    Prompt,
    /// Wait a fixed delay and assume the program is up
    Warmup,
}

/// A request to launch an agent in a terminal session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
    /// Backend session name; unique among live sessions
    pub session_id: String,
    /// Command line that launches the agent
    pub command: String,
    pub work_dir: PathBuf,
    pub runtime_name: String,
    /// Account/config directory handed to the agent
    pub account_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    /// Text delivered once the agent is ready
    pub initial_prompt: Option<String>,
    pub mode: Mode,
}

impl StartOptions {
    pub fn new(session_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            command: command.into(),
            ..Default::default()
        }
    }

    pub fn work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn runtime(mut self, name: impl Into<String>) -> Self {
        self.runtime_name = name.into();
        self
    }

    pub fn account_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.account_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn initial_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.initial_prompt = Some(prompt.into());
        self
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

/// Snapshot of a session at the moment it was produced.
///
/// Handles from `list_sessions` carry only `runtime` and `session_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHandle {
    pub runtime: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_at: Option<DateTime<Utc>>,
}

impl SessionHandle {
    /// A handle carrying only identity
    pub fn partial(runtime: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            runtime: runtime.into(),
            session_id: session_id.into(),
            work_dir: None,
            pid: None,
            started_at: None,
            ready_at: None,
        }
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    pub fn is_ready(&self) -> bool {
        self.ready_at.is_some()
    }
}

/// A message delivery request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub text: String,
    pub delivery: Delivery,
    /// Upper bound for the whole delivery, retries included
    pub timeout: Duration,
}

impl Message {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            delivery: Delivery::default(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    pub fn via(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Narrows `list_sessions` results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub runtime: Option<String>,
    /// Compared byte-for-byte with the backend-reported directory
    pub work_dir: Option<String>,
}

impl SessionFilter {
    pub fn runtime(mut self, name: impl Into<String>) -> Self {
        self.runtime = Some(name.into());
        self
    }

    pub fn work_dir(mut self, dir: impl Into<String>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }
}
