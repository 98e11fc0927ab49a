//! Lifecycle hook events for external tooling.
//!
//! One JSON object per event; sinks decide where it goes.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::env::AgentEnv;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookEventKind {
    SessionStart,
    SessionStop,
    OnMessage,
    OnError,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookEvent {
    pub event: HookEventKind,
    pub runtime: String,
    pub session_id: String,
    pub workdir: String,
    pub rig: String,
    pub role: String,
    pub bead: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub data: Map<String, Value>,
}

impl HookEvent {
    /// Event stamped now, identity taken from the canonical environment
    pub fn new(event: HookEventKind, runtime: &str, session_id: &str) -> Self {
        Self::with_env(event, runtime, session_id, &AgentEnv::from_env())
    }

    pub fn with_env(event: HookEventKind, runtime: &str, session_id: &str, env: &AgentEnv) -> Self {
        Self {
            event,
            runtime: runtime.to_string(),
            session_id: session_id.to_string(),
            workdir: env.work_dir.clone(),
            rig: env.rig.clone(),
            role: env.role.clone(),
            bead: String::new(),
            actor: env.actor.clone(),
            timestamp: Utc::now(),
            data: Map::new(),
        }
    }

    pub fn workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    pub fn bead(mut self, bead: impl Into<String>) -> Self {
        self.bead = bead.into();
        self
    }

    pub fn data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Destination for hook events
pub trait HookSink: Send + Sync {
    fn emit(&self, event: &HookEvent) -> Result<()>;
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl HookSink for NoopSink {
    fn emit(&self, _event: &HookEvent) -> Result<()> {
        Ok(())
    }
}

/// Writes each event as one line of JSON
pub struct JsonLinesSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> HookSink for JsonLinesSink<W> {
    fn emit(&self, event: &HookEvent) -> Result<()> {
        let line = serde_json::to_string(event).context("Failed to encode hook event")?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{}", line).context("Failed to write hook event")?;
        writer.flush().context("Failed to flush hook event")?;
        Ok(())
    }
}
