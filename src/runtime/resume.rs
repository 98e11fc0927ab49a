use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{Result, RuntimeError};

/// Per-workspace directory holding runtime state
pub const RUNTIME_DIR: &str = ".runtime";

/// File under [`RUNTIME_DIR`] holding the agent's own session id
pub const SESSION_ID_FILE: &str = "session_id";

static RE_PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([A-Za-z_]*)\}").unwrap());

pub fn session_id_path(work_dir: &Path) -> PathBuf {
    work_dir.join(RUNTIME_DIR).join(SESSION_ID_FILE)
}

/// Read the persisted session id: the first line of the file, trimmed.
///
/// A missing, unreadable or blank file is reported as `SessionIdMissing`.
pub fn read_session_id(work_dir: &Path) -> Result<String> {
    let path = session_id_path(work_dir);
    let id = std::fs::read_to_string(&path)
        .ok()
        .and_then(|content| content.lines().next().map(|l| l.trim().to_string()))
        .filter(|id| !id.is_empty());
    id.ok_or(RuntimeError::SessionIdMissing { path })
}

/// Expand `{runtime}` and `{session_id}` in a resume command template
pub fn build_resume_command(runtime: &str, template: &str, session_id: &str) -> Result<String> {
    if template.trim().is_empty() {
        return Err(RuntimeError::config(runtime, "resume command template is empty"));
    }

    if let Some(unknown) = RE_PLACEHOLDER
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .find(|name| name != "runtime" && name != "session_id")
    {
        return Err(RuntimeError::config(
            runtime,
            format!("unknown placeholder {{{}}} in resume template", unknown),
        ));
    }

    Ok(RE_PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| match &caps[1] {
            "runtime" => runtime.to_string(),
            _ => session_id.to_string(),
        })
        .into_owned())
}
