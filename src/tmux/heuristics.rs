//! Text and process-name heuristics for judging what a pane is doing.
//!
//! These are inferences from indirect signals, not a handshake with the
//! agent. A program wrapped by an intermediate shell reports the shell as its
//! foreground command and will not match an allow-list.

/// Foreground command names that mean "a shell is waiting"
pub const SUPPORTED_SHELLS: &[&str] = &["bash", "zsh", "sh", "fish", "tcsh", "ksh", "dash"];

/// Whether `cmd` names one of `allowed`.
///
/// Login shells are reported with a leading dash (`-zsh`); that is ignored.
pub fn command_matches(cmd: &str, allowed: &[&str]) -> bool {
    let cmd = cmd.trim().trim_start_matches('-');
    !cmd.is_empty() && allowed.iter().any(|name| *name == cmd)
}

pub fn is_shell(cmd: &str) -> bool {
    command_matches(cmd, SUPPORTED_SHELLS)
}

/// Matches a program's input prompt in captured pane lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMatcher {
    markers: Vec<String>,
}

impl PromptMatcher {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.into().trim().to_string())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// A trimmed line that is the marker, or starts with marker and a space
    pub fn matches_line(&self, line: &str) -> bool {
        let trimmed = line.trim();
        self.markers.iter().any(|marker| {
            trimmed == marker
                || trimmed
                    .strip_prefix(marker.as_str())
                    .is_some_and(|rest| rest.starts_with(char::is_whitespace))
        })
    }

    pub fn find<S: AsRef<str>>(&self, lines: &[S]) -> bool {
        lines.iter().any(|line| self.matches_line(line.as_ref()))
    }
}
