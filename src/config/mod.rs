use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::subprocess::error::SubshellError;

pub mod loader;

pub use loader::ConfigLoader;

const SIMPLE_MODE_VAR: &str = "SUBSHELL_SIMPLE";
const LOG_LEVEL_VAR: &str = "SUBSHELL_LOG_LEVEL";

/// Per-invocation settings for [`crate::Subshell`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunOptions {
    /// Escalate a non-zero exit code to an error
    pub check: bool,
    pub discard_stdout: bool,
    pub discard_stderr: bool,
    /// Keep the full output in memory as well as displaying it
    pub capture_output: bool,
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
    pub display_title: String,
    /// Scrollback height of the live panel
    pub display_lines: usize,
    /// Echo lines directly instead of drawing the panel
    pub simple_mode: bool,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How long drainers get to flush after the process exits
    #[serde(with = "humantime_serde")]
    pub drain_grace: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            check: false,
            discard_stdout: false,
            discard_stderr: false,
            capture_output: false,
            timeout: None,
            display_title: "subshell".to_string(),
            display_lines: 10,
            simple_mode: false,
            poll_interval: Duration::from_millis(10),
            drain_grace: Duration::from_millis(100),
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<(), SubshellError> {
        if self.display_lines == 0 {
            return Err(SubshellError::InvalidOptions(
                "display_lines must be at least 1".to_string(),
            ));
        }
        if self.capture_output && self.discard_stdout && self.discard_stderr {
            return Err(SubshellError::InvalidOptions(
                "capture_output cannot be combined with discarding both streams".to_string(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(SubshellError::InvalidOptions(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubshellConfig {
    pub log_level: Option<String>,
    pub run: RunOptions,
}

impl SubshellConfig {
    pub fn merge_env_vars(&mut self) {
        self.merge_env_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using `lookup` to read variables
    pub fn merge_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(SIMPLE_MODE_VAR) {
            self.run.simple_mode = is_truthy(&value);
        }

        if let Some(log_level) = lookup(LOG_LEVEL_VAR) {
            self.log_level = Some(log_level);
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
