use std::time::Duration;

use crate::subprocess::streaming::StreamSource;

/// Failure of a single stream drainer while reading its stream.
#[derive(Debug, thiserror::Error)]
#[error("failed reading {stream}: {source}")]
pub struct DrainerError {
    pub stream: StreamSource,
    #[source]
    pub source: std::io::Error,
}

impl DrainerError {
    pub fn new(stream: StreamSource, source: std::io::Error) -> Self {
        Self { stream, source }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubshellError {
    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Stream failures seen while tearing down the killed process are kept
    /// in `failures`; the timeout itself takes precedence.
    #[error("`{command}` timed out after {timeout:?}{}", describe_teardown(.failures))]
    Timeout {
        command: String,
        timeout: Duration,
        failures: Vec<DrainerError>,
    },

    #[error("`{command}` exited with code {code}")]
    NonZeroExit {
        command: String,
        code: i32,
        stdout: Option<String>,
        stderr: Option<String>,
    },

    #[error("Output of `{command}` is unreliable: {}", describe_failures(.failures))]
    StreamFailure {
        command: String,
        failures: Vec<DrainerError>,
    },

    #[error("Lost track of `{command}`: {source}")]
    Process {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid run options: {0}")]
    InvalidOptions(String),
}

impl SubshellError {
    /// True when the command never started.
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            SubshellError::CommandNotFound(_) | SubshellError::SpawnFailed { .. }
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, SubshellError::Timeout { .. })
    }

    /// Exit code carried by a strict-mode failure.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SubshellError::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

fn describe_teardown(failures: &[DrainerError]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!(" ({})", describe_failures(failures))
    }
}

fn describe_failures(failures: &[DrainerError]) -> String {
    match failures {
        [] => "no stream failures recorded".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
    }
}
