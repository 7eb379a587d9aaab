use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::AsyncRead;

use super::error::SubshellError;

/// Owned read end of one of the child's output streams
pub type OutputReader = Pin<Box<dyn AsyncRead + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
        }
    }
}

impl fmt::Display for ProcessCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Which output streams are piped back to the supervisor.
///
/// A stream that is not piped goes to the null device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pipes {
    pub stdout: bool,
    pub stderr: bool,
}

impl Default for Pipes {
    fn default() -> Self {
        Self {
            stdout: true,
            stderr: true,
        }
    }
}

/// Handle on a running child process.
#[async_trait]
pub trait ChildProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Take the stdout reader; `None` if not piped or already taken
    fn take_stdout(&mut self) -> Option<OutputReader>;

    fn take_stderr(&mut self) -> Option<OutputReader>;

    /// Exit code if the process has already terminated
    fn try_wait(&mut self) -> std::io::Result<Option<i32>>;

    async fn wait(&mut self) -> std::io::Result<i32>;

    /// Send a forced kill without waiting for the process to exit
    fn start_kill(&mut self) -> std::io::Result<()>;
}

pub trait ProcessLauncher: Send + Sync {
    fn launch(
        &self,
        command: &ProcessCommand,
        pipes: Pipes,
    ) -> Result<Box<dyn ChildProcess>, SubshellError>;
}

/// Launches real processes through `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioLauncher;

impl TokioLauncher {
    fn configure_command(command: &ProcessCommand, pipes: Pipes) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&command.program);

        // Own process group so a kill reaches anything the command spawned
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        cmd.args(&command.args);
        for (key, value) in &command.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Self::stdio(pipes.stdout));
        cmd.stderr(Self::stdio(pipes.stderr));
        cmd.kill_on_drop(true);
        cmd
    }

    fn stdio(piped: bool) -> Stdio {
        if piped {
            Stdio::piped()
        } else {
            Stdio::null()
        }
    }

    fn map_spawn_error(error: std::io::Error, command: &ProcessCommand) -> SubshellError {
        if error.kind() == std::io::ErrorKind::NotFound {
            SubshellError::CommandNotFound(command.program.clone())
        } else {
            SubshellError::SpawnFailed {
                command: command.to_string(),
                source: error,
            }
        }
    }

    fn log_command_start(command: &ProcessCommand) {
        tracing::debug!("Executing subprocess: {}", command);

        if !command.env.is_empty() {
            tracing::trace!("Environment overrides: {:?}", command.env);
        }
        if let Some(ref dir) = command.working_dir {
            tracing::trace!("Working directory: {:?}", dir);
        }
    }
}

impl ProcessLauncher for TokioLauncher {
    fn launch(
        &self,
        command: &ProcessCommand,
        pipes: Pipes,
    ) -> Result<Box<dyn ChildProcess>, SubshellError> {
        Self::log_command_start(command);

        let child = Self::configure_command(command, pipes)
            .spawn()
            .map_err(|e| {
                tracing::error!(
                    "Failed to spawn '{}': {:?} (kind: {:?})",
                    command.program,
                    e,
                    e.kind()
                );
                Self::map_spawn_error(e, command)
            })?;

        tracing::debug!("Spawned '{}' with pid {:?}", command.program, child.id());
        Ok(Box::new(TokioChild { child }))
    }
}

struct TokioChild {
    child: tokio::process::Child,
}

#[async_trait]
impl ChildProcess for TokioChild {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn take_stdout(&mut self) -> Option<OutputReader> {
        self.child
            .stdout
            .take()
            .map(|stdout| Box::pin(stdout) as OutputReader)
    }

    fn take_stderr(&mut self) -> Option<OutputReader> {
        self.child
            .stderr
            .take()
            .map(|stderr| Box::pin(stderr) as OutputReader)
    }

    fn try_wait(&mut self) -> std::io::Result<Option<i32>> {
        Ok(self.child.try_wait()?.map(exit_code))
    }

    async fn wait(&mut self) -> std::io::Result<i32> {
        Ok(exit_code(self.child.wait().await?))
    }

    fn start_kill(&mut self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                match killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                    Ok(()) => return Ok(()),
                    Err(e) => tracing::debug!("killpg({}) failed, killing child only: {}", pid, e),
                }
            }
        }
        self.child.start_kill()
    }
}

/// Exit code of a finished process; signal deaths become the negated signal
pub fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    signal_code(status)
}

#[cfg(unix)]
fn signal_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|signal| -signal).unwrap_or(-1)
}

#[cfg(not(unix))]
fn signal_code(_status: std::process::ExitStatus) -> i32 {
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessCommand {
        let mut command = ProcessCommand::new("sh");
        command.args = vec!["-c".to_string(), script.to_string()];
        command
    }

    #[test]
    fn test_command_display() {
        assert_eq!(sh("echo hi").to_string(), "sh -c echo hi");
        assert_eq!(ProcessCommand::new("true").to_string(), "true");
    }

    #[test]
    fn test_exit_code_conversion() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(exit_code(std::process::ExitStatus::from_raw(0)), 0);
        // Exit code 1
        assert_eq!(exit_code(std::process::ExitStatus::from_raw(256)), 1);
        // Killed by SIGKILL
        assert_eq!(exit_code(std::process::ExitStatus::from_raw(9)), -9);
    }

    #[tokio::test]
    async fn test_launch_and_wait() {
        let mut child = TokioLauncher.launch(&sh("exit 3"), Pipes::default()).unwrap();
        assert!(child.id().is_some());
        assert_eq!(child.wait().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_streams_taken_once() {
        let mut child = TokioLauncher.launch(&sh("true"), Pipes::default()).unwrap();
        assert!(child.take_stdout().is_some());
        assert!(child.take_stdout().is_none());
        assert!(child.take_stderr().is_some());
        child.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_discarded_streams_are_not_piped() {
        let pipes = Pipes {
            stdout: false,
            stderr: true,
        };
        let mut child = TokioLauncher.launch(&sh("echo hidden"), pipes).unwrap();
        assert!(child.take_stdout().is_none());
        assert!(child.take_stderr().is_some());
        assert_eq!(child.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_launch_nonexistent_command() {
        let command = ProcessCommand::new("nonexistent_command_12345");
        match TokioLauncher.launch(&command, Pipes::default()) {
            Err(SubshellError::CommandNotFound(program)) => {
                assert_eq!(program, "nonexistent_command_12345")
            }
            Err(other) => panic!("Expected CommandNotFound, got {:?}", other),
            Ok(_) => panic!("Expected launch to fail"),
        }
    }

    #[tokio::test]
    async fn test_start_kill_terminates_process_group() {
        let mut child = TokioLauncher
            .launch(&sh("sleep 30; echo never"), Pipes::default())
            .unwrap();
        assert_eq!(child.try_wait().unwrap(), None);

        child.start_kill().unwrap();
        assert_eq!(child.wait().await.unwrap(), -9);
    }
}
