//! Supervised execution of one command behind a scrolling display
//!
//! The supervisor owns the child process, spawns one [`Drainer`] per piped
//! stream and runs a single polling loop that fans their queues into the
//! scrollback buffer, the display sink and the optional capture. It moves
//! through `Starting -> Running -> Draining -> Completed`, or through
//! `Running -> TimedOut -> Killed -> Draining -> Completed` when the timeout
//! fires. Every path ends with the process reaped and both drainers joined
//! or aborted before `run` returns.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use super::builder::ProcessCommandBuilder;
use super::error::{DrainerError, SubshellError};
use super::runner::{ChildProcess, Pipes, ProcessCommand, ProcessLauncher, TokioLauncher};
use super::streaming::drainer::QUEUE_CAPACITY;
use super::streaming::{BoundedLineBuffer, DrainOutcome, Drainer, Next, OutputLine, StreamSource};
use crate::config::RunOptions;
use crate::display::{DisplaySink, LiveView, NullView, Passthrough};

/// Upper bound on lines moved per stream in one loop iteration, so exit and
/// timeout checks still happen while output is flooding in.
const MAX_LINES_PER_POLL: usize = 256;

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    pub exit_code: i32,
    /// Full stdout, present only when capture was requested
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub duration: Duration,
}

impl RunResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Reusable runner: every call supervises one fresh child process.
///
/// ```no_run
/// # async fn build() -> Result<(), subshell::SubshellError> {
/// use subshell::{RunOptions, Subshell};
///
/// let runner = Subshell::new(RunOptions {
///     display_title: "Build".to_string(),
///     display_lines: 10,
///     check: true,
///     ..RunOptions::default()
/// });
/// let result = runner.run("make", &["-j8"]).await?;
/// assert!(result.success());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Subshell {
    options: RunOptions,
    launcher: Arc<dyn ProcessLauncher>,
}

impl Subshell {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            launcher: Arc::new(TokioLauncher),
        }
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn ProcessLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub async fn run<S: AsRef<str>>(
        &self,
        program: &str,
        args: &[S],
    ) -> Result<RunResult, SubshellError> {
        let command = ProcessCommandBuilder::new(program).args(args).build();
        self.run_command(&command).await
    }

    /// Run with the display selected by the options
    pub async fn run_command(&self, command: &ProcessCommand) -> Result<RunResult, SubshellError> {
        self.execute(command, || self.default_sink()).await
    }

    /// Run with a caller-provided sink for the scrollback.
    ///
    /// In simple mode the sink is never refreshed and lines are echoed to
    /// this process's stdout/stderr instead.
    pub async fn run_with_display(
        &self,
        command: &ProcessCommand,
        sink: Box<dyn DisplaySink>,
    ) -> Result<RunResult, SubshellError> {
        self.execute(command, move || sink).await
    }

    fn default_sink(&self) -> Box<dyn DisplaySink> {
        if self.options.simple_mode {
            Box::new(NullView)
        } else {
            Box::new(LiveView::new(
                &self.options.display_title,
                self.options.display_lines,
            ))
        }
    }

    /// Validate, then launch. The sink is only built for accepted options.
    async fn execute<F>(
        &self,
        command: &ProcessCommand,
        make_sink: F,
    ) -> Result<RunResult, SubshellError>
    where
        F: FnOnce() -> Box<dyn DisplaySink>,
    {
        self.options.validate()?;

        let pipes = Pipes {
            stdout: !self.options.discard_stdout,
            stderr: !self.options.discard_stderr,
        };
        let mut sink = make_sink();
        let span = tracing::debug_span!("subshell", command = %command);
        let child = match span.in_scope(|| self.launcher.launch(command, pipes)) {
            Ok(child) => child,
            Err(e) => {
                sink.finish();
                return Err(e);
            }
        };

        Supervisor::new(command.to_string(), &self.options, child, sink)
            .supervise()
            .instrument(span)
            .await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Starting,
    Running,
    TimedOut,
    Killed,
    Draining,
    Completed,
}

/// Why the polling loop stopped
enum LoopExit {
    Exited,
    TimedOut(Duration),
    Lost(io::Error),
}

#[derive(Debug, Default)]
struct Capture {
    stdout: String,
    stderr: String,
}

impl Capture {
    fn record(&mut self, line: &OutputLine) {
        match line.source {
            StreamSource::Stdout => self.stdout.push_str(&line.text),
            StreamSource::Stderr => self.stderr.push_str(&line.text),
        }
    }
}

struct Supervisor<'a> {
    command: String,
    options: &'a RunOptions,
    child: Box<dyn ChildProcess>,
    drainers: Vec<Drainer>,
    buffer: BoundedLineBuffer,
    sink: Box<dyn DisplaySink>,
    echo: Option<Passthrough<io::Stdout, io::Stderr>>,
    capture: Option<Capture>,
    phase: Phase,
    started: Instant,
}

impl<'a> Supervisor<'a> {
    fn new(
        command: String,
        options: &'a RunOptions,
        mut child: Box<dyn ChildProcess>,
        sink: Box<dyn DisplaySink>,
    ) -> Self {
        let started = Instant::now();

        let mut drainers = Vec::with_capacity(2);
        if let Some(stdout) = child.take_stdout() {
            drainers.push(Drainer::spawn(StreamSource::Stdout, stdout));
        }
        if let Some(stderr) = child.take_stderr() {
            drainers.push(Drainer::spawn(StreamSource::Stderr, stderr));
        }

        Self {
            command,
            options,
            child,
            drainers,
            buffer: BoundedLineBuffer::new(options.display_lines),
            sink,
            echo: options.simple_mode.then(Passthrough::stdio),
            capture: options.capture_output.then(Capture::default),
            phase: Phase::Starting,
            started,
        }
    }

    async fn supervise(mut self) -> Result<RunResult, SubshellError> {
        self.transition(Phase::Running);
        let exit = self.poll_until_exit().await;

        if let LoopExit::Lost(e) = &exit {
            tracing::error!("Polling `{}` failed, killing it: {}", self.command, e);
            self.kill();
        }

        self.transition(Phase::Draining);
        let waited = self.child.wait().await;
        let failures = self.drain().await;
        self.sink.finish();
        self.transition(Phase::Completed);

        self.conclude(exit, waited, failures)
    }

    async fn poll_until_exit(&mut self) -> LoopExit {
        loop {
            let delivered = self.deliver_ready();

            match self.child.try_wait() {
                Ok(Some(code)) => {
                    tracing::trace!("`{}` exited with code {}", self.command, code);
                    return LoopExit::Exited;
                }
                Ok(None) => {}
                Err(e) => return LoopExit::Lost(e),
            }

            if let Some(timeout) = self.options.timeout {
                if self.started.elapsed() > timeout {
                    self.transition(Phase::TimedOut);
                    tracing::warn!(
                        "`{}` exceeded its {:?} timeout, killing it",
                        self.command,
                        timeout
                    );
                    self.kill();
                    self.transition(Phase::Killed);
                    return LoopExit::TimedOut(timeout);
                }
            }

            if delivered == 0 {
                tokio::time::sleep(self.options.poll_interval).await;
            } else {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Move whatever is already queued, alternating between streams
    fn deliver_ready(&mut self) -> usize {
        let mut delivered = 0;
        for _ in 0..MAX_LINES_PER_POLL {
            let ready: Vec<OutputLine> = self
                .drainers
                .iter_mut()
                .filter_map(Drainer::try_next)
                .collect();
            if ready.is_empty() {
                break;
            }

            delivered += ready.len();
            for line in ready {
                self.deliver(line);
            }
        }
        delivered
    }

    fn deliver(&mut self, line: OutputLine) {
        match &mut self.echo {
            Some(echo) => echo.write_line(&line),
            None => {
                self.buffer.push(line.display_text());
                self.sink.refresh(&self.buffer.snapshot());
            }
        }

        if let Some(capture) = &mut self.capture {
            capture.record(&line);
        }
    }

    fn kill(&mut self) {
        if let Err(e) = self.child.start_kill() {
            tracing::warn!("Failed to kill `{}`: {}", self.command, e);
        }
    }

    /// Flush both queues within the grace period and join the drainers
    async fn drain(&mut self) -> Vec<DrainerError> {
        let deadline = Instant::now() + self.options.drain_grace;
        let mut failures = Vec::new();

        for mut drainer in std::mem::take(&mut self.drainers) {
            loop {
                match drainer.next_before(deadline).await {
                    Next::Line(line) => self.deliver(line),
                    Next::Closed => break,
                    Next::Expired => {
                        if !drainer.is_finished() {
                            tracing::warn!(
                                "{} of `{}` still open {:?} after exit, abandoning it",
                                drainer.source(),
                                self.command,
                                self.options.drain_grace
                            );
                            drainer.abort();
                        }
                        let queued: Vec<OutputLine> = std::iter::from_fn(|| drainer.try_next())
                            .take(QUEUE_CAPACITY)
                            .collect();
                        for line in queued {
                            self.deliver(line);
                        }
                        break;
                    }
                }
            }

            let source = drainer.source();
            match drainer.join().await {
                DrainOutcome::Completed { lines } => {
                    tracing::trace!("{} drainer finished after {} lines", source, lines)
                }
                DrainOutcome::Failed(e) => {
                    tracing::error!("Reading {} of `{}` failed: {}", source, self.command, e.source);
                    failures.push(e);
                }
                DrainOutcome::Abandoned => {}
            }
        }

        failures
    }

    fn conclude(
        self,
        exit: LoopExit,
        waited: io::Result<i32>,
        failures: Vec<DrainerError>,
    ) -> Result<RunResult, SubshellError> {
        let duration = self.started.elapsed();
        let command = self.command;

        let exit_code = match exit {
            LoopExit::TimedOut(timeout) => {
                return Err(SubshellError::Timeout {
                    command,
                    timeout,
                    failures,
                })
            }
            LoopExit::Lost(source) => return Err(SubshellError::Process { command, source }),
            LoopExit::Exited => match waited {
                Ok(code) => code,
                Err(source) => return Err(SubshellError::Process { command, source }),
            },
        };

        if !failures.is_empty() {
            return Err(SubshellError::StreamFailure { command, failures });
        }

        let (stdout, stderr) = self
            .capture
            .map(|capture| (capture.stdout, capture.stderr))
            .unzip();

        if exit_code != 0 && self.options.check {
            tracing::debug!("`{}` failed with exit code {}", command, exit_code);
            return Err(SubshellError::NonZeroExit {
                command,
                code: exit_code,
                stdout,
                stderr,
            });
        }

        tracing::debug!(
            "`{}` completed with exit code {} in {:?}",
            command,
            exit_code,
            duration
        );
        Ok(RunResult {
            exit_code,
            stdout,
            stderr,
            duration,
        })
    }

    fn transition(&mut self, next: Phase) {
        tracing::trace!("`{}`: {:?} -> {:?}", self.command, self.phase, next);
        self.phase = next;
    }
}
