//! Scripted in-memory processes for exercising the supervisor without
//! spawning anything.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use super::error::SubshellError;
use super::runner::{ChildProcess, OutputReader, Pipes, ProcessCommand, ProcessLauncher};

/// Set once the reader it belongs to has been dropped
#[derive(Debug, Clone, Default)]
pub struct ClosedFlag(Arc<AtomicBool>);

impl ClosedFlag {
    pub fn is_closed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reader serving a fixed payload, optionally followed by a read error
pub struct ScriptedReader {
    data: Vec<u8>,
    pos: usize,
    error: Option<io::ErrorKind>,
    closed: ClosedFlag,
}

impl ScriptedReader {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
            error: None,
            closed: ClosedFlag::default(),
        }
    }

    /// Fail with `kind` once the payload is exhausted instead of reaching EOF
    pub fn failing_with(mut self, kind: io::ErrorKind) -> Self {
        self.error = Some(kind);
        self
    }

    pub fn closed_flag(&self) -> ClosedFlag {
        self.closed.clone()
    }
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if this.pos < this.data.len() {
            let n = buf.remaining().min(this.data.len() - this.pos);
            buf.put_slice(&this.data[this.pos..this.pos + n]);
            this.pos += n;
            return Poll::Ready(Ok(()));
        }

        match this.error.take() {
            Some(kind) => Poll::Ready(Err(io::Error::new(kind, "scripted read failure"))),
            None => Poll::Ready(Ok(())),
        }
    }
}

impl Drop for ScriptedReader {
    fn drop(&mut self) {
        self.closed.0.store(true, Ordering::SeqCst);
    }
}

/// Observation handles into a [`ScriptedProcess`] that outlive it
#[derive(Debug, Clone)]
pub struct ProcessProbe {
    pub stdout_closed: ClosedFlag,
    pub stderr_closed: ClosedFlag,
    kills: Arc<AtomicUsize>,
}

impl ProcessProbe {
    pub fn kill_count(&self) -> usize {
        self.kills.load(Ordering::SeqCst)
    }
}

pub struct ScriptedProcess {
    stdout: Option<ScriptedReader>,
    stderr: Option<ScriptedReader>,
    exit_code: i32,
    runs_until_killed: bool,
    killed: bool,
    kills: Arc<AtomicUsize>,
}

impl ScriptedProcess {
    pub fn new(exit_code: i32) -> Self {
        Self {
            stdout: Some(ScriptedReader::new(Vec::new())),
            stderr: Some(ScriptedReader::new(Vec::new())),
            exit_code,
            runs_until_killed: false,
            killed: false,
            kills: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn stdout(mut self, reader: ScriptedReader) -> Self {
        self.stdout = Some(reader);
        self
    }

    pub fn stderr(mut self, reader: ScriptedReader) -> Self {
        self.stderr = Some(reader);
        self
    }

    /// Never exit on its own; a kill ends it with code -9
    pub fn hanging(mut self) -> Self {
        self.runs_until_killed = true;
        self
    }

    pub fn probe(&self) -> ProcessProbe {
        let flag = |reader: &Option<ScriptedReader>| {
            reader
                .as_ref()
                .map(ScriptedReader::closed_flag)
                .unwrap_or_default()
        };
        ProcessProbe {
            stdout_closed: flag(&self.stdout),
            stderr_closed: flag(&self.stderr),
            kills: Arc::clone(&self.kills),
        }
    }

    fn status(&self) -> Option<i32> {
        match (self.runs_until_killed, self.killed) {
            (false, _) => Some(self.exit_code),
            (true, true) => Some(-9),
            (true, false) => None,
        }
    }
}

#[async_trait]
impl ChildProcess for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        None
    }

    fn take_stdout(&mut self) -> Option<OutputReader> {
        self.stdout
            .take()
            .map(|reader| Box::pin(reader) as OutputReader)
    }

    fn take_stderr(&mut self) -> Option<OutputReader> {
        self.stderr
            .take()
            .map(|reader| Box::pin(reader) as OutputReader)
    }

    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.status())
    }

    async fn wait(&mut self) -> io::Result<i32> {
        match self.status() {
            Some(code) => Ok(code),
            None => std::future::pending().await,
        }
    }

    fn start_kill(&mut self) -> io::Result<()> {
        self.kills.fetch_add(1, Ordering::SeqCst);
        self.killed = true;
        Ok(())
    }
}

/// Hands out queued [`ScriptedProcess`]es in order and records each launch
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    processes: Arc<Mutex<VecDeque<ScriptedProcess>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, process: ScriptedProcess) -> ProcessProbe {
        let probe = process.probe();
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(process);
        probe
    }

    pub fn get_call_history(&self) -> Vec<ProcessCommand> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ProcessLauncher for ScriptedLauncher {
    fn launch(
        &self,
        command: &ProcessCommand,
        pipes: Pipes,
    ) -> Result<Box<dyn ChildProcess>, SubshellError> {
        self.call_history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());

        let mut process = self
            .processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| SubshellError::CommandNotFound(command.program.clone()))?;

        if !pipes.stdout {
            process.stdout = None;
        }
        if !pipes.stderr {
            process.stderr = None;
        }
        Ok(Box::new(process))
    }
}
