//! Per-stream reader tasks feeding the supervisor's queues

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::types::{OutputLine, StreamSource};
use crate::subprocess::error::DrainerError;
use crate::subprocess::runner::OutputReader;

/// Lines a drainer may read ahead of the supervisor. A full queue stops the
/// drainer reading, so the pipe fills and the child blocks on its writes.
pub const QUEUE_CAPACITY: usize = 1024;

/// Result of waiting on the drainer queue with a deadline
#[derive(Debug)]
pub enum Next {
    Line(OutputLine),
    /// The drainer finished and its queue is empty
    Closed,
    Expired,
}

/// How a drainer task ended
#[derive(Debug)]
pub enum DrainOutcome {
    Completed { lines: u64 },
    Failed(DrainerError),
    /// Aborted before reaching end of stream
    Abandoned,
}

/// Reads one output stream to completion on its own task.
///
/// The task is the only reader of the stream and the only writer to the
/// bounded queue; the supervisor is the only reader of the queue. Dropping
/// the drainer aborts the task, which closes the stream.
pub struct Drainer {
    source: StreamSource,
    queue: mpsc::Receiver<OutputLine>,
    task: Option<JoinHandle<Result<u64, DrainerError>>>,
}

impl Drainer {
    pub fn spawn(source: StreamSource, reader: OutputReader) -> Self {
        let (sender, queue) = mpsc::channel(QUEUE_CAPACITY);
        let task = tokio::spawn(drain_stream(source, reader, sender));

        Self {
            source,
            queue,
            task: Some(task),
        }
    }

    pub fn source(&self) -> StreamSource {
        self.source
    }

    /// Dequeue a line if one is ready, without waiting
    pub fn try_next(&mut self) -> Option<OutputLine> {
        self.queue.try_recv().ok()
    }

    /// Await the next line until `deadline`.
    ///
    /// Once the deadline has passed this reports [`Next::Expired`] even if
    /// lines are still queued, so a flooding stream cannot hold it open.
    pub async fn next_before(&mut self, deadline: Instant) -> Next {
        if Instant::now() >= deadline {
            return Next::Expired;
        }
        match tokio::time::timeout_at(deadline, self.queue.recv()).await {
            Ok(Some(line)) => Next::Line(line),
            Ok(None) => Next::Closed,
            Err(_) => Next::Expired,
        }
    }

    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the task to end and collect its outcome.
    ///
    /// Call after the queue reported [`Next::Closed`] or after [`Drainer::abort`],
    /// otherwise this waits for end of stream.
    pub async fn join(mut self) -> DrainOutcome {
        let Some(task) = self.task.take() else {
            return DrainOutcome::Abandoned;
        };

        match task.await {
            Ok(Ok(lines)) => DrainOutcome::Completed { lines },
            Ok(Err(e)) => DrainOutcome::Failed(e),
            Err(e) if e.is_cancelled() => DrainOutcome::Abandoned,
            Err(e) => DrainOutcome::Failed(DrainerError::new(
                self.source,
                std::io::Error::other(format!("drainer task panicked: {}", e)),
            )),
        }
    }
}

impl Drop for Drainer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn drain_stream(
    source: StreamSource,
    reader: OutputReader,
    queue: mpsc::Sender<OutputLine>,
) -> Result<u64, DrainerError> {
    let mut reader = BufReader::new(reader);
    let mut lines = 0u64;

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                lines += 1;
                if queue.send(OutputLine::new(source, line)).await.is_err() {
                    tracing::trace!("{} queue dropped, stopping drainer", source);
                    break;
                }
            }
            Err(e) => {
                tracing::debug!("Read error on {} after {} lines: {}", source, lines, e);
                return Err(DrainerError::new(source, e));
            }
        }
    }

    tracing::trace!("{} reached end of stream after {} lines", source, lines);
    Ok(lines)
}
