use std::io::{self, Write};

use crate::subprocess::streaming::{OutputLine, StreamSource};

/// Echoes raw lines to the writer matching their stream.
///
/// Used in simple mode instead of the panel. Each line is flushed as soon as
/// it is written.
pub struct Passthrough<O: Write, E: Write> {
    stdout: O,
    stderr: E,
    warned: bool,
}

impl Passthrough<io::Stdout, io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<O: Write, E: Write> Passthrough<O, E> {
    pub fn new(stdout: O, stderr: E) -> Self {
        Self {
            stdout,
            stderr,
            warned: false,
        }
    }

    pub fn write_line(&mut self, line: &OutputLine) {
        let result = match line.source {
            StreamSource::Stdout => Self::emit(&mut self.stdout, &line.text),
            StreamSource::Stderr => Self::emit(&mut self.stderr, &line.text),
        };

        if let Err(e) = result {
            if !self.warned {
                tracing::warn!("Failed to echo {} line: {}", line.source, e);
                self.warned = true;
            }
        }
    }

    pub fn into_inner(self) -> (O, E) {
        (self.stdout, self.stderr)
    }

    fn emit<W: Write>(writer: &mut W, text: &str) -> io::Result<()> {
        writer.write_all(text.as_bytes())?;
        writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_routed_by_source() {
        let mut echo = Passthrough::new(Vec::new(), Vec::new());
        echo.write_line(&OutputLine::new(StreamSource::Stdout, "out 1\n"));
        echo.write_line(&OutputLine::new(StreamSource::Stderr, "err 1\n"));
        echo.write_line(&OutputLine::new(StreamSource::Stdout, "partial"));

        let (stdout, stderr) = echo.into_inner();
        assert_eq!(String::from_utf8(stdout).unwrap(), "out 1\npartial");
        assert_eq!(String::from_utf8(stderr).unwrap(), "err 1\n");
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_does_not_stop_other_stream() {
        let mut echo = Passthrough::new(BrokenPipe, Vec::new());
        echo.write_line(&OutputLine::new(StreamSource::Stdout, "lost\n"));
        echo.write_line(&OutputLine::new(StreamSource::Stderr, "kept\n"));

        let (_, stderr) = echo.into_inner();
        assert_eq!(stderr, b"kept\n");
    }
}
