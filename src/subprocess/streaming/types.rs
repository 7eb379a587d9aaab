//! Core types for streaming infrastructure

use std::fmt;

/// Stream source identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamSource {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Stdout => f.write_str("stdout"),
            StreamSource::Stderr => f.write_str("stderr"),
        }
    }
}

/// A single line read from one of the child's output streams.
///
/// `text` is kept exactly as read, terminator included, so captured output
/// can be reassembled byte for byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub source: StreamSource,
    pub text: String,
}

impl OutputLine {
    pub fn new(source: StreamSource, text: impl Into<String>) -> Self {
        Self {
            source,
            text: text.into(),
        }
    }

    /// The line with its trailing newline removed
    pub fn display_text(&self) -> &str {
        let line = self.text.strip_suffix('\n').unwrap_or(&self.text);
        line.strip_suffix('\r').unwrap_or(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_text_strips_terminators() {
        assert_eq!(OutputLine::new(StreamSource::Stdout, "test\n").display_text(), "test");
        assert_eq!(OutputLine::new(StreamSource::Stdout, "test\r\n").display_text(), "test");
        assert_eq!(OutputLine::new(StreamSource::Stderr, "test").display_text(), "test");
        assert_eq!(OutputLine::new(StreamSource::Stderr, "").display_text(), "");
        assert_eq!(
            OutputLine::new(StreamSource::Stdout, "a\r\nb\n").display_text(),
            "a\r\nb"
        );
    }

    #[test]
    fn test_stream_source_display() {
        assert_eq!(StreamSource::Stdout.to_string(), "stdout");
        assert_eq!(StreamSource::Stderr.to_string(), "stderr");
    }
}
