//! Fixed-capacity scrollback of the most recent output lines

use std::collections::VecDeque;

/// Keeps the last `capacity` lines in arrival order.
///
/// Pushing past capacity drops the single oldest line. The buffer is owned
/// by the supervisor loop and never shared with the drainers.
#[derive(Debug, Clone)]
pub struct BoundedLineBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl BoundedLineBuffer {
    /// Create a buffer holding at most `capacity` lines (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    /// Current contents, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_push_evicts_oldest() {
        let mut buffer = BoundedLineBuffer::new(3);
        for line in ["a", "b", "c", "d"] {
            buffer.push(line);
        }

        assert_eq!(buffer.snapshot(), vec!["b", "c", "d"]);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_snapshot_does_not_mutate() {
        let mut buffer = BoundedLineBuffer::new(2);
        buffer.push("only");

        assert_eq!(buffer.snapshot(), buffer.snapshot());
        assert_eq!(buffer.len(), 1);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let mut buffer = BoundedLineBuffer::new(0);
        buffer.push("x");
        buffer.push("y");

        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot(), vec!["y"]);
    }

    #[test]
    fn test_clear() {
        let mut buffer = BoundedLineBuffer::new(4);
        buffer.push("x");
        buffer.clear();
        assert!(buffer.is_empty());
    }

    proptest! {
        #[test]
        fn test_snapshot_is_most_recent_window(
            capacity in 1usize..32,
            lines in prop::collection::vec("[a-z0-9]{0,8}", 0..200),
        ) {
            let mut buffer = BoundedLineBuffer::new(capacity);
            for line in &lines {
                buffer.push(line.clone());
                prop_assert!(buffer.len() <= capacity);
            }

            let start = lines.len().saturating_sub(capacity);
            prop_assert_eq!(buffer.snapshot(), lines[start..].to_vec());
        }
    }
}
