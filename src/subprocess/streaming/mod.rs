//! Line-by-line stream plumbing between the child process and the supervisor
//!
//! Each output stream gets its own [`Drainer`] task that forwards lines over a
//! single-producer/single-consumer queue. The supervisor loop owns the
//! [`BoundedLineBuffer`] that backs the scrollback display.

pub mod buffer;
pub mod drainer;
pub mod types;

pub use buffer::BoundedLineBuffer;
pub use drainer::{DrainOutcome, Drainer, Next};
pub use types::{OutputLine, StreamSource};
