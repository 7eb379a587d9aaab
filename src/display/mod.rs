//! Rendering of the scrollback while a command runs
//!
//! A run picks one sink up front: [`LiveView`] redraws a fixed-height panel
//! from the buffer snapshot, [`NullView`] does nothing. In simple mode the
//! supervisor pairs [`NullView`] with a [`Passthrough`] that echoes raw lines.

pub mod live;
pub mod passthrough;

pub use live::{frame_rows, LiveView};
pub use passthrough::Passthrough;

/// Receives the scrollback after every delivered line.
///
/// `refresh` must only redraw: no blocking I/O beyond the terminal write.
pub trait DisplaySink: Send {
    fn refresh(&mut self, snapshot: &[String]);

    /// Called once when the run ends, on every exit path after the
    /// options were accepted, including a failed launch
    fn finish(&mut self) {}
}

/// Sink used when the live panel is disabled
#[derive(Debug, Default, Clone, Copy)]
pub struct NullView;

impl DisplaySink for NullView {
    fn refresh(&mut self, _snapshot: &[String]) {}
}
