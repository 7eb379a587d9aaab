//! # Subshell
//!
//! Run a command while showing only the last few lines of its output in a
//! small live panel, then hand back its exit status and, on request, the full
//! captured output.
//!
//! ## Usage
//!
//! ```bash
//! subshell -t "Build" -n 8 --timeout 10m -- make -j8
//! ```
//!
//! ## Modules
//!
//! - `config` - Run options and the TOML/environment configuration layer
//! - `display` - Live panel, null view and the simple-mode passthrough
//! - `subprocess` - Launch primitive, stream drainers and the process supervisor
pub mod config;
pub mod display;
pub mod subprocess;

pub use config::{ConfigLoader, RunOptions, SubshellConfig};
pub use display::{DisplaySink, LiveView, NullView};
pub use subprocess::{ProcessCommand, ProcessCommandBuilder, RunResult, Subshell, SubshellError};
