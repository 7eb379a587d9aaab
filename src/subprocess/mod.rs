pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;
pub mod streaming;
pub mod supervisor;


pub use builder::ProcessCommandBuilder;
pub use error::{DrainerError, SubshellError};
pub use mock::{ScriptedLauncher, ScriptedProcess, ScriptedReader};
pub use runner::{ChildProcess, OutputReader, Pipes, ProcessCommand, ProcessLauncher, TokioLauncher};
pub use streaming::{BoundedLineBuffer, OutputLine, StreamSource};
pub use supervisor::{RunResult, Subshell};
