use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use subshell::{
    ConfigLoader, ProcessCommand, ProcessCommandBuilder, RunOptions, Subshell, SubshellConfig,
    SubshellError,
};
use tracing::{debug, error, trace};

/// Exit status used when the command hit its timeout, as timeout(1) does
const TIMEOUT_EXIT: u8 = 124;
const NOT_FOUND_EXIT: u8 = 127;

/// Run a command behind a compact live view of its latest output
#[derive(Parser)]
#[command(name = "subshell", version)]
#[command(about = "Run a command behind a compact live view of its latest output", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Title shown above the output panel
    #[arg(short, long)]
    title: Option<String>,

    /// Number of output lines kept in the panel
    #[arg(short = 'n', long)]
    lines: Option<usize>,

    /// Kill the command after this long (e.g. "30s", "5m")
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Report a non-zero exit code as an error
    #[arg(long)]
    check: bool,

    /// Send the command's stdout to the null device
    #[arg(long)]
    discard_stdout: bool,

    /// Send the command's stderr to the null device
    #[arg(long)]
    discard_stderr: bool,

    /// Print output lines as they arrive instead of drawing the panel
    #[arg(long)]
    simple: bool,

    /// Path to configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Command line to run, split with shell quoting rules
    #[arg(long, conflicts_with = "command")]
    shell: Option<String>,

    /// Program and arguments to run
    #[arg(last = true, required_unless_present = "shell")]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ConfigLoader::new().load(cli.config.as_deref()).await {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(cli.verbose, config.log_level.as_deref());
    debug!("subshell started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    let command = match target_command(&cli) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let options = run_options(&cli, config);
    match Subshell::new(options).run_command(&command).await {
        Ok(result) => {
            debug!("`{}` finished in {:?}", command, result.duration);
            ExitCode::from(status_code(result.exit_code))
        }
        Err(e) => {
            error!("Run failed: {}", e);
            eprintln!("Error: {e}");
            ExitCode::from(error_status(&e))
        }
    }
}

fn init_tracing(verbose: u8, configured: Option<&str>) {
    let filter = match verbose {
        0 => configured.unwrap_or("info"),
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose >= 2)
        .with_line_number(verbose >= 3)
        .init();
}

fn target_command(cli: &Cli) -> Result<ProcessCommand> {
    let words = match &cli.shell {
        Some(line) => shell_words::split(line).context("Invalid --shell command line")?,
        None => cli.command.clone(),
    };

    let (program, args) = words.split_first().context("No command given")?;
    Ok(ProcessCommandBuilder::new(program).args(args).build())
}

/// Flags override the configuration file and environment
fn run_options(cli: &Cli, config: SubshellConfig) -> RunOptions {
    let mut options = config.run;

    if let Some(title) = &cli.title {
        options.display_title = title.clone();
    }
    if let Some(lines) = cli.lines {
        options.display_lines = lines;
    }
    if cli.timeout.is_some() {
        options.timeout = cli.timeout;
    }
    options.check |= cli.check;
    options.discard_stdout |= cli.discard_stdout;
    options.discard_stderr |= cli.discard_stderr;
    options.simple_mode |= cli.simple || !std::io::stderr().is_terminal();

    options
}

/// Shell-style status for a child exit code; signal deaths become 128+signal
fn status_code(code: i32) -> u8 {
    match code {
        0..=255 => code as u8,
        c if c < 0 => u8::try_from(128 - c).unwrap_or(u8::MAX),
        _ => 1,
    }
}

fn error_status(err: &SubshellError) -> u8 {
    match err {
        SubshellError::CommandNotFound(_) => NOT_FOUND_EXIT,
        SubshellError::Timeout { .. } => TIMEOUT_EXIT,
        SubshellError::NonZeroExit { code, .. } => status_code(*code),
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_code_mapping() {
        assert_eq!(status_code(0), 0);
        assert_eq!(status_code(7), 7);
        assert_eq!(status_code(-9), 137);
        assert_eq!(status_code(-15), 143);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&SubshellError::CommandNotFound("nope".into())),
            127
        );
        assert_eq!(
            error_status(&SubshellError::Timeout {
                command: "sleep 10".into(),
                timeout: Duration::from_secs(1),
                failures: Vec::new(),
            }),
            124
        );
        assert_eq!(
            error_status(&SubshellError::InvalidOptions("bad".into())),
            1
        );
    }

    #[test]
    fn test_shell_line_is_split_with_quoting() {
        let cli = Cli::parse_from(["subshell", "--shell", "echo 'hello world' done"]);
        let command = target_command(&cli).unwrap();
        assert_eq!(command.program, "echo");
        assert_eq!(command.args, vec!["hello world", "done"]);
    }

    #[test]
    fn test_trailing_command_after_separator() {
        let cli = Cli::parse_from(["subshell", "-n", "4", "--", "ls", "-la"]);
        let command = target_command(&cli).unwrap();
        assert_eq!(command.program, "ls");
        assert_eq!(command.args, vec!["-la"]);
        assert_eq!(cli.lines, Some(4));
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "subshell", "-t", "Deploy", "--timeout", "90s", "--check", "--", "true",
        ]);
        let mut config = SubshellConfig::default();
        config.run.display_title = "from config".into();
        config.run.display_lines = 4;

        let options = run_options(&cli, config);
        assert_eq!(options.display_title, "Deploy");
        assert_eq!(options.display_lines, 4);
        assert_eq!(options.timeout, Some(Duration::from_secs(90)));
        assert!(options.check);
    }
}
