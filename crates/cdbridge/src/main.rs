mod cmd;
mod exit;
mod logging;
mod origins;
mod output;
mod stdio;

use clap::Parser;

use crate::cmd::{BridgeArgs, Command, Settings};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "cdbridge",
    version,
    about = "Chrome native messaging host for the Discord desktop app"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(flatten)]
    settings: Settings,

    /// Calling extension's origin. Chrome starts the host this way; same as
    /// `cdbridge bridge ORIGIN`.
    #[arg(value_name = "ORIGIN")]
    origin: Option<String>,

    /// Native window handle Chrome passes on Windows. Ignored.
    #[arg(long, value_name = "HANDLE", hide = true, global = true)]
    parent_window: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

impl Cli {
    fn into_command(self) -> Option<(Command, Settings, Option<OutputFormat>)> {
        let command = match (self.command, self.origin) {
            (Some(command), _) => command,
            (None, Some(origin)) => Command::Bridge(BridgeArgs { origin }),
            (None, None) => return None,
        };
        Some((command, self.settings, self.format))
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let Some((command, settings, format)) = cli.into_command() else {
        eprintln!("error: expected an extension ORIGIN or a subcommand (see --help)");
        std::process::exit(exit::USAGE);
    };
    let format = format.unwrap_or_else(OutputFormat::default_for_stdout);

    match cmd::run(command, &settings, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
