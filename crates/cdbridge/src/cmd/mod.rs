use std::path::PathBuf;

use cdbridge_transport::DialConfig;
use clap::{Args, Subcommand};

use crate::exit::CliResult;
use crate::origins::AllowedOrigins;
use crate::output::OutputFormat;

pub mod bridge;
pub mod echo;
pub mod endpoints;
pub mod install;
pub mod set_activity;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Relay native messages from an extension to the desktop app.
    Bridge(BridgeArgs),
    /// Native messaging host that echoes every request back.
    Echo(EchoArgs),
    /// Register this binary as a Chrome native messaging host.
    Install(InstallArgs),
    /// Set the desktop app's activity status directly.
    SetActivity(SetActivityArgs),
    /// List candidate desktop IPC endpoints and whether they answer.
    Endpoints(EndpointsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, settings: &Settings, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Bridge(args) => bridge::run(args, settings),
        Command::Echo(args) => echo::run(args),
        Command::Install(args) => install::run(args, settings, format),
        Command::SetActivity(args) => set_activity::run(args, settings, format),
        Command::Endpoints(args) => endpoints::run(args, settings, format),
        Command::Version(args) => version::run(args),
    }
}

/// Options shared by every command.
#[derive(Args, Debug, Clone, Default)]
pub struct Settings {
    /// Directory holding the desktop IPC sockets. Default: the temp dir.
    #[arg(long, value_name = "DIR", env = "CDBRIDGE_IPC_DIR", global = true)]
    pub ipc_dir: Option<PathBuf>,

    /// Replace the built-in allowed origins with the lines of FILE.
    #[arg(
        long,
        value_name = "FILE",
        env = "CDBRIDGE_ALLOWED_ORIGINS",
        global = true
    )]
    pub allowed_origins: Option<PathBuf>,

    /// Allow an extra extension origin. Repeatable.
    #[arg(long = "allow-origin", value_name = "ORIGIN", global = true)]
    pub allow_origin: Vec<String>,
}

impl Settings {
    pub fn dial_config(&self) -> DialConfig {
        match &self.ipc_dir {
            Some(dir) => DialConfig::in_dir(dir),
            None => DialConfig::default(),
        }
    }

    pub fn origins(&self) -> CliResult<AllowedOrigins> {
        AllowedOrigins::load(self.allowed_origins.as_deref(), &self.allow_origin)
    }
}

#[derive(Args, Debug)]
pub struct BridgeArgs {
    /// Calling extension's origin, e.g. chrome-extension://ID/
    pub origin: String,
}

#[derive(Args, Debug, Default)]
pub struct EchoArgs {}

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Host name registered with Chrome.
    #[arg(long, default_value = install::DEFAULT_NAME)]
    pub name: String,
    /// Host description.
    #[arg(long, default_value = install::DEFAULT_DESCRIPTION)]
    pub description: String,
    /// Binary Chrome should start. Default: this executable.
    #[arg(long, value_name = "BINARY")]
    pub path: Option<PathBuf>,
    /// Allowed origin for the manifest. Repeatable. Default: the allowed
    /// origins.
    #[arg(long = "origin", value_name = "ORIGIN")]
    pub origins: Vec<String>,
    /// Write the manifest into DIR instead of Chrome's directory.
    #[arg(long, value_name = "DIR", conflicts_with = "system")]
    pub dir: Option<PathBuf>,
    /// Install system-wide instead of for the current user.
    #[arg(long)]
    pub system: bool,
}

#[derive(Args, Debug)]
pub struct SetActivityArgs {
    /// Application ID, or one of the known names (monkeytype, wanikani).
    pub client_id: String,
    /// Activity state text.
    pub state: String,
    /// Activity details text.
    #[arg(short = 'd', long)]
    pub details: Option<String>,
    /// PID the activity belongs to. Default: this process.
    #[arg(short = 'p', long)]
    pub pid: Option<u32>,
}

#[derive(Args, Debug, Default)]
pub struct EndpointsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
