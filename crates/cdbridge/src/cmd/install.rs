//! Chrome native messaging host manifest.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::cmd::{InstallArgs, Settings};
use crate::exit::{io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

pub const DEFAULT_NAME: &str = "io.github.p00ya.cdb";
pub const DEFAULT_DESCRIPTION: &str =
    "Chrome/Discord bridge - see https://github.com/p00ya/chrome-discord-bridge";

/// The only host type Chrome supports.
const MANIFEST_TYPE: &str = "stdio";

#[cfg(target_os = "macos")]
const SYSTEM_DIR: Option<&str> = Some("/Library/Google/Chrome/NativeMessagingHosts");
#[cfg(target_os = "macos")]
const USER_SUBDIR: Option<&str> =
    Some("Library/Application Support/Google/Chrome/NativeMessagingHosts");

#[cfg(all(unix, not(target_os = "macos")))]
const SYSTEM_DIR: Option<&str> = Some("/etc/opt/chrome/native-messaging-hosts");
#[cfg(all(unix, not(target_os = "macos")))]
const USER_SUBDIR: Option<&str> = Some(".config/google-chrome/NativeMessagingHosts");

// Chrome on Windows locates manifests through the registry.
#[cfg(not(unix))]
const SYSTEM_DIR: Option<&str> = None;
#[cfg(not(unix))]
const USER_SUBDIR: Option<&str> = None;

/// Native messaging host manifest as Chrome reads it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub description: String,
    pub path: String,
    pub allowed_origins: Vec<String>,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

impl Manifest {
    pub fn new(name: &str, description: &str, path: &Path, allowed_origins: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            path: path.display().to_string(),
            allowed_origins,
            kind: MANIFEST_TYPE,
        }
    }

    /// File name Chrome looks for: `<name>.json`.
    pub fn filename(&self) -> String {
        format!("{}.json", self.name)
    }
}

/// Host names are dot-separated runs of lowercase letters, digits and `_`.
pub fn is_valid_name(name: &str) -> bool {
    name.split('.').all(|part| {
        !part.is_empty()
            && part
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
    })
}

/// Check that `origin` is an absolute URL, as Chrome expects in
/// `allowed_origins` (e.g. `chrome-extension://ID/`).
pub fn check_origin(origin: &str) -> CliResult<()> {
    url::Url::parse(origin)
        .map(|_| ())
        .map_err(|err| CliError::usage(format!("invalid origin URL \"{origin}\": {err}")))
}

/// Directory Chrome reads manifests from, for this user or system-wide.
pub fn manifest_dir(system: bool, home: Option<&Path>) -> CliResult<PathBuf> {
    let unsupported =
        || CliError::usage("no known manifest directory on this platform; pass --dir");
    if system {
        return SYSTEM_DIR.map(PathBuf::from).ok_or_else(unsupported);
    }
    let subdir = USER_SUBDIR.ok_or_else(unsupported)?;
    let home = home.ok_or_else(|| CliError::usage("cannot determine home directory; pass --dir"))?;
    Ok(home.join(subdir))
}

#[derive(Serialize)]
struct InstallOutput<'a> {
    manifest_path: String,
    #[serde(flatten)]
    manifest: &'a Manifest,
}

pub fn run(args: InstallArgs, settings: &Settings, format: OutputFormat) -> CliResult<i32> {
    if !is_valid_name(&args.name) {
        return Err(CliError::usage(format!("invalid host name \"{}\"", args.name)));
    }

    let binary = match &args.path {
        Some(path) => path.clone(),
        None => std::env::current_exe()
            .map_err(|err| io_error("resolving current executable", err))?,
    };
    check_executable(&binary);
    let binary = std::path::absolute(&binary)
        .map_err(|err| io_error(&format!("resolving {}", binary.display()), err))?;

    let origins = if args.origins.is_empty() {
        settings.origins()?.to_vec()
    } else {
        args.origins.clone()
    };
    if origins.is_empty() {
        return Err(CliError::usage(
            "no allowed origins; pass --origin or --allow-origin",
        ));
    }
    for origin in &origins {
        check_origin(origin)?;
    }

    let manifest = Manifest::new(&args.name, &args.description, &binary, origins);
    let dir = match &args.dir {
        Some(dir) => dir.clone(),
        None => manifest_dir(args.system, dirs::home_dir().as_deref())?,
    };
    let manifest_path = write_manifest(&dir, &manifest, !args.system)?;
    info!(path = %manifest_path.display(), "wrote manifest");

    print_install(&manifest, &manifest_path, format);
    Ok(SUCCESS)
}

fn write_manifest(dir: &Path, manifest: &Manifest, create_dir: bool) -> CliResult<PathBuf> {
    if create_dir {
        std::fs::create_dir_all(dir)
            .map_err(|err| io_error(&format!("creating {}", dir.display()), err))?;
    }
    let encoded = serde_json::to_vec(manifest)
        .map_err(|err| CliError::new(INTERNAL, format!("encoding manifest: {err}")))?;
    let path = dir.join(manifest.filename());
    std::fs::write(&path, encoded).map_err(|err| io_error("writing manifest", err))?;
    Ok(path)
}

fn check_executable(binary: &Path) {
    match std::fs::metadata(binary) {
        Err(err) => warn!(binary = %binary.display(), error = %err, "cannot access binary"),
        #[cfg(unix)]
        Ok(meta) => {
            use std::os::unix::fs::PermissionsExt;
            if meta.permissions().mode() & 0o100 == 0 {
                warn!(binary = %binary.display(), "binary is not executable");
            }
        }
        #[cfg(not(unix))]
        Ok(_) => {}
    }
}

fn print_install(manifest: &Manifest, manifest_path: &Path, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&InstallOutput {
            manifest_path: manifest_path.display().to_string(),
            manifest,
        }),
        OutputFormat::Table => print_table(
            &["NAME", "MANIFEST", "BINARY", "ORIGINS"],
            vec![vec![
                manifest.name.clone(),
                manifest_path.display().to_string(),
                manifest.path.clone(),
                manifest.allowed_origins.join("\n"),
            ]],
        ),
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!("Wrote manifest for {}", manifest.name);
        }
    }
}
