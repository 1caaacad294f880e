//! Desktop IPC endpoint discovery.
//!
//! The desktop application listens on the first free name out of a small
//! numbered set (`discord-ipc-0` through `discord-ipc-9`). On Unix these are
//! socket files in the temp directory; on Windows they are named pipes.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// Base name shared by every endpoint; the index is appended.
pub const ENDPOINT_BASENAME: &str = "discord-ipc-";

/// How many numbered endpoints the desktop application may listen on.
pub const DEFAULT_MAX_ENDPOINTS: usize = 10;

/// Where and how to look for the desktop IPC endpoint.
#[derive(Debug, Clone)]
pub struct DialConfig {
    /// Directory holding the socket files (Unix only).
    pub dir: PathBuf,
    /// Number of numbered candidates to try, starting at 0.
    pub max_endpoints: usize,
    /// Prepended to the base name. Empty for the real application; set in
    /// tests so a fake peer never collides with a running one.
    pub prefix: String,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            max_endpoints: DEFAULT_MAX_ENDPOINTS,
            prefix: String::new(),
        }
    }
}

impl DialConfig {
    /// Default configuration rooted at `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }
}

/// Path of the `n`th candidate endpoint.
#[cfg(not(windows))]
pub fn endpoint_path(config: &DialConfig, n: usize) -> PathBuf {
    config
        .dir
        .join(format!("{}{ENDPOINT_BASENAME}{n}", config.prefix))
}

/// Path of the `n`th candidate endpoint.
///
/// Uses the `\\?\` prefix like the desktop application's own client library.
#[cfg(windows)]
pub fn endpoint_path(config: &DialConfig, n: usize) -> PathBuf {
    PathBuf::from(format!(
        r"\\?\pipe\{}{ENDPOINT_BASENAME}{n}",
        config.prefix
    ))
}

/// Every candidate endpoint, in the order they are tried.
pub fn candidates(config: &DialConfig) -> Vec<PathBuf> {
    (0..config.max_endpoints)
        .map(|n| endpoint_path(config, n))
        .collect()
}

/// Connect to the first candidate endpoint that accepts a connection.
///
/// Returns the endpoint that answered alongside the stream. When every
/// candidate fails, the error carries the last failure.
pub fn dial(config: &DialConfig) -> Result<(PathBuf, IpcStream)> {
    let mut last = None;
    let mut tried = 0;

    for path in candidates(config) {
        tried += 1;
        match connect(&path) {
            Ok(stream) => {
                info!(path = %path.display(), "connected to desktop IPC endpoint");
                return Ok((path, stream));
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "endpoint unavailable");
                last = Some(err);
            }
        }
    }

    let last = last.unwrap_or_else(|| TransportError::Connect {
        path: config.dir.clone(),
        source: std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no candidate endpoints configured",
        ),
    });
    Err(TransportError::NoEndpoint {
        tried,
        last: Box::new(last),
    })
}

#[cfg(unix)]
fn connect(path: &Path) -> Result<IpcStream> {
    crate::uds::connect(path)
}

#[cfg(windows)]
fn connect(path: &Path) -> Result<IpcStream> {
    crate::pipe::PipeStream::connect(path).map(IpcStream::from)
}

#[cfg(not(any(unix, windows)))]
fn connect(_path: &Path) -> Result<IpcStream> {
    Err(TransportError::Unsupported)
}

/// Observed state of one candidate endpoint.
#[derive(Debug, Clone)]
pub struct EndpointStatus {
    pub index: usize,
    pub path: PathBuf,
    pub exists: bool,
    pub connectable: bool,
    /// Credentials of the listening process as `(uid, gid, pid)`, when known.
    pub peer: Option<(u32, u32, u32)>,
}

/// Check every candidate endpoint without exchanging any frames.
pub fn probe(config: &DialConfig) -> Vec<EndpointStatus> {
    candidates(config)
        .into_iter()
        .enumerate()
        .map(|(index, path)| {
            let exists = path.exists();
            let stream = if exists { connect(&path).ok() } else { None };
            EndpointStatus {
                index,
                exists,
                connectable: stream.is_some(),
                peer: stream.and_then(|s| {
                    let creds = s.peer_credentials();
                    let _ = s.shutdown();
                    creds
                }),
                path,
            }
        })
        .collect()
}
