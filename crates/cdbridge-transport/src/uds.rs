use std::path::Path;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::IpcStream;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Connect to a listening Unix domain socket (blocking).
pub fn connect(path: impl AsRef<Path>) -> Result<IpcStream> {
    let path = path.as_ref();
    check_path_len(path)?;
    let stream =
        std::os::unix::net::UnixStream::connect(path).map_err(|e| TransportError::Connect {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!(?path, "connected to unix domain socket");
    Ok(IpcStream::from(stream))
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_PATH_LEN,
        });
    }
    Ok(())
}

#[cfg(any(test, feature = "listener"))]
pub use listener::UnixDomainSocket;

#[cfg(any(test, feature = "listener"))]
mod listener {
    use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
    use std::os::unix::net::UnixListener;
    use std::path::{Path, PathBuf};

    use tracing::{debug, info};

    use super::check_path_len;
    use crate::error::{Result, TransportError};
    use crate::traits::IpcStream;

    /// Listening side of a desktop IPC socket.
    ///
    /// The desktop application owns the real one; this stands in for it in
    /// tests and local development.
    pub struct UnixDomainSocket {
        listener: UnixListener,
        path: PathBuf,
        created_inode: (u64, u64),
    }

    impl UnixDomainSocket {
        /// Permission mode for created socket paths.
        pub const SOCKET_MODE: u32 = 0o600;

        /// Bind and listen, replacing a stale socket at `path`. Any other
        /// kind of file is left alone and the bind fails.
        pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
            let path = path.as_ref().to_path_buf();
            check_path_len(&path)?;

            let bind_err = |source| TransportError::Bind {
                path: path.clone(),
                source,
            };

            if let Ok(metadata) = std::fs::symlink_metadata(&path) {
                if !metadata.file_type().is_socket() {
                    return Err(bind_err(std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    )));
                }
                debug!(?path, "removing stale socket");
                std::fs::remove_file(&path).map_err(bind_err)?;
            }

            let listener = UnixListener::bind(&path).map_err(bind_err)?;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(Self::SOCKET_MODE))
                .map_err(bind_err)?;
            let created = std::fs::symlink_metadata(&path).map_err(bind_err)?;
            info!(?path, "fake desktop listening");

            Ok(Self {
                listener,
                created_inode: (created.dev(), created.ino()),
                path,
            })
        }

        /// Accept one connection (blocking).
        pub fn accept(&self) -> Result<IpcStream> {
            let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
            Ok(IpcStream::from(stream))
        }

        pub fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for UnixDomainSocket {
        fn drop(&mut self) {
            // Only remove the file if it is still the socket we created.
            let ours = std::fs::symlink_metadata(&self.path)
                .map(|m| m.file_type().is_socket() && (m.dev(), m.ino()) == self.created_inode)
                .unwrap_or(false);
            if ours {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}
