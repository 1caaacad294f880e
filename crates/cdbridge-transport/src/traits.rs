use std::io::{Read, Write};

use crate::error::Result;

/// What a protocol engine needs from a full-duplex byte stream.
///
/// Engines read from one handle on a dedicated thread while writing from
/// another, so the stream must be cloneable into a second handle onto the
/// same connection. Shutting the connection down must wake a reader blocked
/// on the other handle.
pub trait Connection: Read + Write + Send + Sized + 'static {
    /// Open a second handle onto the same connection.
    fn try_clone_connection(&self) -> std::io::Result<Self>;

    /// Shut down both directions of the connection.
    fn shutdown_connection(&self) -> std::io::Result<()>;
}

/// A connected IPC stream implementing Read + Write.
///
/// On Unix, this wraps a Unix domain socket stream; on Windows, the client
/// end of a named pipe.
pub struct IpcStream {
    inner: IpcStreamInner,
}

enum IpcStreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    #[cfg(windows)]
    Pipe(crate::pipe::PipeStream),
}

impl Read for IpcStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.read(buf),
            #[cfg(windows)]
            IpcStreamInner::Pipe(pipe) => pipe.read(buf),
        }
    }
}

impl Write for IpcStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.write(buf),
            #[cfg(windows)]
            IpcStreamInner::Pipe(pipe) => pipe.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream.flush(),
            #[cfg(windows)]
            IpcStreamInner::Pipe(pipe) => pipe.flush(),
        }
    }
}

#[cfg(unix)]
impl From<std::os::unix::net::UnixStream> for IpcStream {
    fn from(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: IpcStreamInner::Unix(stream),
        }
    }
}

#[cfg(windows)]
impl From<crate::pipe::PipeStream> for IpcStream {
    fn from(pipe: crate::pipe::PipeStream) -> Self {
        Self {
            inner: IpcStreamInner::Pipe(pipe),
        }
    }
}

impl IpcStream {
    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => Ok(Self::from(stream.try_clone()?)),
            #[cfg(windows)]
            IpcStreamInner::Pipe(pipe) => Ok(Self::from(pipe.try_clone()?)),
        }
    }

    /// Shut down both halves of the stream.
    pub fn shutdown(&self) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(stream) => stream
                .shutdown(std::net::Shutdown::Both)
                .map_err(Into::into),
            #[cfg(windows)]
            IpcStreamInner::Pipe(pipe) => pipe.shutdown().map_err(Into::into),
        }
    }

    /// Get the credentials of the connected peer (Linux only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            IpcStreamInner::Unix(stream) => stream.as_raw_fd(),
        };

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this process.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }
}

impl Connection for IpcStream {
    fn try_clone_connection(&self) -> std::io::Result<Self> {
        self.try_clone().map_err(into_io)
    }

    fn shutdown_connection(&self) -> std::io::Result<()> {
        self.shutdown().map_err(into_io)
    }
}

#[cfg(unix)]
impl Connection for std::os::unix::net::UnixStream {
    fn try_clone_connection(&self) -> std::io::Result<Self> {
        self.try_clone()
    }

    fn shutdown_connection(&self) -> std::io::Result<()> {
        self.shutdown(std::net::Shutdown::Both)
    }
}

fn into_io(err: crate::TransportError) -> std::io::Error {
    match err {
        crate::TransportError::Io(io) => io,
        other => std::io::Error::other(other.to_string()),
    }
}

impl std::fmt::Debug for IpcStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            #[cfg(unix)]
            IpcStreamInner::Unix(_) => f.debug_struct("IpcStream").field("type", &"unix").finish(),
            #[cfg(windows)]
            IpcStreamInner::Pipe(_) => f.debug_struct("IpcStream").field("type", &"pipe").finish(),
        }
    }
}
