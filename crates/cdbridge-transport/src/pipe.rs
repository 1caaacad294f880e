//! Windows named pipe client.
//!
//! The desktop application serves `\\?\pipe\discord-ipc-N`; the bridge opens
//! the client end as an ordinary file handle in blocking mode.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::windows::ffi::OsStrExt;
use std::os::windows::io::AsRawHandle;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;
use windows_sys::Win32::Foundation::{ERROR_NOT_FOUND, ERROR_PIPE_BUSY};
use windows_sys::Win32::System::Pipes::WaitNamedPipeW;
use windows_sys::Win32::System::IO::CancelIoEx;

use crate::error::{Result, TransportError};

/// How long to wait for a busy pipe instance to free up.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Client end of a named pipe.
///
/// Clones share a shutdown flag: after [`shutdown`](Self::shutdown) every
/// handle reads end-of-stream and refuses writes.
pub struct PipeStream {
    file: File,
    closed: Arc<AtomicBool>,
}

impl PipeStream {
    /// Open the pipe at `path`, waiting up to [`CONNECT_TIMEOUT`] while every
    /// server instance is busy.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_timeout(path, CONNECT_TIMEOUT)
    }

    pub fn connect_timeout(path: impl AsRef<Path>, timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let connect_err = |source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        };
        let deadline = Instant::now() + timeout;

        loop {
            match OpenOptions::new().read(true).write(true).open(path) {
                Ok(file) => {
                    debug!(?path, "connected to named pipe");
                    return Ok(Self {
                        file,
                        closed: Arc::new(AtomicBool::new(false)),
                    });
                }
                Err(err) if err.raw_os_error() == Some(ERROR_PIPE_BUSY as i32) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(connect_err(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "named pipe busy",
                        )));
                    }
                    let name: Vec<u16> = path.as_os_str().encode_wide().chain(Some(0)).collect();
                    let millis = u32::try_from(remaining.as_millis()).unwrap_or(u32::MAX);
                    // SAFETY: `name` is a NUL-terminated UTF-16 string that outlives the call.
                    unsafe { WaitNamedPipeW(name.as_ptr(), millis) };
                }
                Err(err) => return Err(connect_err(err)),
            }
        }
    }

    pub fn try_clone(&self) -> std::io::Result<Self> {
        Ok(Self {
            file: self.file.try_clone()?,
            closed: Arc::clone(&self.closed),
        })
    }

    /// Mark every handle closed and cancel any read or write in progress.
    pub fn shutdown(&self) -> std::io::Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        // SAFETY: the handle is owned by `self.file` and open for the duration
        // of the call; a null OVERLAPPED cancels all I/O on the handle.
        let ok = unsafe { CancelIoEx(self.file.as_raw_handle(), std::ptr::null()) };
        if ok == 0 {
            let err = std::io::Error::last_os_error();
            // Nothing was in flight.
            if err.raw_os_error() != Some(ERROR_NOT_FOUND as i32) {
                return Err(err);
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.is_closed() {
            return Ok(0);
        }
        match self.file.read(buf) {
            Err(_) if self.is_closed() => Ok(0),
            other => other,
        }
    }
}

impl Write for PipeStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.is_closed() {
            return Err(std::io::ErrorKind::BrokenPipe.into());
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_pipe_fails_without_waiting() {
        let path = format!(r"\\?\pipe\cdb-test-missing-{}", std::process::id());
        let started = Instant::now();
        let result = PipeStream::connect(&path);
        assert!(matches!(result, Err(TransportError::Connect { .. })));
        assert!(started.elapsed() < CONNECT_TIMEOUT);
    }
}
