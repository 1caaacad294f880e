//! The browser's end of the native messaging pipe.

use std::io;

/// Writer for native messages to the browser.
#[cfg(unix)]
pub type BrowserOutput = std::fs::File;
#[cfg(not(unix))]
pub type BrowserOutput = io::Stdout;

/// Take sole ownership of the pipe on stdout, so that dropping the returned
/// writer closes it and the browser sees end-of-stream straight away.
///
/// Descriptor 1 is pointed at `/dev/null`; a stray print cannot corrupt the
/// message stream afterwards.
#[cfg(unix)]
pub fn browser_output() -> io::Result<BrowserOutput> {
    use std::os::fd::{AsFd, AsRawFd};

    let stdout = io::stdout();
    let _lock = stdout.lock();
    let pipe = stdout.as_fd().try_clone_to_owned()?;
    let null = std::fs::OpenOptions::new().write(true).open("/dev/null")?;
    // SAFETY: both descriptors are open for the duration of the call, and the
    // stdout lock keeps other threads from writing while fd 1 is swapped.
    if unsafe { libc::dup2(null.as_raw_fd(), libc::STDOUT_FILENO) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(std::fs::File::from(pipe))
}

/// Stdout itself; it is closed when the process exits.
#[cfg(not(unix))]
pub fn browser_output() -> io::Result<BrowserOutput> {
    Ok(io::stdout())
}
