//! Browser-facing engine.
//!
//! A reader thread decodes native messages from the input stream while the
//! coordinator ([`Host::run`]) hands each one to a caller and writes back the
//! caller's response. The reader does not decode the next request until the
//! previous response has been written, so exchanges are strictly ordered 1:1.

use std::io::{Read, Write};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread;

use bytes::Bytes;
use cdbridge_frame::{FrameError, NativeReader, NativeWriter, MAX_PAYLOAD};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

#[derive(Debug)]
enum HostEvent {
    Request(Bytes),
    Eof,
    Failed(FrameError),
    Response(Bytes),
    Close,
    Finish,
}

/// The coordinator half of the browser-facing engine.
///
/// Created together with its [`HostHandle`] by [`Host::new`].
pub struct Host<R, W> {
    input: R,
    output: NativeWriter<W>,
    max_payload: usize,
    events_tx: Sender<HostEvent>,
    events_rx: Receiver<HostEvent>,
    requests: SyncSender<(Bytes, Responder)>,
}

/// Caller side of a [`Host`].
#[derive(Debug)]
pub struct HostHandle {
    requests: Receiver<(Bytes, Responder)>,
    events: Sender<HostEvent>,
}

/// Stops a [`Host`] from a thread that does not own the [`HostHandle`].
#[derive(Debug, Clone)]
pub struct HostCloser {
    events: Sender<HostEvent>,
}

/// Single-use handle for answering one request.
///
/// `respond` consumes the responder, so a request can be answered at most
/// once. Dropping it without responding leaves the engine waiting for a
/// response that never comes: it will neither write anything to the browser
/// nor read another request until [`HostHandle::close`] is called.
#[derive(Debug)]
pub struct Responder {
    events: Sender<HostEvent>,
}

impl<R, W> Host<R, W>
where
    R: Read + Send + 'static,
    W: Write,
{
    /// Create an engine reading requests from `input` and writing responses
    /// to `output` (typically stdin and stdout).
    pub fn new(input: R, output: W) -> (Self, HostHandle) {
        let (events_tx, events_rx) = mpsc::channel();
        let (requests_tx, requests_rx) = mpsc::sync_channel(1);
        let handle = HostHandle {
            requests: requests_rx,
            events: events_tx.clone(),
        };
        let host = Self {
            input,
            output: NativeWriter::new(output),
            max_payload: MAX_PAYLOAD,
            events_tx,
            events_rx,
            requests: requests_tx,
        };
        (host, handle)
    }

    /// Override the largest request accepted from the browser.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Run the engine until the browser closes its end, the handle closes
    /// the engine, or a framing/I/O error occurs.
    ///
    /// End of input is a clean shutdown and returns `Ok(())`. The output
    /// stream is dropped on return, which closes an owned pipe or socket;
    /// `io::Stdout` stays open until the process exits. The input stream
    /// belongs to the reader thread, which is left to finish on its own if
    /// it is blocked in a read.
    pub fn run(self) -> Result<()> {
        let Host {
            input,
            mut output,
            max_payload,
            events_tx,
            events_rx,
            requests,
        } = self;

        let (resume_tx, resume_rx) = mpsc::channel();
        let reader_events = events_tx.clone();
        thread::Builder::new()
            .name("cdbridge-host-reader".to_string())
            .spawn(move || {
                read_requests(
                    NativeReader::with_max_payload(input, max_payload),
                    reader_events,
                    resume_rx,
                )
            })
            .map_err(|source| EngineError::Spawn {
                name: "host reader",
                source,
            })?;

        let mut exchanges = 0u64;
        let result = loop {
            let Ok(event) = events_rx.recv() else {
                break Ok(());
            };
            match event {
                HostEvent::Request(payload) => {
                    let responder = Responder {
                        events: events_tx.clone(),
                    };
                    if requests.send((payload, responder)).is_err() {
                        debug!("host handle dropped; stopping");
                        break Ok(());
                    }

                    let Awaited::Response { payload, finish } = wait_for_response(&events_rx)
                    else {
                        info!("host closed with a request outstanding");
                        break Ok(());
                    };
                    if let Err(err) = output.write_message(&payload) {
                        break Err(err.into());
                    }
                    exchanges += 1;
                    if finish {
                        debug!(exchanges, "host finished");
                        break Ok(());
                    }
                    // The reader only exits after reporting its own event.
                    let _ = resume_tx.send(());
                }
                HostEvent::Eof => {
                    info!(exchanges, "browser closed its input");
                    break Ok(());
                }
                HostEvent::Failed(err) => break Err(err.into()),
                HostEvent::Response(_) => {
                    warn!("response with no request outstanding; dropped");
                }
                HostEvent::Close | HostEvent::Finish => {
                    debug!(exchanges, "host closed");
                    break Ok(());
                }
            }
        };

        if let Err(err) = &result {
            warn!(error = %err, "host engine stopped");
        }
        drop(output);
        result
    }
}

enum Awaited {
    Response { payload: Bytes, finish: bool },
    Closed,
}

fn wait_for_response(events: &Receiver<HostEvent>) -> Awaited {
    let mut finish = false;
    loop {
        let Ok(event) = events.recv() else {
            return Awaited::Closed;
        };
        match event {
            HostEvent::Response(payload) => return Awaited::Response { payload, finish },
            HostEvent::Close => return Awaited::Closed,
            HostEvent::Finish => finish = true,
            // The reader is parked until this response is written.
            HostEvent::Request(_) | HostEvent::Eof | HostEvent::Failed(_) => {}
        }
    }
}

fn read_requests<R: Read>(
    mut reader: NativeReader<R>,
    events: Sender<HostEvent>,
    resume: Receiver<()>,
) {
    loop {
        let event = match reader.read_message() {
            Ok(Some(payload)) => {
                debug!(len = payload.len(), "request from browser");
                HostEvent::Request(payload)
            }
            Ok(None) => HostEvent::Eof,
            Err(err) => HostEvent::Failed(err),
        };
        let more = matches!(event, HostEvent::Request(_));
        if events.send(event).is_err() || !more {
            return;
        }
        if resume.recv().is_err() {
            return;
        }
    }
}

impl HostHandle {
    /// Block until the next request arrives.
    ///
    /// Returns `None` once the engine has stopped, whether because the
    /// browser closed its input, an error occurred, or [`close`](Self::close)
    /// was called.
    pub fn receive(&self) -> Option<(Bytes, Responder)> {
        self.requests.recv().ok()
    }

    /// Ask the engine to stop without waiting for any outstanding exchange.
    pub fn close(&self) {
        let _ = self.events.send(HostEvent::Close);
    }

    /// A cloneable handle that can only stop the engine.
    pub fn closer(&self) -> HostCloser {
        HostCloser {
            events: self.events.clone(),
        }
    }
}

impl HostCloser {
    /// Same as [`HostHandle::close`].
    pub fn close(&self) {
        let _ = self.events.send(HostEvent::Close);
    }

    /// Stop once no exchange is outstanding.
    ///
    /// An idle engine stops at once. If a request has been handed out, the
    /// engine still writes its response before stopping, so the caller
    /// holding the [`Responder`] can report a failure to the browser.
    pub fn finish(&self) {
        let _ = self.events.send(HostEvent::Finish);
    }
}

impl Responder {
    /// Deliver the response for this request.
    ///
    /// Never blocks. If the engine has already stopped the response is
    /// discarded.
    pub fn respond(self, payload: impl Into<Bytes>) {
        let _ = self.events.send(HostEvent::Response(payload.into()));
    }
}
