//! Desktop-facing engine.
//!
//! One [`Client`] drives one IPC connection. A reader thread decodes inbound
//! frames; the coordinator ([`Client::run`]) writes outbound payloads, pairs
//! each with the next non-PING inbound frame, answers PINGs and stops on
//! CLOSE. Callers talk to it through a [`ClientHandle`], whose
//! [`send`](ClientHandle::send) is a plain blocking request/reply call.

use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Mutex, PoisonError};
use std::thread;

use bytes::Bytes;
use cdbridge_frame::{FrameError, FrameReader, FrameWriter, IpcFrame, Opcode};
use cdbridge_transport::{Connection, TransportError};
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};

/// Where a connection is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing sent yet; the next outgoing frame is a HANDSHAKE.
    AwaitingHandshake,
    /// Handshake sent; every outgoing frame is a FRAME.
    Active,
    /// Terminal. A new connection and engine are needed.
    Closed,
}

impl ClientState {
    /// Opcode for the next outgoing payload.
    pub fn outgoing_opcode(self) -> Opcode {
        match self {
            ClientState::AwaitingHandshake => Opcode::Handshake,
            ClientState::Active | ClientState::Closed => Opcode::Frame,
        }
    }
}

type Reply = std::result::Result<Bytes, EngineError>;

enum ClientEvent {
    Inbound(std::result::Result<IpcFrame, FrameError>),
    Outbound(Bytes, SyncSender<Reply>),
    Close,
}

/// The coordinator half of the desktop-facing engine.
pub struct Client<S> {
    stream: S,
    events_tx: Sender<ClientEvent>,
    events_rx: Receiver<ClientEvent>,
}

/// Caller side of a [`Client`].
///
/// Shareable across threads; concurrent [`send`](Self::send) calls are
/// serialized so only one exchange is ever outstanding.
pub struct ClientHandle {
    events: Sender<ClientEvent>,
    exchange: Mutex<()>,
}

enum Step {
    Continue,
    Stop(Result<()>),
}

impl<S: Connection> Client<S> {
    /// Wrap an already-open connection to the desktop application.
    pub fn new(stream: S) -> (Self, ClientHandle) {
        let (events_tx, events_rx) = mpsc::channel();
        let handle = ClientHandle {
            events: events_tx.clone(),
            exchange: Mutex::new(()),
        };
        let client = Self {
            stream,
            events_tx,
            events_rx,
        };
        (client, handle)
    }

    /// Run the engine until a local close, a remote CLOSE, or any read,
    /// write or framing error.
    ///
    /// A local close returns `Ok(())`. The connection is shut down on
    /// return, which also stops the reader thread.
    pub fn run(self) -> Result<()> {
        let Client {
            stream,
            events_tx,
            events_rx,
        } = self;

        let reader_stream = stream
            .try_clone_connection()
            .map_err(TransportError::from)?;
        let reader = thread::Builder::new()
            .name("cdbridge-ipc-reader".to_string())
            .spawn(move || read_frames(FrameReader::new(reader_stream), events_tx))
            .map_err(|source| EngineError::Spawn {
                name: "ipc reader",
                source,
            })?;

        let mut coordinator = Coordinator {
            writer: FrameWriter::new(stream),
            events: events_rx,
            state: ClientState::AwaitingHandshake,
        };
        let result = coordinator.run();
        coordinator.state = ClientState::Closed;

        match &result {
            Ok(()) => info!("ipc client closed"),
            Err(err) => warn!(error = %err, "ipc client stopped"),
        }
        if let Err(err) = coordinator.writer.get_ref().shutdown_connection() {
            debug!(error = %err, "shutdown after close");
        }
        // Dropping the receiver fails any send still queued behind us.
        drop(coordinator);
        let _ = reader.join();
        result
    }
}

struct Coordinator<S: Connection> {
    writer: FrameWriter<S>,
    events: Receiver<ClientEvent>,
    state: ClientState,
}

impl<S: Connection> Coordinator<S> {
    fn run(&mut self) -> Result<()> {
        loop {
            let Ok(event) = self.events.recv() else {
                return Ok(());
            };
            let step = match event {
                ClientEvent::Outbound(payload, reply) => self.exchange(&payload, reply),
                ClientEvent::Inbound(Ok(frame)) => self.unsolicited(frame),
                ClientEvent::Inbound(Err(err)) => Step::Stop(Err(err.into())),
                ClientEvent::Close => Step::Stop(Ok(())),
            };
            if let Step::Stop(result) = step {
                return result;
            }
        }
    }

    /// Write one payload and deliver the frame that answers it.
    fn exchange(&mut self, payload: &[u8], reply: SyncSender<Reply>) -> Step {
        let opcode = self.state.outgoing_opcode();
        if let Err(err) = self.writer.send(opcode, payload) {
            return fail_exchange(reply, err);
        }
        if self.state == ClientState::AwaitingHandshake {
            debug!("handshake sent");
            self.state = ClientState::Active;
        }

        loop {
            let Ok(event) = self.events.recv() else {
                let _ = reply.send(Err(closed("event channel closed")));
                return Step::Stop(Ok(()));
            };
            match event {
                ClientEvent::Inbound(Ok(frame)) => match frame.opcode {
                    Opcode::Ping => {
                        if let Err(err) = self.pong(&frame.payload) {
                            return fail_exchange(reply, err);
                        }
                    }
                    Opcode::Close => {
                        let reason = close_reason(&frame.payload);
                        let _ = reply.send(Err(EngineError::RemoteClosed(reason.clone())));
                        return Step::Stop(Err(EngineError::RemoteClosed(reason)));
                    }
                    opcode => {
                        debug!(%opcode, len = frame.payload.len(), "reply from desktop");
                        let _ = reply.send(Ok(frame.payload));
                        return Step::Continue;
                    }
                },
                ClientEvent::Inbound(Err(err)) => return fail_exchange(reply, err),
                ClientEvent::Outbound(_, other) => {
                    // Handles serialize exchanges; only a misbehaving caller gets here.
                    let _ = other.send(Err(closed("another exchange is outstanding")));
                }
                ClientEvent::Close => {
                    let _ = reply.send(Err(closed("client closed")));
                    return Step::Stop(Ok(()));
                }
            }
        }
    }

    fn unsolicited(&mut self, frame: IpcFrame) -> Step {
        match frame.opcode {
            Opcode::Ping => match self.pong(&frame.payload) {
                Ok(()) => Step::Continue,
                Err(err) => Step::Stop(Err(err.into())),
            },
            Opcode::Close => Step::Stop(Err(EngineError::RemoteClosed(close_reason(
                &frame.payload,
            )))),
            opcode => Step::Stop(Err(EngineError::UnexpectedOpcode { opcode })),
        }
    }

    fn pong(&mut self, payload: &[u8]) -> std::result::Result<(), FrameError> {
        debug!(len = payload.len(), "answering ping");
        self.writer.send(Opcode::Pong, payload)
    }
}

fn read_frames<S: Connection>(mut reader: FrameReader<S>, events: Sender<ClientEvent>) {
    loop {
        let frame = reader.read_frame();
        let stop = frame.is_err();
        if events.send(ClientEvent::Inbound(frame)).is_err() || stop {
            return;
        }
    }
}

/// Fail the outstanding exchange and stop the engine with the same error.
fn fail_exchange(reply: SyncSender<Reply>, err: FrameError) -> Step {
    let _ = reply.send(Err(EngineError::Frame(duplicate(&err))));
    Step::Stop(Err(err.into()))
}

/// A copy of `err` for a second recipient. I/O errors keep their kind and
/// message but not their inner source.
fn duplicate(err: &FrameError) -> FrameError {
    match err {
        FrameError::PayloadTooLarge { size, max } => FrameError::PayloadTooLarge {
            size: *size,
            max: *max,
        },
        FrameError::TruncatedHeader { expected, read } => FrameError::TruncatedHeader {
            expected: *expected,
            read: *read,
        },
        FrameError::TruncatedPayload { expected, read } => FrameError::TruncatedPayload {
            expected: *expected,
            read: *read,
        },
        FrameError::NegativeLength(len) => FrameError::NegativeLength(*len),
        FrameError::UnknownOpcode(opcode) => FrameError::UnknownOpcode(*opcode),
        FrameError::Io(io) => FrameError::Io(std::io::Error::new(io.kind(), io.to_string())),
        FrameError::ConnectionClosed => FrameError::ConnectionClosed,
    }
}

fn close_reason(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload).into_owned()
}

fn closed(reason: &str) -> EngineError {
    EngineError::Closed(reason.to_string())
}

impl ClientHandle {
    /// Send `payload` to the desktop application and wait for its reply.
    ///
    /// The first payload ever sent on the connection goes out as the
    /// HANDSHAKE. Fails with [`EngineError::Closed`] once the engine has
    /// stopped, including when [`close`](Self::close) is called while this
    /// call is waiting.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<Bytes> {
        let _exchange = self.exchange.lock().unwrap_or_else(PoisonError::into_inner);
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.events
            .send(ClientEvent::Outbound(payload.into(), reply_tx))
            .map_err(|_| closed("ipc client is not running"))?;
        reply_rx
            .recv()
            .map_err(|_| closed("ipc client stopped before replying"))?
    }

    /// Stop the engine. Any blocked [`send`](Self::send) fails with
    /// [`EngineError::Closed`].
    pub fn close(&self) {
        let _ = self.events.send(ClientEvent::Close);
    }
}

impl std::fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandle").finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    struct Desktop {
        reader: FrameReader<UnixStream>,
        writer: FrameWriter<UnixStream>,
    }

    impl Desktop {
        fn recv(&mut self) -> IpcFrame {
            self.reader.read_frame().expect("desktop should read a frame")
        }

        fn send(&mut self, opcode: Opcode, payload: &[u8]) {
            self.writer
                .send(opcode, payload)
                .expect("desktop should write a frame");
        }
    }

    fn spawn_client() -> (Desktop, Arc<ClientHandle>, thread::JoinHandle<Result<()>>) {
        let (ours, theirs) = UnixStream::pair().expect("pair should open");
        let (client, handle) = Client::new(ours);
        let join = thread::spawn(move || client.run());
        let desktop = Desktop {
            reader: FrameReader::new(theirs.try_clone().expect("clone")),
            writer: FrameWriter::new(theirs),
        };
        (desktop, Arc::new(handle), join)
    }

    fn send_in_background(
        handle: &Arc<ClientHandle>,
        payload: &'static [u8],
    ) -> thread::JoinHandle<Result<Bytes>> {
        let handle = Arc::clone(handle);
        thread::spawn(move || handle.send(payload))
    }

    #[test]
    fn state_machine_opcodes() {
        assert_eq!(
            ClientState::AwaitingHandshake.outgoing_opcode(),
            Opcode::Handshake
        );
        assert_eq!(ClientState::Active.outgoing_opcode(), Opcode::Frame);
    }

    #[test]
    fn first_send_is_handshake_then_frames() {
        let (mut desktop, handle, join) = spawn_client();

        for (i, expected) in [Opcode::Handshake, Opcode::Frame, Opcode::Frame]
            .into_iter()
            .enumerate()
        {
            let pending = send_in_background(&handle, b"payload");
            let frame = desktop.recv();
            assert_eq!(frame.opcode, expected, "send #{i}");
            desktop.send(frame.opcode, format!("reply-{i}").as_bytes());
            let reply = pending.join().expect("sender").expect("reply");
            assert_eq!(reply.as_ref(), format!("reply-{i}").as_bytes());
        }

        handle.close();
        join.join().expect("client thread").expect("local close is clean");
    }

    #[test]
    fn ping_while_waiting_is_answered_and_skipped() {
        let (mut desktop, handle, join) = spawn_client();
        let pending = send_in_background(&handle, b"hello");

        assert_eq!(desktop.recv().opcode, Opcode::Handshake);
        desktop.send(Opcode::Ping, br#"{"nonce":"1"}"#);
        let pong = desktop.recv();
        assert_eq!(pong.opcode, Opcode::Pong);
        assert_eq!(pong.payload.as_ref(), br#"{"nonce":"1"}"#);

        desktop.send(Opcode::Frame, b"answer");
        assert_eq!(
            pending.join().expect("sender").expect("reply").as_ref(),
            b"answer"
        );

        handle.close();
        join.join().expect("client thread").expect("clean");
    }

    #[test]
    fn unsolicited_ping_gets_exactly_one_pong() {
        let (mut desktop, handle, join) = spawn_client();

        desktop.send(Opcode::Ping, b"keepalive");
        let pong = desktop.recv();
        assert_eq!(pong, IpcFrame::new(Opcode::Pong, "keepalive"));

        // The next frame the desktop sees is our handshake, not a second pong.
        let pending = send_in_background(&handle, b"hs");
        assert_eq!(desktop.recv().opcode, Opcode::Handshake);
        desktop.send(Opcode::Frame, b"ok");
        pending.join().expect("sender").expect("reply");

        handle.close();
        join.join().expect("client thread").expect("clean");
    }

    #[test]
    fn remote_close_fails_pending_and_later_sends() {
        let (mut desktop, handle, join) = spawn_client();
        let pending = send_in_background(&handle, b"hello");
        desktop.recv();
        desktop.send(Opcode::Close, br#"{"code":4000,"message":"bye"}"#);

        let err = pending.join().expect("sender").expect_err("pending should fail");
        assert!(matches!(err, EngineError::RemoteClosed(ref r) if r.contains("bye")));

        let err = join.join().expect("client thread").expect_err("run should fail");
        assert!(matches!(err, EngineError::RemoteClosed(_)));

        assert!(matches!(handle.send(&b"again"[..]), Err(EngineError::Closed(_))));
    }

    #[test]
    fn unsolicited_close_ends_run_with_error() {
        let (mut desktop, handle, join) = spawn_client();
        desktop.send(Opcode::Close, b"shutting down");

        let err = join.join().expect("client thread").expect_err("close is fatal");
        assert!(matches!(err, EngineError::RemoteClosed(ref r) if r == "shutting down"));
        assert!(matches!(handle.send(&b"x"[..]), Err(EngineError::Closed(_))));
    }

    #[test]
    fn unsolicited_frame_is_protocol_error() {
        let (mut desktop, _handle, join) = spawn_client();
        desktop.send(Opcode::Frame, b"nobody asked");

        let err = join.join().expect("client thread").expect_err("fatal");
        assert!(matches!(
            err,
            EngineError::UnexpectedOpcode {
                opcode: Opcode::Frame
            }
        ));
    }

    #[test]
    fn local_close_releases_blocked_sender() {
        let (mut desktop, handle, join) = spawn_client();
        let pending = send_in_background(&handle, b"hello");
        desktop.recv();

        handle.close();
        let err = pending.join().expect("sender").expect_err("should be released");
        assert!(matches!(err, EngineError::Closed(_)));
        join.join().expect("client thread").expect("local close is clean");
    }

    #[test]
    fn bad_frame_mid_exchange_reaches_sender_typed() {
        use std::io::Write;

        let (mut desktop, handle, join) = spawn_client();
        let pending = send_in_background(&handle, b"hello");
        desktop.recv();

        let mut raw = desktop.writer.get_ref();
        raw.write_all(&[9, 0, 0, 0, 0, 0, 0, 0]).expect("raw header");

        let err = pending.join().expect("sender").expect_err("bad frame");
        assert!(matches!(err, EngineError::Frame(FrameError::UnknownOpcode(9))));
        let err = join.join().expect("client thread").expect_err("fatal");
        assert!(matches!(err, EngineError::Frame(FrameError::UnknownOpcode(9))));
    }

    #[test]
    fn peer_hangup_mid_exchange_is_connection_error() {
        let (mut desktop, handle, join) = spawn_client();
        let pending = send_in_background(&handle, b"hello");
        desktop.recv();
        drop(desktop);

        let err = pending.join().expect("sender").expect_err("hangup");
        assert!(matches!(err, EngineError::Frame(FrameError::ConnectionClosed)));
        join.join().expect("client thread").expect_err("hangup");
    }

    #[test]
    fn peer_hangup_is_connection_error() {
        let (desktop, handle, join) = spawn_client();
        drop(desktop);

        let err = join.join().expect("client thread").expect_err("hangup");
        assert!(matches!(
            err,
            EngineError::Frame(FrameError::ConnectionClosed)
        ));
        assert!(handle.send(&b"x"[..]).is_err());
    }

    #[test]
    fn concurrent_senders_are_serialized() {
        let (mut desktop, handle, join) = spawn_client();
        let first = send_in_background(&handle, b"one");
        let second = send_in_background(&handle, b"two");

        let a = desktop.recv();
        assert_eq!(a.opcode, Opcode::Handshake);
        // The other caller must not get a frame onto the wire yet.
        desktop
            .reader
            .get_ref()
            .set_read_timeout(Some(Duration::from_millis(100)))
            .expect("timeout");
        assert!(desktop.reader.read_frame().is_err());
        desktop
            .reader
            .get_ref()
            .set_read_timeout(None)
            .expect("timeout");

        desktop.send(Opcode::Frame, &a.payload);
        let b = desktop.recv();
        assert_eq!(b.opcode, Opcode::Frame);
        desktop.send(Opcode::Frame, &b.payload);

        assert_eq!(first.join().expect("first").expect("reply").as_ref(), b"one");
        assert_eq!(second.join().expect("second").expect("reply").as_ref(), b"two");

        handle.close();
        join.join().expect("client thread").expect("clean");
    }
}
