//! Relay loop and bridge wiring.

use std::io::{Read, Write};
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use cdbridge_transport::Connection;
use tracing::{debug, info, warn};

use crate::client::{Client, ClientHandle};
use crate::error::{EngineError, Result};
use crate::host::{Host, HostHandle};

/// Forward every browser request through the desktop client until the
/// browser closes its end.
///
/// When the client fails, the outstanding request is answered with
/// [`error_payload`] before the error is returned. Either way the client is
/// closed on return.
pub fn relay(host: &HostHandle, client: &ClientHandle) -> Result<()> {
    let mut exchanges = 0u64;
    while let Some((request, responder)) = host.receive() {
        match client.send(request) {
            Ok(reply) => responder.respond(reply),
            Err(err) => {
                warn!(error = %err, exchanges, "desktop exchange failed");
                responder.respond(error_payload(&err));
                client.close();
                return Err(err);
            }
        }
        exchanges += 1;
    }

    info!(exchanges, "browser side finished; closing desktop connection");
    client.close();
    Ok(())
}

/// JSON body sent to the browser in place of a reply that could not be
/// obtained: `{"error":"<message>"}`.
pub fn error_payload(err: &EngineError) -> Bytes {
    Bytes::from(serde_json::json!({ "error": err.to_string() }).to_string())
}

/// Both engines plus the relay between them.
///
/// The host and client engines each run on their own thread while the relay
/// runs on the caller's thread. Whichever side stops first brings the other
/// down: the relay closes the client when the browser goes away, and a
/// stopped client closes the host so the relay stops waiting for requests.
pub struct Bridge<R, W, S> {
    host: Host<R, W>,
    host_handle: HostHandle,
    client: Client<S>,
    client_handle: ClientHandle,
}

impl<R, W, S> Bridge<R, W, S>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
    S: Connection,
{
    /// Bridge browser `input`/`output` to an open desktop connection.
    pub fn new(input: R, output: W, stream: S) -> Self {
        let (host, host_handle) = Host::new(input, output);
        let (client, client_handle) = Client::new(stream);
        Self {
            host,
            host_handle,
            client,
            client_handle,
        }
    }

    /// Run until either side stops.
    ///
    /// Returns the first error in the order relay, host, client; `Ok(())`
    /// means the browser closed its end and the desktop connection was
    /// closed locally.
    pub fn run(self) -> Result<()> {
        let Bridge {
            host,
            host_handle,
            client,
            client_handle,
        } = self;

        let host_thread = spawn("cdbridge-host", move || host.run())?;
        let closer = host_handle.closer();
        let client_thread = match spawn("cdbridge-ipc", move || {
            let result = client.run();
            closer.finish();
            result
        }) {
            Ok(thread) => thread,
            Err(err) => {
                host_handle.close();
                let _ = host_thread.join();
                return Err(err);
            }
        };

        let relayed = relay(&host_handle, &client_handle);
        host_handle.close();
        client_handle.close();

        let host_result = join("host", host_thread);
        let client_result = join("ipc client", client_thread);
        debug!(
            relay_ok = relayed.is_ok(),
            host_ok = host_result.is_ok(),
            client_ok = client_result.is_ok(),
            "bridge stopped"
        );
        relayed.and(host_result).and(client_result)
    }
}

fn spawn<F>(name: &'static str, f: F) -> Result<JoinHandle<Result<()>>>
where
    F: FnOnce() -> Result<()> + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(f)
        .map_err(|source| EngineError::Spawn { name, source })
}

fn join(name: &str, thread: JoinHandle<Result<()>>) -> Result<()> {
    thread
        .join()
        .unwrap_or_else(|_| Err(EngineError::Closed(format!("{name} thread panicked"))))
}
