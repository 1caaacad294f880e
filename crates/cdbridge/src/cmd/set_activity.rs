use std::sync::mpsc;
use std::thread;

use cdbridge_engine::{Client, ClientHandle};
use cdbridge_transport::dial;
use serde::Serialize;
use tracing::info;

use crate::cmd::{SetActivityArgs, Settings};
use crate::exit::{engine_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_reply, OutputFormat};

/// Application IDs of known browser integrations.
const KNOWN_CLIENTS: &[(&str, &str)] = &[
    ("monkeytype", "798272335035498557"),
    ("wanikani", "800166344023867443"),
];

#[derive(Serialize)]
struct HandshakeRequest<'a> {
    v: u32,
    client_id: &'a str,
    nonce: &'a str,
}

#[derive(Serialize)]
struct FrameRequest<'a, A> {
    nonce: &'a str,
    args: A,
    cmd: &'a str,
}

#[derive(Serialize)]
struct SetActivity<'a> {
    pid: u32,
    activity: Activity<'a>,
}

#[derive(Serialize)]
struct Activity<'a> {
    state: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

enum Stop {
    Interrupted,
    EngineStopped,
}

/// Map a known name to its application ID, or accept a numeric ID as is.
pub fn resolve_client_id(id_or_name: &str) -> CliResult<String> {
    if let Some((_, id)) = KNOWN_CLIENTS.iter().find(|(name, _)| *name == id_or_name) {
        return Ok((*id).to_string());
    }
    if !id_or_name.is_empty() && id_or_name.bytes().all(|b| b.is_ascii_digit()) {
        return Ok(id_or_name.to_string());
    }
    let names: Vec<_> = KNOWN_CLIENTS.iter().map(|(name, _)| *name).collect();
    Err(CliError::usage(format!(
        "invalid CLIENT_ID '{id_or_name}'; must be a number or one of: [{}]",
        names.join(", ")
    )))
}

fn handshake_request(client_id: &str) -> CliResult<Vec<u8>> {
    encode(&HandshakeRequest {
        v: 1,
        client_id,
        nonce: "0",
    })
}

fn set_activity_request(pid: u32, state: &str, details: Option<&str>) -> CliResult<Vec<u8>> {
    encode(&FrameRequest {
        nonce: "1",
        args: SetActivity {
            pid,
            activity: Activity {
                state,
                details: details.filter(|d| !d.is_empty()),
            },
        },
        cmd: "SET_ACTIVITY",
    })
}

fn encode<T: Serialize>(request: &T) -> CliResult<Vec<u8>> {
    serde_json::to_vec(request)
        .map_err(|err| CliError::new(INTERNAL, format!("encoding request: {err}")))
}

pub fn run(args: SetActivityArgs, settings: &Settings, format: OutputFormat) -> CliResult<i32> {
    let client_id = resolve_client_id(&args.client_id)?;
    let pid = args.pid.unwrap_or_else(std::process::id);

    let (path, stream) = dial(&settings.dial_config())
        .map_err(|err| transport_error("connecting to the desktop app", err))?;
    info!(endpoint = %path.display(), "connected");

    let (client, handle) = Client::new(stream);
    let (stop_tx, stop_rx) = mpsc::channel();
    let engine_stop = stop_tx.clone();
    let engine = thread::Builder::new()
        .name("cdbridge-ipc".to_string())
        .spawn(move || {
            let result = client.run();
            let _ = engine_stop.send(Stop::EngineStopped);
            result
        })
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start ipc client: {err}")))?;

    let outcome = set_and_wait(&handle, &client_id, pid, &args, format, stop_tx, &stop_rx);
    handle.close();
    let engine_result = engine
        .join()
        .map_err(|_| CliError::new(INTERNAL, "ipc client thread panicked"))?;

    match outcome? {
        Stop::Interrupted => {
            info!("interrupted; closing connection");
            Ok(SUCCESS)
        }
        Stop::EngineStopped => {
            engine_result.map_err(|err| engine_error("desktop connection ended", err))?;
            Ok(SUCCESS)
        }
    }
}

fn set_and_wait(
    handle: &ClientHandle,
    client_id: &str,
    pid: u32,
    args: &SetActivityArgs,
    format: OutputFormat,
    stop_tx: mpsc::Sender<Stop>,
    stop_rx: &mpsc::Receiver<Stop>,
) -> CliResult<Stop> {
    let reply = handle
        .send(handshake_request(client_id)?)
        .map_err(|err| engine_error("sending HANDSHAKE", err))?;
    print_reply("handshake", &reply, format);

    let request = set_activity_request(pid, &args.state, args.details.as_deref())?;
    let reply = handle
        .send(request)
        .map_err(|err| engine_error("sending SET_ACTIVITY", err))?;
    print_reply("set_activity", &reply, format);

    ctrlc::set_handler(move || {
        let _ = stop_tx.send(Stop::Interrupted);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    info!("activity set; press Ctrl-C to exit");

    // The engine thread holds a sender for as long as it runs.
    stop_rx
        .recv()
        .map_err(|_| CliError::new(INTERNAL, "stop channel closed"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        assert_eq!(
            resolve_client_id("wanikani").expect("alias"),
            "800166344023867443"
        );
        assert_eq!(
            resolve_client_id("922040684020645908").expect("numeric"),
            "922040684020645908"
        );
    }

    #[test]
    fn unknown_name_lists_aliases() {
        let err = resolve_client_id("discord").expect_err("not numeric");
        assert_eq!(err.code, crate::exit::USAGE);
        assert!(err.message.contains("monkeytype, wanikani"));
    }

    #[test]
    fn handshake_body() {
        let body = handshake_request("42").expect("encodes");
        assert_eq!(body, br#"{"v":1,"client_id":"42","nonce":"0"}"#);
    }

    #[test]
    fn set_activity_body() {
        let body = set_activity_request(7, "Typing", Some("60 wpm")).expect("encodes");
        assert_eq!(
            std::str::from_utf8(&body).expect("utf8"),
            r#"{"nonce":"1","args":{"pid":7,"activity":{"state":"Typing","details":"60 wpm"}},"cmd":"SET_ACTIVITY"}"#
        );

        let body = set_activity_request(7, "Idle", Some("")).expect("encodes");
        assert_eq!(
            std::str::from_utf8(&body).expect("utf8"),
            r#"{"nonce":"1","args":{"pid":7,"activity":{"state":"Idle"}},"cmd":"SET_ACTIVITY"}"#
        );
    }
}
