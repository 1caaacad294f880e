use cdbridge_engine::Host;
use tracing::{debug, info};

use crate::cmd::EchoArgs;
use crate::exit::{engine_error, io_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::stdio::browser_output;

/// Answer every native message with itself until the browser disconnects.
pub fn run(_args: EchoArgs) -> CliResult<i32> {
    let output = browser_output().map_err(|err| io_error("taking over stdout", err))?;
    let (host, handle) = Host::new(std::io::stdin(), output);
    let engine = std::thread::Builder::new()
        .name("cdbridge-host".to_string())
        .spawn(move || host.run())
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start host: {err}")))?;

    let mut echoed = 0u64;
    while let Some((request, responder)) = handle.receive() {
        debug!(size = request.len(), "echoing request");
        responder.respond(request);
        echoed += 1;
    }
    info!(echoed, "browser disconnected");

    engine
        .join()
        .map_err(|_| CliError::new(INTERNAL, "host thread panicked"))?
        .map_err(|err| engine_error("echo host failed", err))?;
    Ok(SUCCESS)
}
