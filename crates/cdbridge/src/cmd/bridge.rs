use cdbridge_engine::Bridge;
use cdbridge_transport::dial;
use tracing::info;

use crate::cmd::{BridgeArgs, Settings};
use crate::exit::{engine_error, io_error, transport_error, CliError, CliResult, SUCCESS};
use crate::stdio::browser_output;

pub fn run(args: BridgeArgs, settings: &Settings) -> CliResult<i32> {
    let origins = settings.origins()?;
    if !origins.contains(&args.origin) {
        return Err(CliError::usage(format!("invalid origin {}", args.origin)));
    }

    let config = settings.dial_config();
    let (path, stream) =
        dial(&config).map_err(|err| transport_error("connecting to the desktop app", err))?;
    info!(origin = %args.origin, endpoint = %path.display(), "bridge started");

    let output = browser_output().map_err(|err| io_error("taking over stdout", err))?;
    Bridge::new(std::io::stdin(), output, stream)
        .run()
        .map_err(|err| engine_error("bridge failed", err))?;

    info!("extension disconnected");
    Ok(SUCCESS)
}
