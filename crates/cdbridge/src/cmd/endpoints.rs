use cdbridge_transport::{probe, EndpointStatus};
use serde::Serialize;

use crate::cmd::{EndpointsArgs, Settings};
use crate::exit::{CliResult, HEALTH_CHECK_FAILED, SUCCESS};
use crate::output::{print_json, print_table, OutputFormat};

#[derive(Debug, Serialize)]
struct EndpointOutput {
    index: usize,
    path: String,
    exists: bool,
    connectable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer_pid: Option<u32>,
}

impl From<EndpointStatus> for EndpointOutput {
    fn from(status: EndpointStatus) -> Self {
        Self {
            index: status.index,
            path: status.path.display().to_string(),
            exists: status.exists,
            connectable: status.connectable,
            peer_pid: status.peer.map(|(_, _, pid)| pid),
        }
    }
}

/// Exits with `HEALTH_CHECK_FAILED` when no endpoint accepts a connection.
pub fn run(_args: EndpointsArgs, settings: &Settings, format: OutputFormat) -> CliResult<i32> {
    let endpoints: Vec<EndpointOutput> = probe(&settings.dial_config())
        .into_iter()
        .map(EndpointOutput::from)
        .collect();
    let any_live = endpoints.iter().any(|e| e.connectable);

    match format {
        OutputFormat::Json => print_json(&endpoints),
        OutputFormat::Table => print_table(
            &["#", "PATH", "EXISTS", "CONNECTABLE", "PID"],
            endpoints
                .iter()
                .map(|e| {
                    vec![
                        e.index.to_string(),
                        e.path.clone(),
                        yes_no(e.exists).to_string(),
                        yes_no(e.connectable).to_string(),
                        e.peer_pid.map(|p| p.to_string()).unwrap_or_default(),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Pretty => {
            for e in &endpoints {
                let state = match (e.exists, e.connectable) {
                    (_, true) => "listening",
                    (true, false) => "stale",
                    (false, false) => "absent",
                };
                println!("  [{:>9}] {}", state, e.path);
            }
        }
        OutputFormat::Raw => {
            if let Some(live) = endpoints.iter().find(|e| e.connectable) {
                println!("{}", live.path);
            }
        }
    }

    Ok(if any_live { SUCCESS } else { HEALTH_CHECK_FAILED })
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
