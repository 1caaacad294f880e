use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

/// How human-facing commands render their results.
///
/// Never used by `bridge` or `echo`, whose stdout is the native messaging
/// stream.
#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Print one serializable record as a JSON line.
pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

/// Print rows under a header as a table.
pub fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    step: &'a str,
    payload_size: usize,
    payload: serde_json::Value,
}

/// Print a reply received from the desktop application.
pub fn print_reply(step: &str, payload: &[u8], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&ReplyOutput {
            step,
            payload_size: payload.len(),
            payload: serde_json::from_slice(payload)
                .unwrap_or_else(|_| serde_json::Value::String(payload_preview(payload))),
        }),
        OutputFormat::Table => print_table(
            &["STEP", "SIZE", "REPLY"],
            vec![vec![
                step.to_string(),
                payload.len().to_string(),
                payload_preview(payload),
            ]],
        ),
        OutputFormat::Pretty => {
            println!("{step}: {}", payload_preview(payload));
        }
        OutputFormat::Raw => {
            print_raw(payload);
            println!();
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_marks_binary() {
        assert_eq!(payload_preview(br#"{"ok":true}"#), r#"{"ok":true}"#);
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }

    #[test]
    fn reply_output_embeds_json_payload() {
        let out = ReplyOutput {
            step: "handshake",
            payload_size: 11,
            payload: serde_json::from_slice(br#"{"ok":true}"#).expect("valid JSON"),
        };
        let value = serde_json::to_value(&out).expect("serializes");
        assert_eq!(value["payload"]["ok"], true);
        assert_eq!(value["step"], "handshake");
    }
}
