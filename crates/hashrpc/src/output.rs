use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use hashrpc_channel::PeerId;
use hashrpc_frame::{Envelope, RpcHashWidth};
use hashrpc_hash::MessageId;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
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

/// Identifiers computed for one message name.
#[derive(Serialize)]
pub struct HashRow {
    pub name: String,
    pub id32: String,
    pub id64: String,
    /// Wire bytes of the command at the selected width, hex encoded.
    pub command: String,
}

impl HashRow {
    pub fn new(name: &str, id: MessageId, width: RpcHashWidth) -> Self {
        Self {
            name: name.to_string(),
            id32: format!("{:#010x}", id.id32),
            id64: format!("{:#018x}", id.id64),
            command: hex::encode(width.encode_command(id)),
        }
    }
}

pub fn print_hashes(rows: &[HashRow], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for row in rows {
                println!("{}", to_json(row));
            }
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["NAME", "ID32", "ID64", "COMMAND"]);
            for row in rows {
                table.add_row(vec![
                    row.name.clone(),
                    row.id32.clone(),
                    row.id64.clone(),
                    row.command.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in rows {
                println!(
                    "{} id32={} id64={} command={}",
                    row.name, row.id32, row.id64, row.command
                );
            }
        }
        OutputFormat::Raw => {
            for row in rows {
                println!("{}", row.command);
            }
        }
    }
}

#[derive(Serialize)]
struct EncodedOutput<'a> {
    name: &'a str,
    command: String,
    size: usize,
    envelope: String,
}

pub fn print_encoded(
    name: &str,
    envelope: &Envelope,
    wire: &[u8],
    width: RpcHashWidth,
    format: OutputFormat,
) {
    let out = EncodedOutput {
        name,
        command: command_label(envelope, width),
        size: wire.len(),
        envelope: hex::encode(wire),
    };
    match format {
        OutputFormat::Json => println!("{}", to_json(&out)),
        OutputFormat::Table => {
            let mut table = new_table(vec!["NAME", "COMMAND", "SIZE", "ENVELOPE"]);
            table.add_row(vec![
                out.name.to_string(),
                out.command,
                out.size.to_string(),
                out.envelope,
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!(
            "name={} command={} size={} envelope={}",
            out.name, out.command, out.size, out.envelope
        ),
        OutputFormat::Raw => println!("{}", out.envelope),
    }
}

#[derive(Serialize)]
struct EnvelopeOutput<'a> {
    command: String,
    name: Option<&'a str>,
    peer: Option<PeerId>,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_envelope(
    envelope: &Envelope,
    width: RpcHashWidth,
    name: Option<&str>,
    peer: Option<PeerId>,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = EnvelopeOutput {
                command: command_label(envelope, width),
                name,
                peer,
                payload_size: envelope.payload.len(),
                payload: payload_preview(&envelope.payload),
                timestamp: now_unix_seconds(),
            };
            println!("{}", to_json(&out));
        }
        OutputFormat::Table => {
            let mut table = new_table(vec!["COMMAND", "NAME", "PEER", "SIZE", "PAYLOAD"]);
            table.add_row(vec![
                command_label(envelope, width),
                name.unwrap_or("-").to_string(),
                peer.map_or_else(|| "-".to_string(), |p| p.to_string()),
                envelope.payload.len().to_string(),
                payload_preview(&envelope.payload),
            ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "command={} name={} peer={} size={} payload={}",
                command_label(envelope, width),
                name.unwrap_or("-"),
                peer.map_or_else(|| "-".to_string(), |p| p.to_string()),
                envelope.payload.len(),
                payload_preview(&envelope.payload)
            );
        }
        OutputFormat::Raw => print_raw(&envelope.payload),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// The command id at `width`, or its raw bytes when the length does not fit.
pub fn command_label(envelope: &Envelope, width: RpcHashWidth) -> String {
    match envelope.command_id(width) {
        Ok(id) => id.to_string(),
        Err(_) => format!("raw:{}", hex::encode(&envelope.command)),
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
