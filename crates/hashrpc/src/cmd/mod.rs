use std::fs;
use std::path::PathBuf;

use clap::{Args, Subcommand};
use hashrpc_frame::{CommandId, RpcHashWidth};
use hashrpc_hash::MessageId;

use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod hash;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the message ids derived from type names.
    Hash(HashArgs),
    /// Build an envelope for a message and print it as hex.
    Encode(EncodeArgs),
    /// Decode a hex envelope.
    Decode(DecodeArgs),
    /// Bind a socket and print every envelope received.
    Listen(ListenArgs),
    /// Send one message to a listening socket.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
#[derive(Clone, Copy, Debug)]
pub struct Context {
    pub format: OutputFormat,
    pub width: RpcHashWidth,
}

pub fn run(command: Command, ctx: Context) -> CliResult<i32> {
    match command {
        Command::Hash(args) => hash::run(args, ctx),
        Command::Encode(args) => encode::run(args, ctx),
        Command::Decode(args) => decode::run(args, ctx),
        Command::Listen(args) => listen::run(args, ctx),
        Command::Send(args) => send::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct HashArgs {
    /// Fully-qualified message names.
    #[arg(required = true)]
    pub names: Vec<String>,
    /// Hash seed. Both ends of a link must agree on it.
    #[arg(long, default_value_t = hashrpc_hash::DEFAULT_SEED)]
    pub seed: u32,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Fully-qualified message name.
    pub name: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Envelope bytes as hex (whitespace and a leading 0x are ignored).
    pub hex: String,
    /// Candidate message names to match the command against (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub names: Vec<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after receiving N envelopes.
    #[arg(long)]
    pub count: Option<usize>,
    /// Candidate message names to match commands against (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub names: Vec<String>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Fully-qualified message name.
    pub name: String,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Wait for one reply envelope and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Candidate names for matching the reply command (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub names: Vec<String>,
}

/// Message body source. At most one may be given; the default body is empty.
#[derive(Args, Debug, Default)]
pub struct PayloadArgs {
    /// JSON body (validated before sending).
    #[arg(long, conflicts_with_all = ["data", "hex_body", "file"])]
    pub json: Option<String>,
    /// Raw string body.
    #[arg(long, conflicts_with_all = ["json", "hex_body", "file"])]
    pub data: Option<String>,
    /// Body bytes as hex.
    #[arg(long = "hex", id = "hex_body", conflicts_with_all = ["json", "data", "file"])]
    pub hex_body: Option<String>,
    /// Read the body from a file.
    #[arg(long, conflicts_with_all = ["json", "data", "hex_body"])]
    pub file: Option<PathBuf>,
}

impl PayloadArgs {
    pub fn resolve(&self) -> CliResult<Vec<u8>> {
        if let Some(json) = &self.json {
            serde_json::from_str::<serde_json::Value>(json)
                .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
            return Ok(json.as_bytes().to_vec());
        }
        if let Some(data) = &self.data {
            return Ok(data.as_bytes().to_vec());
        }
        if let Some(text) = &self.hex_body {
            return parse_hex(text)
                .map_err(|err| CliError::new(USAGE, format!("--hex: {}", err.message)));
        }
        if let Some(path) = &self.file {
            return fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
        }
        Ok(Vec::new())
    }
}

/// Decode hex text, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let digits = compact
        .strip_prefix("0x")
        .or_else(|| compact.strip_prefix("0X"))
        .unwrap_or(&compact);
    hex::decode(digits).map_err(|err| CliError::new(DATA_INVALID, format!("invalid hex: {err}")))
}

/// The first name in `names` whose id at `width` equals `command`.
pub fn match_name(names: &[String], width: RpcHashWidth, command: CommandId) -> Option<&str> {
    names
        .iter()
        .find(|name| width.command_id(MessageId::from_name(name)) == command)
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hex_ignores_prefix_and_whitespace() {
        assert_eq!(parse_hex("0x0a 0b\n0c").unwrap(), vec![0x0a, 0x0b, 0x0c]);
        assert_eq!(parse_hex("").unwrap(), Vec::<u8>::new());
        assert_eq!(parse_hex("abc").unwrap_err().code, DATA_INVALID);
        assert_eq!(parse_hex("zz").unwrap_err().code, DATA_INVALID);
    }

    #[test]
    fn match_name_uses_the_active_width() {
        let names = vec!["Game.PongMessage".to_string(), "Game.PingMessage".to_string()];
        let ping = MessageId::from_name("Game.PingMessage");

        assert_eq!(
            match_name(&names, RpcHashWidth::FourBytes, CommandId::Id32(ping.id32)),
            Some("Game.PingMessage")
        );
        assert_eq!(
            match_name(&names, RpcHashWidth::EightBytes, CommandId::Id64(ping.id64)),
            Some("Game.PingMessage")
        );
        assert_eq!(
            match_name(&names, RpcHashWidth::FourBytes, CommandId::Id32(1)),
            None
        );
    }

    #[test]
    fn payload_sources() {
        let args = PayloadArgs {
            json: Some("{\"seq\":1}".into()),
            ..PayloadArgs::default()
        };
        assert_eq!(args.resolve().unwrap(), b"{\"seq\":1}".to_vec());

        let args = PayloadArgs {
            json: Some("{".into()),
            ..PayloadArgs::default()
        };
        assert_eq!(args.resolve().unwrap_err().code, USAGE);

        let args = PayloadArgs {
            hex_body: Some("6869".into()),
            ..PayloadArgs::default()
        };
        assert_eq!(args.resolve().unwrap(), b"hi".to_vec());

        assert!(PayloadArgs::default().resolve().unwrap().is_empty());
    }
}
