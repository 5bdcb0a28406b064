mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use hashrpc_frame::RpcHashWidth;

use crate::cmd::{Command, Context};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "hashrpc", version, about = "Hash-keyed typed RPC tools")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). RUST_LOG overrides it when set.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Command id width in bytes: 4 or 8.
    #[arg(
        long,
        value_name = "BYTES",
        env = "HASHRPC_WIDTH",
        default_value = "4",
        value_parser = parse_width,
        global = true
    )]
    width: RpcHashWidth,

    #[command(subcommand)]
    command: Command,
}

fn parse_width(input: &str) -> Result<RpcHashWidth, String> {
    input.parse().map_err(|err| format!("{err}"))
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if err.use_stderr() => {
            let _ = err.print();
            std::process::exit(exit::USAGE);
        }
        Err(err) => err.exit(),
    };
    init_logging(cli.log_format, cli.log_level);

    let ctx = Context {
        format: cli.format.unwrap_or_else(OutputFormat::default_for_stdout),
        width: cli.width,
    };

    match cmd::run(cli.command, ctx) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_defaults_to_four_bytes() {
        let cli = Cli::try_parse_from(["hashrpc", "hash", "Game.PingMessage"])
            .expect("hash args should parse");
        assert_eq!(cli.width, RpcHashWidth::FourBytes);
        assert!(matches!(cli.command, Command::Hash(_)));
    }

    #[test]
    fn parses_width_forms() {
        for (arg, want) in [
            ("8", RpcHashWidth::EightBytes),
            ("eight", RpcHashWidth::EightBytes),
            ("4-byte", RpcHashWidth::FourBytes),
        ] {
            let cli = Cli::try_parse_from(["hashrpc", "--width", arg, "hash", "X"])
                .expect("width should parse");
            assert_eq!(cli.width, want);
        }
    }

    #[test]
    fn rejects_unknown_width() {
        let err = Cli::try_parse_from(["hashrpc", "--width", "5", "hash", "X"])
            .expect_err("width 5 should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "hashrpc",
            "send",
            "/tmp/test.sock",
            "Game.PingMessage",
            "--json",
            "{\"seq\":1}",
            "--wait",
        ])
        .expect("send args should parse");

        assert!(matches!(cli.command, Command::Send(ref args) if args.wait));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "hashrpc",
            "encode",
            "Game.PingMessage",
            "--hex",
            "00",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }
}
