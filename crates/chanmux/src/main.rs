mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::exit::{CliError, INTERNAL};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "chanmux", version, about = "Channel multiplexer over TCP")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| CliError::new(INTERNAL, format!("runtime setup failed: {err}")))
        .and_then(|runtime| runtime.block_on(cmd::run(cli.command, format)));

    match result {
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
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "chanmux",
            "send",
            "127.0.0.1:7000",
            "--data",
            "hello",
            "--channels",
            "3",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.channels, 3);
                assert_eq!(args.data.as_deref(), Some("hello"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "chanmux",
            "send",
            "127.0.0.1:7000",
            "--data",
            "hello",
            "--file",
            "/tmp/payload.bin",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_echo_with_tuning() {
        let cli = Cli::try_parse_from([
            "chanmux",
            "--log-level",
            "debug",
            "echo",
            "127.0.0.1:0",
            "--max-connections",
            "2",
            "--receive-buffer-size",
            "512",
            "--keep-alive",
            "1s",
        ])
        .expect("echo args should parse");

        match cli.command {
            Command::Echo(args) => {
                assert_eq!(args.addr, "127.0.0.1:0");
                assert_eq!(args.max_connections, Some(2));
                assert_eq!(args.tuning.receive_buffer_size, 512);
                assert_eq!(args.tuning.keep_alive.as_deref(), Some("1s"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
