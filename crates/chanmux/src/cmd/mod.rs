use std::path::PathBuf;
use std::time::Duration;

use chanmux_connection::{ConnectionConfig, Role, DEFAULT_RECEIVE_BUFFER_SIZE};
use chanmux_frame::MAX_FRAME_PAYLOAD;
use clap::{Args, Subcommand};

use crate::exit::{mux_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every channel back to its sender.
    Echo(EchoArgs),
    /// Send a payload on one or more channels and print the replies.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format).await,
        Command::Send(args) => send::run(args, format).await,
        Command::Version(args) => version::run(args),
    }
}

/// Connection settings shared by every subcommand that opens a connection.
#[derive(Args, Debug)]
pub struct TuningArgs {
    /// Receive buffer capacity in bytes.
    #[arg(long, default_value_t = DEFAULT_RECEIVE_BUFFER_SIZE)]
    pub receive_buffer_size: usize,
    /// Largest payload carried by one frame.
    #[arg(long, default_value_t = MAX_FRAME_PAYLOAD)]
    pub max_frame_payload: usize,
    /// Send keep-alive frames at this interval (e.g. 5s, 500ms).
    #[arg(long, value_name = "DURATION")]
    pub keep_alive: Option<String>,
}

impl TuningArgs {
    pub fn to_config(&self, role: Role) -> CliResult<ConnectionConfig> {
        let keep_alive = self.keep_alive.as_deref().map(parse_duration).transpose()?;
        let config = ConnectionConfig::default()
            .with_role(role)
            .with_receive_buffer_size(self.receive_buffer_size)
            .with_max_frame_payload(self.max_frame_payload)
            .with_keep_alive_interval(keep_alive);
        config
            .validate()
            .map_err(|err| mux_error("invalid connection settings", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to listen on.
    #[arg(env = "CHANMUX_ADDR", default_value = "127.0.0.1:7000")]
    pub addr: String,
    /// Exit once this many connections have been served.
    #[arg(long, value_name = "N")]
    pub max_connections: Option<usize>,
    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to.
    #[arg(env = "CHANMUX_ADDR")]
    pub addr: String,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Number of channels to open, each carrying the payload.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub channels: u16,
    /// Give up if connecting or the exchange takes longer (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
    #[command(flatten)]
    pub tuning: TuningArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(number) = input.strip_suffix("ms") {
        (number, true)
    } else if let Some(number) = input.strip_suffix('s') {
        (number, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
