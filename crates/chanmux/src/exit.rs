use std::fmt;
use std::io;

use chanmux_connection::MuxError;
use chanmux_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::AddrInUse => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: &TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn mux_error(context: &str, err: MuxError) -> CliError {
    match err {
        MuxError::Transport(err) => transport_error(context, &err),
        MuxError::Frame(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        MuxError::ConnectionClosed => CliError::new(FAILURE, format!("{context}: {err}")),
        MuxError::InvalidConfig(_) => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_connect_is_a_plain_failure() {
        let err = MuxError::from(TransportError::Connect {
            addr: "127.0.0.1:1".to_string(),
            source: io::ErrorKind::ConnectionRefused.into(),
        });
        let cli = mux_error("connect failed", err);
        assert_eq!(cli.code, FAILURE);
        assert!(cli.message.starts_with("connect failed: "));
    }

    #[test]
    fn non_io_transport_errors_use_transport_code() {
        let cli = mux_error("send failed", MuxError::from(TransportError::WriteZero));
        assert_eq!(cli.code, TRANSPORT_ERROR);
    }

    #[test]
    fn config_and_protocol_errors_map_to_specific_codes() {
        let usage = mux_error("start", MuxError::InvalidConfig("bad".to_string()));
        assert_eq!(usage.code, USAGE);

        let frame = mux_error(
            "receive",
            MuxError::Frame(chanmux_frame::FrameError::InvalidNibble {
                index: 2,
                value: 0x40,
            }),
        );
        assert_eq!(frame.code, DATA_INVALID);

        let internal = mux_error("read", MuxError::ConcurrentRead(1));
        assert_eq!(internal.code, INTERNAL);
    }
}
