use std::sync::Arc;

use chanmux_frame::FrameError;
use chanmux_transport::TransportError;

use crate::completion::OperationToken;

/// Errors surfaced by connections and channels.
///
/// Cloneable: a single transport failure is reported to every pending
/// operation on the connection.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MuxError {
    /// The transport failed to read or write.
    #[error("transport error: {0}")]
    Transport(Arc<TransportError>),

    /// The peer sent a malformed frame header.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The connection was closed locally or by the peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// A read is already pending on this channel.
    #[error("channel {0} already has a read in progress")]
    ConcurrentRead(u16),

    /// The channel's send direction was already half-closed.
    #[error("channel {0} is closed for sending")]
    SendClosed(u16),

    /// Every channel id available to this side has been used.
    #[error("channel id space exhausted")]
    ChannelIdsExhausted,

    /// `read` was called with a zero-length buffer.
    #[error("read buffer is empty")]
    EmptyReadBuffer,

    /// A completion was delivered to the wrong waiter.
    #[error("operation mismatch: expected {expected}, got {actual}")]
    OperationMismatch {
        expected: OperationToken,
        actual: OperationToken,
    },

    /// Connection configuration was rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<TransportError> for MuxError {
    fn from(err: TransportError) -> Self {
        Self::Transport(Arc::new(err))
    }
}

impl MuxError {
    /// True for errors that end the whole connection rather than one call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Frame(_) | Self::ConnectionClosed
        )
    }
}

impl From<MuxError> for std::io::Error {
    fn from(err: MuxError) -> Self {
        use std::io::ErrorKind;

        let kind = match &err {
            MuxError::ConnectionClosed => ErrorKind::ConnectionAborted,
            MuxError::SendClosed(_) => ErrorKind::BrokenPipe,
            MuxError::Frame(_) => ErrorKind::InvalidData,
            MuxError::EmptyReadBuffer | MuxError::InvalidConfig(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

pub type Result<T> = std::result::Result<T, MuxError>;
