/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read was issued with a buffer that has no spare capacity.
    #[error("read buffer has no spare capacity")]
    NoBufferSpace,

    /// The transport accepted zero bytes of a non-empty write.
    #[error("transport accepted zero bytes")]
    WriteZero,
}

pub type Result<T> = std::result::Result<T, TransportError>;
