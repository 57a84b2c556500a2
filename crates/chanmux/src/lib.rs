//! Many independent, ordered byte streams over one TCP connection.
//!
//! # Crate Structure
//!
//! - [`frame`]: the 8-byte nibble-encoded frame header and streaming decoder
//! - [`transport`]: transport halves and TCP connect/listen helpers
//! - [`actor`]: the mailbox actors the pipelines run on
//! - [`connection`]: connections, channels, and the sender/receiver pipelines
//!
//! The common entry points are re-exported at the top level:
//!
//! ```no_run
//! # async fn demo() -> chanmux::Result<()> {
//! let connection = chanmux::connect("127.0.0.1:7000").await?;
//! let channel = connection.open()?;
//! channel.write(&b"hello"[..]).await?;
//! channel.close_send().await?;
//! let reply = channel.read_to_end().await?;
//! # let _ = reply;
//! # Ok(())
//! # }
//! ```

/// Re-export frame types.
pub mod frame {
    pub use chanmux_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use chanmux_transport::*;
}

/// Re-export actor types.
pub mod actor {
    pub use chanmux_actor::*;
}

/// Re-export connection types.
pub mod connection {
    pub use chanmux_connection::*;
}

pub use chanmux_connection::{
    connect, connect_with_config, Channel, ChannelStream, Connection, ConnectionConfig, MuxError,
    MuxListener, Result, Role,
};
