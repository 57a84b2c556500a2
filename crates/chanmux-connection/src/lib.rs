//! Channel multiplexing over a single transport.
//!
//! A [`Connection`] carries any number of independent, ordered byte streams
//! ([`Channel`]s) over one reliable duplex transport. Work is split across
//! actors:
//! - one sender that serialises frames from every channel onto the wire
//! - one receiver that reads the transport and routes decoded payloads
//! - one actor per channel that queues payloads and serves reads
//!
//! Clients open odd channel ids and servers even ones, so both ends can open
//! channels without negotiation.
//!
//! [`ChannelStream`] adapts a channel to tokio's `AsyncRead`/`AsyncWrite`.

pub mod channel;
mod channel_receiver;
pub mod completion;
pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod listener;
mod receiver;
mod sender;
pub mod stream;

pub use channel::Channel;
pub use completion::{
    completion, Completion, ConnectionId, OperationKind, OperationToken, PendingOperation,
};
pub use config::{ConnectionConfig, Role, CHANNEL_ID_STEP, DEFAULT_RECEIVE_BUFFER_SIZE};
pub use connection::Connection;
pub use connector::{connect, connect_with_config};
pub use error::{MuxError, Result};
pub use listener::MuxListener;
pub use stream::ChannelStream;
