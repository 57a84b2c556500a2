//! Transport adapters for chanmux.
//!
//! A transport is an already-connected, reliable, ordered duplex byte stream.
//! This crate splits one into a [`TransportReader`] and a
//! [`TransportWriter`] with exactly the operations the multiplexer needs:
//! - read into the spare capacity of a fixed buffer
//! - vectored write of a list of segments, reporting partial progress
//! - shutdown of the write direction
//!
//! TCP helpers ([`connect`], [`TcpTransportListener`]) cover the common case;
//! any tokio `AsyncRead + AsyncWrite` stream works through [`Transport::new`].

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{connect, TcpTransportListener};
pub use traits::{Transport, TransportReader, TransportWriter, MAX_IO_SLICES};
