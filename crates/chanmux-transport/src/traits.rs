use std::io::{ErrorKind, IoSlice};
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Result, TransportError};

/// Maximum number of segments handed to a single vectored write.
pub const MAX_IO_SLICES: usize = 64;

/// Upper bound on bytes copied together when the stream lacks vectored writes.
const COALESCE_LIMIT: usize = 64 * 1024;

type BoxedRead = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// A connected duplex byte stream, ready to be split into halves.
pub struct Transport {
    reader: TransportReader,
    writer: TransportWriter,
    peer_addr: Option<SocketAddr>,
}

impl Transport {
    /// Wrap any tokio duplex stream (for example `tokio::io::duplex`).
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self {
            reader: TransportReader::new(read),
            writer: TransportWriter::new(write),
            peer_addr: None,
        }
    }

    /// Wrap a connected TCP socket. Disables Nagle's algorithm: the sender
    /// already batches frames into one write.
    pub fn from_tcp(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok();
        let (read, write) = stream.into_split();
        Ok(Self {
            reader: TransportReader::new(read),
            writer: TransportWriter::new(write),
            peer_addr,
        })
    }

    /// Remote address, when the transport is a socket.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer_addr
    }

    /// Split into independently owned halves.
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        (self.reader, self.writer)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer_addr", &self.peer_addr)
            .finish_non_exhaustive()
    }
}

/// Receive half of a transport.
pub struct TransportReader {
    inner: BoxedRead,
}

impl TransportReader {
    pub fn new<R>(inner: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            inner: Box::new(inner),
        }
    }

    /// Read into the spare capacity of `buf`, appending to its contents.
    ///
    /// Never grows `buf`. Returns `Ok(0)` when the peer closed the stream.
    pub async fn read(&mut self, buf: &mut BytesMut) -> Result<usize> {
        if buf.capacity() == buf.len() {
            return Err(TransportError::NoBufferSpace);
        }

        loop {
            match self.inner.read_buf(buf).await {
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
    }
}

/// Send half of a transport.
pub struct TransportWriter {
    inner: BoxedWrite,
    scratch: BytesMut,
}

impl TransportWriter {
    pub fn new<W>(inner: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            inner: Box::new(inner),
            scratch: BytesMut::new(),
        }
    }

    /// Issue one write covering the front of `segments`.
    ///
    /// Returns the number of bytes the transport accepted, which may be fewer
    /// than the total; the caller re-issues the remainder. Returns `Ok(0)` only
    /// if every segment is empty.
    pub async fn write(&mut self, segments: &[Bytes]) -> Result<usize> {
        let non_empty = segments.iter().filter(|s| !s.is_empty());

        let written = if self.inner.is_write_vectored() {
            let slices: Vec<IoSlice<'_>> = non_empty
                .take(MAX_IO_SLICES)
                .map(|s| IoSlice::new(s.as_ref()))
                .collect();
            if slices.is_empty() {
                return Ok(0);
            }
            loop {
                match self.inner.write_vectored(&slices).await {
                    Ok(n) => break n,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => return Err(TransportError::Io(err)),
                }
            }
        } else {
            // Without vectored support each write would carry one segment
            // (often an 8-byte header), so copy a prefix together first.
            self.scratch.clear();
            for segment in non_empty {
                let room = COALESCE_LIMIT.saturating_sub(self.scratch.len());
                if room == 0 {
                    break;
                }
                let take = segment.len().min(room);
                self.scratch.extend_from_slice(&segment[..take]);
            }
            if self.scratch.is_empty() {
                return Ok(0);
            }
            loop {
                match self.inner.write(&self.scratch).await {
                    Ok(n) => break n,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => return Err(TransportError::Io(err)),
                }
            }
        };

        if written == 0 {
            return Err(TransportError::WriteZero);
        }
        Ok(written)
    }

    /// Flush and close the write direction.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(TransportError::Io)
    }
}
