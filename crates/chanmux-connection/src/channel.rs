use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chanmux_actor::Addr;
use chanmux_frame::encode_frames;

use crate::channel_receiver::ChannelMessage;
use crate::completion::{completion, ConnectionId, OperationKind, OperationToken};
use crate::config::Role;
use crate::error::{MuxError, Result};
use crate::sender::{self, SenderMessage};
use crate::stream::ChannelStream;

/// Connection-wide state shared by every channel handle.
pub(crate) struct ChannelContext {
    pub(crate) connection: ConnectionId,
    pub(crate) role: Role,
    pub(crate) sender: Addr<SenderMessage>,
    pub(crate) max_frame_payload: usize,
}

/// One ordered, bidirectional byte stream within a connection.
///
/// Cheap to clone; clones share the stream. Once every clone is dropped,
/// data still arriving for the channel is discarded.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    id: u16,
    context: Arc<ChannelContext>,
    actor: Addr<ChannelMessage>,
    send_closed: AtomicBool,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        let _ = self.actor.send(ChannelMessage::Released);
    }
}

impl Channel {
    pub(crate) fn new(id: u16, context: Arc<ChannelContext>, actor: Addr<ChannelMessage>) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                id,
                context,
                actor,
                send_closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> u16 {
        self.inner.id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.inner.context.connection
    }

    /// Read into `buf`, returning the number of bytes copied.
    ///
    /// Waits until at least one byte is available. Returns `Ok(0)` once the
    /// peer has half-closed the channel and everything before that was read.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let data = self.read_bytes(buf.len()).await?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    /// Read up to `max` bytes. An empty result means end of stream.
    pub async fn read_bytes(&self, max: usize) -> Result<Bytes> {
        if max == 0 {
            return Err(MuxError::EmptyReadBuffer);
        }
        let owner = self.connection_id();
        let (done, pending) = completion(OperationToken::new(owner, OperationKind::Read));
        self.inner
            .actor
            .send(ChannelMessage::Read {
                max,
                completion: done,
            })
            .map_err(|_| MuxError::ConnectionClosed)?;
        pending.wait(owner, OperationKind::Read).await
    }

    /// Read until the peer half-closes the channel.
    pub async fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let chunk = self.read_bytes(usize::from(u16::MAX)).await?;
            if chunk.is_empty() {
                return Ok(out);
            }
            out.extend_from_slice(&chunk);
        }
    }

    /// Send `data`, split into frames, and wait until it is on the wire.
    ///
    /// Writes from concurrent callers are never interleaved with each other.
    pub async fn write(&self, data: impl Into<Bytes>) -> Result<()> {
        let data = data.into();
        if self.is_send_closed() {
            return Err(MuxError::SendClosed(self.id()));
        }
        if data.is_empty() {
            return Ok(());
        }

        let context = &self.inner.context;
        let mut segments = Vec::new();
        encode_frames(self.id(), data, context.max_frame_payload, &mut segments);
        sender::submit(
            &context.sender,
            context.connection,
            OperationKind::Write,
            self.id(),
            segments,
        )
        .await
    }

    /// Half-close: tell the peer no more data follows. Reading stays open.
    ///
    /// Writes queued after the half-close, from any clone, fail with
    /// [`MuxError::SendClosed`].
    pub async fn close_send(&self) -> Result<()> {
        self.inner.send_closed.store(true, Ordering::Release);
        let context = &self.inner.context;
        sender::half_close(&context.sender, context.connection, self.id()).await
    }

    pub fn is_send_closed(&self) -> bool {
        self.inner.send_closed.load(Ordering::Acquire)
    }

    /// Wrap this handle as an `AsyncRead + AsyncWrite` stream.
    pub fn into_stream(self) -> ChannelStream {
        ChannelStream::new(self)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("connection", &self.inner.context.connection)
            .field("send_closed", &self.is_send_closed())
            .finish()
    }
}
