//! [`AsyncRead`] and [`AsyncWrite`] over a [`Channel`].
//!
//! Lets a channel be driven by tokio's I/O utilities (`copy`, `split`,
//! buffered readers). Shutting the writer down half-closes the channel.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

use crate::channel::Channel;
use crate::error::Result;

type Pending<T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>>;

/// A [`Channel`] as a tokio byte stream.
///
/// `poll_write` accepts a buffer as soon as the previous write is on the
/// wire, so a write error can surface on the following write or flush.
/// Dropping the stream while a read is pending leaves that data queued on
/// the channel.
pub struct ChannelStream {
    channel: Channel,
    read: Option<Pending<Bytes>>,
    /// Received bytes that did not fit the caller's buffer.
    unread: Bytes,
    write: Option<Pending<()>>,
    shutdown: Option<Pending<()>>,
}

impl ChannelStream {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            read: None,
            unread: Bytes::new(),
            write: None,
            shutdown: None,
        }
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn into_channel(self) -> Channel {
        self.channel
    }

    fn poll_write_done(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(write) = self.write.as_mut() {
            let result = ready!(write.as_mut().poll(cx));
            self.write = None;
            result?;
        }
        Poll::Ready(Ok(()))
    }
}

impl From<Channel> for ChannelStream {
    fn from(channel: Channel) -> Self {
        Self::new(channel)
    }
}

impl AsyncRead for ChannelStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        if this.unread.is_empty() {
            if this.read.is_none() {
                let channel = this.channel.clone();
                let max = buf.remaining();
                this.read = Some(Box::pin(async move { channel.read_bytes(max).await }));
            }
            if let Some(read) = this.read.as_mut() {
                let result = ready!(read.as_mut().poll(cx));
                this.read = None;
                this.unread = result?;
            }
        }

        // Empty here means end of stream.
        let n = this.unread.len().min(buf.remaining());
        buf.put_slice(&this.unread.split_to(n));
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for ChannelStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_write_done(cx))?;
        if data.is_empty() {
            return Poll::Ready(Ok(0));
        }

        let channel = this.channel.clone();
        let data = Bytes::copy_from_slice(data);
        let len = data.len();
        this.write = Some(Box::pin(async move { channel.write(data).await }));
        // Start the write now so it is queued in call order.
        if let Poll::Ready(Err(err)) = this.poll_write_done(cx) {
            return Poll::Ready(Err(err));
        }
        Poll::Ready(Ok(len))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.get_mut().poll_write_done(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_write_done(cx))?;

        if this.shutdown.is_none() {
            trace!(channel = this.channel.id(), "stream shutdown");
            let channel = this.channel.clone();
            this.shutdown = Some(Box::pin(async move { channel.close_send().await }));
        }
        if let Some(shutdown) = this.shutdown.as_mut() {
            let result = ready!(shutdown.as_mut().poll(cx));
            this.shutdown = None;
            result?;
        }
        Poll::Ready(Ok(()))
    }
}

impl std::fmt::Debug for ChannelStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelStream")
            .field("channel", &self.channel)
            .field("unread", &self.unread.len())
            .finish_non_exhaustive()
    }
}
