use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chanmux_actor::{ActorManager, Addr};
use chanmux_frame::{FrameHeader, KEEP_ALIVE_CHANNEL};
use chanmux_transport::Transport;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, Instrument, Span};

use crate::channel::{Channel, ChannelContext};
use crate::channel_receiver::ChannelReceiver;
use crate::completion::{completion, ConnectionId, OperationKind, OperationToken};
use crate::config::{ConnectionConfig, Role, CHANNEL_ID_STEP};
use crate::error::{MuxError, Result};
use crate::receiver::{ReceiverMessage, TransportReceiver};
use crate::sender::{self, SenderActor, SenderMessage};

/// A multiplexed connection over one transport.
///
/// Owns the sender and receiver pipelines. Either side may open channels;
/// channels opened by the peer are handed out by [`Connection::accept`].
///
/// Dropping the connection without [`Connection::close`] starts the same
/// shutdown in the background; channels still in use then fail with
/// [`MuxError::ConnectionClosed`].
pub struct Connection {
    id: ConnectionId,
    role: Role,
    manager: ActorManager,
    context: Arc<ChannelContext>,
    receiver: Addr<ReceiverMessage>,
    next_channel_id: AtomicU32,
    cancel: CancellationToken,
    closed: AtomicBool,
    span: Span,
}

impl Connection {
    /// Start multiplexing over `transport`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(transport: Transport, config: ConnectionConfig) -> Result<Self> {
        config.validate()?;

        let id = ConnectionId::next();
        let span = debug_span!("connection", %id, role = %config.role);
        let manager = ActorManager::new();
        let cancel = CancellationToken::new();
        let (reader, writer) = transport.into_split();

        let (context, receiver) = span.in_scope(|| {
            let sender = manager.spawn_with(|me| SenderActor::new(me, id, writer));
            let context = Arc::new(ChannelContext {
                connection: id,
                role: config.role,
                sender,
                max_frame_payload: config.max_frame_payload,
            });
            let receiver = manager.spawn_with(|me| {
                TransportReceiver::new(
                    me,
                    manager.clone(),
                    Arc::clone(&context),
                    reader,
                    config.receive_buffer_size,
                    cancel.child_token(),
                )
            });
            (context, receiver)
        });

        if let Some(interval) = config.keep_alive_interval {
            spawn_keep_alive(
                context.sender.clone(),
                id,
                interval,
                cancel.child_token(),
                span.clone(),
            );
        }
        debug!(parent: &span, "connection started");

        Ok(Self {
            id,
            role: config.role,
            manager,
            context,
            receiver,
            next_channel_id: AtomicU32::new(u32::from(config.role.first_channel_id())),
            cancel,
            closed: AtomicBool::new(false),
            span,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Open a new channel. Usable at once; the peer learns of it with the
    /// first frame written on it.
    pub fn open(&self) -> Result<Channel> {
        if self.is_closed() {
            return Err(MuxError::ConnectionClosed);
        }
        let id = self.allocate_channel_id()?;

        let addr = self.span.in_scope(|| {
            self.manager
                .spawn(ChannelReceiver::new(id, self.receiver.clone()))
        });
        self.receiver
            .send(ReceiverMessage::ChannelCreated {
                id,
                addr: addr.clone(),
            })
            .map_err(|_| MuxError::ConnectionClosed)?;

        debug!(parent: &self.span, channel = id, "channel opened");
        Ok(Channel::new(id, Arc::clone(&self.context), addr))
    }

    fn allocate_channel_id(&self) -> Result<u16> {
        let step = u32::from(CHANNEL_ID_STEP);
        let limit = u32::from(u16::MAX);
        let previous = self
            .next_channel_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |next| {
                (next <= limit).then_some(next + step)
            })
            .map_err(|_| MuxError::ChannelIdsExhausted)?;
        u16::try_from(previous).map_err(|_| MuxError::ChannelIdsExhausted)
    }

    /// Wait for the next channel opened by the peer.
    ///
    /// Concurrent callers are served in call order.
    pub async fn accept(&self) -> Result<Channel> {
        let (done, pending) = completion(OperationToken::new(self.id, OperationKind::Accept));
        self.receiver
            .send(ReceiverMessage::Accept { completion: done })
            .map_err(|_| MuxError::ConnectionClosed)?;
        pending.wait(self.id, OperationKind::Accept).await
    }

    /// Send one keep-alive frame.
    pub async fn keep_alive(&self) -> Result<()> {
        send_keep_alive(&self.context.sender, self.id).await
    }

    /// Flush pending writes, shut down the transport and stop every actor.
    ///
    /// Returns the transport error if the flush failed. Later calls return
    /// `Ok(())`.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!(parent: &self.span, "closing connection");
        self.cancel.cancel();

        let flushed = sender::close(&self.context.sender, self.id).await;
        let _ = self.receiver.send(ReceiverMessage::Shutdown);
        self.manager.wait_for_actors().await;

        debug!(parent: &self.span, "connection closed");
        flushed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let _ = self
            .context
            .sender
            .send(SenderMessage::Close { completion: None });
        let _ = self.receiver.send(ReceiverMessage::Shutdown);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

async fn send_keep_alive(sender: &Addr<SenderMessage>, owner: ConnectionId) -> Result<()> {
    let frame = Bytes::copy_from_slice(&FrameHeader::keep_alive().encode());
    sender::submit(
        sender,
        owner,
        OperationKind::KeepAlive,
        KEEP_ALIVE_CHANNEL,
        vec![frame],
    )
    .await
}

fn spawn_keep_alive(
    sender: Addr<SenderMessage>,
    owner: ConnectionId,
    interval: Duration,
    cancel: CancellationToken,
    span: Span,
) {
    tokio::spawn(
        async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = send_keep_alive(&sender, owner).await {
                            debug!(error = %err, "keep-alive stopped");
                            break;
                        }
                    }
                }
            }
        }
        .instrument(span),
    );
}
