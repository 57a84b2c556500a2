//! Transport receiver: reads the socket, decodes frames and routes payloads
//! to per-channel actors.
//!
//! The receive buffer has a fixed capacity. Each read fills the unused tail;
//! the filled part is split off and frozen, and decoded payloads are
//! zero-copy slices of it. Once the capacity is used up, reading pauses until
//! every forwarded byte has been consumed, and the buffer starts over at
//! offset 0.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use chanmux_actor::{Actor, ActorManager, Addr, Continuation};
use chanmux_frame::{is_keep_alive_channel, FrameDecoder};
use chanmux_transport::{self as transport, TransportReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn, Instrument};

use crate::channel::{Channel, ChannelContext};
use crate::channel_receiver::{ChannelMessage, ChannelReceiver};
use crate::completion::Completion;
use crate::error::MuxError;

pub(crate) enum ReceiverMessage {
    ReadCompleted {
        reader: TransportReader,
        buffer: BytesMut,
        result: transport::Result<usize>,
    },
    Accept {
        completion: Completion<Channel>,
    },
    /// A channel actor handed `n` bytes to a reader or discarded them.
    DataConsumed(usize),
    /// A locally opened channel.
    ChannelCreated {
        id: u16,
        addr: Addr<ChannelMessage>,
    },
    ChannelRetired(u16),
    Shutdown,
}

/// Reader half and buffer while no read is outstanding.
struct Idle {
    reader: TransportReader,
    buffer: BytesMut,
}

pub(crate) struct TransportReceiver {
    me: Addr<ReceiverMessage>,
    manager: ActorManager,
    context: Arc<ChannelContext>,
    cancel: CancellationToken,
    idle: Option<Idle>,
    buffer_capacity: usize,
    decoder: FrameDecoder,
    channels: HashMap<u16, Addr<ChannelMessage>>,
    retired: HashSet<u16>,
    /// Remotely opened channels not yet handed to `accept`.
    unaccepted: VecDeque<Channel>,
    accepts: VecDeque<Completion<Channel>>,
    /// Forwarded payload bytes not yet reported consumed.
    outstanding: usize,
    paused: bool,
    lost: Option<MuxError>,
}

impl TransportReceiver {
    pub(crate) fn new(
        me: Addr<ReceiverMessage>,
        manager: ActorManager,
        context: Arc<ChannelContext>,
        reader: TransportReader,
        buffer_capacity: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            me,
            manager,
            context,
            cancel,
            idle: Some(Idle {
                reader,
                buffer: BytesMut::with_capacity(buffer_capacity),
            }),
            buffer_capacity,
            decoder: FrameDecoder::new(),
            channels: HashMap::new(),
            retired: HashSet::new(),
            unaccepted: VecDeque::new(),
            accepts: VecDeque::new(),
            outstanding: 0,
            paused: false,
            lost: None,
        }
    }

    fn issue_read(&mut self) {
        let Some(Idle {
            mut reader,
            mut buffer,
        }) = self.idle.take()
        else {
            return;
        };

        let me = self.me.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(
            async move {
                let result = tokio::select! {
                    result = reader.read(&mut buffer) => result,
                    _ = cancel.cancelled() => return,
                };
                let _ = me.send(ReceiverMessage::ReadCompleted {
                    reader,
                    buffer,
                    result,
                });
            }
            .in_current_span(),
        );
    }

    fn read_completed(
        &mut self,
        reader: TransportReader,
        mut buffer: BytesMut,
        result: transport::Result<usize>,
    ) {
        let read = match result {
            Ok(0) => {
                if !self.decoder.is_idle() {
                    warn!(connection = %self.context.connection, "peer closed mid-frame");
                }
                debug!(connection = %self.context.connection, "peer closed transport");
                self.idle = Some(Idle { reader, buffer });
                self.connection_lost(MuxError::ConnectionClosed);
                return;
            }
            Ok(read) => read,
            Err(err) => {
                self.idle = Some(Idle { reader, buffer });
                self.connection_lost(MuxError::from(err));
                return;
            }
        };

        let chunk = buffer.split().freeze();
        let exhausted = buffer.capacity() == 0;
        self.idle = Some(Idle { reader, buffer });
        trace!(read, exhausted, "transport read completed");

        let mut groups: Vec<(u16, Vec<Bytes>)> = Vec::new();
        let decoded = self.decoder.decode(&chunk, |segment| {
            if is_keep_alive_channel(segment.channel_id) {
                trace!("keep-alive received");
                return;
            }
            match groups.iter_mut().find(|(id, _)| *id == segment.channel_id) {
                Some((_, segments)) => segments.push(segment.payload),
                None => groups.push((segment.channel_id, vec![segment.payload])),
            }
        });
        drop(chunk);

        for (channel_id, segments) in groups {
            self.dispatch(channel_id, segments);
        }

        if let Err(err) = decoded {
            warn!(connection = %self.context.connection, error = %err, "malformed frame");
            self.connection_lost(MuxError::from(err));
            return;
        }

        if exhausted {
            self.paused = true;
            self.try_resume();
        } else {
            self.issue_read();
        }
    }

    fn dispatch(&mut self, channel_id: u16, segments: Vec<Bytes>) {
        if self.retired.contains(&channel_id) {
            trace!(channel = channel_id, "discarding data for retired channel");
            return;
        }

        let addr = match self.channels.get(&channel_id) {
            Some(addr) => addr.clone(),
            // Only the local side may open ids of its own parity.
            None if self.context.role.allocates(channel_id) => {
                warn!(
                    connection = %self.context.connection,
                    channel = channel_id,
                    "discarding data for unopened local channel id"
                );
                return;
            }
            None => self.materialize(channel_id),
        };

        let bytes: usize = segments.iter().map(Bytes::len).sum();
        self.outstanding += bytes;
        if addr.send(ChannelMessage::DataArrived(segments)).is_err() {
            self.outstanding -= bytes;
        }
    }

    /// Spawn the actor for a channel the peer opened and queue it for accept.
    fn materialize(&mut self, channel_id: u16) -> Addr<ChannelMessage> {
        debug!(channel = channel_id, "peer opened channel");
        let receiver = self.me.clone();
        let addr = self
            .manager
            .spawn(ChannelReceiver::new(channel_id, receiver));
        self.channels.insert(channel_id, addr.clone());
        self.unaccepted.push_back(Channel::new(
            channel_id,
            Arc::clone(&self.context),
            addr.clone(),
        ));
        self.match_accepts();
        addr
    }

    fn match_accepts(&mut self) {
        while let Some(waiter) = self.accepts.pop_front() {
            if waiter.is_abandoned() {
                continue;
            }
            if let Some(channel) = self.unaccepted.pop_front() {
                if let Err(Ok(channel)) = waiter.try_complete(Ok(channel)) {
                    self.unaccepted.push_front(channel);
                }
                continue;
            }
            match &self.lost {
                Some(err) => waiter.complete(Err(err.clone())),
                None => {
                    self.accepts.push_front(waiter);
                    return;
                }
            }
        }
    }

    fn try_resume(&mut self) {
        if !self.paused || self.outstanding > 0 || self.lost.is_some() {
            return;
        }
        let Some(idle) = self.idle.as_mut() else {
            return;
        };
        // Reclaims the same allocation once every slice of it is gone.
        idle.buffer.reserve(self.buffer_capacity);
        self.paused = false;
        trace!("receive buffer reset");
        self.issue_read();
    }

    fn connection_lost(&mut self, err: MuxError) {
        if self.lost.is_some() {
            return;
        }
        for addr in self.channels.values() {
            let _ = addr.send(ChannelMessage::ConnectionLost(err.clone()));
        }
        self.lost = Some(err);
        self.match_accepts();
    }

    fn shutdown(&mut self) {
        debug!(
            connection = %self.context.connection,
            channels = self.channels.len(),
            "receiver shutting down"
        );
        self.cancel.cancel();
        for addr in self.channels.values() {
            let _ = addr.send(ChannelMessage::Shutdown);
        }
        for waiter in self.accepts.drain(..) {
            waiter.complete(Err(MuxError::ConnectionClosed));
        }
        self.unaccepted.clear();
    }
}

impl Actor for TransportReceiver {
    type Message = ReceiverMessage;

    const NAME: &'static str = "receiver";

    fn started(&mut self) -> Continuation {
        self.issue_read();
        Continuation::BlockOnReceive
    }

    fn handle(&mut self, message: ReceiverMessage) -> Continuation {
        match message {
            ReceiverMessage::ReadCompleted {
                reader,
                buffer,
                result,
            } => self.read_completed(reader, buffer, result),
            ReceiverMessage::Accept { completion } => {
                self.accepts.push_back(completion);
                self.match_accepts();
            }
            ReceiverMessage::DataConsumed(bytes) => {
                self.outstanding = self.outstanding.saturating_sub(bytes);
                self.try_resume();
            }
            ReceiverMessage::ChannelCreated { id, addr } => {
                if let Some(err) = &self.lost {
                    let _ = addr.send(ChannelMessage::ConnectionLost(err.clone()));
                }
                match self.channels.entry(id) {
                    Entry::Vacant(entry) => {
                        entry.insert(addr);
                    }
                    Entry::Occupied(_) => {
                        warn!(channel = id, "channel id already in use");
                        let _ = addr.send(ChannelMessage::Shutdown);
                    }
                }
            }
            ReceiverMessage::ChannelRetired(id) => {
                // Data already forwarded is drained before the actor stops.
                if let Some(addr) = self.channels.remove(&id) {
                    let _ = addr.send(ChannelMessage::Shutdown);
                }
                self.retired.insert(id);
                debug!(channel = id, "channel retired");
            }
            ReceiverMessage::Shutdown => {
                self.shutdown();
                return Continuation::Done;
            }
        }
        Continuation::BlockOnReceive
    }
}
