//! Per-channel receive queue.
//!
//! Holds the segments the transport receiver forwarded for one channel and
//! serves reads from them. A zero-length segment is the peer's half-close.

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use chanmux_actor::{Actor, Addr, Continuation};
use tracing::{debug, trace};

use crate::completion::Completion;
use crate::error::MuxError;
use crate::receiver::ReceiverMessage;

pub(crate) enum ChannelMessage {
    DataArrived(Vec<Bytes>),
    Read {
        max: usize,
        completion: Completion<Bytes>,
    },
    /// The transport stopped delivering data.
    ConnectionLost(MuxError),
    /// Every `Channel` handle was dropped.
    Released,
    Shutdown,
}

struct PendingRead {
    max: usize,
    completion: Completion<Bytes>,
}

pub(crate) struct ChannelReceiver {
    id: u16,
    receiver: Addr<ReceiverMessage>,
    queue: VecDeque<Bytes>,
    queued_bytes: usize,
    pending: Option<PendingRead>,
    eof: bool,
    lost: Option<MuxError>,
    released: bool,
    retiring: bool,
}

impl ChannelReceiver {
    pub(crate) fn new(id: u16, receiver: Addr<ReceiverMessage>) -> Self {
        Self {
            id,
            receiver,
            queue: VecDeque::new(),
            queued_bytes: 0,
            pending: None,
            eof: false,
            lost: None,
            released: false,
            retiring: false,
        }
    }

    fn data_arrived(&mut self, segments: Vec<Bytes>) {
        let mut discarded = 0;
        for segment in segments {
            if self.eof || self.released {
                discarded += segment.len();
                self.eof |= segment.is_empty();
                continue;
            }
            if segment.is_empty() {
                debug!(channel = self.id, "peer half-closed channel");
                self.eof = true;
                continue;
            }
            self.queued_bytes += segment.len();
            self.queue.push_back(segment);
        }
        if discarded > 0 {
            trace!(channel = self.id, discarded, "discarded channel data");
            self.report_consumed(discarded);
        }
    }

    fn read(&mut self, max: usize, completion: Completion<Bytes>) {
        if let Some(existing) = &self.pending {
            if !existing.completion.is_abandoned() {
                completion.complete(Err(MuxError::ConcurrentRead(self.id)));
                return;
            }
        }
        self.pending = Some(PendingRead { max, completion });
    }

    /// Complete the pending read if anything can satisfy it.
    fn serve(&mut self) {
        let Some(read) = self.pending.take() else {
            return;
        };
        if read.completion.is_abandoned() {
            return;
        }

        if !self.queue.is_empty() {
            let data = self.take(read.max);
            let len = data.len();
            match read.completion.try_complete(Ok(data)) {
                Ok(()) => self.report_consumed(len),
                Err(Ok(data)) => {
                    // The reader went away mid-delivery; keep the bytes.
                    self.queued_bytes += data.len();
                    self.queue.push_front(data);
                }
                Err(Err(_)) => {}
            }
        } else if self.eof {
            read.completion.complete(Ok(Bytes::new()));
        } else if let Some(err) = &self.lost {
            read.completion.complete(Err(err.clone()));
        } else {
            self.pending = Some(read);
        }
    }

    /// Copy up to `max` queued bytes into a fresh buffer.
    fn take(&mut self, max: usize) -> Bytes {
        let mut out = BytesMut::with_capacity(max.min(self.queued_bytes));
        while out.len() < max {
            let Some(front) = self.queue.front_mut() else {
                break;
            };
            let want = max - out.len();
            if front.len() <= want {
                out.extend_from_slice(front);
                self.queue.pop_front();
            } else {
                out.extend_from_slice(&front[..want]);
                front.advance(want);
            }
        }
        self.queued_bytes -= out.len();
        out.freeze()
    }

    fn release(&mut self) {
        self.released = true;
        let queued = self.queued_bytes;
        self.queue.clear();
        self.queued_bytes = 0;
        self.pending = None;
        if queued > 0 {
            self.report_consumed(queued);
        }
    }

    fn report_consumed(&self, bytes: usize) {
        let _ = self.receiver.send(ReceiverMessage::DataConsumed(bytes));
    }

    /// A released channel asks to be retired once its peer half-closed. The
    /// receiver answers with `Shutdown` after everything already forwarded.
    fn continuation(&mut self) -> Continuation {
        if !self.released {
            return Continuation::BlockOnReceive;
        }
        if self.lost.is_some() {
            return Continuation::Done;
        }
        if self.eof && !self.retiring {
            self.retiring = true;
            let _ = self.receiver.send(ReceiverMessage::ChannelRetired(self.id));
        }
        Continuation::BlockOnReceive
    }
}

impl Actor for ChannelReceiver {
    type Message = ChannelMessage;

    const NAME: &'static str = "channel";

    fn handle(&mut self, message: ChannelMessage) -> Continuation {
        match message {
            ChannelMessage::DataArrived(segments) => {
                self.data_arrived(segments);
                self.serve();
            }
            ChannelMessage::Read { max, completion } => {
                self.read(max, completion);
                self.serve();
            }
            ChannelMessage::ConnectionLost(err) => {
                trace!(channel = self.id, error = %err, "connection lost");
                self.lost.get_or_insert(err);
                self.serve();
            }
            ChannelMessage::Released => self.release(),
            ChannelMessage::Shutdown => {
                if let Some(read) = self.pending.take() {
                    read.completion.complete(Err(MuxError::ConnectionClosed));
                }
                return Continuation::Done;
            }
        }
        self.continuation()
    }
}
