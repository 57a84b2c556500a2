//! Transport sender: serialises frames from every channel onto the wire.
//!
//! Segments wait in one FIFO. At most one transport write is outstanding;
//! it covers the front of the FIFO, and its confirmed byte count is walked
//! off the front when it completes. Partially written segments are sliced
//! in place so their tail goes out with the next write.
//!
//! Half-closes are tracked here as well: once a channel's marker is queued,
//! later sends on that channel are rejected, whichever handle they come from.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;
use chanmux_actor::{Actor, Addr, Continuation};
use chanmux_frame::FrameHeader;
use chanmux_transport::{self as transport, TransportWriter, MAX_IO_SLICES};
use tracing::{debug, trace, warn};

use crate::completion::{completion, Completion, ConnectionId, OperationKind, OperationToken};
use crate::error::{MuxError, Result};

pub(crate) enum SenderMessage {
    /// Queue frame segments for `channel`. The completion fires once the
    /// last one is on the wire.
    Send {
        channel: u16,
        segments: Vec<Bytes>,
        completion: Option<Completion<()>>,
    },
    /// Queue the half-close marker for `channel`; repeats complete at once.
    HalfClose {
        channel: u16,
        completion: Option<Completion<()>>,
    },
    WriteCompleted {
        writer: TransportWriter,
        result: transport::Result<usize>,
    },
    /// Flush the queue, shut down the write half and stop.
    Close { completion: Option<Completion<()>> },
    ShutdownCompleted { result: transport::Result<()> },
}

struct QueuedSegment {
    bytes: Bytes,
    completion: Option<Completion<()>>,
}

pub(crate) struct SenderActor {
    me: Addr<SenderMessage>,
    connection: ConnectionId,
    /// `None` while a write or the shutdown owns the writer.
    writer: Option<TransportWriter>,
    queue: VecDeque<QueuedSegment>,
    half_closed: HashSet<u16>,
    failure: Option<MuxError>,
    closing: Option<Option<Completion<()>>>,
    shutting_down: bool,
}

impl SenderActor {
    pub(crate) fn new(
        me: Addr<SenderMessage>,
        connection: ConnectionId,
        writer: TransportWriter,
    ) -> Self {
        Self {
            me,
            connection,
            writer: Some(writer),
            queue: VecDeque::new(),
            half_closed: HashSet::new(),
            failure: None,
            closing: None,
            shutting_down: false,
        }
    }

    /// Why new segments cannot be queued, if they cannot.
    fn rejection(&self, channel: u16) -> Option<MuxError> {
        if let Some(err) = &self.failure {
            return Some(err.clone());
        }
        if self.closing.is_some() {
            return Some(MuxError::ConnectionClosed);
        }
        self.half_closed
            .contains(&channel)
            .then_some(MuxError::SendClosed(channel))
    }

    fn enqueue(
        &mut self,
        channel: u16,
        segments: Vec<Bytes>,
        completion: Option<Completion<()>>,
    ) {
        if let Some(err) = self.rejection(channel) {
            if let Some(completion) = completion {
                completion.complete(Err(err));
            }
            return;
        }
        self.push(segments, completion);
    }

    fn half_close(&mut self, channel: u16, completion: Option<Completion<()>>) {
        let result = if self.half_closed.contains(&channel) {
            Some(Ok(()))
        } else {
            self.rejection(channel).map(Err)
        };
        if let Some(result) = result {
            if let Some(completion) = completion {
                completion.complete(result);
            }
            return;
        }

        self.half_closed.insert(channel);
        trace!(connection = %self.connection, channel, "half-close queued");
        let marker = Bytes::copy_from_slice(&FrameHeader::half_close(channel).encode());
        self.push(vec![marker], completion);
    }

    fn push(&mut self, segments: Vec<Bytes>, completion: Option<Completion<()>>) {
        let count = segments.len();
        if count == 0 {
            if let Some(completion) = completion {
                completion.complete(Ok(()));
            }
            return;
        }

        let mut completion = completion;
        for (index, bytes) in segments.into_iter().enumerate() {
            let completion = if index + 1 == count {
                completion.take()
            } else {
                None
            };
            self.queue.push_back(QueuedSegment { bytes, completion });
        }
        trace!(
            connection = %self.connection,
            segments = count,
            queued = self.queue.len(),
            "segments queued"
        );
        self.issue_write();
    }

    fn issue_write(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let Some(mut writer) = self.writer.take() else {
            // A write is already outstanding; it reissues on completion.
            return;
        };

        let segments: Vec<Bytes> = self
            .queue
            .iter()
            .take(MAX_IO_SLICES)
            .map(|queued| queued.bytes.clone())
            .collect();
        let me = self.me.clone();
        tokio::spawn(async move {
            let result = writer.write(&segments).await;
            let _ = me.send(SenderMessage::WriteCompleted { writer, result });
        });
    }

    /// Retire every segment covered by `written` confirmed bytes.
    fn confirm(&mut self, mut written: usize) {
        while let Some(front) = self.queue.front_mut() {
            if front.bytes.len() > written {
                let _ = front.bytes.split_to(written);
                break;
            }
            written -= front.bytes.len();
            if let Some(QueuedSegment {
                completion: Some(completion),
                ..
            }) = self.queue.pop_front()
            {
                completion.complete(Ok(()));
            }
        }
    }

    fn fail(&mut self, err: MuxError) {
        warn!(connection = %self.connection, error = %err, "transport write failed");
        for queued in self.queue.drain(..) {
            if let Some(completion) = queued.completion {
                completion.complete(Err(err.clone()));
            }
        }
        self.failure = Some(err);
    }

    fn handle_write_completed(
        &mut self,
        writer: TransportWriter,
        result: transport::Result<usize>,
    ) -> Continuation {
        match result {
            Ok(written) => {
                trace!(connection = %self.connection, written, "write completed");
                self.writer = Some(writer);
                self.confirm(written);
                self.issue_write();
            }
            Err(err) => self.fail(MuxError::from(err)),
        }
        self.maybe_finish_close()
    }

    fn maybe_finish_close(&mut self) -> Continuation {
        if self.closing.is_none() {
            return Continuation::BlockOnReceive;
        }

        if let Some(err) = &self.failure {
            if let Some(Some(completion)) = self.closing.take() {
                completion.complete(Err(err.clone()));
            }
            return Continuation::Done;
        }

        if self.shutting_down || !self.queue.is_empty() {
            return Continuation::BlockOnReceive;
        }
        let Some(mut writer) = self.writer.take() else {
            return Continuation::BlockOnReceive;
        };

        self.shutting_down = true;
        let me = self.me.clone();
        tokio::spawn(async move {
            let result = writer.shutdown().await;
            let _ = me.send(SenderMessage::ShutdownCompleted { result });
        });
        Continuation::BlockOnReceive
    }
}

impl Actor for SenderActor {
    type Message = SenderMessage;

    const NAME: &'static str = "sender";

    fn handle(&mut self, message: SenderMessage) -> Continuation {
        match message {
            SenderMessage::Send {
                channel,
                segments,
                completion,
            } => {
                self.enqueue(channel, segments, completion);
                Continuation::BlockOnReceive
            }
            SenderMessage::HalfClose {
                channel,
                completion,
            } => {
                self.half_close(channel, completion);
                Continuation::BlockOnReceive
            }
            SenderMessage::WriteCompleted { writer, result } => {
                self.handle_write_completed(writer, result)
            }
            SenderMessage::Close { completion } => {
                debug!(
                    connection = %self.connection,
                    queued = self.queue.len(),
                    "closing sender"
                );
                // Only the first close waits for the flush.
                if self.closing.is_none() {
                    self.closing = Some(completion);
                } else if let Some(completion) = completion {
                    completion.complete(Ok(()));
                }
                self.maybe_finish_close()
            }
            SenderMessage::ShutdownCompleted { result } => {
                debug!(connection = %self.connection, "write half shut down");
                let result = result.map_err(MuxError::from);
                if let Some(Some(completion)) = self.closing.take() {
                    completion.complete(result);
                }
                Continuation::Done
            }
        }
    }
}

/// Queue `segments` for `channel` and wait until they are on the wire.
pub(crate) async fn submit(
    sender: &Addr<SenderMessage>,
    owner: ConnectionId,
    kind: OperationKind,
    channel: u16,
    segments: Vec<Bytes>,
) -> Result<()> {
    let (done, pending) = completion(OperationToken::new(owner, kind));
    sender
        .send(SenderMessage::Send {
            channel,
            segments,
            completion: Some(done),
        })
        .map_err(|_| MuxError::ConnectionClosed)?;
    pending.wait(owner, kind).await
}

/// Half-close `channel` and wait until the marker is on the wire.
pub(crate) async fn half_close(
    sender: &Addr<SenderMessage>,
    owner: ConnectionId,
    channel: u16,
) -> Result<()> {
    let kind = OperationKind::CloseSend;
    let (done, pending) = completion(OperationToken::new(owner, kind));
    sender
        .send(SenderMessage::HalfClose {
            channel,
            completion: Some(done),
        })
        .map_err(|_| MuxError::ConnectionClosed)?;
    pending.wait(owner, kind).await
}

/// Ask the sender to flush and shut down, waiting for it to finish.
pub(crate) async fn close(sender: &Addr<SenderMessage>, owner: ConnectionId) -> Result<()> {
    let (done, pending) = completion(OperationToken::new(owner, OperationKind::Close));
    if sender
        .send(SenderMessage::Close {
            completion: Some(done),
        })
        .is_err()
    {
        // Already stopped.
        return Ok(());
    }
    pending.wait(owner, OperationKind::Close).await
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};
    use std::time::Duration;

    use chanmux_actor::ActorManager;
    use chanmux_frame::{encode_frames, FrameDecoder, FrameHeader};
    use tokio::io::{AsyncReadExt, AsyncWrite};

    use super::*;

    fn spawn_sender(writer: TransportWriter) -> (ActorManager, Addr<SenderMessage>, ConnectionId) {
        let manager = ActorManager::new();
        let owner = ConnectionId::next();
        let addr = manager.spawn_with(|me| SenderActor::new(me, owner, writer));
        (manager, addr, owner)
    }

    fn frames(channel_id: u16, payload: &'static [u8], max_frame: usize) -> Vec<Bytes> {
        let mut out = Vec::new();
        encode_frames(channel_id, Bytes::from_static(payload), max_frame, &mut out);
        out
    }

    /// Decode everything the sender put on the wire into (channel, payload) frames.
    fn decode_wire(wire: &[u8]) -> Vec<(u16, Vec<u8>)> {
        let mut frames: Vec<(u16, Vec<u8>)> = Vec::new();
        let mut decoder = FrameDecoder::new();
        // One chunk, so every frame arrives as a single segment.
        decoder
            .decode(&Bytes::copy_from_slice(wire), |segment| {
                frames.push((segment.channel_id, segment.payload.to_vec()));
            })
            .unwrap();
        assert!(decoder.is_idle());
        frames
    }

    #[tokio::test]
    async fn writes_frames_in_submission_order() {
        let (mut peer, local) = tokio::io::duplex(4096);
        let (_reader, writer) = chanmux_transport::Transport::new(local).into_split();
        let (manager, sender, owner) = spawn_sender(writer);

        submit(&sender, owner, OperationKind::Write, 1, frames(1, b"hello", 14_000))
            .await
            .unwrap();
        submit(
            &sender,
            owner,
            OperationKind::KeepAlive,
            0,
            vec![Bytes::copy_from_slice(&FrameHeader::keep_alive().encode())],
        )
        .await
        .unwrap();
        submit(&sender, owner, OperationKind::Write, 3, frames(3, b"world", 14_000))
            .await
            .unwrap();
        close(&sender, owner).await.unwrap();
        manager.wait_for_actors().await;

        let mut wire = Vec::new();
        peer.read_to_end(&mut wire).await.unwrap();
        assert_eq!(
            decode_wire(&wire),
            vec![
                (1, b"hello".to_vec()),
                (0, Vec::new()),
                (3, b"world".to_vec())
            ]
        );
    }

    /// Accepts at most `limit` bytes per write call and records the output.
    struct Trickle {
        limit: usize,
        wire: Arc<Mutex<Vec<u8>>>,
    }

    impl AsyncWrite for Trickle {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            let n = buf.len().min(self.limit);
            self.wire.lock().unwrap().extend_from_slice(&buf[..n]);
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn partial_writes_are_resumed_mid_segment() {
        let wire = Arc::new(Mutex::new(Vec::new()));
        let writer = TransportWriter::new(Trickle {
            limit: 3,
            wire: Arc::clone(&wire),
        });
        let (manager, sender, owner) = spawn_sender(writer);

        let writes = [
            submit(&sender, owner, OperationKind::Write, 1, frames(1, b"abcdefghij", 4)),
            submit(&sender, owner, OperationKind::Write, 2, frames(2, b"klmnop", 4)),
        ];
        let (written, closed) = tokio::join!(
            futures_util::future::join_all(writes),
            half_close(&sender, owner, 1),
        );
        for result in written {
            result.unwrap();
        }
        closed.unwrap();
        close(&sender, owner).await.unwrap();
        manager.wait_for_actors().await;

        let wire = wire.lock().unwrap().clone();
        assert_eq!(
            decode_wire(&wire),
            vec![
                (1, b"abcd".to_vec()),
                (1, b"efgh".to_vec()),
                (1, b"ij".to_vec()),
                (2, b"klmn".to_vec()),
                (2, b"op".to_vec()),
                (1, Vec::new()),
            ]
        );
    }

    struct Broken;

    impl AsyncWrite for Broken {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn transport_failure_fails_current_and_later_writes() {
        let (manager, sender, owner) = spawn_sender(TransportWriter::new(Broken));

        let first = submit(&sender, owner, OperationKind::Write, 1, frames(1, b"x", 14_000)).await;
        assert!(matches!(first, Err(MuxError::Transport(_))));

        let later = submit(&sender, owner, OperationKind::Write, 1, frames(1, b"y", 14_000)).await;
        assert!(matches!(later, Err(MuxError::Transport(_))));

        assert!(matches!(
            close(&sender, owner).await,
            Err(MuxError::Transport(_))
        ));
        tokio::time::timeout(Duration::from_secs(5), manager.wait_for_actors())
            .await
            .expect("sender should stop after close");
    }

    #[tokio::test]
    async fn writes_after_close_are_rejected() {
        let (_peer, local) = tokio::io::duplex(64);
        let (_reader, writer) = chanmux_transport::Transport::new(local).into_split();
        let (manager, sender, owner) = spawn_sender(writer);

        close(&sender, owner).await.unwrap();
        manager.wait_for_actors().await;

        let err = submit(&sender, owner, OperationKind::Write, 1, frames(1, b"late", 14_000))
            .await
            .unwrap_err();
        assert!(matches!(err, MuxError::ConnectionClosed));
        // Closing a stopped sender is a no-op.
        close(&sender, owner).await.unwrap();
    }

    #[tokio::test]
    async fn empty_submission_completes_immediately() {
        let (_peer, local) = tokio::io::duplex(64);
        let (_reader, writer) = chanmux_transport::Transport::new(local).into_split();
        let (_manager, sender, owner) = spawn_sender(writer);

        submit(&sender, owner, OperationKind::Write, 1, Vec::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sends_queued_after_half_close_are_rejected() {
        let (mut peer, local) = tokio::io::duplex(4096);
        let (_reader, writer) = chanmux_transport::Transport::new(local).into_split();
        let (manager, sender, owner) = spawn_sender(writer);

        // Queue all four before any completes, as racing handles would.
        let (first, closed, late, repeat) = tokio::join!(
            submit(&sender, owner, OperationKind::Write, 1, frames(1, b"ab", 14_000)),
            half_close(&sender, owner, 1),
            submit(&sender, owner, OperationKind::Write, 1, frames(1, b"late", 14_000)),
            half_close(&sender, owner, 1),
        );
        first.unwrap();
        closed.unwrap();
        assert!(matches!(late, Err(MuxError::SendClosed(1))));
        repeat.unwrap();

        submit(&sender, owner, OperationKind::Write, 3, frames(3, b"other", 14_000))
            .await
            .unwrap();
        close(&sender, owner).await.unwrap();
        manager.wait_for_actors().await;

        let mut wire = Vec::new();
        peer.read_to_end(&mut wire).await.unwrap();
        assert_eq!(
            decode_wire(&wire),
            vec![
                (1, b"ab".to_vec()),
                (1, Vec::new()),
                (3, b"other".to_vec())
            ]
        );
    }
}
