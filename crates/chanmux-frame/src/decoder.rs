use bytes::Bytes;
use tracing::trace;

use crate::codec::{FrameHeader, HEADER_SIZE};
use crate::error::Result;

/// A run of payload bytes belonging to one channel.
///
/// A frame whose payload straddles transport reads is reported as several
/// segments. A zero-length frame is reported as one empty segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSegment {
    pub channel_id: u16,
    pub payload: Bytes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Positioned on a frame boundary.
    Idle,
    /// Some header bytes arrived; the rest are in a later read.
    PartialHeader {
        bytes: [u8; HEADER_SIZE],
        filled: usize,
    },
    /// The header arrived but `remaining` payload bytes are still due.
    PartialPayload { channel_id: u16, remaining: usize },
}

/// Streaming frame decoder.
///
/// Carries partial-header or partial-payload state from one transport read to
/// the next, so frame boundaries never have to align with read boundaries.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecodeState,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Idle,
        }
    }

    /// True when the decoder sits on a frame boundary.
    pub fn is_idle(&self) -> bool {
        self.state == DecodeState::Idle
    }

    /// Decode one freshly read chunk, passing every segment to `sink` in
    /// arrival order. Payload segments are slices of `chunk`.
    ///
    /// On error the decoder is left in an unspecified state; the stream can
    /// not be resynchronised.
    pub fn decode<F>(&mut self, chunk: &Bytes, mut sink: F) -> Result<()>
    where
        F: FnMut(DecodedSegment),
    {
        let mut pos = 0;
        while pos < chunk.len() {
            match self.state {
                DecodeState::PartialHeader { mut bytes, filled } => {
                    let take = (HEADER_SIZE - filled).min(chunk.len() - pos);
                    bytes[filled..filled + take].copy_from_slice(&chunk[pos..pos + take]);
                    pos += take;

                    let filled = filled + take;
                    if filled < HEADER_SIZE {
                        self.state = DecodeState::PartialHeader { bytes, filled };
                        continue;
                    }
                    let header = FrameHeader::decode(&bytes)?;
                    pos += self.take_payload(
                        chunk,
                        pos,
                        header.channel_id,
                        header.length.into(),
                        &mut sink,
                    );
                }
                DecodeState::PartialPayload {
                    channel_id,
                    remaining,
                } => {
                    pos += self.take_payload(chunk, pos, channel_id, remaining, &mut sink);
                }
                DecodeState::Idle => {
                    if chunk.len() - pos < HEADER_SIZE {
                        let mut bytes = [0u8; HEADER_SIZE];
                        let filled = chunk.len() - pos;
                        bytes[..filled].copy_from_slice(&chunk[pos..]);
                        self.state = DecodeState::PartialHeader { bytes, filled };
                        trace!(filled, "stashed partial frame header");
                        pos = chunk.len();
                        continue;
                    }

                    let mut bytes = [0u8; HEADER_SIZE];
                    bytes.copy_from_slice(&chunk[pos..pos + HEADER_SIZE]);
                    let header = FrameHeader::decode(&bytes)?;
                    pos += HEADER_SIZE;
                    pos += self.take_payload(
                        chunk,
                        pos,
                        header.channel_id,
                        header.length.into(),
                        &mut sink,
                    );
                }
            }
        }
        Ok(())
    }

    /// Consume up to `length` payload bytes starting at `pos`, updating the
    /// state. Returns the number of bytes consumed.
    fn take_payload<F>(
        &mut self,
        chunk: &Bytes,
        pos: usize,
        channel_id: u16,
        length: usize,
        sink: &mut F,
    ) -> usize
    where
        F: FnMut(DecodedSegment),
    {
        let available = chunk.len() - pos;
        if available >= length {
            sink(DecodedSegment {
                channel_id,
                payload: chunk.slice(pos..pos + length),
            });
            self.state = DecodeState::Idle;
            return length;
        }

        if available > 0 {
            sink(DecodedSegment {
                channel_id,
                payload: chunk.slice(pos..),
            });
        }
        self.state = DecodeState::PartialPayload {
            channel_id,
            remaining: length - available,
        };
        trace!(channel_id, remaining = length - available, "stashed partial frame payload");
        available
    }
}
