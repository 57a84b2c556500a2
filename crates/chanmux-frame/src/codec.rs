use bytes::Bytes;

use crate::channel::KEEP_ALIVE_CHANNEL;
use crate::error::{FrameError, Result};

/// Frame header: length (4 nibbles) + channel id (4 nibbles) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest payload carried by a single frame. Longer writes are split.
pub const MAX_FRAME_PAYLOAD: usize = 14000;

/// The fixed-size header preceding every frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Payload length in bytes.
    pub length: u16,
    /// The channel this frame belongs to.
    pub channel_id: u16,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(length: u16, channel_id: u16) -> Self {
        Self { length, channel_id }
    }

    /// The keep-alive frame: channel 0, no payload.
    pub fn keep_alive() -> Self {
        Self::new(0, KEEP_ALIVE_CHANNEL)
    }

    /// The half-close frame for a channel: no payload.
    pub fn half_close(channel_id: u16) -> Self {
        Self::new(0, channel_id)
    }

    /// True for frames on the keep-alive channel.
    pub fn is_keep_alive(&self) -> bool {
        self.channel_id == KEEP_ALIVE_CHANNEL
    }

    /// True for zero-length frames on a stream channel.
    pub fn is_half_close(&self) -> bool {
        self.length == 0 && self.channel_id != KEEP_ALIVE_CHANNEL
    }

    /// Encode into the wire format.
    ///
    /// Wire format:
    /// ```text
    /// ┌────┬────┬────┬────┬────┬────┬────┬────┐
    /// │ L3 │ L2 │ L1 │ L0 │ C3 │ C2 │ C1 │ C0 │
    /// └────┴────┴────┴────┴────┴────┴────┴────┘
    /// ```
    /// Each byte holds one nibble (0-15), most significant first. Length 300
    /// (0x012C) on channel 7 encodes as `[0, 1, 2, 12, 0, 0, 0, 7]`.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut header = [0u8; HEADER_SIZE];
        put_nibbles(self.length, &mut header[0..4]);
        put_nibbles(self.channel_id, &mut header[4..8]);
        header
    }

    /// Decode a header from its wire format.
    pub fn decode(header: &[u8; HEADER_SIZE]) -> Result<Self> {
        if let Some(index) = header.iter().position(|b| *b > 0x0F) {
            return Err(FrameError::InvalidNibble {
                index,
                value: header[index],
            });
        }
        Ok(Self {
            length: get_nibbles(&header[0..4]),
            channel_id: get_nibbles(&header[4..8]),
        })
    }
}

fn put_nibbles(value: u16, dst: &mut [u8]) {
    dst[0] = ((value >> 12) & 0x0F) as u8;
    dst[1] = ((value >> 8) & 0x0F) as u8;
    dst[2] = ((value >> 4) & 0x0F) as u8;
    dst[3] = (value & 0x0F) as u8;
}

fn get_nibbles(src: &[u8]) -> u16 {
    src.iter().fold(0u16, |acc, nibble| (acc << 4) | u16::from(*nibble))
}

/// Split `payload` into frames on `channel_id` and append the resulting wire
/// segments (header, payload slice, header, payload slice, ...) to `out`.
///
/// Each frame carries at most `max_frame` payload bytes. Payload slices share
/// the caller's buffer. An empty payload produces a single zero-length frame,
/// which is a keep-alive on channel 0 and a half-close anywhere else.
///
/// `max_frame` is clamped to `1..=u16::MAX`.
pub fn encode_frames(channel_id: u16, payload: Bytes, max_frame: usize, out: &mut Vec<Bytes>) {
    if payload.is_empty() {
        out.push(header_segment(FrameHeader::new(0, channel_id)));
        return;
    }

    let max_frame = max_frame.clamp(1, usize::from(u16::MAX));
    out.reserve(2 * payload.len().div_ceil(max_frame));

    let mut offset = 0;
    while offset < payload.len() {
        let len = (payload.len() - offset).min(max_frame);
        // `len` never exceeds u16::MAX because of the clamp above.
        out.push(header_segment(FrameHeader::new(len as u16, channel_id)));
        out.push(payload.slice(offset..offset + len));
        offset += len;
    }
}

fn header_segment(header: FrameHeader) -> Bytes {
    Bytes::copy_from_slice(&header.encode())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_matches_nibble_layout() {
        let header = FrameHeader::new(300, 7);
        assert_eq!(header.encode(), [0, 1, 2, 12, 0, 0, 0, 7]);
    }

    #[test]
    fn test_encode_extremes() {
        assert_eq!(FrameHeader::new(0, 0).encode(), [0; HEADER_SIZE]);
        assert_eq!(
            FrameHeader::new(u16::MAX, u16::MAX).encode(),
            [15, 15, 15, 15, 15, 15, 15, 15]
        );
        assert_eq!(
            FrameHeader::new(14000, 0xA5B6).encode(),
            [0x3, 0x6, 0xB, 0x0, 0xA, 0x5, 0xB, 0x6]
        );
    }

    #[test]
    fn test_decode_inverts_encode() {
        for (length, channel) in [(0u16, 1u16), (1, 2), (300, 7), (14000, 4097), (65535, 65534)] {
            let header = FrameHeader::new(length, channel);
            assert_eq!(FrameHeader::decode(&header.encode()).unwrap(), header);
        }
    }

    #[test]
    fn test_decode_rejects_non_nibble_bytes() {
        let err = FrameHeader::decode(&[0, 0, 0, 0x10, 0, 0, 0, 1]).unwrap_err();
        assert_eq!(err, FrameError::InvalidNibble { index: 3, value: 0x10 });

        let err = FrameHeader::decode(b"00000001").unwrap_err();
        assert!(matches!(err, FrameError::InvalidNibble { index: 0, .. }));
    }

    #[test]
    fn test_header_kinds() {
        assert!(FrameHeader::keep_alive().is_keep_alive());
        assert!(!FrameHeader::keep_alive().is_half_close());
        assert!(FrameHeader::half_close(3).is_half_close());
        assert!(!FrameHeader::new(5, 3).is_half_close());
    }

    #[test]
    fn test_encode_frames_small_payload() {
        let mut out = Vec::new();
        encode_frames(5, Bytes::from_static(b"abc"), MAX_FRAME_PAYLOAD, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].as_ref(), &FrameHeader::new(3, 5).encode());
        assert_eq!(out[1].as_ref(), b"abc");
    }

    #[test]
    fn test_encode_frames_splits_at_max_frame() {
        let payload = Bytes::from(vec![7u8; 30000]);
        let mut out = Vec::new();
        encode_frames(9, payload, MAX_FRAME_PAYLOAD, &mut out);

        // 14000 + 14000 + 2000
        assert_eq!(out.len(), 6);
        assert_eq!(out[0].as_ref(), &FrameHeader::new(14000, 9).encode());
        assert_eq!(out[1].len(), 14000);
        assert_eq!(out[2].as_ref(), &FrameHeader::new(14000, 9).encode());
        assert_eq!(out[3].len(), 14000);
        assert_eq!(out[4].as_ref(), &FrameHeader::new(2000, 9).encode());
        assert_eq!(out[5].len(), 2000);
    }

    #[test]
    fn test_encode_frames_exact_multiple() {
        let mut out = Vec::new();
        encode_frames(1, Bytes::from(vec![0u8; 20]), 10, &mut out);
        assert_eq!(out.len(), 4);
        assert!(out.iter().skip(1).step_by(2).all(|p| p.len() == 10));
    }

    #[test]
    fn test_encode_frames_empty_payload_is_single_zero_frame() {
        let mut out = Vec::new();
        encode_frames(0, Bytes::new(), MAX_FRAME_PAYLOAD, &mut out);
        assert_eq!(out, vec![Bytes::copy_from_slice(&[0u8; HEADER_SIZE])]);

        out.clear();
        encode_frames(4, Bytes::new(), MAX_FRAME_PAYLOAD, &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref(), &FrameHeader::half_close(4).encode());
    }

    #[test]
    fn test_encode_frames_clamps_oversized_max_frame() {
        let mut out = Vec::new();
        encode_frames(2, Bytes::from(vec![1u8; 70000]), usize::MAX, &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(out[1].len(), usize::from(u16::MAX));
        assert_eq!(out[3].len(), 70000 - usize::from(u16::MAX));
    }
}
