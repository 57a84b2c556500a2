//! Frame codec for the chanmux wire protocol.
//!
//! Every frame is an 8-byte header followed by its payload:
//! - 4 bytes of payload length, one hexadecimal nibble per byte
//! - 4 bytes of channel id, one hexadecimal nibble per byte
//!
//! Channel 0 carries keep-alive frames. A zero-length frame on any other
//! channel is a half-close. [`FrameDecoder`] reassembles frames whose
//! boundaries do not line up with transport reads.

pub mod channel;
pub mod codec;
pub mod decoder;
pub mod error;

pub use channel::{is_keep_alive_channel, KEEP_ALIVE_CHANNEL};
pub use codec::{encode_frames, FrameHeader, HEADER_SIZE, MAX_FRAME_PAYLOAD};
pub use decoder::{DecodedSegment, FrameDecoder};
pub use error::{FrameError, Result};
