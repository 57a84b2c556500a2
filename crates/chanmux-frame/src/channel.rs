//! Reserved channel ids.
//!
//! Channel 0 is reserved for keep-alive traffic. Every other id names a
//! multiplexed stream; clients open odd ids and servers open even ids.

/// Keep-alive frames travel on this channel and are never surfaced.
pub const KEEP_ALIVE_CHANNEL: u16 = 0;

/// Returns true if frames on this channel are keep-alive traffic.
pub fn is_keep_alive_channel(id: u16) -> bool {
    id == KEEP_ALIVE_CHANNEL
}
