use std::time::Duration;

use chanmux_frame::MAX_FRAME_PAYLOAD;

use crate::error::{MuxError, Result};

/// Default capacity of the per-connection receive buffer.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 20_000;

/// Distance between consecutive locally allocated channel ids.
pub const CHANNEL_ID_STEP: u16 = 2;

/// Which end of the transport this side is. Decides channel id parity so
/// both ends can open channels without coordination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Role {
    /// Opens odd channel ids: 1, 3, 5, ...
    #[default]
    Client,
    /// Opens even channel ids: 2, 4, 6, ...
    Server,
}

impl Role {
    /// First channel id this role allocates.
    pub fn first_channel_id(self) -> u16 {
        match self {
            Self::Client => 1,
            Self::Server => 2,
        }
    }

    /// True if `channel_id` belongs to the ids this role allocates.
    pub fn allocates(self, channel_id: u16) -> bool {
        channel_id != 0 && channel_id % 2 == self.first_channel_id() % 2
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub role: Role,
    /// Capacity of the receive buffer. Reads pause once it is used up until
    /// every forwarded byte has been consumed.
    pub receive_buffer_size: usize,
    /// Largest payload carried by a single frame.
    pub max_frame_payload: usize,
    /// Send a keep-alive frame at this interval.
    pub keep_alive_interval: Option<Duration>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            role: Role::Client,
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            max_frame_payload: MAX_FRAME_PAYLOAD,
            keep_alive_interval: None,
        }
    }
}

impl ConnectionConfig {
    pub fn client() -> Self {
        Self::default()
    }

    pub fn server() -> Self {
        Self::default().with_role(Role::Server)
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    pub fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = size;
        self
    }

    pub fn with_max_frame_payload(mut self, size: usize) -> Self {
        self.max_frame_payload = size;
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// Reject settings the pipelines cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.receive_buffer_size == 0 {
            return Err(MuxError::InvalidConfig(
                "receive buffer size must be non-zero".to_string(),
            ));
        }
        if self.max_frame_payload == 0 || self.max_frame_payload > usize::from(u16::MAX) {
            return Err(MuxError::InvalidConfig(format!(
                "max frame payload must be between 1 and {}, got {}",
                u16::MAX,
                self.max_frame_payload
            )));
        }
        if self.keep_alive_interval == Some(Duration::ZERO) {
            return Err(MuxError::InvalidConfig(
                "keep-alive interval must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_wire_limits() {
        let config = ConnectionConfig::default();
        assert_eq!(config.role, Role::Client);
        assert_eq!(config.receive_buffer_size, 20_000);
        assert_eq!(config.max_frame_payload, 14_000);
        assert_eq!(config.keep_alive_interval, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn roles_split_the_id_space_by_parity() {
        assert_eq!(Role::Client.first_channel_id(), 1);
        assert_eq!(Role::Server.first_channel_id(), 2);
        assert!(Role::Client.allocates(65535));
        assert!(!Role::Client.allocates(2));
        assert!(Role::Server.allocates(2));
        assert!(!Role::Server.allocates(0));
    }

    #[test]
    fn validate_rejects_unusable_sizes() {
        let zero_buffer = ConnectionConfig::default().with_receive_buffer_size(0);
        assert!(matches!(
            zero_buffer.validate(),
            Err(MuxError::InvalidConfig(_))
        ));

        let huge_frame = ConnectionConfig::default().with_max_frame_payload(70_000);
        assert!(huge_frame.validate().is_err());

        let zero_frame = ConnectionConfig::default().with_max_frame_payload(0);
        assert!(zero_frame.validate().is_err());

        let zero_interval =
            ConnectionConfig::server().with_keep_alive_interval(Some(Duration::ZERO));
        assert!(zero_interval.validate().is_err());

        let largest = ConnectionConfig::default().with_max_frame_payload(65_535);
        assert!(largest.validate().is_ok());
    }
}
