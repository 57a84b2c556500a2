use std::fmt::Display;
use std::net::SocketAddr;

use chanmux_transport::TcpTransportListener;
use tokio::net::ToSocketAddrs;
use tracing::debug;

use crate::config::{ConnectionConfig, Role};
use crate::connection::Connection;
use crate::error::Result;

/// Accepts TCP connections and multiplexes each as a server-role
/// [`Connection`].
pub struct MuxListener {
    listener: TcpTransportListener,
    config: ConnectionConfig,
}

impl MuxListener {
    /// Bind to a TCP address.
    pub async fn bind(addr: impl ToSocketAddrs + Display) -> Result<Self> {
        let listener = TcpTransportListener::bind(addr).await?;
        Ok(Self {
            listener,
            config: ConnectionConfig::server(),
        })
    }

    /// Override the settings of accepted connections. The role is always
    /// [`Role::Server`].
    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config.with_role(Role::Server);
        self
    }

    /// Accept the next connection.
    pub async fn accept(&self) -> Result<Connection> {
        let transport = self.listener.accept().await?;
        let peer = transport.peer_addr();
        let connection = Connection::new(transport, self.config.clone())?;
        debug!(connection = %connection.id(), ?peer, "accepted connection");
        Ok(connection)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::connector::{connect, connect_with_config};
    use crate::error::MuxError;

    #[tokio::test]
    async fn tcp_round_trip_between_listener_and_connector() {
        let listener = MuxListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr();

        let server = tokio::spawn(async move {
            let connection = listener.accept().await.unwrap();
            assert_eq!(connection.role(), Role::Server);
            let channel = connection.accept().await.unwrap();
            let request = channel.read_to_end().await.unwrap();
            channel.write(request).await.unwrap();
            channel.close_send().await.unwrap();
            connection.close().await.unwrap();
        });

        let client = connect(addr.to_string()).await.unwrap();
        assert_eq!(client.role(), Role::Client);
        let channel = client.open().unwrap();
        assert_eq!(channel.id(), 1);
        channel.write(&b"over tcp"[..]).await.unwrap();
        channel.close_send().await.unwrap();
        assert_eq!(channel.read_to_end().await.unwrap(), b"over tcp");

        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server should finish")
            .unwrap();
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn listener_forces_server_role() {
        let listener = MuxListener::bind("127.0.0.1:0")
            .await
            .unwrap()
            .with_config(ConnectionConfig::client().with_receive_buffer_size(512));
        assert_eq!(listener.config().role, Role::Server);
        assert_eq!(listener.config().receive_buffer_size, 512);
    }

    #[tokio::test]
    async fn connect_rejects_invalid_config_before_dialing() {
        let config = ConnectionConfig::client().with_receive_buffer_size(0);
        let err = connect_with_config("127.0.0.1:1", config).await.unwrap_err();
        assert!(matches!(err, MuxError::InvalidConfig(_)));
    }
}
