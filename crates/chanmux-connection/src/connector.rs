use std::fmt::Display;

use tokio::net::ToSocketAddrs;

use crate::config::{ConnectionConfig, Role};
use crate::connection::Connection;
use crate::error::Result;

/// Connect to a listening peer over TCP with default settings.
pub async fn connect(addr: impl ToSocketAddrs + Display) -> Result<Connection> {
    connect_with_config(addr, ConnectionConfig::client()).await
}

/// Connect with explicit configuration. The connecting side always takes
/// the client role.
pub async fn connect_with_config(
    addr: impl ToSocketAddrs + Display,
    config: ConnectionConfig,
) -> Result<Connection> {
    config.validate()?;
    let transport = chanmux_transport::connect(addr).await?;
    Connection::new(transport, config.with_role(Role::Client))
}
