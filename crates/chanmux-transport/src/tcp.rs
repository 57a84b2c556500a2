use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::Transport;

/// TCP listener producing [`Transport`]s.
pub struct TcpTransportListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpTransportListener {
    /// Bind and listen on a TCP address. Port 0 picks a free port.
    pub async fn bind(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Self> {
        let target = addr.to_string();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: target.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            addr: target,
            source,
        })?;

        info!(%local_addr, "listening on tcp");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept the next incoming connection.
    pub async fn accept(&self) -> Result<Transport> {
        let (stream, peer) = self.listener.accept().await.map_err(TransportError::Accept)?;
        debug!(%peer, "accepted tcp connection");
        Transport::from_tcp(stream)
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Connect to a listening TCP endpoint.
pub async fn connect(addr: impl ToSocketAddrs + std::fmt::Display) -> Result<Transport> {
    let target = addr.to_string();
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: target.clone(),
            source,
        })?;
    debug!(addr = %target, "connected over tcp");
    Transport::from_tcp(stream)
}
