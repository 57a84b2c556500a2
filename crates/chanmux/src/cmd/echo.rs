use bytes::Bytes;
use chanmux_connection::{Channel, Connection, MuxError, MuxListener, Role};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::cmd::EchoArgs;
use crate::exit::{mux_error, CliResult, SUCCESS};
use crate::output::{print_listening, OutputFormat};

/// Upper bound on bytes pulled from a channel per read.
const ECHO_READ_SIZE: usize = 64 * 1024;

pub async fn run(args: EchoArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.tuning.to_config(Role::Server)?;
    let listener = MuxListener::bind(args.addr.as_str())
        .await
        .map_err(|err| mux_error("bind failed", err))?
        .with_config(config);

    let addr = listener.local_addr();
    info!(%addr, "echo server listening");
    print_listening(addr, format);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut connections = JoinSet::new();
    let mut accepted = 0usize;
    loop {
        if args.max_connections.is_some_and(|max| accepted >= max) {
            break;
        }
        tokio::select! {
            result = listener.accept() => {
                let connection = result.map_err(|err| mux_error("accept failed", err))?;
                accepted += 1;
                connections.spawn(serve_connection(connection));
            }
            _ = &mut shutdown => {
                info!("interrupted, stopping echo server");
                connections.shutdown().await;
                return Ok(SUCCESS);
            }
        }
    }

    while let Some(joined) = connections.join_next().await {
        if let Err(err) = joined {
            warn!(error = %err, "connection task failed");
        }
    }
    Ok(SUCCESS)
}

/// Echo every channel the peer opens until the transport ends.
async fn serve_connection(connection: Connection) -> u64 {
    let id = connection.id();
    debug!(connection = %id, "serving connection");

    let mut channels = JoinSet::new();
    loop {
        match connection.accept().await {
            Ok(channel) => {
                channels.spawn(echo_channel(channel));
            }
            Err(MuxError::ConnectionClosed) => break,
            Err(err) => {
                warn!(connection = %id, error = %err, "connection failed");
                break;
            }
        }
    }

    let mut echoed = 0;
    while let Some(joined) = channels.join_next().await {
        match joined {
            Ok(Ok(bytes)) => echoed += bytes,
            Ok(Err(err)) => debug!(connection = %id, error = %err, "channel ended early"),
            Err(err) => warn!(connection = %id, error = %err, "channel task failed"),
        }
    }

    if let Err(err) = connection.close().await {
        debug!(connection = %id, error = %err, "close after peer shutdown failed");
    }
    info!(connection = %id, bytes = echoed, "connection finished");
    echoed
}

/// Write back everything read from `channel`, then half-close it.
async fn echo_channel(channel: Channel) -> Result<u64, MuxError> {
    let mut total = 0u64;
    loop {
        let data: Bytes = channel.read_bytes(ECHO_READ_SIZE).await?;
        if data.is_empty() {
            break;
        }
        total += data.len() as u64;
        channel.write(data).await?;
    }
    channel.close_send().await?;
    debug!(channel = channel.id(), bytes = total, "channel echoed");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use chanmux_connection::ConnectionConfig;
    use chanmux_transport::Transport;

    use super::*;

    #[tokio::test]
    async fn serves_channels_until_the_peer_closes() {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let client = Connection::new(Transport::new(a), ConnectionConfig::client()).unwrap();
        let server = Connection::new(Transport::new(b), ConnectionConfig::server()).unwrap();
        let served = tokio::spawn(serve_connection(server));

        let first = client.open().unwrap();
        let second = client.open().unwrap();
        first.write(&b"one"[..]).await.unwrap();
        second.write(&b"two!"[..]).await.unwrap();
        first.close_send().await.unwrap();
        second.close_send().await.unwrap();

        assert_eq!(first.read_to_end().await.unwrap(), b"one");
        assert_eq!(second.read_to_end().await.unwrap(), b"two!");

        client.close().await.unwrap();
        assert_eq!(served.await.unwrap(), 7);
    }
}
