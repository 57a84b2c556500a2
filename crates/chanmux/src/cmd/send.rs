use std::fs;

use bytes::Bytes;
use chanmux_connection::{connect_with_config, Channel, MuxError, Role};
use tokio::task::JoinSet;
use tracing::debug;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{io_error, mux_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_replies, ChannelReply, OutputFormat};

pub async fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    if args.channels == 0 {
        return Err(CliError::new(USAGE, "--channels must be at least 1"));
    }
    let payload = resolve_payload(&args)?;
    let timeout = parse_duration(&args.timeout)?;
    let config = args.tuning.to_config(Role::Client)?;

    let connection = tokio::time::timeout(timeout, connect_with_config(args.addr.as_str(), config))
        .await
        .map_err(|_| CliError::new(TIMEOUT, format!("connect to {} timed out", args.addr)))?
        .map_err(|err| mux_error("connect failed", err))?;
    debug!(connection = %connection.id(), addr = %args.addr, "connected");

    let mut exchanges = JoinSet::new();
    for _ in 0..args.channels {
        let channel = connection
            .open()
            .map_err(|err| mux_error("open failed", err))?;
        exchanges.spawn(exchange(channel, payload.clone()));
    }

    let mut replies = tokio::time::timeout(timeout, collect(&mut exchanges))
        .await
        .map_err(|_| CliError::new(TIMEOUT, "exchange timed out"))??;
    replies.sort_by_key(|reply| reply.channel);

    connection
        .close()
        .await
        .map_err(|err| mux_error("close failed", err))?;

    print_replies(&replies, &connection.id().to_string(), format);
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Bytes> {
    if let Some(data) = &args.data {
        return Ok(Bytes::copy_from_slice(data.as_bytes()));
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map(Bytes::from)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), &err));
    }
    Ok(Bytes::new())
}

/// Send `payload`, half-close, and read the reply to its end.
async fn exchange(channel: Channel, payload: Bytes) -> Result<ChannelReply, MuxError> {
    let sent = payload.to_vec();
    channel.write(payload).await?;
    channel.close_send().await?;
    let received = channel.read_to_end().await?;
    Ok(ChannelReply {
        channel: channel.id(),
        sent,
        received,
    })
}

async fn collect(
    exchanges: &mut JoinSet<Result<ChannelReply, MuxError>>,
) -> CliResult<Vec<ChannelReply>> {
    let mut replies = Vec::with_capacity(exchanges.len());
    while let Some(joined) = exchanges.join_next().await {
        let reply = joined
            .map_err(|err| CliError::new(INTERNAL, format!("exchange task failed: {err}")))?
            .map_err(|err| mux_error("exchange failed", err))?;
        replies.push(reply);
    }
    Ok(replies)
}

#[cfg(test)]
mod tests {
    use chanmux_connection::{Connection, ConnectionConfig};
    use chanmux_transport::Transport;

    use super::*;

    #[tokio::test]
    async fn exchange_reads_the_echoed_reply() {
        let (a, b) = tokio::io::duplex(4096);
        let client = Connection::new(Transport::new(a), ConnectionConfig::client()).unwrap();
        let server = Connection::new(Transport::new(b), ConnectionConfig::server()).unwrap();

        let echo = async {
            let channel = server.accept().await.unwrap();
            let data = channel.read_to_end().await.unwrap();
            channel.write(data).await.unwrap();
            channel.close_send().await.unwrap();
        };
        let channel = client.open().unwrap();
        let (reply, ()) = tokio::join!(exchange(channel, Bytes::from_static(b"ping")), echo);

        let reply = reply.unwrap();
        assert_eq!(reply.channel, 1);
        assert!(reply.matches());
    }

    #[test]
    fn empty_payload_without_data_or_file() {
        let args = SendArgs {
            addr: "127.0.0.1:7000".to_string(),
            data: None,
            file: None,
            channels: 1,
            timeout: "5s".to_string(),
            tuning: crate::cmd::TuningArgs {
                receive_buffer_size: 20_000,
                max_frame_payload: 14_000,
                keep_alive: None,
            },
        };
        assert!(resolve_payload(&args).unwrap().is_empty());
    }
}
