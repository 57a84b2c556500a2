//! Multi-channel example: a client and a server in one process, each
//! opening channels on the same TCP connection.
//!
//! Run with:
//!   cargo run -p chanmux --example multi-channel

use chanmux::{connect, MuxListener};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = MuxListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr();

    let server = tokio::spawn(async move {
        let connection = listener.accept().await?;

        // Answer the client's request channel.
        let request = connection.accept().await?;
        let command = request.read_to_end().await?;
        eprintln!(
            "[server] channel={} request={}",
            request.id(),
            String::from_utf8_lossy(&command)
        );
        request.write(&b"{\"status\":\"ok\"}"[..]).await?;
        request.close_send().await?;

        // Push a notification on a channel of our own (even id).
        let push = connection.open()?;
        push.write(&b"server-initiated update"[..]).await?;
        push.close_send().await?;

        // Wait for the client to finish reading before tearing down.
        let done = connection.accept().await?;
        let _ = done.read_to_end().await?;
        connection.close().await
    });

    let client = connect(addr.to_string()).await?;

    let request = client.open()?;
    request.write(&b"{\"action\":\"ping\"}"[..]).await?;
    request.close_send().await?;
    let reply = request.read_to_end().await?;
    eprintln!(
        "[client] channel={} reply={}",
        request.id(),
        String::from_utf8_lossy(&reply)
    );

    let push = client.accept().await?;
    let update = push.read_to_end().await?;
    eprintln!(
        "[client] channel={} push={}",
        push.id(),
        String::from_utf8_lossy(&update)
    );

    let done = client.open()?;
    done.write(&b"bye"[..]).await?;
    done.close_send().await?;

    server.await??;
    client.close().await?;
    Ok(())
}
