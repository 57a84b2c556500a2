//! Echo server example: every channel a client opens is echoed back.
//!
//! Run with:
//!   cargo run -p chanmux --example echo-server
//!
//! Then, from another terminal:
//!   cargo run -p chanmux --features cli -- send 127.0.0.1:7000 --data hello

use chanmux::{Channel, MuxError, MuxListener};

async fn echo(channel: Channel) -> chanmux::Result<()> {
    loop {
        let data = channel.read_bytes(16 * 1024).await?;
        if data.is_empty() {
            break;
        }
        channel.write(data).await?;
    }
    channel.close_send().await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7000".to_string());
    let listener = MuxListener::bind(addr.as_str()).await?;
    eprintln!("[server] listening on {}", listener.local_addr());

    loop {
        let connection = listener.accept().await?;
        eprintln!("[server] connection {}", connection.id());

        tokio::spawn(async move {
            let mut tasks = Vec::new();
            loop {
                match connection.accept().await {
                    Ok(channel) => {
                        eprintln!("[server] channel {} opened", channel.id());
                        tasks.push(tokio::spawn(echo(channel)));
                    }
                    Err(MuxError::ConnectionClosed) => break,
                    Err(err) => {
                        eprintln!("[server] connection failed: {err}");
                        break;
                    }
                }
            }
            for task in tasks {
                if let Ok(Err(err)) = task.await {
                    eprintln!("[server] channel failed: {err}");
                }
            }
            let _ = connection.close().await;
        });
    }
}
