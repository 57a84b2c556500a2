use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Result of one request/reply exchange on a channel.
#[derive(Debug, Clone)]
pub struct ChannelReply {
    pub channel: u16,
    pub sent: Vec<u8>,
    pub received: Vec<u8>,
}

impl ChannelReply {
    pub fn matches(&self) -> bool {
        self.sent == self.received
    }
}

#[derive(Serialize)]
struct ReplyOutput<'a> {
    event: &'static str,
    connection: &'a str,
    channel: u16,
    sent: usize,
    received: usize,
    echo_matches: bool,
    payload: String,
    timestamp: String,
}

#[derive(Serialize)]
struct ListeningOutput {
    event: &'static str,
    addr: String,
    timestamp: String,
}

pub fn print_listening(addr: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = ListeningOutput {
                event: "listening",
                addr: addr.to_string(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        _ => println!("listening on {addr}"),
    }
}

pub fn print_replies(replies: &[ChannelReply], connection: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for reply in replies {
                let out = ReplyOutput {
                    event: "reply",
                    connection,
                    channel: reply.channel,
                    sent: reply.sent.len(),
                    received: reply.received.len(),
                    echo_matches: reply.matches(),
                    payload: payload_preview(&reply.received),
                    timestamp: now_unix_seconds(),
                };
                println!(
                    "{}",
                    serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "SENT", "RECEIVED", "MATCH", "PAYLOAD"]);
            for reply in replies {
                table.add_row(vec![
                    reply.channel.to_string(),
                    reply.sent.len().to_string(),
                    reply.received.len().to_string(),
                    if reply.matches() { "yes" } else { "no" }.to_string(),
                    payload_preview(&reply.received),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for reply in replies {
                println!(
                    "channel={} sent={} received={} match={} connection={} payload={}",
                    reply.channel,
                    reply.sent.len(),
                    reply.received.len(),
                    reply.matches(),
                    connection,
                    payload_preview(&reply.received)
                );
            }
        }
        OutputFormat::Raw => {
            for reply in replies {
                print_raw(&reply.received);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    const PREVIEW_LIMIT: usize = 64;
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().count() <= PREVIEW_LIMIT => text.to_string(),
        Ok(text) => {
            let head: String = text.chars().take(PREVIEW_LIMIT).collect();
            format!("{head}... ({} bytes)", payload.len())
        }
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
