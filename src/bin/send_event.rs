//! Post a Plex style webhook to a running listener.
//!
//! Usage: `send_event [uuid] [title] [event]`, target taken from `PLEX_WEBHOOK_ADDR`.

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::info;

const BOUNDARY: &str = "------------------------plexwebhooktest";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let addr = std::env::var("PLEX_WEBHOOK_ADDR").unwrap_or_else(|_| "127.0.0.1:9090".to_string());
    let mut args = std::env::args().skip(1);
    let uuid = args
        .next()
        .unwrap_or_else(|| "d2b5a4c1-0e6f-4a7b-9c3d-1f2e3a4b5c6d".to_string());
    let title = args.next().unwrap_or_else(|| "Test Player".to_string());
    let event = args.next().unwrap_or_else(|| "media.pause".to_string());

    let payload = serde_json::json!({
        "event": event,
        "user": true,
        "owner": true,
        "Account": { "id": 1, "title": "tester" },
        "Server": { "title": "Test Server", "uuid": "server-uuid" },
        "Player": { "local": true, "publicAddress": "127.0.0.1", "title": title, "uuid": uuid },
        "Metadata": { "type": "episode", "title": "Pilot" }
    });

    let body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"payload\"\r\nContent-Type: application/json\r\n\r\n{payload}\r\n--{BOUNDARY}--\r\n"
    );
    let request = format!(
        "POST / HTTP/1.1\r\nHost: {addr}\r\nUser-Agent: PlexMediaServer\r\nContent-Type: multipart/form-data; boundary={BOUNDARY}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );

    info!(addr = %addr, uuid = %uuid, title = %title, event = %event, "Sending webhook");

    let mut stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    stream.write_all(request.as_bytes()).await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    let status_line = response.lines().next().unwrap_or_default();

    info!(status = %status_line, "Webhook delivered");

    Ok(())
}
