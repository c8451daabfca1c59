//! WebSocket echo session.
//!
//! Demonstrates:
//! - Connecting with a subprotocol offer
//! - Sending text and binary messages
//! - Ping and graceful close
//!
//! Usage:
//!   cargo run --example 003_websocket_echo -- ws://localhost:8765/
//!   cargo run --example 003_websocket_echo -- wss://echo.example.com/ --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use reqwire::{AsyncWebSocket, Message, WebSocketConfig};

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(&args).await {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    println!("=== 003: WebSocket Echo ===\n");

    let config = WebSocketConfig::new()
        .timeout(Duration::from_secs(10))
        .auto_reconnect(true)
        .reconnect_delay(Duration::from_millis(500));

    let url = args.target_or("ws://localhost:8765/");
    let mut ws = AsyncWebSocket::new(&url, config)?;

    println!("[1] Connecting to {url}");
    ws.connect().await?;
    println!("    ✓ Connected (protocol: {:?})\n", ws.protocol());

    println!("[2] Sending messages");
    ws.send("hello").await?;
    ws.send(vec![0xDEu8, 0xAD, 0xBE, 0xEF]).await?;
    ws.ping(b"heartbeat").await?;

    for _ in 0..2 {
        match ws.receive().await? {
            Message::Text(text) => println!("    ← text: {text}"),
            Message::Binary(data) => println!("    ← binary: {} bytes", data.len()),
        }
    }

    println!("\n[3] Closing");
    ws.close().await;
    println!("    ✓ Closed");
    Ok(())
}
