//! Concurrent async requests sharing one pool.
//!
//! Demonstrates:
//! - Building an async client with a small pool
//! - Keep-alive reuse across requests
//! - Per-endpoint permits bounding concurrency
//!
//! Usage:
//!   cargo run --example 002_async_pool
//!   cargo run --example 002_async_pool -- http://example.com/ --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Instant;

use common::Args;
use reqwire::{AsyncClient, AsyncRequest};

// ============================================================================
// Constants
// ============================================================================

const REQUESTS: usize = 8;
const POOL_SIZE: usize = 2;

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
    println!("=== 002: Async Pool ===\n");

    let client = AsyncClient::builder().pool_max_size(POOL_SIZE).build_async()?;
    let url = args.target_or("http://example.com/");
    let started = Instant::now();

    let mut tasks = Vec::with_capacity(REQUESTS);
    for i in 0..REQUESTS {
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            let request = AsyncRequest::get(&url)?.header("Connection", "keep-alive");
            let response = client.send(request).await?;
            Ok::<_, reqwire::Error>((i, response.status_code))
        }));
    }

    for task in tasks {
        let (i, status) = task.await??;
        println!("    request {i}: {status}");
    }

    let parsed = url::Url::parse(&url)?;
    let host = parsed.host_str().unwrap_or_default();
    let port = parsed.port_or_known_default().unwrap_or(80);
    let tls = parsed.scheme() == "https";

    println!("\n[Done] {REQUESTS} requests in {:?}", started.elapsed());
    println!("       idle connections: {}", client.pool().idle_count(host, port, tls));

    client.close();
    Ok(())
}
