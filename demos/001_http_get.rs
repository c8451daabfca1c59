//! Blocking GET with redirects.
//!
//! Demonstrates:
//! - Building a configured blocking client
//! - Following redirects and inspecting the history
//! - Decoding the body as text
//!
//! Usage:
//!   cargo run --example 001_http_get
//!   cargo run --example 001_http_get -- http://example.com/ --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use reqwire::{Client, Request};

// ============================================================================
// Main
// ============================================================================

fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(&args) {
        eprintln!("\n[ERROR] {e:#}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> anyhow::Result<()> {
    println!("=== 001: HTTP GET ===\n");

    let client = Client::builder()
        .timeout(Duration::from_secs(10))
        .max_redirects(5)
        .build()?;

    let url = args.target_or("http://example.com/");
    println!("[1] GET {url}");

    let request = Request::get(&url)?.header("Accept", "text/html");
    let response = client.send(request)?;

    for (i, hop) in response.history.iter().enumerate() {
        println!("    redirect {}: {} {}", i + 1, hop.status_code, hop.url);
    }
    println!("    {} ({} bytes)", response.status_line, response.body.len());

    let text = response.text();
    let preview: String = text.chars().take(200).collect();
    println!("\n[2] Body preview:\n{preview}");

    client.close();
    Ok(())
}
