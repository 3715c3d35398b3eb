//! Statistics Runtime - JSON-lines front end for the statistics pipeline
//!
//! Reads one JSON message per line from stdin, feeds it through the
//! MessageHandler and prints every emitted `[channel0, channel1]` array as
//! one JSON line on stdout. Logs go to stderr.
//!
//! Usage:
//!   cargo run --release --bin statistics_runtime < samples.jsonl
//!
//! Environment variables:
//!   STATISTICS_CONFIG - Path to a JSON node configuration (default: built-in defaults)
//!   STATISTICS_CHANNEL_BUFFER - Outbound channel size (default: 1000)
//!   RUST_LOG - Log filter (default: info)

use dotenv::dotenv;
use log::{error, info, warn};
use serde_json::Value;
use slotstat::pipeline::{MemoryHost, MessageHandler, RuntimeConfig};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize environment and logging
    dotenv().ok();
    let runtime = RuntimeConfig::from_env();
    env_logger::Builder::new()
        .parse_filters(&runtime.rust_log)
        .target(env_logger::Target::Stderr)
        .init();

    info!("🚀 Statistics Runtime");
    info!("   ├─ Config: {}", runtime.config_path.as_deref().unwrap_or("(defaults)"));
    info!("   └─ Channel buffer: {}", runtime.channel_buffer);

    let config = runtime.load_configuration()?;
    info!("✅ Configuration loaded: {}", config.describe());

    let (host, mut outbound) = MemoryHost::new(runtime.channel_buffer);
    let host = Arc::new(host);
    let handler = MessageHandler::start(config, host.clone());

    // Printer: one JSON line per sent message array
    let printer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(messages) = outbound.recv().await {
            match serde_json::to_string(&messages) {
                Ok(line) => {
                    if let Err(e) = stdout.write_all(format!("{}\n", line).as_bytes()).await {
                        error!("❌ Failed to write output: {}", e);
                        break;
                    }
                    let _ = stdout.flush().await;
                }
                Err(e) => error!("❌ Failed to serialize output: {}", e),
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0u64;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Value>(line) {
                            Ok(data) => {
                                // completion is reported through the host
                                let _ = handler.handle(data);
                                accepted += 1;
                            }
                            Err(e) => warn!("⚠️  Skipping unparsable line: {}", e),
                        }
                    }
                    Ok(None) => {
                        info!("📭 End of input after {} message(s)", accepted);
                        break;
                    }
                    Err(e) => {
                        error!("❌ Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("⚠️  Received CTRL+C, shutting down...");
                break;
            }
        }
    }

    // Drain the queue and stop the update timer
    handler.shutdown().await;

    // Last sender goes away with the host; the printer then finishes
    drop(host);
    if let Err(e) = printer.await {
        error!("❌ Printer task failed: {}", e);
    }

    info!("✅ Statistics runtime stopped");
    Ok(())
}
