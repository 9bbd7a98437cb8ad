// 🌐 Branch Locator - Web Server
//
// Thin entry point: config → pipeline → router. Routes live in the library
// (branch_locator::api) so they can be exercised without a socket.

use anyhow::{Context, Result};
use branch_locator::config::DEFAULT_CONFIG_PATH;
use branch_locator::{api, init_logging, AppConfig, Pipeline};
use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    println!("🌐 Branch Locator - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = std::env::var("BRANCH_LOCATOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = AppConfig::load(&config_path)?;
    println!("✓ Config loaded: {:?}", config_path);

    let pipeline = Pipeline::from_config(&config)?;
    println!("✓ Cache TTL: {}s", pipeline.ttl().as_secs());

    let app = api::router(pipeline);

    let addr = config.server.bind.as_str();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/view", addr);
    println!("   UI:  http://{}", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}
