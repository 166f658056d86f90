//! `jarvis mcp`: Serve the calendar capabilities to MCP clients over stdio.
//!
//! stdout carries the protocol; logs go to stderr.

use std::sync::Arc;

use jarvis_config::AppConfig;
use jarvis_gateway::mcp::McpServer;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let tools = Arc::new(jarvis_tools::calendar_registry(&config)?);

    McpServer::new("jarvis-calendar", tools).serve_stdio().await?;

    Ok(())
}
