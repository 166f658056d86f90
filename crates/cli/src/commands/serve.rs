//! `jarvis serve`: Start the HTTP gateway.

use jarvis_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("🤖 Jarvis Gateway");
    println!("   Listening: http://{}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.model);
    println!(
        "   Calendar:  {}",
        if config.calendar.enabled { "enabled" } else { "disabled" }
    );

    jarvis_gateway::start(config).await?;

    Ok(())
}
