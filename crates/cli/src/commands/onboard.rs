//! `jarvis onboard`: First-time setup.

use jarvis_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("🤖 Jarvis: First-Time Setup");
    println!("============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
    }

    let token_path = AppConfig::load_from(&config_path)
        .map(|c| c.calendar.token_path())
        .unwrap_or_else(|_| config_dir.join("calendar_token.json"));

    println!("\n📝 Next steps:");
    println!("   1. Set OPENAI_API_KEY (or api_key in {})", config_path.display());
    println!(
        "   2. For the calendar, place your Google OAuth token at {}",
        token_path.display()
    );
    println!("      and set GOOGLE_CLIENT_ID / GOOGLE_CLIENT_SECRET so it can be refreshed");
    println!("   3. Run: jarvis serve   (web client on http://localhost:5000)");
    println!("      or:  jarvis chat\n");

    Ok(())
}
