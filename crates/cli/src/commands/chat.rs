//! `jarvis chat`: Interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;

use jarvis_agent::Orchestrator;
use jarvis_config::AppConfig;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY = 'sk-...'");
        eprintln!("    JARVIS_API_KEY = 'sk-...'   (takes precedence)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider = jarvis_providers::build_from_config(&config)?;
    let tools = Arc::new(jarvis_tools::default_registry(&config)?);
    let tool_names = tools.names().join(", ");
    let orchestrator = Orchestrator::from_config(provider, tools, &config);

    if let Some(msg) = message {
        eprint!("  Pensando...");
        let response = orchestrator.respond(&msg, now()).await?;
        eprint!("\r              \r");
        println!("{response}");
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Jarvis - Interactive Mode           ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", config.model);
    println!("  Tools:     {tool_names}");
    println!("  User:      {}", config.assistant.user_name);
    println!();
    println!("  Each message is answered on its own; there is no chat history.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("  Tú > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("salir") {
            break;
        }
        if !input.is_empty() {
            eprint!("  ...");
            match orchestrator.respond(input, now()).await {
                Ok(response) => {
                    eprint!("\r     \r");
                    println!();
                    for line in response.lines() {
                        println!("  Jarvis > {line}");
                    }
                    println!();
                }
                Err(e) => {
                    eprint!("\r     \r");
                    eprintln!("  [Error] {e}");
                    println!();
                }
            }
        }

        print!("  Tú > ");
        std::io::stdout().flush()?;
    }

    println!();
    println!("  Hasta luego 👋");
    println!();

    Ok(())
}

fn now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}
