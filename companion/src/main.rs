//! Tabletop companion, played from a terminal.
//!
//! Loads the Goblin Cave with a quick-start fighter and reads commands from
//! stdin:
//!
//! ```bash
//! cargo run -p companion -- --name "Brenna" --provider ollama
//! ```

mod headless;

use std::sync::Arc;

use companion_core::{
    bridge, goblin_cave, BridgeConfig, GameSession, LlmBridge, Provider, SessionConfig,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "companion=info,companion_core=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }
    let options = headless::parse_options(&args)?;

    let mut bridge_config = BridgeConfig::from_env()?;
    if let Some(provider) = options.provider {
        bridge_config = bridge_config.with_provider(provider);
    }

    let narrator = if options.offline {
        None
    } else {
        connect_narrator(&bridge_config).await
    };

    let mut config = SessionConfig::new().with_bridge(bridge_config);
    if let Some(seed) = options.seed {
        config = config.with_seed(seed);
    }

    let session = GameSession::spawn(config, None, narrator);
    session
        .update({
            let character = headless::quick_start_character(&options.name);
            move |store| {
                store.add_character(character);
            }
        })
        .await?;

    headless::run(session, Arc::new(goblin_cave())).await?;
    Ok(())
}

/// Build the configured bridge and make sure it answers. Any failure leaves
/// the session without a narrator.
async fn connect_narrator(config: &BridgeConfig) -> Option<Arc<dyn LlmBridge>> {
    let narrator = match bridge::connect(config) {
        Ok(narrator) => narrator,
        Err(e) => {
            tracing::warn!(error = %e, "Narrator unavailable");
            return None;
        }
    };
    if let Err(e) = narrator.check_connection().await {
        tracing::warn!(provider = %narrator.provider(), error = %e, "Narrator not reachable");
        return None;
    }
    tracing::info!(provider = %narrator.provider(), model = %narrator.model(), "Narrator connected");
    Some(narrator)
}

fn print_help() {
    println!("Tabletop companion");
    println!();
    println!("USAGE:");
    println!("    companion [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --name <NAME>          Character name (default: Adventurer)");
    println!(
        "    --provider <PROVIDER>  Narrator: ollama or claude (default: {})",
        Provider::default()
    );
    println!("    --seed <N>             Seed the dice");
    println!("    --offline              Play without a narrator");
    println!("    -h, --help             Print help");
    println!();
    println!("ENVIRONMENT:");
    println!("    COMPANION_LLM_PROVIDER  ollama | claude");
    println!("    OLLAMA_BASE_URL         Ollama server (default http://localhost:11434)");
    println!("    OLLAMA_MODEL            Ollama model");
    println!("    ANTHROPIC_API_KEY       Claude API key");
    println!("    CLAUDE_MODEL            Claude model");
    println!("    RUST_LOG                Log filter (default companion=info,companion_core=info)");
}
