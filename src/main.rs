//! RelayBot - Entry Point
//!
//! Modes:
//! - Default: profile from `RELAY_MODE` (stateful unless set)
//! - --stateless / -s: single-shot relay, no history

use relaybot::{Config, RelayMode};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Parse args
    let args: Vec<String> = std::env::args().collect();
    let stateless_mode = args.iter().any(|a| a == "--stateless" || a == "-s");
    let json_logs = args.iter().any(|a| a == "--json");
    let help_mode = args.iter().any(|a| a == "--help" || a == "-h");

    if help_mode {
        println!("RelayBot v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Usage: relaybot [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --stateless, -s    Relay single messages without history");
        println!("  --json             Log as JSON to stderr");
        println!("  --help, -h         Show this help");
        println!();
        println!("Environment variables:");
        println!("  DISCORD_BOT_TOKEN     Discord bot token (required)");
        println!("  TOGETHER_API_KEY      Completion API key (required)");
        println!("  TOGETHER_MODEL_NAME   Model name");
        println!("  TOGETHER_API_URL      Completion API base URL");
        println!("  ALLOWED_CHANNEL_ID    Channel to answer in");
        println!("  ALLOWED_CHANNEL_IDS   Comma-separated channels to answer in");
        println!("  RELAY_MODE            stateful (default) or stateless");
        println!("  HISTORY_PATH          Primary history file (default: chat_history.json)");
        println!("  HISTORY_BACKUP_PATH   Backup history file (default: chat_history_backup.json)");
        println!("  TOKEN_LIMIT           Model context limit (default: 8193)");
        println!("  RUST_LOG              Log filter (default: info)");
        return Ok(());
    }

    // RUST_LOG directives, e.g. "relaybot=debug,serenity=warn"
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_logs {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_ansi(true)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("🚨 Missing or invalid configuration: {:#}. Check your .env file.", e);
            return Err(e);
        }
    };
    if stateless_mode {
        config.mode = RelayMode::Stateless;
    }

    info!("RelayBot v{} ({})", env!("CARGO_PKG_VERSION"), config.mode.as_str());

    relaybot::channels::discord::run_discord_bot(config).await
}
