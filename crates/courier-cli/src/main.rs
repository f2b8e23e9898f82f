use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use courier_common::UserId;
use courier_config::AppConfig;
use courier_engine::{ChatEngine, ChatTransport, TurnLimits};
use courier_history::HistoryStore;
use courier_providers::BackendRegistry;
use courier_telegram::{CourierBot, TelegramTransport};
use teloxide::Bot;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courier", version, about = "Telegram relay for streaming LLM chat backends")]
struct Args {
    /// Load this .env file instead of the one in the working directory.
    #[arg(long)]
    env_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match &args.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
        }
        None => {
            // Missing .env is fine; the environment may be set directly.
            let _ = dotenvy::dotenv();
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("failed to load configuration")?;

    let history = Arc::new(
        HistoryStore::open(&config.history_db_path, config.history_limit)
            .context("failed to open history store")?,
    );

    let registry = Arc::new(BackendRegistry::from_config(
        &config.credentials,
        &config.models,
    ));
    if !registry.has_any_backend() {
        warn!("no provider credentials configured; every message will be refused");
    }

    let bot = Bot::new(&config.telegram_bot_token);
    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramTransport::new(bot.clone()));

    let engine = Arc::new(ChatEngine::new(
        registry,
        history,
        transport,
        Some(config.default_model.clone()),
        TurnLimits::default(),
    ));

    let whitelist: Vec<UserId> = config.whitelisted_users.iter().copied().map(UserId).collect();

    info!(
        default_model = %config.default_model,
        whitelisted = whitelist.len(),
        "starting courier"
    );

    CourierBot::new(bot, engine, whitelist).dispatch().await;

    info!("courier stopped");
    Ok(())
}
