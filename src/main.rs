mod agent;
mod config;
mod intent;
mod platform;
mod responses;
mod scheduler;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::agent::Agent;
use crate::config::Config;
use crate::platform::telegram::TelegramHost;
use crate::scheduler::{tasks, Scheduler};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the console host keeps stdout to itself
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,fleetbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Assistant: {}", config.chat.assistant_name);
    info!("  Reply delay: {}ms", config.chat.reply_delay_ms);

    let agent = Arc::new(Agent::new(config.chat.clone()));

    let mut scheduler = Scheduler::new().await?;
    tasks::register_heartbeat(&scheduler).await?;

    match &config.telegram {
        Some(telegram) => {
            info!("  Allowed users: {:?}", telegram.allowed_user_ids);
            let host = Arc::new(TelegramHost::new(agent, telegram.allowed_user_ids.clone()));
            tasks::register_session_sweep(&scheduler, host.sessions(), &config.sessions).await?;
            scheduler.start().await?;

            info!("Bot is starting...");
            platform::telegram::run(host, teloxide::Bot::new(&telegram.bot_token)).await?;
        }
        None => {
            info!("No [telegram] section, using the console");
            scheduler.start().await?;
            platform::console::run(agent).await?;
        }
    }

    scheduler.shutdown().await?;
    Ok(())
}
