//! Discord Channel Implementation
//!
//! Uses the Discord gateway and REST API via the serenity crate.
//!
//! # Configuration
//!
//! Environment variables:
//! - `DISCORD_BOT_TOKEN`: Discord bot token
//! - `ALLOWED_CHANNEL_ID` / `ALLOWED_CHANNEL_IDS`: channels the bot answers in

use super::traits::*;
use crate::completion::TogetherClient;
use crate::config::Config;
use crate::conversation::{Conversation, RelayMode};
use crate::dispatcher::Dispatcher;
use crate::history::HistoryStore;
use crate::tokenizer::TokenBudget;
use anyhow::Result;
use async_trait::async_trait;
use serenity::http::{Http, HttpError};
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::model::id::ChannelId;
use serenity::prelude::*;
use std::sync::Arc;
use tracing::{debug, info};

/// Outbound sender over serenity's HTTP client
#[derive(Clone)]
pub struct DiscordSender {
    http: Arc<Http>,
}

impl DiscordSender {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn map_serenity_error(err: serenity::Error) -> ChannelError {
    match &err {
        serenity::Error::Http(HttpError::UnsuccessfulRequest(resp))
            if resp.status_code.as_u16() == 429 =>
        {
            // Real value is in the JSON body; serenity already retries internally
            ChannelError::RateLimited(1)
        }
        serenity::Error::Http(_) => ChannelError::SendFailed(err.to_string()),
        _ => ChannelError::Internal(err.to_string()),
    }
}

#[async_trait]
impl ChannelSender for DiscordSender {
    async fn send_text(&self, chat_id: u64, text: &str) -> Result<(), ChannelError> {
        ChannelId::new(chat_id)
            .say(&*self.http, text)
            .await
            .map(|_| ())
            .map_err(map_serenity_error)
    }

    async fn send_typing(&self, chat_id: u64) -> Result<(), ChannelError> {
        self.http
            .broadcast_typing(ChannelId::new(chat_id))
            .await
            .map_err(map_serenity_error)
    }
}

/// Serenity event handler feeding the dispatcher
pub struct DiscordHandler {
    dispatcher: Arc<Dispatcher>,
}

impl DiscordHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Convert a gateway message into a ChannelMessage
    fn parse_message(ctx: &Context, msg: &Message) -> ChannelMessage {
        let from_self = msg.author.id == ctx.cache.current_user().id;
        let is_admin = msg
            .author_permissions(&ctx.cache)
            .is_some_and(|p| p.administrator());

        ChannelMessage {
            id: msg.id.get(),
            sender_id: msg.author.id.get(),
            sender_name: Some(msg.author.name.clone()),
            chat_id: msg.channel_id.get(),
            content: msg.content.clone(),
            from_self,
            is_admin,
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("✅ Bot is online as {} (ID: {})", ready.user.name, ready.user.id);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let inbound = Self::parse_message(&ctx, &msg);
        let sender = DiscordSender::new(ctx.http.clone());
        self.dispatcher.handle(&inbound, &sender).await;
    }
}

/// Build the dispatcher for a config
fn build_dispatcher(config: &Config) -> Dispatcher {
    let budget = TokenBudget::new(config.token_limit);
    let conversation = match config.mode {
        RelayMode::Stateful => Conversation::stateful(
            HistoryStore::new(config.history_path.clone(), config.backup_path.clone()),
            budget,
        ),
        RelayMode::Stateless => Conversation::stateless(budget),
    };

    Dispatcher::new(
        Arc::new(TogetherClient::from_config(config)),
        conversation,
        config.allowed_channels.clone(),
    )
}

/// Run the Discord bot until the gateway stops or a shutdown signal arrives
pub async fn run_discord_bot(config: Config) -> Result<()> {
    info!("===========================================");
    info!("  RelayBot Discord - Starting...");
    info!("===========================================");
    info!("{}", config.summary());

    let dispatcher = Arc::new(build_dispatcher(&config));

    let intents = GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILDS;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(DiscordHandler::new(dispatcher))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Discord client: {}", e))?;

    // Close all shards on SIGTERM or Ctrl+C
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    debug!("SIGTERM handler unavailable: {}", e);
                    tokio::signal::ctrl_c().await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            tokio::signal::ctrl_c().await.ok();
        }
        info!("Shutdown signal received, stopping Discord client...");
        shard_manager.shutdown_all().await;
    });

    info!("Starting Discord gateway connection...");

    client
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Discord client error: {}", e))?;

    info!("Discord bot stopped");
    Ok(())
}
