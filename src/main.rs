mod commands;
mod db;
mod error;
mod handlers;
mod jail;
mod providers;
mod roster;
mod scheduler;
mod ui;
mod utils;
mod webhook;

use std::env;
use std::sync::Arc;

use anyhow::Context as _;
use dotenvy::dotenv;
use serenity::all::{Client, GatewayIntents, Http};
use tracing::{info, warn};

use crate::handlers::Handler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let token = env::var("DISCORD_TOKEN").context("DISCORD_TOKEN not set")?;
    let db_url = env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://bai.db".to_string());

    let pool = db::init_pool(&db_url).await?;

    // The Ko-fi listener is optional; without a token and channel it stays off.
    match (
        env::var("KOFI_VERIFICATION_TOKEN"),
        env::var("KOFI_CHANNEL_ID"),
    ) {
        (Ok(verification_token), Ok(channel)) => {
            let channel_id: i64 = channel.parse().context("KOFI_CHANNEL_ID must be an id")?;
            let addr =
                env::var("WEBHOOK_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
            let state = webhook::WebhookState {
                http: Arc::new(Http::new(&token)),
                channel_id,
                verification_token,
            };
            tokio::spawn(async move {
                if let Err(err) = webhook::serve(state, &addr).await {
                    warn!(error = %err, "ko-fi webhook stopped");
                }
            });
        }
        _ => info!("ko-fi webhook not configured, skipping"),
    }

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let mut client = Client::builder(&token, intents)
        .event_handler(Handler::new(pool))
        .await?;
    client.start().await?;
    Ok(())
}
