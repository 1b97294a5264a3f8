pub mod components;

use std::sync::Arc;

use anyhow::Context as _;
use serenity::all::{
    ChannelId, Context, CreateMessage, EventHandler, GuildId, Interaction, Member, Message,
    MessageId, MessageUpdateEvent, Ready, User,
};
use serenity::async_trait;
use serenity::prelude::TypeMapKey;
use sqlx::SqlitePool;
use tracing::{error, info, warn};

use crate::db::repo;
use crate::handlers::components::SignupRegistry;
use crate::jail::{AnswerChecker, NormalisedChecker};
use crate::roster::RosterManager;
use crate::scheduler::{HttpMessenger, Scheduler};
use crate::ui::embeds;

pub struct Handler {
    pool: SqlitePool,
    roster: Arc<RosterManager>,
    registry: Arc<SignupRegistry>,
    checker: Arc<dyn AnswerChecker>,
}

impl Handler {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            roster: Arc::new(RosterManager::new(pool.clone())),
            registry: Arc::new(SignupRegistry::new()),
            checker: Arc::new(NormalisedChecker),
            pool,
        }
    }

    /// Channel the guild wants audit events in, if configured.
    async fn log_channel(&self, guild_id: i64) -> Option<ChannelId> {
        match repo::get_or_create_guild(&self.pool, guild_id).await {
            Ok(guild) => guild.log_channel.map(|id| ChannelId::new(id as u64)),
            Err(err) => {
                warn!(guild_id, error = %err, "could not load guild config for audit log");
                None
            }
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "connected");

        let scheduler = Scheduler::new(
            self.pool.clone(),
            Arc::new(HttpMessenger::new(ctx.http.clone())),
        );
        {
            let mut data = ctx.data.write().await;
            data.insert::<DbKey>(self.pool.clone());
            data.insert::<RosterKey>(self.roster.clone());
            data.insert::<RegistryKey>(self.registry.clone());
            data.insert::<SchedulerKey>(scheduler.clone());
            data.insert::<CheckerKey>(self.checker.clone());
        }

        if let Err(err) = crate::commands::register_commands(&ctx).await {
            error!(error = %err, "failed to register slash commands");
        }

        // Re-arm persisted jobs and still-open sign-up controllers.
        let pool = self.pool.clone();
        let registry = self.registry.clone();
        let roster = self.roster.clone();
        let http = ctx.http.clone();
        tokio::spawn(async move {
            if let Err(err) = scheduler.restore().await {
                error!(error = %err, "job restore failed");
            }
            match repo::list_open_raids(&pool).await {
                Ok(raids) => {
                    info!(count = raids.len(), "restoring sign-up controllers");
                    for raid in raids {
                        registry.activate(raid.id);
                        components::spawn_signup_timeout(
                            http.clone(),
                            pool.clone(),
                            registry.clone(),
                            roster.clone(),
                            raid.id,
                            raid.apply_by,
                        );
                    }
                }
                Err(err) => error!(error = %err, "could not list open raids"),
            }
        });
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(cmd) => {
                if let Err(err) = crate::commands::dispatch(&ctx, &cmd).await {
                    error!(command = %cmd.data.name, error = %err, "command failed");
                }
            }
            Interaction::Component(comp) => {
                if let Err(err) = components::handle_component(&ctx, &comp).await {
                    error!(custom_id = %comp.data.custom_id, error = %err, "component failed");
                }
            }
            _ => {}
        }
    }

    async fn message_delete(
        &self,
        ctx: Context,
        channel_id: ChannelId,
        deleted_message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        let Some(guild_id) = guild_id else { return };
        // The gateway only sends ids; without a cached copy there is nothing
        // useful to report.
        let Some(message) = ctx
            .cache
            .message(channel_id, deleted_message_id)
            .map(|m| m.clone())
        else {
            return;
        };
        if message.author.bot {
            return;
        }
        let Some(log) = self.log_channel(guild_id.get() as i64).await else {
            return;
        };
        if let Err(err) = log
            .send_message(&ctx.http, CreateMessage::new().embed(embeds::message_delete(&message)))
            .await
        {
            warn!(error = %err, "failed to log deleted message");
        }
    }

    async fn message_update(
        &self,
        ctx: Context,
        old_if_available: Option<Message>,
        new: Option<Message>,
        event: MessageUpdateEvent,
    ) {
        let (Some(before), Some(after)) = (old_if_available, new) else {
            return;
        };
        if before.author.bot || before.content == after.content {
            return;
        }
        let Some(guild_id) = event.guild_id else { return };
        let Some(log) = self.log_channel(guild_id.get() as i64).await else {
            return;
        };
        if let Err(err) = log
            .send_message(
                &ctx.http,
                CreateMessage::new().embed(embeds::message_edit(&before, &after)),
            )
            .await
        {
            warn!(error = %err, "failed to log edited message");
        }
    }

    async fn guild_member_removal(
        &self,
        ctx: Context,
        guild_id: GuildId,
        user: User,
        member_data_if_available: Option<Member>,
    ) {
        if user.bot {
            return;
        }
        let Some(log) = self.log_channel(guild_id.get() as i64).await else {
            return;
        };
        let embed = embeds::member_leave(&user, member_data_if_available.as_ref());
        if let Err(err) = log.send_message(&ctx.http, CreateMessage::new().embed(embed)).await {
            warn!(error = %err, "failed to log member departure");
        }
    }
}

/* Context data access */

struct DbKey;
impl TypeMapKey for DbKey {
    type Value = SqlitePool;
}

struct RosterKey;
impl TypeMapKey for RosterKey {
    type Value = Arc<RosterManager>;
}

struct RegistryKey;
impl TypeMapKey for RegistryKey {
    type Value = Arc<SignupRegistry>;
}

struct SchedulerKey;
impl TypeMapKey for SchedulerKey {
    type Value = Scheduler;
}

struct CheckerKey;
impl TypeMapKey for CheckerKey {
    type Value = Arc<dyn AnswerChecker>;
}

pub async fn pool_from_ctx(ctx: &Context) -> anyhow::Result<SqlitePool> {
    let data = ctx.data.read().await;
    data.get::<DbKey>().cloned().context("pool missing from context")
}

pub async fn roster_from_ctx(ctx: &Context) -> anyhow::Result<Arc<RosterManager>> {
    let data = ctx.data.read().await;
    data.get::<RosterKey>()
        .cloned()
        .context("roster manager missing from context")
}

pub async fn registry_from_ctx(ctx: &Context) -> anyhow::Result<Arc<SignupRegistry>> {
    let data = ctx.data.read().await;
    data.get::<RegistryKey>()
        .cloned()
        .context("sign-up registry missing from context")
}

pub async fn scheduler_from_ctx(ctx: &Context) -> anyhow::Result<Scheduler> {
    let data = ctx.data.read().await;
    data.get::<SchedulerKey>()
        .cloned()
        .context("scheduler missing from context")
}

pub async fn checker_from_ctx(ctx: &Context) -> anyhow::Result<Arc<dyn AnswerChecker>> {
    let data = ctx.data.read().await;
    data.get::<CheckerKey>()
        .cloned()
        .context("answer checker missing from context")
}
