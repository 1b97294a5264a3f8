use chrono::Utc;
use serenity::all::{
    Command, CommandInteraction, CommandOptionType, Context, CreateCommand, CreateCommandOption,
};

use crate::commands::{ephemeral, ephemeral_embed, has_role, opt_channel, opt_str, subcommand};
use crate::db::repo;
use crate::handlers::{pool_from_ctx, scheduler_from_ctx};
use crate::ui::{embeds, messages};
use crate::utils::parse_datetime;

pub async fn register(ctx: &Context) -> anyhow::Result<()> {
    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("schedule")
            .description("Schedule a message for later (organiser only)")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "message",
                    "Send a message at a given time",
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Channel, "channel", "Where to send")
                        .required(true),
                )
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::String,
                        "when",
                        "When to send, `YYYY-MM-DD HH:MM` UTC",
                    )
                    .required(true),
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "text", "What to send")
                        .required(true),
                ),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "list",
                "List this server's pending jobs",
            )),
    )
    .await?;
    Ok(())
}

pub async fn handle(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let Some(guild_id) = cmd.guild_id else {
        return ephemeral(ctx, cmd, "Scheduling only works inside a server.").await;
    };
    let pool = pool_from_ctx(ctx).await?;
    let guild = repo::get_or_create_guild(&pool, guild_id.get() as i64).await?;
    if !has_role(ctx, guild_id, cmd.user.id, guild.organiser_role).await? {
        return ephemeral_embed(ctx, cmd, embeds::permissions_error(guild.organiser_role)).await;
    }

    match subcommand(cmd) {
        Some(("message", options)) => {
            let Some(channel) = opt_channel(options, "channel") else {
                return Ok(());
            };
            let text = opt_str(options, "text").unwrap_or_default();
            let Some(when) = opt_str(options, "when").and_then(parse_datetime) else {
                return ephemeral(ctx, cmd, "Invalid `when`. Use `YYYY-MM-DD HH:MM` (UTC).").await;
            };
            if when <= Utc::now() {
                return ephemeral(ctx, cmd, "That time is already in the past.").await;
            }

            let scheduler = scheduler_from_ctx(ctx).await?;
            scheduler
                .schedule_message(guild.id, channel, when, text)
                .await?;
            ephemeral_embed(ctx, cmd, embeds::scheduled_message_ack(text, when)).await
        }
        Some(("list", _)) => {
            let jobs = repo::list_pending_jobs_for_guild(&pool, guild.id).await?;
            ephemeral(ctx, cmd, &messages::jobs_list(&jobs)).await
        }
        _ => Ok(()),
    }
}
