use chrono::Utc;
use serenity::all::{
    Command, CommandInteraction, CommandOptionType, Context, CreateCommand, CreateCommandOption,
    CreateMessage,
};

use crate::commands::{ephemeral, ephemeral_embed, has_role, opt_int, opt_role, opt_str, subcommand};
use crate::db::models::RaidKind;
use crate::db::repo;
use crate::handlers::components::spawn_signup_timeout;
use crate::handlers::{pool_from_ctx, registry_from_ctx, roster_from_ctx, scheduler_from_ctx};
use crate::ui::{embeds, menus};
use crate::utils::{mention_user, parse_datetime, ts_long, ts_relative};

fn shared_options(option: CreateCommandOption) -> CreateCommandOption {
    option
        .add_sub_option(
            CreateCommandOption::new(CommandOptionType::String, "title", "Raid title")
                .required(true),
        )
        .add_sub_option(
            CreateCommandOption::new(CommandOptionType::String, "description", "Short description")
                .required(true),
        )
        .add_sub_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "apply_by",
                "Sign-up deadline, `YYYY-MM-DD HH:MM` UTC",
            )
            .required(true),
        )
        .add_sub_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "happens_on",
                "Start time, `YYYY-MM-DD HH:MM` UTC",
            )
            .required(true),
        )
        .add_sub_option(CreateCommandOption::new(
            CommandOptionType::Role,
            "ping",
            "Role to ping 1 hour before and at the start",
        ))
}

pub async fn register(ctx: &Context) -> anyhow::Result<()> {
    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("raid")
            .description("Announce a raid with an interactive sign-up roster")
            .add_option(shared_options(CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "starverse",
                "One leader and up to 19 supports",
            )))
            .add_option(
                shared_options(CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "kunlun",
                    "Per-array drivers with an open backup list",
                ))
                .add_sub_option(
                    CreateCommandOption::new(
                        CommandOptionType::Integer,
                        "arrays",
                        "How many arrays run (1 driver and 4 supports each)",
                    )
                    .min_int_value(1)
                    .max_int_value(10)
                    .required(true),
                ),
            ),
    )
    .await?;
    Ok(())
}

pub async fn handle(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let Some((sub, options)) = subcommand(cmd) else {
        return Ok(());
    };
    let Some(kind) = RaidKind::parse(sub) else {
        return Ok(());
    };

    let Some(guild_id) = cmd.guild_id else {
        return ephemeral(ctx, cmd, "Raids can only be created inside a server.").await;
    };

    let pool = pool_from_ctx(ctx).await?;
    let guild = repo::get_or_create_guild(&pool, guild_id.get() as i64).await?;
    if !guild.raid_ready() {
        return ephemeral_embed(ctx, cmd, embeds::configuration_error(&guild)).await;
    }
    if !has_role(ctx, guild_id, cmd.user.id, guild.organiser_role).await? {
        return ephemeral_embed(ctx, cmd, embeds::permissions_error(guild.organiser_role)).await;
    }

    let title = opt_str(options, "title").unwrap_or_default();
    let description = opt_str(options, "description").unwrap_or_default();
    let arrays = opt_int(options, "arrays").unwrap_or(1);
    let ping_role = opt_role(options, "ping");

    let Some(apply_by) = opt_str(options, "apply_by").and_then(parse_datetime) else {
        return ephemeral(ctx, cmd, "Invalid `apply_by`. Use `YYYY-MM-DD HH:MM` (UTC).").await;
    };
    let Some(happens_on) = opt_str(options, "happens_on").and_then(parse_datetime) else {
        return ephemeral(ctx, cmd, "Invalid `happens_on`. Use `YYYY-MM-DD HH:MM` (UTC).").await;
    };
    let now = Utc::now();
    if apply_by <= now {
        return ephemeral(ctx, cmd, "The sign-up deadline is already in the past.").await;
    }
    if happens_on < apply_by {
        return ephemeral(ctx, cmd, "The raid cannot start before sign-ups end.").await;
    }

    let organiser = cmd.user.id.get() as i64;
    let full_description = format!(
        "{description}\n\nStarts: {} ({})\nSign-ups close: {}\nOrganiser: {}",
        ts_long(happens_on),
        ts_relative(happens_on),
        ts_long(apply_by),
        mention_user(organiser),
    );

    let raid = repo::create_raid(
        &pool,
        guild_id.get() as i64,
        organiser,
        title,
        &full_description,
        kind,
        arrays,
        ping_role,
        apply_by,
        happens_on,
    )
    .await?;

    // Post the announcement, then remember where it lives so the roster
    // display and notifications can edit it later.
    let message = cmd
        .channel_id
        .send_message(
            &ctx.http,
            CreateMessage::new()
                .embed(embeds::raid_display(&raid, &raid.roster.0))
                .components(vec![menus::signup_row(raid.id, kind, false)]),
        )
        .await?;
    repo::set_raid_message(
        &pool,
        raid.id,
        cmd.channel_id.get() as i64,
        message.id.get() as i64,
    )
    .await?;

    let registry = registry_from_ctx(ctx).await?;
    registry.activate(raid.id);
    spawn_signup_timeout(
        ctx.http.clone(),
        pool.clone(),
        registry,
        roster_from_ctx(ctx).await?,
        raid.id,
        raid.apply_by,
    );

    let scheduler = scheduler_from_ctx(ctx).await?;
    scheduler.schedule_raid_notifications(&raid).await?;

    ephemeral(ctx, cmd, &format!("Raid `{}` created.", raid.id)).await
}
