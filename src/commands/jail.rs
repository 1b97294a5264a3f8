use std::time::Duration;

use serenity::all::{
    ChannelId, Command, CommandDataOption, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateMessage, GuildId, RoleId, UserId,
};
use tracing::warn;

use crate::commands::{ephemeral, ephemeral_embed, has_role, opt_str, opt_user, public, subcommand};
use crate::db::models::GuildConfig;
use crate::db::repo;
use crate::handlers::{checker_from_ctx, pool_from_ctx};
use crate::jail::{is_valid_solution, parse_grid};
use crate::providers;
use crate::ui::{embeds, messages};

/// How long the "right answer" message lingers before the release lands.
const RELEASE_DELAY: Duration = Duration::from_secs(10);

pub async fn register(ctx: &Context) -> anyhow::Result<()> {
    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("jail")
            .description("Warden controls for the jail")
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "imprison",
                    "Jail a user until they solve a riddle",
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::User, "user", "User to imprison")
                        .required(true),
                ),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "release",
                    "Release a jailed user early",
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::User, "user", "User to release")
                        .required(true),
                ),
            ),
    )
    .await?;
    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("solve")
            .description("Submit an answer to your riddle or sudoku")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "answer", "Your answer")
                    .required(true),
            ),
    )
    .await?;
    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("sudoku").description("Trade your riddle for a sudoku (once)"),
    )
    .await?;
    Ok(())
}

pub async fn handle(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let Some(guild_id) = cmd.guild_id else {
        return ephemeral(ctx, cmd, "The jail only exists inside a server.").await;
    };
    let pool = pool_from_ctx(ctx).await?;
    let guild = repo::get_or_create_guild(&pool, guild_id.get() as i64).await?;
    if !guild.jail_ready() {
        return ephemeral_embed(ctx, cmd, embeds::configuration_error(&guild)).await;
    }

    match cmd.data.name.as_str() {
        "jail" => match subcommand(cmd) {
            Some(("imprison", options)) => imprison(ctx, cmd, options, &guild).await,
            Some(("release", options)) => release(ctx, cmd, options, &guild).await,
            _ => Ok(()),
        },
        "solve" => solve(ctx, cmd, &guild).await,
        "sudoku" => swap_sudoku(ctx, cmd, &guild).await,
        _ => Ok(()),
    }
}

async fn is_warden(
    ctx: &Context,
    cmd: &CommandInteraction,
    guild: &GuildConfig,
) -> anyhow::Result<bool> {
    let Some(guild_id) = cmd.guild_id else {
        return Ok(false);
    };
    has_role(ctx, guild_id, cmd.user.id, guild.warden_role).await
}

async fn imprison(
    ctx: &Context,
    cmd: &CommandInteraction,
    options: &[CommandDataOption],
    guild: &GuildConfig,
) -> anyhow::Result<()> {
    if !is_warden(ctx, cmd, guild).await? {
        return ephemeral_embed(ctx, cmd, embeds::permissions_error(guild.warden_role)).await;
    }
    let Some(target) = opt_user(options, "user") else {
        return Ok(());
    };
    if target == cmd.user.id.get() as i64 {
        return ephemeral(ctx, cmd, "You cannot imprison yourself.").await;
    }

    let Some(guild_id) = cmd.guild_id else {
        return Ok(());
    };
    let member = guild_id.member(&ctx.http, UserId::new(target as u64)).await?;
    if member.user.bot {
        return ephemeral(ctx, cmd, "Bots are beyond the reach of the law.").await;
    }

    let pool = pool_from_ctx(ctx).await?;
    if repo::get_riddle(&pool, guild.id, target).await?.is_some() {
        return ephemeral(ctx, cmd, "That user is already imprisoned.").await;
    }

    let riddle = match providers::fetch_riddle().await {
        Ok(r) => r,
        Err(err) => {
            return ephemeral_embed(ctx, cmd, embeds::api_error("riddle", &err.to_string())).await;
        }
    };
    repo::create_riddle(&pool, guild.id, target, &riddle.riddle, &riddle.answer).await?;

    if let Some(role) = guild.inmate_role {
        member.add_role(&ctx.http, RoleId::new(role as u64)).await?;
    }
    if let Some(jail) = guild.jail_channel {
        ChannelId::new(jail as u64)
            .send_message(
                &ctx.http,
                CreateMessage::new().content(messages::imprisonment(target, &riddle.riddle)),
            )
            .await?;
    }
    ephemeral(ctx, cmd, "The sentence has been carried out.").await
}

async fn release(
    ctx: &Context,
    cmd: &CommandInteraction,
    options: &[CommandDataOption],
    guild: &GuildConfig,
) -> anyhow::Result<()> {
    if !is_warden(ctx, cmd, guild).await? {
        return ephemeral_embed(ctx, cmd, embeds::permissions_error(guild.warden_role)).await;
    }
    let Some(target) = opt_user(options, "user") else {
        return Ok(());
    };

    let pool = pool_from_ctx(ctx).await?;
    if repo::get_riddle(&pool, guild.id, target).await?.is_none() {
        return ephemeral(ctx, cmd, "That user is not imprisoned.").await;
    }

    free_inmate(ctx, guild, target).await?;
    ephemeral(ctx, cmd, "The prisoner walks free.").await
}

async fn solve(ctx: &Context, cmd: &CommandInteraction, guild: &GuildConfig) -> anyhow::Result<()> {
    if guild.jail_channel != Some(cmd.channel_id.get() as i64) {
        return ephemeral(ctx, cmd, "Answers are only heard in the jail channel.").await;
    }
    let pool = pool_from_ctx(ctx).await?;
    let user_id = cmd.user.id.get() as i64;
    let Some(riddle) = repo::get_riddle(&pool, guild.id, user_id).await? else {
        return ephemeral(ctx, cmd, "You are not imprisoned. Count yourself lucky.").await;
    };
    let answer = opt_str(&cmd.data.options, "answer").unwrap_or_default();

    let correct = if riddle.is_sudoku {
        match (parse_grid(&riddle.text), parse_grid(answer.trim())) {
            // Any valid completion counts, not just the stored solution.
            (Some(puzzle), Some(submitted)) => is_valid_solution(&puzzle, &submitted),
            _ => false,
        }
    } else {
        let checker = checker_from_ctx(ctx).await?;
        checker.matches(&riddle.solution, answer)
    };

    if !correct {
        return ephemeral(ctx, cmd, &messages::wrong_answer(&riddle)).await;
    }

    public(ctx, cmd, &messages::right_answer(user_id)).await?;
    repo::delete_riddle(&pool, guild.id, user_id).await?;

    // Let the moment sink in before the cell opens.
    let http = ctx.http.clone();
    let freed = guild.clone();
    tokio::spawn(async move {
        tokio::time::sleep(RELEASE_DELAY).await;
        if let Some(role) = freed.inmate_role {
            if let Err(err) = http
                .remove_member_role(
                    GuildId::new(freed.id as u64),
                    UserId::new(user_id as u64),
                    RoleId::new(role as u64),
                    None,
                )
                .await
            {
                warn!(user_id, error = %err, "failed to remove inmate role");
            }
        }
        if let Some(jail) = freed.jail_channel {
            let _ = ChannelId::new(jail as u64)
                .send_message(&http, CreateMessage::new().content(messages::release(user_id)))
                .await;
        }
    });
    Ok(())
}

async fn swap_sudoku(
    ctx: &Context,
    cmd: &CommandInteraction,
    guild: &GuildConfig,
) -> anyhow::Result<()> {
    let pool = pool_from_ctx(ctx).await?;
    let user_id = cmd.user.id.get() as i64;
    let Some(riddle) = repo::get_riddle(&pool, guild.id, user_id).await? else {
        return ephemeral(ctx, cmd, "You are not imprisoned. Count yourself lucky.").await;
    };
    if riddle.is_sudoku {
        // One trade only; remind them what they're stuck with.
        return ephemeral(ctx, cmd, &messages::riddle_reminder(&riddle)).await;
    }

    let sudoku = match providers::fetch_sudoku().await {
        Ok(s) => s,
        Err(err) => {
            return ephemeral_embed(ctx, cmd, embeds::api_error("sudoku", &err.to_string())).await;
        }
    };
    repo::update_riddle(&pool, guild.id, user_id, &sudoku.grid, &sudoku.solution, true).await?;
    public(
        ctx,
        cmd,
        &messages::switch_sudoku(user_id, &sudoku.grid, &sudoku.difficulty),
    )
    .await
}

/// Shared release path: drop the riddle, strip the role, announce it.
async fn free_inmate(ctx: &Context, guild: &GuildConfig, user_id: i64) -> anyhow::Result<()> {
    let pool = pool_from_ctx(ctx).await?;
    repo::delete_riddle(&pool, guild.id, user_id).await?;
    if let Some(role) = guild.inmate_role {
        ctx.http
            .remove_member_role(
                GuildId::new(guild.id as u64),
                UserId::new(user_id as u64),
                RoleId::new(role as u64),
                None,
            )
            .await?;
    }
    if let Some(jail) = guild.jail_channel {
        ChannelId::new(jail as u64)
            .send_message(&ctx.http, CreateMessage::new().content(messages::release(user_id)))
            .await?;
    }
    Ok(())
}
