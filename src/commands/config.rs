use serenity::all::{
    Command, CommandInteraction, CommandOptionType, Context, CreateCommand, CreateCommandOption,
    Permissions,
};

use crate::commands::{ephemeral, opt_channel, opt_role, opt_str, subcommand};
use crate::db::repo::{self, GuildField};
use crate::handlers::pool_from_ctx;

pub async fn register(ctx: &Context) -> anyhow::Result<()> {
    Command::create_global_command(
        &ctx.http,
        CreateCommand::new("configure")
            .description("Configure the bot for this server (admin only)")
            .default_member_permissions(Permissions::ADMINISTRATOR)
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "channel",
                    "Set a channel used by a feature",
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "which", "Which channel")
                        .required(true)
                        .add_string_choice("jail", "jail")
                        .add_string_choice("log", "log"),
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Channel, "channel", "The channel")
                        .required(true),
                ),
            )
            .add_option(
                CreateCommandOption::new(
                    CommandOptionType::SubCommand,
                    "role",
                    "Set a role used by a feature",
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::String, "which", "Which role")
                        .required(true)
                        .add_string_choice("warden", "warden")
                        .add_string_choice("inmate", "inmate")
                        .add_string_choice("organiser", "organiser"),
                )
                .add_sub_option(
                    CreateCommandOption::new(CommandOptionType::Role, "role", "The role")
                        .required(true),
                ),
            ),
    )
    .await?;
    Ok(())
}

pub async fn handle(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    let Some(guild_id) = cmd.guild_id else {
        return ephemeral(ctx, cmd, "Configuration only makes sense inside a server.").await;
    };
    let Some((sub, options)) = subcommand(cmd) else {
        return Ok(());
    };

    let (field, value) = match sub {
        "channel" => {
            let field = match opt_str(options, "which") {
                Some("jail") => GuildField::JailChannel,
                Some("log") => GuildField::LogChannel,
                _ => return Ok(()),
            };
            let Some(channel) = opt_channel(options, "channel") else {
                return Ok(());
            };
            (field, channel)
        }
        "role" => {
            let field = match opt_str(options, "which") {
                Some("warden") => GuildField::WardenRole,
                Some("inmate") => GuildField::InmateRole,
                Some("organiser") => GuildField::OrganiserRole,
                _ => return Ok(()),
            };
            let Some(role) = opt_role(options, "role") else {
                return Ok(());
            };
            (field, role)
        }
        _ => return Ok(()),
    };

    let pool = pool_from_ctx(ctx).await?;
    repo::set_guild_field(&pool, guild_id.get() as i64, field, value).await?;
    ephemeral(ctx, cmd, "Configuration updated.").await
}
