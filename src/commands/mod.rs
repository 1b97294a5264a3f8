pub mod config;
pub mod jail;
pub mod raid;
pub mod schedule;

use serenity::all::{
    CommandDataOption, CommandDataOptionValue, CommandInteraction, Context, CreateEmbed,
    CreateInteractionResponse, CreateInteractionResponseMessage, GuildId, UserId,
};

pub async fn register_commands(ctx: &Context) -> anyhow::Result<()> {
    raid::register(ctx).await?;
    jail::register(ctx).await?;
    config::register(ctx).await?;
    schedule::register(ctx).await?;
    Ok(())
}

pub async fn dispatch(ctx: &Context, cmd: &CommandInteraction) -> anyhow::Result<()> {
    match cmd.data.name.as_str() {
        "raid" => raid::handle(ctx, cmd).await,
        "jail" | "solve" | "sudoku" => jail::handle(ctx, cmd).await,
        "configure" => config::handle(ctx, cmd).await,
        "schedule" => schedule::handle(ctx, cmd).await,
        _ => Ok(()),
    }
}

/* Option extraction */

pub(crate) fn opt_str<'a>(options: &'a [CommandDataOption], name: &str) -> Option<&'a str> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::String(s) => Some(s.as_str()),
        _ => None,
    })
}

pub(crate) fn opt_int(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::Integer(n) => Some(*n),
        _ => None,
    })
}

pub(crate) fn opt_role(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::Role(id) => Some(id.get() as i64),
        _ => None,
    })
}

pub(crate) fn opt_channel(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::Channel(id) => Some(id.get() as i64),
        _ => None,
    })
}

pub(crate) fn opt_user(options: &[CommandDataOption], name: &str) -> Option<i64> {
    options.iter().find(|o| o.name == name).and_then(|o| match &o.value {
        CommandDataOptionValue::User(id) => Some(id.get() as i64),
        _ => None,
    })
}

/// The subcommand a user invoked, if any: its name and inner options.
pub(crate) fn subcommand(cmd: &CommandInteraction) -> Option<(&str, &[CommandDataOption])> {
    cmd.data.options.first().and_then(|o| match &o.value {
        CommandDataOptionValue::SubCommand(inner) => Some((o.name.as_str(), inner.as_slice())),
        _ => None,
    })
}

/// Whether the invoking user holds the given configured role. An unset role
/// means nobody qualifies.
pub(crate) async fn has_role(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
    role: Option<i64>,
) -> anyhow::Result<bool> {
    let Some(role_id) = role else {
        return Ok(false);
    };
    let member = guild_id.member(&ctx.http, user_id).await?;
    Ok(member.roles.iter().any(|r| r.get() as i64 == role_id))
}

/* Responses */

pub(crate) async fn ephemeral(
    ctx: &Context,
    cmd: &CommandInteraction,
    tip: &str,
) -> anyhow::Result<()> {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(tip)
                .ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}

pub(crate) async fn ephemeral_embed(
    ctx: &Context,
    cmd: &CommandInteraction,
    embed: CreateEmbed,
) -> anyhow::Result<()> {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .embed(embed)
                .ephemeral(true),
        ),
    )
    .await?;
    Ok(())
}

pub(crate) async fn public(
    ctx: &Context,
    cmd: &CommandInteraction,
    content: &str,
) -> anyhow::Result<()> {
    cmd.create_response(
        &ctx.http,
        CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().content(content),
        ),
    )
    .await?;
    Ok(())
}
