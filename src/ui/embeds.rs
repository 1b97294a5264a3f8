use serenity::all::{Colour, CreateEmbed, Member, Message, User};

use crate::db::models::{GuildConfig, Raid, RaidKind, Roster};
use crate::utils::mention_user;
use crate::webhook::KofiPayload;

pub fn configuration_error(guild: &GuildConfig) -> CreateEmbed {
    let role = |v: Option<i64>| v.map(|id| format!("<@&{id}>")).unwrap_or_else(|| "unset".into());
    let chan = |v: Option<i64>| v.map(|id| format!("<#{id}>")).unwrap_or_else(|| "unset".into());
    CreateEmbed::new()
        .colour(Colour::RED)
        .title(format!("Guild `{}` is not configured correctly!", guild.id))
        .description(format!(
            "All the following variables must be set:\n\
             `warden_role`: {}\n\
             `inmate_role`: {}\n\
             `organiser_role`: {}\n\
             `jail_channel`: {}\n\
             `log_channel`: {}",
            role(guild.warden_role),
            role(guild.inmate_role),
            role(guild.organiser_role),
            chan(guild.jail_channel),
            chan(guild.log_channel),
        ))
}

pub fn permissions_error(required_role: Option<i64>) -> CreateEmbed {
    let needed = required_role
        .map(|id| format!("You need the role <@&{id}> to use this command."))
        .unwrap_or_else(|| "The required role is not configured on this server.".to_string());
    CreateEmbed::new()
        .colour(Colour::RED)
        .title("You don't have permission to use this command!")
        .description(needed)
}

pub fn api_error(what: &str, detail: &str) -> CreateEmbed {
    CreateEmbed::new()
        .colour(Colour::RED)
        .title(format!("API Error ({what})"))
        .description(format!("```\n{detail}\n```"))
}

/* Audit log embeds */

pub fn member_leave(user: &User, member: Option<&Member>) -> CreateEmbed {
    let mut e = CreateEmbed::new()
        .colour(Colour::RED)
        .title(format!("{} left", user.name))
        .description(format!("<@{}> left us.", user.id.get()));
    if let Some(joined) = member.and_then(|m| m.joined_at) {
        e = e.field("Joined", joined.to_string(), false);
    }
    if let Some(url) = user.avatar_url() {
        e = e.thumbnail(url);
    }
    e
}

fn attachment_lines(message: &Message) -> String {
    if message.attachments.is_empty() {
        return String::new();
    }
    let list = message
        .attachments
        .iter()
        .map(|a| format!("[{}]({})", a.filename, a.url))
        .collect::<Vec<_>>()
        .join("\n");
    format!("\n**Attachments**:\n{list}")
}

pub fn message_delete(message: &Message) -> CreateEmbed {
    CreateEmbed::new()
        .colour(Colour::RED)
        .title(format!("A message was deleted by {}", message.author.name))
        .description(format!(
            "**Original message follows**\n{}\n\n-# Sent at {}\n-------\n\
             **User**: <@{}> ({})\n**Channel**: <#{}>{}",
            message.content,
            message.timestamp,
            message.author.id.get(),
            message.author.name,
            message.channel_id.get(),
            attachment_lines(message),
        ))
}

pub fn message_edit(before: &Message, after: &Message) -> CreateEmbed {
    CreateEmbed::new()
        .colour(Colour::PURPLE)
        .title(format!("A message was edited by {}", before.author.name))
        .description(format!(
            "**Original message follows**\n{}\n\n-# Sent at {}\n-------\n\
             **Edited message follows**\n{}\n-------\n\
             **User**: <@{}> ({})\n**Channel**: <#{}>\n**Context**: {}{}",
            before.content,
            before.timestamp,
            after.content,
            before.author.id.get(),
            before.author.name,
            before.channel_id.get(),
            after.link(),
            attachment_lines(before),
        ))
}

/* Payment notifications */

pub fn kofi_payment(data: &KofiPayload) -> CreateEmbed {
    let title = match &data.tier_name {
        Some(tier) => format!("{} ({tier})", data.kind),
        None => data.kind.clone(),
    };
    let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "n/a".to_string());
    let user_mention = data
        .discord_userid
        .as_deref()
        .and_then(|s| s.parse::<i64>().ok())
        .map(mention_user)
        .unwrap_or_else(|| "n/a".to_string());
    CreateEmbed::new()
        .colour(Colour::LIGHT_GREY)
        .title(title)
        .description(opt(&data.message))
        .field(
            "First payment?",
            data.is_first_subscription_payment
                .map(|b| b.to_string())
                .unwrap_or_else(|| "n/a".to_string()),
            true,
        )
        .field("Amount", format!("{} {}", data.amount, data.currency), true)
        .field("Email", opt(&data.email), false)
        .field("Name", data.from_name.clone(), true)
        .field("User", opt(&data.discord_username), false)
        .field("ID", user_mention, true)
        .field("Transaction", data.kofi_transaction_id.clone(), false)
        .field("When", data.timestamp.clone(), false)
}

/* Raid roster display */

fn mention_list(ids: &[i64]) -> String {
    if ids.is_empty() {
        return "None".to_string();
    }
    ids.iter()
        .map(|&id| mention_user(id))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The public announcement: raid description plus the authoritative roster.
pub fn raid_display(raid: &Raid, roster: &Roster) -> CreateEmbed {
    let kind = raid.kind();
    let leader_label = match kind {
        RaidKind::Starverse => "Leader",
        RaidKind::Kunlun => "Drivers",
    };

    let mut body = format!(
        "{}\n--------------------------------------\n{} ({}/{}): {}\n",
        raid.description,
        leader_label,
        roster.leaders.len(),
        kind.leader_capacity(raid.arrays),
        mention_list(&roster.leaders),
    );
    if kind == RaidKind::Kunlun {
        body.push_str(&format!(
            "Backups ({}): {}\n",
            roster.backups.len(),
            mention_list(&roster.backups),
        ));
    }
    body.push_str(&format!(
        "Supports ({}/{}): {}",
        roster.supports.len(),
        kind.support_capacity(raid.arrays),
        mention_list(&roster.supports),
    ));

    CreateEmbed::new()
        .title(raid.title.clone())
        .description(body)
        .footer(serenity::all::CreateEmbedFooter::new(format!(
            "Raid: {}",
            raid.id
        )))
}

pub fn scheduled_message_ack(message: &str, when: chrono::DateTime<chrono::Utc>) -> CreateEmbed {
    CreateEmbed::new()
        .colour(Colour::LIGHT_GREY)
        .title("Message scheduled")
        .description("Your message has been scheduled successfully!")
        .field("Message", message.to_string(), false)
        .field("When", crate::utils::ts_long(when), false)
}
