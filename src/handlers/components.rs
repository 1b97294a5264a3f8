use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serenity::all::{
    ChannelId, ComponentInteraction, Context, CreateInteractionResponse,
    CreateInteractionResponseMessage, EditMessage, Http,
};
use sqlx::SqlitePool;
use tracing::{error, warn};

use crate::db::repo;
use crate::error::RosterError;
use crate::handlers::{pool_from_ctx, registry_from_ctx, roster_from_ctx};
use crate::roster::{Category, Reject, RosterManager, ToggleOutcome};
use crate::ui::{embeds, menus};
use crate::utils::{parse_component_id, ComponentAction};

/// Lifecycle of one raid's interactive sign-up message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupState {
    Active,
    /// `apply_by` passed and the buttons were disabled by the timeout task.
    TimedOut,
    /// A storage error disabled the buttons; no further writes accepted.
    ErrorDisabled,
    /// The organiser closed sign-ups early.
    Closed,
}

/// In-memory registry of live sign-up controllers. Rebuilt from the store on
/// startup; a raid absent from the registry takes no component input.
#[derive(Default)]
pub struct SignupRegistry {
    states: DashMap<i64, SignupState>,
}

impl SignupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, raid_id: i64) {
        self.states.insert(raid_id, SignupState::Active);
    }

    pub fn state(&self, raid_id: i64) -> Option<SignupState> {
        self.states.get(&raid_id).map(|s| *s)
    }

    /// Whether component presses for this raid are currently processed.
    pub fn accepts_input(&self, raid_id: i64) -> bool {
        self.state(raid_id) == Some(SignupState::Active)
    }

    /// Move to `TimedOut`. Returns false when the controller already left the
    /// active state, so the timeout task skips its disable-render.
    pub fn mark_timed_out(&self, raid_id: i64) -> bool {
        match self.states.get_mut(&raid_id) {
            Some(mut s) if *s == SignupState::Active => {
                *s = SignupState::TimedOut;
                true
            }
            _ => false,
        }
    }

    /// Move to `Closed`. Returns false when already closed or errored, which
    /// suppresses a duplicate disable-render.
    pub fn mark_closed(&self, raid_id: i64) -> bool {
        match self.states.get_mut(&raid_id) {
            Some(mut s) if matches!(*s, SignupState::Active | SignupState::TimedOut) => {
                *s = SignupState::Closed;
                true
            }
            _ => false,
        }
    }

    pub fn mark_error(&self, raid_id: i64) {
        self.states.insert(raid_id, SignupState::ErrorDisabled);
    }

    /// Drop a terminal controller's entry. Absent raids take no component
    /// input, so retirement keeps the rejection while freeing the slot.
    pub fn retire(&self, raid_id: i64) {
        self.states.remove(&raid_id);
    }
}

pub async fn handle_component(ctx: &Context, it: &ComponentInteraction) -> anyhow::Result<()> {
    // Foreign components are someone else's problem.
    let Some((action, raid_id)) = parse_component_id(&it.data.custom_id) else {
        return Ok(());
    };

    if it.user.bot {
        return ephemeral(ctx, it, "Bot accounts cannot sign up.").await;
    }

    let registry = registry_from_ctx(ctx).await?;
    if !registry.accepts_input(raid_id) {
        return ephemeral(ctx, it, "Sign-ups for this raid are closed.").await;
    }

    match action {
        ComponentAction::Toggle(category) => toggle(ctx, it, raid_id, category).await,
        ComponentAction::CloseSignups => close_signups(ctx, it, raid_id).await,
    }
}

async fn toggle(
    ctx: &Context,
    it: &ComponentInteraction,
    raid_id: i64,
    category: Category,
) -> anyhow::Result<()> {
    let roster = roster_from_ctx(ctx).await?;
    let pool = pool_from_ctx(ctx).await?;
    let user_id = it.user.id.get() as i64;

    // The kind never changes, so reading it up front keeps every post-commit
    // step below free of storage reads.
    let kind = match repo::get_raid(&pool, raid_id).await {
        Ok(Some(raid)) => raid.kind(),
        Ok(None) => {
            return ephemeral(ctx, it, &RosterError::NotFound(raid_id).user_message()).await;
        }
        Err(err) => return disable_on_error(ctx, it, raid_id, RosterError::Db(err)).await,
    };

    let outcome = match roster.toggle(raid_id, category, user_id).await {
        Ok(outcome) => outcome,
        Err(err) if freezes_controller(&err) => {
            return disable_on_error(ctx, it, raid_id, err).await;
        }
        // Nothing was committed; the press can simply be retried.
        Err(err) => return ephemeral(ctx, it, &err.user_message()).await,
    };

    let tip = match outcome {
        ToggleOutcome::Joined(c) => format!("You're signed up as {}.", c.label(kind)),
        ToggleOutcome::Left(c) => format!("You're no longer signed up as {}.", c.label(kind)),
        ToggleOutcome::Redirected(_) => format!(
            "All {} slots are taken, you were added to the backups.",
            kind.leader_label()
        ),
        ToggleOutcome::Rejected(Reject::Full(c)) => {
            format!("Sorry, every {} slot is taken.", c.label(kind))
        }
        ToggleOutcome::Rejected(Reject::Closed) => {
            "Sign-ups for this raid are closed.".to_string()
        }
        ToggleOutcome::Rejected(Reject::AlreadyIn(c)) => format!(
            "You're already signed up as {}. Leave that slot first.",
            c.label(kind)
        ),
    };

    if outcome.mutated() {
        // The change is committed; a redraw failure from here on is a display
        // problem and must not read as a failed sign-up.
        if let Err(err) = render_public(&ctx.http, &pool, raid_id, false).await {
            return freeze_stale_display(ctx, it, raid_id, err).await;
        }
    }
    ephemeral(ctx, it, &tip).await
}

async fn close_signups(ctx: &Context, it: &ComponentInteraction, raid_id: i64) -> anyhow::Result<()> {
    let pool = pool_from_ctx(ctx).await?;
    let roster = roster_from_ctx(ctx).await?;
    let registry = registry_from_ctx(ctx).await?;

    let raid = match repo::get_raid(&pool, raid_id).await {
        Ok(Some(raid)) => raid,
        Ok(None) => {
            return ephemeral(ctx, it, &RosterError::NotFound(raid_id).user_message()).await;
        }
        Err(err) => return disable_on_error(ctx, it, raid_id, RosterError::Db(err)).await,
    };

    // The organiser who created the raid, or anyone holding the configured
    // organiser role, may close sign-ups early.
    let user_id = it.user.id.get() as i64;
    let mut allowed = raid.organiser == user_id;
    if !allowed {
        let guild = match repo::get_or_create_guild(&pool, raid.guild_id).await {
            Ok(guild) => guild,
            Err(err) => return disable_on_error(ctx, it, raid_id, RosterError::Db(err)).await,
        };
        if let (Some(role_id), Some(gid)) = (guild.organiser_role, it.guild_id) {
            if let Ok(member) = gid.member(&ctx.http, it.user.id).await {
                allowed = member.roles.iter().any(|r| r.get() as i64 == role_id);
            }
        }
    }
    if !allowed {
        return ephemeral(ctx, it, "Only an organiser can close sign-ups.").await;
    }

    match roster.close(raid_id).await {
        Ok(()) => {}
        Err(err) if freezes_controller(&err) => {
            return disable_on_error(ctx, it, raid_id, err).await;
        }
        Err(err) => return ephemeral(ctx, it, &err.user_message()).await,
    }
    if registry.mark_closed(raid_id) {
        // The close is committed and the gate already rejects presses; a
        // failed grey-out only leaves the display stale.
        if let Err(err) = render_public(&ctx.http, &pool, raid_id, true).await {
            warn!(raid_id, error = %err, "close render failed");
        }
    }
    registry.retire(raid_id);
    roster.forget(raid_id);
    ephemeral(ctx, it, "Sign-ups are now closed.").await
}

/// Whether an error poisons the whole controller or just this press.
/// `Conflict` and `NotFound` leave the store untouched and readable; only a
/// storage failure means further clicks run against unknown state.
fn freezes_controller(err: &RosterError) -> bool {
    matches!(err, RosterError::Db(_))
}

/// Storage failed mid-interaction. Fail closed: freeze the controller, grey
/// out the buttons, tell the user. Accepting further clicks against unknown
/// state could oversubscribe the roster.
async fn disable_on_error(
    ctx: &Context,
    it: &ComponentInteraction,
    raid_id: i64,
    err: RosterError,
) -> anyhow::Result<()> {
    error!(raid_id, error = %err, "sign-up controller failing closed");
    let registry = registry_from_ctx(ctx).await?;
    registry.mark_error(raid_id);

    if let Ok(pool) = pool_from_ctx(ctx).await {
        if let Err(render_err) = render_public(&ctx.http, &pool, raid_id, true).await {
            warn!(raid_id, error = %render_err, "could not disable sign-up buttons");
        }
    }
    ephemeral(ctx, it, &err.user_message()).await
}

/// A roster change landed but the announcement could not be redrawn, so the
/// public display no longer matches committed state. Freeze the controller,
/// and make clear to the acting user that their change itself went through.
async fn freeze_stale_display(
    ctx: &Context,
    it: &ComponentInteraction,
    raid_id: i64,
    err: anyhow::Error,
) -> anyhow::Result<()> {
    error!(raid_id, error = %err, "render failed after a committed roster change");
    let registry = registry_from_ctx(ctx).await?;
    registry.mark_error(raid_id);

    if let Ok(pool) = pool_from_ctx(ctx).await {
        if let Err(render_err) = render_public(&ctx.http, &pool, raid_id, true).await {
            warn!(raid_id, error = %render_err, "could not disable sign-up buttons");
        }
    }
    ephemeral(
        ctx,
        it,
        "Your sign-up change was saved, but the announcement could not be \
         updated. Sign-ups are paused until an organiser sorts the raid out.",
    )
    .await
}

/// Re-read the committed state and redraw the public announcement. Rendering
/// never trusts an in-memory roster; the store is authoritative.
pub async fn render_public(
    http: &Http,
    pool: &SqlitePool,
    raid_id: i64,
    disabled: bool,
) -> anyhow::Result<()> {
    let raid = repo::get_raid(pool, raid_id)
        .await?
        .ok_or(RosterError::NotFound(raid_id))?;
    let embed = embeds::raid_display(&raid, &raid.roster.0);
    ChannelId::new(raid.channel_id as u64)
        .edit_message(
            http,
            raid.message_id as u64,
            EditMessage::new()
                .embed(embed)
                .components(vec![menus::signup_row(raid_id, raid.kind(), disabled)]),
        )
        .await?;
    Ok(())
}

/// Arm the sign-up window timer. Fires at `apply_by`, disables the buttons
/// and flips the registry, unless the organiser already closed the raid.
pub fn spawn_signup_timeout(
    http: Arc<Http>,
    pool: SqlitePool,
    registry: Arc<SignupRegistry>,
    roster: Arc<RosterManager>,
    raid_id: i64,
    apply_by: chrono::DateTime<Utc>,
) {
    tokio::spawn(async move {
        let wait = (apply_by - Utc::now()).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;
        if registry.mark_timed_out(raid_id) {
            if let Err(err) = render_public(&http, &pool, raid_id, true).await {
                warn!(raid_id, error = %err, "sign-up timeout render failed");
            }
        }
        // Terminal either way once `apply_by` has passed; free both per-raid
        // entries.
        registry.retire(raid_id);
        roster.forget(raid_id);
    });
}

async fn ephemeral(ctx: &Context, it: &ComponentInteraction, tip: &str) -> anyhow::Result<()> {
    it.create_response(
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_only_fires_from_active() {
        let registry = SignupRegistry::new();
        registry.activate(7);
        assert!(registry.mark_timed_out(7));
        assert!(!registry.mark_timed_out(7));
        assert_eq!(registry.state(7), Some(SignupState::TimedOut));
    }

    #[test]
    fn close_after_timeout_wins_but_renders_once() {
        let registry = SignupRegistry::new();
        registry.activate(7);
        assert!(registry.mark_closed(7));
        // The later timeout must not re-render a closed controller.
        assert!(!registry.mark_timed_out(7));
        assert!(!registry.mark_closed(7));
        assert_eq!(registry.state(7), Some(SignupState::Closed));
    }

    #[test]
    fn error_state_is_terminal() {
        let registry = SignupRegistry::new();
        registry.activate(7);
        registry.mark_error(7);
        assert!(!registry.mark_closed(7));
        assert!(!registry.mark_timed_out(7));
        assert_eq!(registry.state(7), Some(SignupState::ErrorDisabled));
    }

    #[test]
    fn unknown_raids_have_no_state() {
        let registry = SignupRegistry::new();
        assert_eq!(registry.state(1), None);
        assert!(!registry.mark_timed_out(1));
        assert!(!registry.accepts_input(1));
    }

    #[test]
    fn display_failure_stops_further_presses() {
        let registry = SignupRegistry::new();
        registry.activate(7);
        assert!(registry.accepts_input(7));
        // A failed redraw after a committed change freezes the controller.
        registry.mark_error(7);
        assert!(!registry.accepts_input(7));
        assert_eq!(registry.state(7), Some(SignupState::ErrorDisabled));
    }

    #[test]
    fn only_storage_errors_freeze_the_controller() {
        assert!(!freezes_controller(&RosterError::Conflict));
        assert!(!freezes_controller(&RosterError::NotFound(1)));
        assert!(freezes_controller(&RosterError::Db(sqlx::Error::PoolClosed)));
    }

    #[test]
    fn retired_controllers_reject_input_and_free_the_slot() {
        let registry = SignupRegistry::new();
        registry.activate(7);
        assert!(registry.mark_closed(7));
        registry.retire(7);
        assert_eq!(registry.state(7), None);
        assert!(!registry.accepts_input(7));
        assert!(!registry.mark_timed_out(7));
    }
}
