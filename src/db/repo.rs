use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::db::models::{GuildConfig, Job, Raid, RaidKind, Riddle, Roster};

/* Guild configuration */

pub async fn get_or_create_guild(
    pool: &SqlitePool,
    guild_id: i64,
) -> Result<GuildConfig, sqlx::Error> {
    sqlx::query("INSERT OR IGNORE INTO guilds (id, updated_at) VALUES (?, ?)")
        .bind(guild_id)
        .bind(Utc::now())
        .execute(pool)
        .await?;

    let guild = sqlx::query_as::<_, GuildConfig>("SELECT * FROM guilds WHERE id = ?")
        .bind(guild_id)
        .fetch_one(pool)
        .await?;
    Ok(guild)
}

/// Which configurable field a `/configure` command targets. The column names
/// are fixed here, never interpolated from user input.
#[derive(Debug, Clone, Copy)]
pub enum GuildField {
    WardenRole,
    InmateRole,
    OrganiserRole,
    JailChannel,
    LogChannel,
}

impl GuildField {
    fn column(&self) -> &'static str {
        match self {
            GuildField::WardenRole => "warden_role",
            GuildField::InmateRole => "inmate_role",
            GuildField::OrganiserRole => "organiser_role",
            GuildField::JailChannel => "jail_channel",
            GuildField::LogChannel => "log_channel",
        }
    }
}

pub async fn set_guild_field(
    pool: &SqlitePool,
    guild_id: i64,
    field: GuildField,
    value: i64,
) -> anyhow::Result<()> {
    let _ = get_or_create_guild(pool, guild_id).await?;
    let sql = format!(
        "UPDATE guilds SET {} = ?, updated_at = ? WHERE id = ?",
        field.column()
    );
    sqlx::query(&sql)
        .bind(value)
        .bind(Utc::now())
        .bind(guild_id)
        .execute(pool)
        .await?;
    Ok(())
}

/* Raids */

#[allow(clippy::too_many_arguments)]
pub async fn create_raid(
    pool: &SqlitePool,
    guild_id: i64,
    organiser: i64,
    title: &str,
    description: &str,
    kind: RaidKind,
    arrays: i64,
    ping_role: Option<i64>,
    apply_by: DateTime<Utc>,
    happens_on: DateTime<Utc>,
) -> anyhow::Result<Raid> {
    let res = sqlx::query(
        r#"
        INSERT INTO raids
            (guild_id, organiser, title, description, kind, arrays, ping_role,
             roster, apply_by, happens_on, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(guild_id)
    .bind(organiser)
    .bind(title)
    .bind(description)
    .bind(kind.as_str())
    .bind(arrays)
    .bind(ping_role)
    .bind(Json(Roster::default()))
    .bind(apply_by)
    .bind(happens_on)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let id = res.last_insert_rowid();
    let raid = sqlx::query_as::<_, Raid>("SELECT * FROM raids WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(raid)
}

pub async fn get_raid(pool: &SqlitePool, raid_id: i64) -> Result<Option<Raid>, sqlx::Error> {
    sqlx::query_as::<_, Raid>("SELECT * FROM raids WHERE id = ?")
        .bind(raid_id)
        .fetch_optional(pool)
        .await
}

/// Record where the public announcement lives, so the roster display and the
/// scheduled notifications can find it later.
pub async fn set_raid_message(
    pool: &SqlitePool,
    raid_id: i64,
    channel_id: i64,
    message_id: i64,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE raids SET channel_id = ?, message_id = ?, updated_at = ? WHERE id = ?")
        .bind(channel_id)
        .bind(message_id)
        .bind(Utc::now())
        .bind(raid_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Versioned conditional write of the roster column. Returns false when
/// someone else committed in between; the caller re-reads and retries.
/// A plain overwrite here would reintroduce the lost-update race.
pub async fn update_roster(
    pool: &SqlitePool,
    raid_id: i64,
    expected_version: i64,
    roster: &Roster,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r#"
        UPDATE raids SET roster = ?, version = version + 1, updated_at = ?
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(Json(roster))
    .bind(Utc::now())
    .bind(raid_id)
    .bind(expected_version)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Freeze sign-ups by moving `apply_by` to `now`, same versioned write as the
/// roster so it cannot race an in-flight join.
pub async fn close_raid(
    pool: &SqlitePool,
    raid_id: i64,
    expected_version: i64,
    now: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r#"
        UPDATE raids SET apply_by = ?, version = version + 1, updated_at = ?
        WHERE id = ? AND version = ?
        "#,
    )
    .bind(now)
    .bind(now)
    .bind(raid_id)
    .bind(expected_version)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Reminder,
    Start,
}

/// Claim the "already sent" marker for a notification. Returns true for the
/// first caller only; redelivered jobs see false and skip the send.
pub async fn claim_notification(
    pool: &SqlitePool,
    raid_id: i64,
    kind: NotificationKind,
) -> anyhow::Result<bool> {
    let sql = match kind {
        NotificationKind::Reminder => {
            "UPDATE raids SET reminder_sent = 1, updated_at = ? WHERE id = ? AND reminder_sent = 0"
        }
        NotificationKind::Start => {
            "UPDATE raids SET start_sent = 1, updated_at = ? WHERE id = ? AND start_sent = 0"
        }
    };
    let res = sqlx::query(sql)
        .bind(Utc::now())
        .bind(raid_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() == 1)
}

/// Raids whose sign-up window is still open; used to rebuild the interactive
/// controllers after a restart.
pub async fn list_open_raids(pool: &SqlitePool) -> anyhow::Result<Vec<Raid>> {
    let raids = sqlx::query_as::<_, Raid>("SELECT * FROM raids WHERE apply_by > ?")
        .bind(Utc::now())
        .fetch_all(pool)
        .await?;
    Ok(raids)
}

/* Riddles */

pub async fn create_riddle(
    pool: &SqlitePool,
    guild_id: i64,
    user_id: i64,
    text: &str,
    solution: &str,
) -> anyhow::Result<Riddle> {
    sqlx::query(
        r#"
        INSERT INTO riddles (guild_id, user_id, text, solution, is_sudoku, updated_at)
        VALUES (?, ?, ?, ?, 0, ?)
        ON CONFLICT (guild_id, user_id) DO NOTHING
        "#,
    )
    .bind(guild_id)
    .bind(user_id)
    .bind(text)
    .bind(solution)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let riddle =
        sqlx::query_as::<_, Riddle>("SELECT * FROM riddles WHERE guild_id = ? AND user_id = ?")
            .bind(guild_id)
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(riddle)
}

pub async fn get_riddle(
    pool: &SqlitePool,
    guild_id: i64,
    user_id: i64,
) -> anyhow::Result<Option<Riddle>> {
    let riddle =
        sqlx::query_as::<_, Riddle>("SELECT * FROM riddles WHERE guild_id = ? AND user_id = ?")
            .bind(guild_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(riddle)
}

/// Swap a text riddle for a sudoku puzzle.
pub async fn update_riddle(
    pool: &SqlitePool,
    guild_id: i64,
    user_id: i64,
    text: &str,
    solution: &str,
    is_sudoku: bool,
) -> anyhow::Result<Riddle> {
    sqlx::query(
        r#"
        UPDATE riddles SET text = ?, solution = ?, is_sudoku = ?, updated_at = ?
        WHERE guild_id = ? AND user_id = ?
        "#,
    )
    .bind(text)
    .bind(solution)
    .bind(is_sudoku)
    .bind(Utc::now())
    .bind(guild_id)
    .bind(user_id)
    .execute(pool)
    .await?;

    let riddle =
        sqlx::query_as::<_, Riddle>("SELECT * FROM riddles WHERE guild_id = ? AND user_id = ?")
            .bind(guild_id)
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    Ok(riddle)
}

pub async fn delete_riddle(pool: &SqlitePool, guild_id: i64, user_id: i64) -> anyhow::Result<()> {
    sqlx::query("DELETE FROM riddles WHERE guild_id = ? AND user_id = ?")
        .bind(guild_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

/* Jobs */

pub async fn insert_job(
    pool: &SqlitePool,
    guild_id: i64,
    fire_at: DateTime<Utc>,
    args: &str,
) -> anyhow::Result<Job> {
    let res = sqlx::query(
        "INSERT INTO jobs (guild_id, fire_at, args, done, created_at) VALUES (?, ?, ?, 0, ?)",
    )
    .bind(guild_id)
    .bind(fire_at)
    .bind(args)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
        .bind(res.last_insert_rowid())
        .fetch_one(pool)
        .await?;
    Ok(job)
}

pub async fn list_pending_jobs(pool: &SqlitePool) -> anyhow::Result<Vec<Job>> {
    let jobs = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE done = 0 ORDER BY fire_at ASC")
        .fetch_all(pool)
        .await?;
    Ok(jobs)
}

pub async fn list_pending_jobs_for_guild(
    pool: &SqlitePool,
    guild_id: i64,
) -> anyhow::Result<Vec<Job>> {
    let jobs = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs WHERE done = 0 AND guild_id = ? ORDER BY fire_at ASC",
    )
    .bind(guild_id)
    .fetch_all(pool)
    .await?;
    Ok(jobs)
}

pub async fn mark_job_done(pool: &SqlitePool, job_id: i64) -> anyhow::Result<()> {
    sqlx::query("UPDATE jobs SET done = 1 WHERE id = ?")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn guild_get_or_create_is_idempotent() {
        let pool = test_pool().await;
        let a = get_or_create_guild(&pool, 42).await.unwrap();
        set_guild_field(&pool, 42, GuildField::JailChannel, 777)
            .await
            .unwrap();
        let b = get_or_create_guild(&pool, 42).await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.jail_channel, Some(777));
        assert!(!b.jail_ready());
    }

    #[tokio::test]
    async fn roster_update_is_conditional_on_version() {
        let pool = test_pool().await;
        let raid = create_raid(
            &pool,
            1,
            10,
            "Starverse",
            "desc",
            RaidKind::Starverse,
            1,
            None,
            Utc::now() + chrono::Duration::hours(1),
            Utc::now() + chrono::Duration::hours(2),
        )
        .await
        .unwrap();

        let mut roster = raid.roster.0.clone();
        roster.supports.push(5);
        assert!(update_roster(&pool, raid.id, raid.version, &roster)
            .await
            .unwrap());

        // Stale version must lose.
        roster.supports.push(6);
        assert!(!update_roster(&pool, raid.id, raid.version, &roster)
            .await
            .unwrap());

        let fresh = get_raid(&pool, raid.id).await.unwrap().unwrap();
        assert_eq!(fresh.roster.0.supports, vec![5]);
        assert_eq!(fresh.version, raid.version + 1);
    }

    #[tokio::test]
    async fn notification_claim_is_single_shot() {
        let pool = test_pool().await;
        let raid = create_raid(
            &pool,
            1,
            10,
            "Kunlun",
            "desc",
            RaidKind::Kunlun,
            3,
            Some(99),
            Utc::now() + chrono::Duration::hours(1),
            Utc::now() + chrono::Duration::hours(2),
        )
        .await
        .unwrap();

        assert!(claim_notification(&pool, raid.id, NotificationKind::Reminder)
            .await
            .unwrap());
        assert!(!claim_notification(&pool, raid.id, NotificationKind::Reminder)
            .await
            .unwrap());
        // The start marker is independent.
        assert!(claim_notification(&pool, raid.id, NotificationKind::Start)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn riddle_lifecycle() {
        let pool = test_pool().await;
        let r = create_riddle(&pool, 1, 2, "What walks on four legs?", "man")
            .await
            .unwrap();
        assert!(!r.is_sudoku);

        // create is get-or-create: a second insert keeps the first puzzle
        let again = create_riddle(&pool, 1, 2, "other", "other").await.unwrap();
        assert_eq!(again.solution, "man");

        let swapped = update_riddle(&pool, 1, 2, "0".repeat(81).as_str(), "1".repeat(81).as_str(), true)
            .await
            .unwrap();
        assert!(swapped.is_sudoku);

        delete_riddle(&pool, 1, 2).await.unwrap();
        assert!(get_riddle(&pool, 1, 2).await.unwrap().is_none());
    }
}
