//! Persisted one-shot jobs: raid notifications and organiser-scheduled
//! messages. Jobs survive restarts; delivery is at-least-once, with the
//! sent markers on the raid row collapsing raid pings to exactly one send.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, CreateMessage, Http};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::db::models::{Job, Raid};
use crate::db::repo::{
    claim_notification, get_raid, insert_job, list_pending_jobs, mark_job_done, NotificationKind,
};
use crate::ui::messages;

/// Outbound delivery seam. The production implementation talks to Discord;
/// tests record sends in memory.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, channel_id: i64, content: &str) -> anyhow::Result<()>;
}

pub struct HttpMessenger {
    http: Arc<Http>,
}

impl HttpMessenger {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Messenger for HttpMessenger {
    async fn send_text(&self, channel_id: i64, content: &str) -> anyhow::Result<()> {
        ChannelId::new(channel_id as u64)
            .send_message(&self.http, CreateMessage::new().content(content))
            .await?;
        Ok(())
    }
}

/// What a fired job should do, stored as JSON in the `args` column.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobArgs {
    RaidReminder { raid_id: i64, ping_role: i64 },
    RaidStart { raid_id: i64, ping_role: i64 },
    SendMessage { channel_id: i64, text: String },
}

#[derive(Clone)]
pub struct Scheduler {
    pool: SqlitePool,
    messenger: Arc<dyn Messenger>,
}

impl Scheduler {
    pub fn new(pool: SqlitePool, messenger: Arc<dyn Messenger>) -> Self {
        Self { pool, messenger }
    }

    /// Queue the one-hour reminder and the start ping for a raid. Raids
    /// without a ping role get no notifications.
    pub async fn schedule_raid_notifications(&self, raid: &Raid) -> anyhow::Result<()> {
        let Some(ping_role) = raid.ping_role else {
            return Ok(());
        };

        let reminder = JobArgs::RaidReminder {
            raid_id: raid.id,
            ping_role,
        };
        let start = JobArgs::RaidStart {
            raid_id: raid.id,
            ping_role,
        };
        for (fire_at, args) in [
            (raid.happens_on - Duration::hours(1), reminder),
            (raid.happens_on, start),
        ] {
            let job = insert_job(
                &self.pool,
                raid.guild_id,
                fire_at,
                &serde_json::to_string(&args)?,
            )
            .await?;
            self.spawn(job);
        }
        Ok(())
    }

    /// Queue a free-form message for later delivery.
    pub async fn schedule_message(
        &self,
        guild_id: i64,
        channel_id: i64,
        fire_at: DateTime<Utc>,
        text: &str,
    ) -> anyhow::Result<Job> {
        let args = JobArgs::SendMessage {
            channel_id,
            text: text.to_string(),
        };
        let job = insert_job(&self.pool, guild_id, fire_at, &serde_json::to_string(&args)?).await?;
        self.spawn(job.clone());
        Ok(job)
    }

    /// Re-arm every pending job after a restart. Overdue jobs fire right away.
    pub async fn restore(&self) -> anyhow::Result<()> {
        let jobs = list_pending_jobs(&self.pool).await?;
        info!(count = jobs.len(), "restoring pending jobs");
        for job in jobs {
            self.spawn(job);
        }
        Ok(())
    }

    fn spawn(&self, job: Job) {
        let this = self.clone();
        tokio::spawn(async move {
            let wait = (job.fire_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            if let Err(err) = this.run(&job).await {
                warn!(job_id = job.id, error = %err, "scheduled job failed");
            }
        });
    }

    /// Execute one fired job. Deletions race with delivery; a raid that no
    /// longer exists makes the job a no-op rather than an error.
    pub async fn run(&self, job: &Job) -> anyhow::Result<()> {
        let args: JobArgs = serde_json::from_str(&job.args)?;
        match args {
            JobArgs::RaidReminder { raid_id, ping_role } => {
                self.raid_ping(job, raid_id, ping_role, NotificationKind::Reminder)
                    .await?;
            }
            JobArgs::RaidStart { raid_id, ping_role } => {
                self.raid_ping(job, raid_id, ping_role, NotificationKind::Start)
                    .await?;
            }
            JobArgs::SendMessage { channel_id, text } => {
                self.messenger.send_text(channel_id, &text).await?;
                mark_job_done(&self.pool, job.id).await?;
            }
        }
        Ok(())
    }

    async fn raid_ping(
        &self,
        job: &Job,
        raid_id: i64,
        ping_role: i64,
        kind: NotificationKind,
    ) -> anyhow::Result<()> {
        let Some(raid) = get_raid(&self.pool, raid_id).await? else {
            info!(raid_id, "raid gone before notification, skipping");
            mark_job_done(&self.pool, job.id).await?;
            return Ok(());
        };

        // Claim the marker first so a redelivered job cannot ping twice.
        if claim_notification(&self.pool, raid_id, kind).await? {
            let content = match kind {
                NotificationKind::Reminder => messages::raid_reminder(&raid, ping_role),
                NotificationKind::Start => messages::raid_now(&raid, ping_role),
            };
            self.messenger.send_text(raid.channel_id, &content).await?;
        }
        mark_job_done(&self.pool, job.id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::RaidKind;
    use crate::db::repo::{create_raid, list_pending_jobs_for_guild, set_raid_message};
    use crate::db::test_pool;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemMessenger {
        sent: Mutex<Vec<(i64, String)>>,
    }

    #[async_trait]
    impl Messenger for MemMessenger {
        async fn send_text(&self, channel_id: i64, content: &str) -> anyhow::Result<()> {
            self.sent.lock().await.push((channel_id, content.to_string()));
            Ok(())
        }
    }

    async fn setup() -> (SqlitePool, Arc<MemMessenger>, Scheduler) {
        let pool = test_pool().await;
        let messenger = Arc::new(MemMessenger::default());
        let scheduler = Scheduler::new(pool.clone(), messenger.clone());
        (pool, messenger, scheduler)
    }

    #[tokio::test]
    async fn redelivered_reminder_pings_once() {
        let (pool, messenger, scheduler) = setup().await;
        let raid = create_raid(
            &pool,
            1,
            10,
            "Starverse",
            "desc",
            RaidKind::Starverse,
            1,
            Some(55),
            Utc::now() + Duration::hours(1),
            Utc::now() + Duration::hours(2),
        )
        .await
        .unwrap();
        set_raid_message(&pool, raid.id, 900, 901).await.unwrap();

        let args = serde_json::to_string(&JobArgs::RaidReminder {
            raid_id: raid.id,
            ping_role: 55,
        })
        .unwrap();
        let job = insert_job(&pool, 1, Utc::now(), &args).await.unwrap();

        scheduler.run(&job).await.unwrap();
        scheduler.run(&job).await.unwrap();

        let sent = messenger.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 900);
        assert!(sent[0].1.contains("<@&55>"));
        assert!(sent[0].1.contains("1 hour"));
    }

    #[tokio::test]
    async fn notification_for_missing_raid_is_a_no_op() {
        let (pool, messenger, scheduler) = setup().await;
        let args = serde_json::to_string(&JobArgs::RaidStart {
            raid_id: 424242,
            ping_role: 55,
        })
        .unwrap();
        let job = insert_job(&pool, 1, Utc::now(), &args).await.unwrap();

        scheduler.run(&job).await.unwrap();

        assert!(messenger.sent.lock().await.is_empty());
        assert!(list_pending_jobs_for_guild(&pool, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_message_is_delivered_and_completed() {
        let (pool, messenger, scheduler) = setup().await;
        let args = serde_json::to_string(&JobArgs::SendMessage {
            channel_id: 77,
            text: "movie night!".into(),
        })
        .unwrap();
        let job = insert_job(&pool, 1, Utc::now(), &args).await.unwrap();

        scheduler.run(&job).await.unwrap();

        let sent = messenger.sent.lock().await;
        assert_eq!(sent.as_slice(), &[(77, "movie night!".to_string())]);
        drop(sent);
        assert!(list_pending_jobs_for_guild(&pool, 1).await.unwrap().is_empty());
    }

    #[test]
    fn job_args_round_trip() {
        let args = JobArgs::SendMessage {
            channel_id: 1,
            text: "hi".into(),
        };
        let json = serde_json::to_string(&args).unwrap();
        assert!(json.contains("\"kind\":\"send_message\""));
        assert_eq!(serde_json::from_str::<JobArgs>(&json).unwrap(), args);
    }
}
