use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

/// Per-guild configuration. Typed columns instead of a free-form blob; a
/// feature is usable once the fields it needs are set via `/configure`.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct GuildConfig {
    pub id: i64,
    pub warden_role: Option<i64>,
    pub inmate_role: Option<i64>,
    pub organiser_role: Option<i64>,
    pub jail_channel: Option<i64>,
    pub log_channel: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl GuildConfig {
    /// Jail commands need the warden role, the inmate role and a jail channel.
    pub fn jail_ready(&self) -> bool {
        self.warden_role.is_some() && self.inmate_role.is_some() && self.jail_channel.is_some()
    }

    pub fn raid_ready(&self) -> bool {
        self.organiser_role.is_some()
    }
}

/// The raid variant decides capacity policy and what a "leader" is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaidKind {
    /// Single leader, 19 supports, full categories reject outright.
    Starverse,
    /// `arrays` drivers, 4×arrays supports, a full driver list demotes the
    /// request into the unbounded backup list.
    Kunlun,
}

impl RaidKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RaidKind::Starverse => "starverse",
            RaidKind::Kunlun => "kunlun",
        }
    }

    pub fn parse(s: &str) -> Option<RaidKind> {
        match s {
            "starverse" => Some(RaidKind::Starverse),
            "kunlun" => Some(RaidKind::Kunlun),
            _ => None,
        }
    }

    pub fn leader_label(&self) -> &'static str {
        match self {
            RaidKind::Starverse => "leader",
            RaidKind::Kunlun => "driver",
        }
    }

    pub fn leader_capacity(&self, arrays: i64) -> usize {
        match self {
            RaidKind::Starverse => 1,
            RaidKind::Kunlun => arrays.max(1) as usize,
        }
    }

    pub fn support_capacity(&self, arrays: i64) -> usize {
        match self {
            RaidKind::Starverse => 19,
            RaidKind::Kunlun => (4 * arrays.max(1)) as usize,
        }
    }

    /// Whether a full leader category overflows into backups.
    pub fn overflow_to_backup(&self) -> bool {
        matches!(self, RaidKind::Kunlun)
    }
}

/// Participant sets for one raid, stored as a JSON column on the raid row.
/// Invariant (enforced by the roster manager): a user id appears in at most
/// one of the three lists.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    pub leaders: Vec<i64>,
    pub backups: Vec<i64>,
    pub supports: Vec<i64>,
}

/// A scheduled group event with a capacity-bounded sign-up roster.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Raid {
    pub id: i64,
    pub guild_id: i64,
    pub organiser: i64,
    pub title: String,
    pub description: String,
    pub kind: String,
    pub arrays: i64,
    pub channel_id: i64,
    pub message_id: i64,
    pub ping_role: Option<i64>,
    pub roster: Json<Roster>,
    pub apply_by: DateTime<Utc>,
    pub happens_on: DateTime<Utc>,
    pub reminder_sent: bool,
    pub start_sent: bool,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Raid {
    pub fn kind(&self) -> RaidKind {
        RaidKind::parse(&self.kind).unwrap_or(RaidKind::Starverse)
    }

    pub fn is_closed(&self, now: DateTime<Utc>) -> bool {
        now >= self.apply_by
    }
}

/// One active puzzle per (guild, user). Sudoku grids and solutions are
/// 81-character row-major digit strings, `0` for an empty cell.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Riddle {
    pub guild_id: i64,
    pub user_id: i64,
    pub text: String,
    pub solution: String,
    pub is_sudoku: bool,
    pub updated_at: DateTime<Utc>,
}

/// A persisted one-shot job; restored on startup and executed at-least-once.
#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub guild_id: i64,
    pub fire_at: DateTime<Utc>,
    pub args: String,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}
