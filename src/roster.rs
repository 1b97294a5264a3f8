//! Race-safe, capacity-aware mutation of a raid's roster.
//!
//! All mutators for one raid are serialised through a per-raid async lock, and
//! every write is a versioned conditional update on top of that, so a process
//! sharing the database with another writer still cannot lose an update. The
//! closed check runs on the freshly-read row inside the locked section.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::db::models::{RaidKind, Roster};
use crate::db::repo;
use crate::error::RosterError;

const MAX_CAS_RETRIES: u32 = 5;

/// A named role slot in a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Leader,
    Backup,
    Support,
}

impl Category {
    pub fn label(&self, kind: RaidKind) -> &'static str {
        match self {
            Category::Leader => kind.leader_label(),
            Category::Backup => "backup",
            Category::Support => "support",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// The bounded category has no free slot.
    Full(Category),
    /// Sign-ups are closed (`apply_by` has passed).
    Closed,
    /// The user already occupies a different category.
    AlreadyIn(Category),
}

/// What a toggle did, so the caller can acknowledge it precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Joined(Category),
    Left(Category),
    /// The requested category was full; the user landed in `Category::Backup`.
    Redirected(Category),
    Rejected(Reject),
}

impl ToggleOutcome {
    /// Whether the roster changed and the public display needs a re-render.
    pub fn mutated(&self) -> bool {
        !matches!(self, ToggleOutcome::Rejected(_))
    }
}

impl Roster {
    pub fn members(&self, category: Category) -> &Vec<i64> {
        match category {
            Category::Leader => &self.leaders,
            Category::Backup => &self.backups,
            Category::Support => &self.supports,
        }
    }

    fn members_mut(&mut self, category: Category) -> &mut Vec<i64> {
        match category {
            Category::Leader => &mut self.leaders,
            Category::Backup => &mut self.backups,
            Category::Support => &mut self.supports,
        }
    }

    /// The single category a user occupies, if any.
    pub fn category_of(&self, user_id: i64) -> Option<Category> {
        for category in [Category::Leader, Category::Backup, Category::Support] {
            if self.members(category).contains(&user_id) {
                return Some(category);
            }
        }
        None
    }
}

/// Pure toggle semantics, applied to an already-loaded roster. Separated from
/// the persistence loop so the policy table is testable on its own.
pub fn apply_toggle(
    roster: &mut Roster,
    kind: RaidKind,
    arrays: i64,
    category: Category,
    user_id: i64,
) -> ToggleOutcome {
    if let Some(current) = roster.category_of(user_id) {
        if current == category {
            // Idempotent leave.
            roster.members_mut(category).retain(|&u| u != user_id);
            return ToggleOutcome::Left(category);
        }
        return ToggleOutcome::Rejected(Reject::AlreadyIn(current));
    }

    let capacity = match category {
        Category::Leader => Some(kind.leader_capacity(arrays)),
        Category::Support => Some(kind.support_capacity(arrays)),
        Category::Backup => None,
    };

    if let Some(cap) = capacity {
        if roster.members(category).len() >= cap {
            // Policy divergence between the raid variants: kunlun demotes a
            // full driver join into the backup list, starverse rejects.
            if category == Category::Leader && kind.overflow_to_backup() {
                roster.backups.push(user_id);
                return ToggleOutcome::Redirected(Category::Backup);
            }
            return ToggleOutcome::Rejected(Reject::Full(category));
        }
    }

    roster.members_mut(category).push(user_id);
    ToggleOutcome::Joined(category)
}

/// Owns the per-raid locks and the read-modify-write loop against the store.
pub struct RosterManager {
    pool: SqlitePool,
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl RosterManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, raid_id: i64) -> Arc<Mutex<()>> {
        self.locks
            .entry(raid_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Toggle `user_id`'s membership in `category` for `raid_id`.
    ///
    /// Reads the current persisted roster, applies the toggle, writes back
    /// conditionally; on a version conflict the whole section is retried with
    /// fresh state, bounded by `MAX_CAS_RETRIES`.
    pub async fn toggle(
        &self,
        raid_id: i64,
        category: Category,
        user_id: i64,
    ) -> Result<ToggleOutcome, RosterError> {
        let lock = self.lock_for(raid_id);
        let _guard = lock.lock().await;

        for _ in 0..MAX_CAS_RETRIES {
            let raid = repo::get_raid(&self.pool, raid_id)
                .await?
                .ok_or(RosterError::NotFound(raid_id))?;

            if raid.is_closed(Utc::now()) {
                return Ok(ToggleOutcome::Rejected(Reject::Closed));
            }

            let mut roster = raid.roster.0.clone();
            let outcome = apply_toggle(&mut roster, raid.kind(), raid.arrays, category, user_id);
            if !outcome.mutated() {
                return Ok(outcome);
            }
            if repo::update_roster(&self.pool, raid_id, raid.version, &roster).await? {
                return Ok(outcome);
            }
            // Another writer committed first; reload and retry.
        }
        Err(RosterError::Conflict)
    }

    /// Latest committed roster, straight from the store.
    pub async fn get_roster(&self, raid_id: i64) -> Result<Roster, RosterError> {
        let raid = repo::get_raid(&self.pool, raid_id)
            .await?
            .ok_or(RosterError::NotFound(raid_id))?;
        Ok(raid.roster.0)
    }

    /// Freeze sign-ups now. Runs under the same per-raid lock as `toggle`, so
    /// an in-flight join either lands before the freeze or is rejected.
    pub async fn close(&self, raid_id: i64) -> Result<(), RosterError> {
        let lock = self.lock_for(raid_id);
        let _guard = lock.lock().await;

        for _ in 0..MAX_CAS_RETRIES {
            let raid = repo::get_raid(&self.pool, raid_id)
                .await?
                .ok_or(RosterError::NotFound(raid_id))?;
            let now = Utc::now();
            if raid.is_closed(now) {
                return Ok(());
            }
            if repo::close_raid(&self.pool, raid_id, raid.version, now).await? {
                return Ok(());
            }
        }
        Err(RosterError::Conflict)
    }

    /// Drop the per-raid lock entry once the raid has reached a terminal
    /// state. A straggling toggle recreates the entry and is then rejected by
    /// the closed check, so eviction never reopens anything.
    pub fn forget(&self, raid_id: i64) {
        self.locks.remove(&raid_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Raid;
    use crate::db::test_pool;
    use chrono::Duration;

    async fn make_raid(pool: &SqlitePool, kind: RaidKind, arrays: i64) -> Raid {
        repo::create_raid(
            pool,
            1,
            100,
            "test raid",
            "desc",
            kind,
            arrays,
            None,
            Utc::now() + Duration::hours(1),
            Utc::now() + Duration::hours(2),
        )
        .await
        .unwrap()
    }

    #[test]
    fn toggle_join_then_leave_restores_prior_state() {
        let mut roster = Roster::default();
        let before = roster.clone();
        assert_eq!(
            apply_toggle(&mut roster, RaidKind::Starverse, 1, Category::Support, 7),
            ToggleOutcome::Joined(Category::Support)
        );
        assert_eq!(
            apply_toggle(&mut roster, RaidKind::Starverse, 1, Category::Support, 7),
            ToggleOutcome::Left(Category::Support)
        );
        assert_eq!(roster, before);
    }

    #[test]
    fn user_occupies_at_most_one_category() {
        let mut roster = Roster::default();
        apply_toggle(&mut roster, RaidKind::Starverse, 1, Category::Leader, 7);
        let outcome = apply_toggle(&mut roster, RaidKind::Starverse, 1, Category::Support, 7);
        assert_eq!(
            outcome,
            ToggleOutcome::Rejected(Reject::AlreadyIn(Category::Leader))
        );
        assert_eq!(roster.leaders, vec![7]);
        assert!(roster.supports.is_empty());
    }

    #[test]
    fn starverse_full_leader_rejects() {
        let mut roster = Roster::default();
        apply_toggle(&mut roster, RaidKind::Starverse, 1, Category::Leader, 1);
        let outcome = apply_toggle(&mut roster, RaidKind::Starverse, 1, Category::Leader, 2);
        assert_eq!(
            outcome,
            ToggleOutcome::Rejected(Reject::Full(Category::Leader))
        );
        assert_eq!(roster.leaders, vec![1]);
    }

    #[test]
    fn kunlun_full_driver_redirects_to_backup() {
        let mut roster = Roster::default();
        for u in 1..=3 {
            assert_eq!(
                apply_toggle(&mut roster, RaidKind::Kunlun, 3, Category::Leader, u),
                ToggleOutcome::Joined(Category::Leader)
            );
        }
        let outcome = apply_toggle(&mut roster, RaidKind::Kunlun, 3, Category::Leader, 4);
        assert_eq!(outcome, ToggleOutcome::Redirected(Category::Backup));
        assert_eq!(roster.leaders, vec![1, 2, 3]);
        assert_eq!(roster.backups, vec![4]);
    }

    #[test]
    fn kunlun_full_support_still_rejects() {
        let mut roster = Roster::default();
        for u in 1..=4 {
            apply_toggle(&mut roster, RaidKind::Kunlun, 1, Category::Support, u);
        }
        let outcome = apply_toggle(&mut roster, RaidKind::Kunlun, 1, Category::Support, 5);
        assert_eq!(
            outcome,
            ToggleOutcome::Rejected(Reject::Full(Category::Support))
        );
        assert_eq!(roster.supports.len(), 4);
    }

    #[tokio::test]
    async fn twenty_users_on_nineteen_support_slots() {
        let pool = test_pool().await;
        let raid = make_raid(&pool, RaidKind::Starverse, 1).await;
        let mgr = Arc::new(RosterManager::new(pool.clone()));

        let mut handles = Vec::new();
        for user in 1..=20i64 {
            let mgr = mgr.clone();
            let raid_id = raid.id;
            handles.push(tokio::spawn(async move {
                mgr.toggle(raid_id, Category::Support, user).await.unwrap()
            }));
        }

        let mut joined = 0;
        let mut rejected_full = 0;
        for h in handles {
            match h.await.unwrap() {
                ToggleOutcome::Joined(Category::Support) => joined += 1,
                ToggleOutcome::Rejected(Reject::Full(Category::Support)) => rejected_full += 1,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(joined, 19);
        assert_eq!(rejected_full, 1);

        let roster = mgr.get_roster(raid.id).await.unwrap();
        assert_eq!(roster.supports.len(), 19);
    }

    #[tokio::test]
    async fn concurrent_toggles_are_serialisable() {
        let pool = test_pool().await;
        let raid = make_raid(&pool, RaidKind::Kunlun, 2).await;
        let mgr = Arc::new(RosterManager::new(pool.clone()));

        // Each user presses twice: join then leave, racing everyone else.
        let mut handles = Vec::new();
        for user in 1..=10i64 {
            let mgr = mgr.clone();
            let raid_id = raid.id;
            handles.push(tokio::spawn(async move {
                let a = mgr.toggle(raid_id, Category::Support, user).await.unwrap();
                let b = mgr.toggle(raid_id, Category::Support, user).await.unwrap();
                (a, b)
            }));
        }

        for h in handles {
            let (a, b) = h.await.unwrap();
            // Whatever the interleaving, the second press undoes the first.
            match (a, b) {
                (ToggleOutcome::Joined(_), ToggleOutcome::Left(_)) => {}
                (ToggleOutcome::Rejected(Reject::Full(_)), ToggleOutcome::Joined(_))
                | (ToggleOutcome::Rejected(Reject::Full(_)), ToggleOutcome::Rejected(_)) => {
                    // the first press lost the capacity race; membership is
                    // checked below either way
                }
                other => panic!("unexpected pair: {other:?}"),
            }
        }

        // No lost updates: sizes within capacity, no duplicate members.
        let roster = mgr.get_roster(raid.id).await.unwrap();
        assert!(roster.supports.len() <= 8);
        let mut seen = roster.supports.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), roster.supports.len());
    }

    #[tokio::test]
    async fn capacity_holds_under_concurrent_joins() {
        let pool = test_pool().await;
        let raid = make_raid(&pool, RaidKind::Kunlun, 3).await;
        let mgr = Arc::new(RosterManager::new(pool.clone()));

        let mut handles = Vec::new();
        for user in 1..=8i64 {
            let mgr = mgr.clone();
            let raid_id = raid.id;
            handles.push(tokio::spawn(async move {
                mgr.toggle(raid_id, Category::Leader, user).await.unwrap()
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let roster = mgr.get_roster(raid.id).await.unwrap();
        assert_eq!(roster.leaders.len(), 3);
        assert_eq!(roster.backups.len(), 5);
        // One category per user, across all 8.
        for user in 1..=8i64 {
            let occupancy = [&roster.leaders, &roster.backups, &roster.supports]
                .iter()
                .filter(|set| set.contains(&user))
                .count();
            assert_eq!(occupancy, 1, "user {user} appears {occupancy} times");
        }
    }

    #[tokio::test]
    async fn toggle_after_close_rejects_and_leaves_roster_untouched() {
        let pool = test_pool().await;
        let raid = make_raid(&pool, RaidKind::Starverse, 1).await;
        let mgr = RosterManager::new(pool.clone());

        mgr.toggle(raid.id, Category::Support, 1).await.unwrap();
        let before = mgr.get_roster(raid.id).await.unwrap();

        mgr.close(raid.id).await.unwrap();

        let outcome = mgr.toggle(raid.id, Category::Support, 2).await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Rejected(Reject::Closed));
        assert_eq!(mgr.get_roster(raid.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn forget_releases_lock_entry_without_reopening() {
        let pool = test_pool().await;
        let raid = make_raid(&pool, RaidKind::Starverse, 1).await;
        let mgr = RosterManager::new(pool.clone());

        mgr.toggle(raid.id, Category::Support, 1).await.unwrap();
        mgr.close(raid.id).await.unwrap();
        mgr.forget(raid.id);
        assert!(mgr.locks.is_empty());

        // A press after eviction takes a fresh lock and is still rejected.
        let outcome = mgr.toggle(raid.id, Category::Support, 2).await.unwrap();
        assert_eq!(outcome, ToggleOutcome::Rejected(Reject::Closed));
    }

    #[tokio::test]
    async fn unknown_raid_is_not_found() {
        let pool = test_pool().await;
        let mgr = RosterManager::new(pool);
        match mgr.toggle(9999, Category::Support, 1).await {
            Err(RosterError::NotFound(9999)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }
}
