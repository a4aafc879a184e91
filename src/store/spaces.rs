//! SQLite-backed space directory.
//!
//! Concrete implementation of the engine's outbound collaborators for
//! deployments that keep membership locally: spaces with thresholds and a
//! minimum proposal duration, members carrying voting power, and
//! administrators.
//!
//! Membership is stored as append-only power rows, each effective from a
//! timestamp. Power lookups take the latest row at or before the requested
//! time, so the directory can answer "what power did this member hold at
//! the proposal's snapshot?" long after the membership has changed. A
//! member added after a snapshot reports zero power at that snapshot.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use super::{StoreError, StoreResult};
use crate::governance::error::{GovernanceError, GovernanceResult};
use crate::governance::threshold::Thresholds;
use crate::governance::traits::{
    MemberId, SpaceConfigSource, SpaceId, Timestamp, VotingPowerSource,
};

pub(crate) async fn init_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS spaces (
            id                INTEGER PRIMARY KEY AUTOINCREMENT,
            name              TEXT    NOT NULL,
            owner             TEXT    NOT NULL,
            quorum_pct        INTEGER NOT NULL,
            unity_pct         INTEGER NOT NULL,
            min_duration_secs INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS space_members (
            space_id   INTEGER NOT NULL REFERENCES spaces(id),
            member     TEXT    NOT NULL,
            power      INTEGER NOT NULL DEFAULT 1,
            valid_from INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (space_id, member, valid_from)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS space_admins (
            space_id INTEGER NOT NULL REFERENCES spaces(id),
            member   TEXT    NOT NULL,
            PRIMARY KEY (space_id, member)
        )",
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Clone)]
pub struct SpaceDirectory {
    pool: SqlitePool,
}

impl SpaceDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a space. The owner becomes its first member (with power 1,
    /// effective from the beginning of time) and an administrator.
    pub async fn create_space(
        &self,
        name: &str,
        owner: &MemberId,
        thresholds: Thresholds,
        min_duration_secs: u64,
    ) -> GovernanceResult<SpaceId> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let result = sqlx::query(
            "INSERT INTO spaces (name, owner, quorum_pct, unity_pct, min_duration_secs)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(&owner.0)
        .bind(thresholds.quorum_pct as i64)
        .bind(thresholds.unity_pct as i64)
        .bind(min_duration_secs as i64)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        let space = SpaceId(result.last_insert_rowid() as u64);

        sqlx::query(
            "INSERT INTO space_members (space_id, member, power, valid_from) VALUES (?, ?, 1, 0)",
        )
        .bind(space.0 as i64)
        .bind(&owner.0)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(space)
    }

    /// Add a member or change an existing member's power, effective from
    /// the given time. Earlier power rows are kept, so proposals whose
    /// snapshot predates the change still see the old power.
    pub async fn add_member(
        &self,
        space: SpaceId,
        member: &MemberId,
        power: u64,
        effective_from: Timestamp,
    ) -> GovernanceResult<()> {
        self.require_space(space).await?;
        sqlx::query(
            "INSERT INTO space_members (space_id, member, power, valid_from) VALUES (?, ?, ?, ?)
             ON CONFLICT (space_id, member, valid_from) DO UPDATE SET power = excluded.power",
        )
        .bind(space.0 as i64)
        .bind(&member.0)
        .bind(power as i64)
        .bind(effective_from as i64)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(())
    }

    /// Remove a member by recording a zero-power row effective from the
    /// given time. History stays intact for earlier snapshots.
    pub async fn remove_member(
        &self,
        space: SpaceId,
        member: &MemberId,
        effective_from: Timestamp,
    ) -> GovernanceResult<()> {
        self.add_member(space, member, 0, effective_from).await
    }

    pub async fn add_administrator(
        &self,
        space: SpaceId,
        member: &MemberId,
    ) -> GovernanceResult<()> {
        self.require_space(space).await?;
        sqlx::query("INSERT OR IGNORE INTO space_admins (space_id, member) VALUES (?, ?)")
            .bind(space.0 as i64)
            .bind(&member.0)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    /// Change thresholds. Takes effect at the next evaluation of any open
    /// proposal in the space; nothing is re-snapshotted.
    pub async fn set_thresholds(
        &self,
        space: SpaceId,
        thresholds: Thresholds,
    ) -> GovernanceResult<()> {
        let result = sqlx::query("UPDATE spaces SET quorum_pct = ?, unity_pct = ? WHERE id = ?")
            .bind(thresholds.quorum_pct as i64)
            .bind(thresholds.unity_pct as i64)
            .bind(space.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(GovernanceError::UnknownSpace(space));
        }
        Ok(())
    }

    pub async fn set_minimum_duration(&self, space: SpaceId, secs: u64) -> GovernanceResult<()> {
        let result = sqlx::query("UPDATE spaces SET min_duration_secs = ? WHERE id = ?")
            .bind(secs as i64)
            .bind(space.0 as i64)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        if result.rows_affected() == 0 {
            return Err(GovernanceError::UnknownSpace(space));
        }
        Ok(())
    }

    async fn require_space(&self, space: SpaceId) -> GovernanceResult<()> {
        let row = sqlx::query("SELECT 1 FROM spaces WHERE id = ?")
            .bind(space.0 as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        if row.is_none() {
            return Err(GovernanceError::UnknownSpace(space));
        }
        Ok(())
    }

    async fn space_row(&self, space: SpaceId) -> GovernanceResult<(i64, i64, i64, String)> {
        let row = sqlx::query(
            "SELECT quorum_pct, unity_pct, min_duration_secs, owner FROM spaces WHERE id = ?",
        )
        .bind(space.0 as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?
        .ok_or(GovernanceError::UnknownSpace(space))?;

        Ok((
            row.try_get("quorum_pct").map_err(StoreError::from)?,
            row.try_get("unity_pct").map_err(StoreError::from)?,
            row.try_get("min_duration_secs").map_err(StoreError::from)?,
            row.try_get("owner").map_err(StoreError::from)?,
        ))
    }
}

#[async_trait]
impl VotingPowerSource for SpaceDirectory {
    async fn total_voting_power(&self, space: SpaceId, at: Timestamp) -> GovernanceResult<u64> {
        self.require_space(space).await?;
        // Per member, the latest power row at or before `at`; summed.
        let row = sqlx::query(
            "SELECT COALESCE(SUM(power), 0) AS total FROM space_members sm
             WHERE sm.space_id = ? AND sm.valid_from = (
                 SELECT MAX(m.valid_from) FROM space_members m
                 WHERE m.space_id = sm.space_id AND m.member = sm.member AND m.valid_from <= ?
             )",
        )
        .bind(space.0 as i64)
        .bind(at as i64)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::from)?;
        let total: i64 = row.try_get("total").map_err(StoreError::from)?;
        Ok(total as u64)
    }

    async fn voting_power_of(
        &self,
        space: SpaceId,
        member: &MemberId,
        at: Timestamp,
    ) -> GovernanceResult<u64> {
        let row = sqlx::query(
            "SELECT power FROM space_members
             WHERE space_id = ? AND member = ? AND valid_from <= ?
             ORDER BY valid_from DESC LIMIT 1",
        )
        .bind(space.0 as i64)
        .bind(&member.0)
        .bind(at as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;
        match row {
            Some(row) => {
                let power: i64 = row.try_get("power").map_err(StoreError::from)?;
                Ok(power as u64)
            }
            None => Ok(0),
        }
    }
}

#[async_trait]
impl SpaceConfigSource for SpaceDirectory {
    async fn thresholds(&self, space: SpaceId) -> GovernanceResult<Thresholds> {
        let (quorum_pct, unity_pct, _, _) = self.space_row(space).await?;
        Ok(Thresholds {
            quorum_pct: quorum_pct as u64,
            unity_pct: unity_pct as u64,
        })
    }

    async fn is_administrator(&self, space: SpaceId, member: &MemberId) -> GovernanceResult<bool> {
        let (_, _, _, owner) = self.space_row(space).await?;
        if owner == member.0 {
            return Ok(true);
        }
        let row = sqlx::query("SELECT 1 FROM space_admins WHERE space_id = ? AND member = ?")
            .bind(space.0 as i64)
            .bind(&member.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(row.is_some())
    }

    async fn minimum_duration(&self, space: SpaceId) -> GovernanceResult<u64> {
        let (_, _, min_duration, _) = self.space_row(space).await?;
        Ok(min_duration as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::open_database;
    use tempfile::TempDir;

    async fn directory() -> (TempDir, SpaceDirectory) {
        let dir = TempDir::new().unwrap();
        let pool = open_database(&dir.path().join("agora.db")).await.unwrap();
        (dir, SpaceDirectory::new(pool))
    }

    fn th(quorum: u64, unity: u64) -> Thresholds {
        Thresholds {
            quorum_pct: quorum,
            unity_pct: unity,
        }
    }

    #[tokio::test]
    async fn owner_is_member_and_administrator() {
        let (_dir, spaces) = directory().await;
        let owner = MemberId("alice".into());
        let space = spaces
            .create_space("garden", &owner, th(51, 80), 0)
            .await
            .unwrap();

        assert_eq!(spaces.voting_power_of(space, &owner, 0).await.unwrap(), 1);
        assert!(spaces.is_administrator(space, &owner).await.unwrap());
        assert!(!spaces
            .is_administrator(space, &MemberId("bob".into()))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn total_power_sums_member_weights() {
        let (_dir, spaces) = directory().await;
        let owner = MemberId("alice".into());
        let space = spaces
            .create_space("garden", &owner, th(51, 80), 0)
            .await
            .unwrap();

        spaces
            .add_member(space, &MemberId("bob".into()), 4, 0)
            .await
            .unwrap();
        spaces
            .add_member(space, &MemberId("carol".into()), 5, 0)
            .await
            .unwrap();

        assert_eq!(spaces.total_voting_power(space, 100).await.unwrap(), 10);
        assert_eq!(
            spaces
                .voting_power_of(space, &MemberId("dave".into()), 100)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn power_lookups_honor_the_requested_time() {
        let (_dir, spaces) = directory().await;
        let owner = MemberId("alice".into());
        let space = spaces
            .create_space("garden", &owner, th(51, 80), 0)
            .await
            .unwrap();
        let bob = MemberId("bob".into());
        let whale = MemberId("whale".into());

        spaces.add_member(space, &bob, 4, 0).await.unwrap();
        spaces.add_member(space, &whale, 1_000, 500).await.unwrap();

        // Before the whale joined: absent, and not counted in the total.
        assert_eq!(spaces.voting_power_of(space, &whale, 100).await.unwrap(), 0);
        assert_eq!(spaces.total_voting_power(space, 100).await.unwrap(), 5);

        // From 500 on, the whale's power is visible.
        assert_eq!(
            spaces.voting_power_of(space, &whale, 500).await.unwrap(),
            1_000
        );
        assert_eq!(spaces.total_voting_power(space, 600).await.unwrap(), 1_005);

        // A power change is effective from its own timestamp only.
        spaces.add_member(space, &bob, 9, 700).await.unwrap();
        assert_eq!(spaces.voting_power_of(space, &bob, 600).await.unwrap(), 4);
        assert_eq!(spaces.voting_power_of(space, &bob, 700).await.unwrap(), 9);

        // Removal zeroes power going forward, history stays readable.
        spaces.remove_member(space, &bob, 800).await.unwrap();
        assert_eq!(spaces.voting_power_of(space, &bob, 750).await.unwrap(), 9);
        assert_eq!(spaces.voting_power_of(space, &bob, 800).await.unwrap(), 0);
        assert_eq!(spaces.total_voting_power(space, 900).await.unwrap(), 1_001);
    }

    #[tokio::test]
    async fn thresholds_are_read_live() {
        let (_dir, spaces) = directory().await;
        let owner = MemberId("alice".into());
        let space = spaces
            .create_space("garden", &owner, th(51, 80), 0)
            .await
            .unwrap();

        assert_eq!(spaces.thresholds(space).await.unwrap(), th(51, 80));
        spaces.set_thresholds(space, th(30, 60)).await.unwrap();
        assert_eq!(spaces.thresholds(space).await.unwrap(), th(30, 60));
    }

    #[tokio::test]
    async fn unknown_space_is_an_error() {
        let (_dir, spaces) = directory().await;
        let err = spaces.thresholds(SpaceId(99)).await.unwrap_err();
        assert!(matches!(err, GovernanceError::UnknownSpace(SpaceId(99))));

        let err = spaces
            .set_minimum_duration(SpaceId(99), 60)
            .await
            .unwrap_err();
        assert!(matches!(err, GovernanceError::UnknownSpace(_)));
    }
}
