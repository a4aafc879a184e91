//! Durable SQLite-backed proposal store.
//!
//! WAL-journaled database holding the proposal ledger and one row per
//! ballot. Terminal transitions are guarded `UPDATE ... WHERE` statements
//! so the database itself enforces the "set exactly once" invariant, and a
//! resolved proposal's state survives restarts.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteRow};
use sqlx::Row;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::{spaces, ProposalStore, StoreError, StoreResult};
use crate::governance::proposal::{Ballot, NewProposal, Operation, Proposal};
use crate::governance::traits::{MemberId, ProposalId, SpaceId};

/// Open (creating if missing) the agora database and initialize the schema
/// for both the proposal ledger and the space directory.
pub async fn open_database(path: &Path) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePool::connect_with(options).await?;
    init_schema(&pool).await?;
    spaces::init_schema(&pool).await?;
    Ok(pool)
}

async fn init_schema(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS proposals (
            id                 INTEGER PRIMARY KEY AUTOINCREMENT,
            space_id           INTEGER NOT NULL,
            creator            TEXT    NOT NULL,
            start_time         INTEGER NOT NULL,
            end_time           INTEGER NOT NULL,
            total_power        INTEGER NOT NULL,
            yes_votes          INTEGER NOT NULL DEFAULT 0,
            no_votes           INTEGER NOT NULL DEFAULT 0,
            operations         TEXT    NOT NULL,
            executed           INTEGER NOT NULL DEFAULT 0,
            expired            INTEGER NOT NULL DEFAULT 0,
            withdrawn          INTEGER NOT NULL DEFAULT 0,
            withdrawn_by_admin INTEGER NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS votes (
            proposal_id INTEGER NOT NULL REFERENCES proposals(id),
            voter       TEXT    NOT NULL,
            support     INTEGER NOT NULL,
            power       INTEGER NOT NULL,
            PRIMARY KEY (proposal_id, voter)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_proposals_space ON proposals(space_id)")
        .execute(pool)
        .await?;

    Ok(())
}

const PROPOSAL_COLUMNS: &str = "id, space_id, creator, start_time, end_time, total_power, \
     yes_votes, no_votes, operations, executed, expired, withdrawn, withdrawn_by_admin";

fn decode_proposal(row: &SqliteRow) -> StoreResult<Proposal> {
    let operations: Vec<Operation> =
        serde_json::from_str(row.try_get::<String, _>("operations")?.as_str())?;

    Ok(Proposal {
        id: ProposalId(row.try_get::<i64, _>("id")? as u64),
        space_id: SpaceId(row.try_get::<i64, _>("space_id")? as u64),
        creator: MemberId(row.try_get::<String, _>("creator")?),
        start_time: row.try_get::<i64, _>("start_time")? as u64,
        end_time: row.try_get::<i64, _>("end_time")? as u64,
        total_voting_power_at_snapshot: row.try_get::<i64, _>("total_power")? as u64,
        yes_votes: row.try_get::<i64, _>("yes_votes")? as u64,
        no_votes: row.try_get::<i64, _>("no_votes")? as u64,
        operations,
        executed: row.try_get::<bool, _>("executed")?,
        expired: row.try_get::<bool, _>("expired")?,
        withdrawn: row.try_get::<bool, _>("withdrawn")?,
        withdrawn_by_admin: row.try_get::<bool, _>("withdrawn_by_admin")?,
        ballots: BTreeMap::new(),
    })
}

fn decode_ballot(row: &SqliteRow) -> StoreResult<(MemberId, Ballot)> {
    Ok((
        MemberId(row.try_get::<String, _>("voter")?),
        Ballot {
            support: row.try_get::<bool, _>("support")?,
            power: row.try_get::<i64, _>("power")? as u64,
        },
    ))
}

pub struct SqliteProposalStore {
    pool: SqlitePool,
}

impl SqliteProposalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProposalStore for SqliteProposalStore {
    async fn allocate(&self, new: NewProposal) -> StoreResult<ProposalId> {
        let operations = serde_json::to_string(&new.operations)?;

        let result = sqlx::query(
            "INSERT INTO proposals
                (space_id, creator, start_time, end_time, total_power, operations)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new.space_id.0 as i64)
        .bind(&new.creator.0)
        .bind(new.start_time as i64)
        .bind(new.end_time as i64)
        .bind(new.total_voting_power_at_snapshot as i64)
        .bind(operations)
        .execute(&self.pool)
        .await?;

        Ok(ProposalId(result.last_insert_rowid() as u64))
    }

    async fn load(&self, id: ProposalId) -> StoreResult<Option<Proposal>> {
        let row = sqlx::query(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE id = ?"
        ))
        .bind(id.0 as i64)
        .fetch_optional(&self.pool)
        .await?;

        let mut proposal = match row {
            Some(row) => decode_proposal(&row)?,
            None => return Ok(None),
        };

        let vote_rows = sqlx::query("SELECT voter, support, power FROM votes WHERE proposal_id = ?")
            .bind(id.0 as i64)
            .fetch_all(&self.pool)
            .await?;
        for vote in vote_rows {
            let (voter, ballot) = decode_ballot(&vote)?;
            proposal.ballots.insert(voter, ballot);
        }

        Ok(Some(proposal))
    }

    async fn record_vote(
        &self,
        id: ProposalId,
        voter: &MemberId,
        support: bool,
        power: u64,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO votes (proposal_id, voter, support, power)
             VALUES (?, ?, ?, ?)",
        )
        .bind(id.0 as i64)
        .bind(&voter.0)
        .bind(support)
        .bind(power as i64)
        .execute(&mut *tx)
        .await?;

        // The primary key is the backstop against double voting; only a
        // fresh ballot moves the tally.
        if inserted.rows_affected() == 1 {
            let column = if support { "yes_votes" } else { "no_votes" };
            let update = format!("UPDATE proposals SET {column} = {column} + ? WHERE id = ?");
            sqlx::query(&update)
                .bind(power as i64)
                .bind(id.0 as i64)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn mark_executed(&self, id: ProposalId) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE proposals SET executed = 1
             WHERE id = ? AND executed = 0 AND expired = 0 AND withdrawn = 0",
        )
        .bind(id.0 as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_expired(&self, id: ProposalId) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE proposals SET expired = 1
             WHERE id = ? AND executed = 0 AND expired = 0 AND withdrawn = 0",
        )
        .bind(id.0 as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_withdrawn(&self, id: ProposalId, by_admin: bool) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE proposals
             SET withdrawn = 1,
                 withdrawn_by_admin = ?,
                 expired = CASE WHEN ? THEN 1 ELSE expired END
             WHERE id = ? AND executed = 0 AND expired = 0 AND withdrawn = 0",
        )
        .bind(by_admin)
        .bind(by_admin)
        .bind(id.0 as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_by_space(&self, space: SpaceId) -> StoreResult<Vec<Proposal>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROPOSAL_COLUMNS} FROM proposals WHERE space_id = ? ORDER BY id DESC"
        ))
        .bind(space.0 as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut proposals = Vec::with_capacity(rows.len());
        let mut index = HashMap::with_capacity(rows.len());
        for row in rows {
            let proposal = decode_proposal(&row)?;
            index.insert(proposal.id.0, proposals.len());
            proposals.push(proposal);
        }

        // All of the space's ballots in one pass instead of one query per
        // proposal.
        let vote_rows = sqlx::query(
            "SELECT v.proposal_id, v.voter, v.support, v.power
             FROM votes v JOIN proposals p ON p.id = v.proposal_id
             WHERE p.space_id = ?",
        )
        .bind(space.0 as i64)
        .fetch_all(&self.pool)
        .await?;
        for vote in vote_rows {
            let proposal_id = vote.try_get::<i64, _>("proposal_id")? as u64;
            if let Some(&slot) = index.get(&proposal_id) {
                let (voter, ballot) = decode_ballot(&vote)?;
                proposals[slot].ballots.insert(voter, ballot);
            }
        }

        Ok(proposals)
    }

    async fn latest_id(&self) -> StoreResult<Option<ProposalId>> {
        let row = sqlx::query("SELECT MAX(id) AS id FROM proposals")
            .fetch_one(&self.pool)
            .await?;
        let id: Option<i64> = row.try_get("id")?;
        Ok(id.map(|id| ProposalId(id as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_temp() -> (TempDir, SqliteProposalStore) {
        let dir = TempDir::new().unwrap();
        let pool = open_database(&dir.path().join("agora.db")).await.unwrap();
        (dir, SqliteProposalStore::new(pool))
    }

    fn new_proposal() -> NewProposal {
        NewProposal {
            space_id: SpaceId(7),
            creator: MemberId("alice".into()),
            start_time: 100,
            end_time: 400,
            total_voting_power_at_snapshot: 10,
            operations: vec![Operation {
                target: "treasury".into(),
                value: 1,
                payload: vec![0xab],
            }],
        }
    }

    #[tokio::test]
    async fn round_trips_a_proposal_with_ballots() {
        let (_dir, store) = open_temp().await;
        let id = store.allocate(new_proposal()).await.unwrap();

        store
            .record_vote(id, &MemberId("bob".into()), true, 5)
            .await
            .unwrap();
        store
            .record_vote(id, &MemberId("carol".into()), false, 2)
            .await
            .unwrap();

        let p = store.load(id).await.unwrap().unwrap();
        assert_eq!(p.yes_votes, 5);
        assert_eq!(p.no_votes, 2);
        assert_eq!(p.ballots.len(), 2);
        assert_eq!(p.operations.len(), 1);
        assert_eq!(p.operations[0].payload, vec![0xab]);
    }

    #[tokio::test]
    async fn duplicate_ballot_does_not_move_the_tally() {
        let (_dir, store) = open_temp().await;
        let id = store.allocate(new_proposal()).await.unwrap();

        let bob = MemberId("bob".into());
        store.record_vote(id, &bob, true, 5).await.unwrap();
        store.record_vote(id, &bob, false, 5).await.unwrap();

        let p = store.load(id).await.unwrap().unwrap();
        assert_eq!(p.yes_votes, 5);
        assert_eq!(p.no_votes, 0);
        assert_eq!(p.ballots.len(), 1);
    }

    #[tokio::test]
    async fn list_attaches_ballots_to_the_right_proposal() {
        let (_dir, store) = open_temp().await;
        let first = store.allocate(new_proposal()).await.unwrap();
        let second = store.allocate(new_proposal()).await.unwrap();

        store
            .record_vote(first, &MemberId("bob".into()), true, 5)
            .await
            .unwrap();
        store
            .record_vote(second, &MemberId("carol".into()), false, 2)
            .await
            .unwrap();

        let listed = store.list_by_space(SpaceId(7)).await.unwrap();
        assert_eq!(listed.len(), 2);

        // Newest first, each carrying only its own ballots.
        assert_eq!(listed[0].id, second);
        assert_eq!(listed[0].ballots.len(), 1);
        assert!(listed[0].ballots.contains_key(&MemberId("carol".into())));
        assert_eq!(listed[1].id, first);
        assert_eq!(listed[1].yes_votes, 5);
        assert!(listed[1].ballots.contains_key(&MemberId("bob".into())));
    }

    #[tokio::test]
    async fn terminal_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agora.db");

        let id = {
            let pool = open_database(&path).await.unwrap();
            let store = SqliteProposalStore::new(pool);
            let id = store.allocate(new_proposal()).await.unwrap();
            assert!(store.mark_withdrawn(id, true).await.unwrap());
            id
        };

        let pool = open_database(&path).await.unwrap();
        let store = SqliteProposalStore::new(pool);
        let p = store.load(id).await.unwrap().unwrap();
        assert!(p.withdrawn && p.expired && p.withdrawn_by_admin);
        assert!(!p.executed);

        // The guard still holds across processes.
        assert!(!store.mark_executed(id).await.unwrap());
    }

    #[tokio::test]
    async fn mark_is_compare_and_set() {
        let (_dir, store) = open_temp().await;
        let id = store.allocate(new_proposal()).await.unwrap();

        assert!(store.mark_expired(id).await.unwrap());
        assert!(!store.mark_expired(id).await.unwrap());
        assert!(!store.mark_executed(id).await.unwrap());
        assert!(!store.mark_withdrawn(id, false).await.unwrap());
    }
}
