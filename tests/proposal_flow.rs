//! Integration test for end-to-end proposal flow over the SQLite stack.
//!
//! Tests the complete lifecycle:
//! 1. Create a space with weighted members
//! 2. Submit a proposal (power snapshot taken at creation)
//! 3. Vote until quorum and unity are met
//! 4. Early pass executes the operation batch exactly once
//! 5. Terminal state survives a database reopen
//! 6. Quiet proposals expire at window close via sweep
//! 7. Creator withdrawal vs administrator veto

use std::path::Path;
use std::sync::Arc;

use agora::governance::mock::{ManualClock, RecordingExecutor};
use agora::governance::Clock;
use agora::governance::{
    GovernanceEngine, GovernanceError, MemberId, Operation, ProposalState, SpaceId, Thresholds,
};
use agora::store::{open_database, SpaceDirectory, SqliteProposalStore};
use tempfile::TempDir;

struct Harness {
    engine: GovernanceEngine<SqliteProposalStore>,
    spaces: SpaceDirectory,
    executor: Arc<RecordingExecutor>,
    clock: Arc<ManualClock>,
}

async fn harness(path: &Path, clock: Arc<ManualClock>) -> Harness {
    let pool = open_database(path).await.unwrap();
    let spaces = SpaceDirectory::new(pool.clone());
    let executor = Arc::new(RecordingExecutor::new());

    let engine = GovernanceEngine::new(
        Arc::new(SqliteProposalStore::new(pool)),
        Arc::new(spaces.clone()),
        Arc::new(spaces.clone()),
        executor.clone(),
        clock.clone(),
    );

    Harness {
        engine,
        spaces,
        executor,
        clock,
    }
}

fn member(name: &str) -> MemberId {
    MemberId(name.to_string())
}

fn transfer_op() -> Operation {
    Operation {
        target: "treasury".into(),
        value: 250,
        payload: vec![0xca, 0xfe],
    }
}

/// Space with alice (owner, power 1), bob (4), carol (5): total 10.
/// Quorum 51% needs 6 units cast; unity 80% of votes cast.
async fn garden_space(h: &Harness) -> SpaceId {
    let space = h
        .spaces
        .create_space(
            "garden",
            &member("alice"),
            Thresholds {
                quorum_pct: 51,
                unity_pct: 80,
            },
            0,
        )
        .await
        .unwrap();
    h.spaces
        .add_member(space, &member("bob"), 4, 0)
        .await
        .unwrap();
    h.spaces
        .add_member(space, &member("carol"), 5, 0)
        .await
        .unwrap();
    space
}

#[tokio::test]
async fn full_lifecycle_early_pass() {
    let dir = TempDir::new().unwrap();
    let h = harness(&dir.path().join("agora.db"), Arc::new(ManualClock::new(1_000))).await;
    let space = garden_space(&h).await;

    let id = h
        .engine
        .create_proposal(space, member("alice"), 3_600, vec![transfer_op()])
        .await
        .unwrap();

    let view = h.engine.get_proposal(id).await.unwrap();
    assert_eq!(view.total_voting_power_at_snapshot, 10);
    assert_eq!(view.end_time, 4_600);

    // alice alone: 1 of 10 cast, quorum (6) not reached.
    let state = h.engine.vote(id, member("alice"), true).await.unwrap();
    assert_eq!(state, ProposalState::Pending);

    // bob joins: 5 cast, still short of quorum.
    let state = h.engine.vote(id, member("bob"), true).await.unwrap();
    assert_eq!(state, ProposalState::Pending);
    assert_eq!(h.executor.executions(), 0);

    // carol tips it over: 10 cast, 100% yes. Passes with the window open.
    let state = h.engine.vote(id, member("carol"), true).await.unwrap();
    assert_eq!(state, ProposalState::Executed);

    assert_eq!(h.executor.executions(), 1);
    assert_eq!(h.executor.last_batch().unwrap(), vec![transfer_op()]);

    // Late arrivals see the resolved state.
    let err = h.engine.vote(id, member("alice"), false).await.unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyResolved));

    // Repeat evaluation is a no-op.
    assert_eq!(h.engine.evaluate(id).await.unwrap(), ProposalState::Executed);
    assert_eq!(h.executor.executions(), 1);
}

#[tokio::test]
async fn terminal_state_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agora.db");
    let clock = Arc::new(ManualClock::new(1_000));

    let (space, id) = {
        let h = harness(&path, clock.clone()).await;
        let space = garden_space(&h).await;
        let id = h
            .engine
            .create_proposal(space, member("carol"), 3_600, vec![transfer_op()])
            .await
            .unwrap();
        h.engine.vote(id, member("carol"), true).await.unwrap();
        h.engine.vote(id, member("bob"), true).await.unwrap();
        assert_eq!(
            h.engine.evaluate(id).await.unwrap(),
            ProposalState::Executed
        );
        (space, id)
    };

    // Fresh engine over the same database: history intact, no re-execution.
    let h = harness(&path, clock).await;
    let view = h.engine.get_proposal(id).await.unwrap();
    assert_eq!(view.state, ProposalState::Executed);
    assert_eq!(view.yes_votes, 9);
    assert!(h.engine.has_voted(id, &member("bob")).await.unwrap());

    assert_eq!(h.engine.evaluate(id).await.unwrap(), ProposalState::Executed);
    assert_eq!(h.executor.executions(), 0);

    let listed = h.engine.list_space_proposals(space).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(h.engine.latest_proposal_id().await.unwrap(), Some(id));
}

#[tokio::test]
async fn sweep_expires_quiet_proposals() {
    let dir = TempDir::new().unwrap();
    let h = harness(&dir.path().join("agora.db"), Arc::new(ManualClock::new(1_000))).await;
    let space = garden_space(&h).await;

    let quiet = h
        .engine
        .create_proposal(space, member("alice"), 600, vec![transfer_op()])
        .await
        .unwrap();
    let open = h
        .engine
        .create_proposal(space, member("bob"), 7_200, vec![transfer_op()])
        .await
        .unwrap();

    // Nothing fires at end_time by itself.
    h.clock.advance(1_000);
    assert_eq!(
        h.engine.get_proposal(quiet).await.unwrap().state,
        ProposalState::Pending
    );

    let resolved = h.engine.sweep_space(space).await.unwrap();
    assert_eq!(resolved, 1);
    assert_eq!(
        h.engine.get_proposal(quiet).await.unwrap().state,
        ProposalState::Expired
    );
    assert_eq!(
        h.engine.get_proposal(open).await.unwrap().state,
        ProposalState::Pending
    );
    assert_eq!(h.executor.executions(), 0);
}

#[tokio::test]
async fn creator_withdrawal_and_admin_veto() {
    let dir = TempDir::new().unwrap();
    let h = harness(&dir.path().join("agora.db"), Arc::new(ManualClock::new(1_000))).await;
    let space = garden_space(&h).await;

    // Creator retracts their own proposal.
    let own = h
        .engine
        .create_proposal(space, member("bob"), 3_600, vec![transfer_op()])
        .await
        .unwrap();
    h.engine.withdraw(own, member("bob")).await.unwrap();
    let view = h.engine.get_proposal(own).await.unwrap();
    assert_eq!(view.state, ProposalState::Withdrawn);
    assert!(!view.withdrawn_by_admin && !view.expired);

    // A non-admin, non-creator member cannot withdraw.
    let vetoed = h
        .engine
        .create_proposal(space, member("bob"), 3_600, vec![transfer_op()])
        .await
        .unwrap();
    let err = h.engine.withdraw(vetoed, member("carol")).await.unwrap_err();
    assert!(matches!(err, GovernanceError::Unauthorized));

    // The space owner vetoes: withdrawn and expired both set.
    h.engine.withdraw(vetoed, member("alice")).await.unwrap();
    let view = h.engine.get_proposal(vetoed).await.unwrap();
    assert_eq!(view.state, ProposalState::Withdrawn);
    assert!(view.withdrawn_by_admin && view.expired);

    // Votes on a withdrawn proposal are refused.
    let err = h.engine.vote(vetoed, member("carol"), true).await.unwrap_err();
    assert!(matches!(err, GovernanceError::AlreadyResolved));
}

#[tokio::test]
async fn membership_changes_after_snapshot_do_not_move_the_bar() {
    let dir = TempDir::new().unwrap();
    let h = harness(&dir.path().join("agora.db"), Arc::new(ManualClock::new(1_000))).await;
    let space = garden_space(&h).await;

    let id = h
        .engine
        .create_proposal(space, member("carol"), 3_600, vec![transfer_op()])
        .await
        .unwrap();

    // A whale joins after the snapshot; quorum stays 6 of the original 10.
    h.clock.advance(100);
    h.spaces
        .add_member(space, &member("whale"), 1_000, h.clock.now())
        .await
        .unwrap();

    h.engine.vote(id, member("carol"), true).await.unwrap();
    let state = h.engine.vote(id, member("bob"), true).await.unwrap();
    assert_eq!(state, ProposalState::Executed);
}

#[tokio::test]
async fn post_snapshot_members_hold_no_power_over_open_proposals() {
    let dir = TempDir::new().unwrap();
    let h = harness(&dir.path().join("agora.db"), Arc::new(ManualClock::new(1_000))).await;
    let space = garden_space(&h).await;

    let id = h
        .engine
        .create_proposal(space, member("alice"), 3_600, vec![transfer_op()])
        .await
        .unwrap();

    // The whale's power exists only from after the proposal's snapshot.
    h.clock.advance(100);
    h.spaces
        .add_member(space, &member("whale"), 1_000, h.clock.now())
        .await
        .unwrap();

    let err = h.engine.vote(id, member("whale"), true).await.unwrap_err();
    assert!(matches!(err, GovernanceError::NotMember { .. }));

    // The tally never exceeds the snapshot total and the whale decided
    // nothing.
    let view = h.engine.get_proposal(id).await.unwrap();
    assert_eq!(view.yes_votes + view.no_votes, 0);
    assert!(view.yes_votes + view.no_votes <= view.total_voting_power_at_snapshot);
    assert_eq!(view.state, ProposalState::Pending);

    // A proposal created after the whale joined sees the new total.
    let later = h
        .engine
        .create_proposal(space, member("whale"), 3_600, vec![transfer_op()])
        .await
        .unwrap();
    let view = h.engine.get_proposal(later).await.unwrap();
    assert_eq!(view.total_voting_power_at_snapshot, 1_010);
}

#[tokio::test]
async fn minimum_duration_is_enforced() {
    let dir = TempDir::new().unwrap();
    let h = harness(&dir.path().join("agora.db"), Arc::new(ManualClock::new(1_000))).await;
    let space = garden_space(&h).await;

    h.spaces.set_minimum_duration(space, 1_800).await.unwrap();

    let err = h
        .engine
        .create_proposal(space, member("alice"), 600, vec![transfer_op()])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GovernanceError::InvalidDuration {
            requested: 600,
            minimum: 1_800
        }
    ));

    h.engine
        .create_proposal(space, member("alice"), 1_800, vec![transfer_op()])
        .await
        .unwrap();
}
