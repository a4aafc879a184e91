//! Mock collaborators for testing the engine without a database or a real
//! execution backend. Each mock keeps its state behind a mutex and exposes
//! setters for the scenario plus accessors for assertions.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::error::GovernanceResult;
use super::proposal::Operation;
use super::threshold::Thresholds;
use super::traits::{
    Clock, ExecutionError, MemberId, OperationBatchExecutor, SpaceConfigSource, SpaceId,
    Timestamp, VotingPowerSource,
};

/// Voting power source backed by a plain map. Power is constant over time;
/// tests that need "membership changed after the snapshot" simply mutate the
/// map between calls.
#[derive(Default)]
pub struct MockVotingPower {
    powers: Mutex<HashMap<(u64, String), u64>>,
}

impl MockVotingPower {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_power(&self, space: SpaceId, member: &MemberId, power: u64) {
        let mut powers = self.powers.lock().unwrap();
        powers.insert((space.0, member.0.clone()), power);
    }
}

#[async_trait]
impl VotingPowerSource for MockVotingPower {
    async fn total_voting_power(&self, space: SpaceId, _at: Timestamp) -> GovernanceResult<u64> {
        let powers = self.powers.lock().unwrap();
        Ok(powers
            .iter()
            .filter(|((s, _), _)| *s == space.0)
            .map(|(_, power)| power)
            .sum())
    }

    async fn voting_power_of(
        &self,
        space: SpaceId,
        member: &MemberId,
        _at: Timestamp,
    ) -> GovernanceResult<u64> {
        let powers = self.powers.lock().unwrap();
        Ok(powers
            .get(&(space.0, member.0.clone()))
            .copied()
            .unwrap_or(0))
    }
}

struct MockConfigState {
    thresholds: Thresholds,
    minimum_duration: u64,
    administrators: HashSet<String>,
}

/// Single-space configuration with mutable thresholds, so tests can change
/// the bar mid-vote the way a space administrator would.
pub struct MockSpaceConfig {
    space: SpaceId,
    state: Mutex<MockConfigState>,
}

impl MockSpaceConfig {
    pub fn new(space: SpaceId, thresholds: Thresholds) -> Self {
        Self {
            space,
            state: Mutex::new(MockConfigState {
                thresholds,
                minimum_duration: 0,
                administrators: HashSet::new(),
            }),
        }
    }

    pub fn set_thresholds(&self, thresholds: Thresholds) {
        self.state.lock().unwrap().thresholds = thresholds;
    }

    pub fn set_minimum_duration(&self, secs: u64) {
        self.state.lock().unwrap().minimum_duration = secs;
    }

    pub fn add_administrator(&self, member: &MemberId) {
        self.state
            .lock()
            .unwrap()
            .administrators
            .insert(member.0.clone());
    }
}

#[async_trait]
impl SpaceConfigSource for MockSpaceConfig {
    async fn thresholds(&self, space: SpaceId) -> GovernanceResult<Thresholds> {
        debug_assert_eq!(space, self.space);
        Ok(self.state.lock().unwrap().thresholds)
    }

    async fn is_administrator(&self, space: SpaceId, member: &MemberId) -> GovernanceResult<bool> {
        debug_assert_eq!(space, self.space);
        Ok(self.state.lock().unwrap().administrators.contains(&member.0))
    }

    async fn minimum_duration(&self, space: SpaceId) -> GovernanceResult<u64> {
        debug_assert_eq!(space, self.space);
        Ok(self.state.lock().unwrap().minimum_duration)
    }
}

/// Executor that records every batch it is handed and always succeeds.
#[derive(Default)]
pub struct RecordingExecutor {
    batches: Mutex<Vec<Vec<Operation>>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful batch executions.
    pub fn executions(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn last_batch(&self) -> Option<Vec<Operation>> {
        self.batches.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl OperationBatchExecutor for RecordingExecutor {
    async fn execute_all(&self, operations: &[Operation]) -> Result<(), ExecutionError> {
        self.batches.lock().unwrap().push(operations.to_vec());
        Ok(())
    }
}

/// Executor that fails its first N calls, then succeeds. Models a flaky
/// downstream so retry behavior can be exercised.
pub struct FailingExecutor {
    remaining_failures: Mutex<u32>,
    successes: Mutex<u32>,
}

impl FailingExecutor {
    pub fn failing_times(n: u32) -> Self {
        Self {
            remaining_failures: Mutex::new(n),
            successes: Mutex::new(0),
        }
    }

    pub fn successes(&self) -> u32 {
        *self.successes.lock().unwrap()
    }
}

#[async_trait]
impl OperationBatchExecutor for FailingExecutor {
    async fn execute_all(&self, _operations: &[Operation]) -> Result<(), ExecutionError> {
        let mut remaining = self.remaining_failures.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ExecutionError("downstream unavailable".into()));
        }
        *self.successes.lock().unwrap() += 1;
        Ok(())
    }
}

/// Manually advanced clock, so tests control exactly when a voting window
/// closes.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, to: Timestamp) {
        self.now.store(to, Ordering::SeqCst);
    }

    pub fn advance(&self, by: u64) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}
