//! Agora - Proposal Governance Engine
//!
//! Weighted-voting governance for membership spaces: proposals carry a
//! frozen batch of operations, members vote with snapshot-anchored voting
//! power, and a proposal that clears its space's quorum and unity
//! thresholds has its batch executed atomically.
//!
//! Key principles:
//! - Lazy resolution (nothing fires at end_time; evaluation settles fate)
//! - Terminal states are exclusive and set exactly once
//! - Voting power snapshotted at creation, thresholds read live
//! - Execution backends stay behind the [`governance::OperationBatchExecutor`] seam

pub mod governance;
pub mod store;
