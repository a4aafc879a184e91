//! Quorum/unity threshold evaluator
//!
//! Pure, side-effect-free decision function over a proposal's tallies and a
//! space's live thresholds. Two numeric contracts matter here:
//!
//! - Quorum uses CEILING division. With a total power of 2 and a 51% quorum,
//!   truncating division would require only 1 vote, letting a single voter
//!   pass what is nominally a majority requirement. Ceiling requires 2.
//! - Unity is the share of yes among votes CAST, not among total power.
//!
//! Early rejection fires only after quorum is reached, and only when even
//! all remaining snapshot power voting yes could not satisfy unity. Before
//! quorum the decision stays `Undecided` until the window closes.

use serde::{Deserialize, Serialize};

/// Per-space pass requirements, in whole percent (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Minimum share of total snapshotted power that must participate
    pub quorum_pct: u64,
    /// Minimum share of votes cast that must be yes
    pub unity_pct: u64,
}

/// Vote tallies against the creation-time power snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub yes: u64,
    pub no: u64,
    pub total_power: u64,
}

impl Tally {
    pub fn cast(&self) -> u64 {
        self.yes + self.no
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Undecided,
    Passed,
    Rejected,
}

/// Votes required to meet quorum: `ceil(quorum_pct * total_power / 100)`.
pub fn required_quorum(quorum_pct: u64, total_power: u64) -> u64 {
    let exact = quorum_pct as u128 * total_power as u128;
    exact.div_ceil(100) as u64
}

/// Whether participation meets quorum.
pub fn quorum_met(tally: &Tally, thresholds: &Thresholds) -> bool {
    tally.cast() >= required_quorum(thresholds.quorum_pct, tally.total_power)
}

/// Whether the yes share of votes cast meets unity. False when nothing has
/// been cast.
pub fn unity_met(tally: &Tally, thresholds: &Thresholds) -> bool {
    let cast = tally.cast();
    cast > 0 && tally.yes as u128 * 100 >= thresholds.unity_pct as u128 * cast as u128
}

/// Whether unity can no longer be reached even if every remaining unit of
/// snapshot power votes yes. Adding yes votes raises the yes share
/// monotonically, so the best reachable share is
/// `(yes + remaining) / total_power`.
fn unity_unreachable(tally: &Tally, thresholds: &Thresholds) -> bool {
    let remaining = tally.total_power.saturating_sub(tally.cast());
    let max_yes = tally.yes + remaining;
    (max_yes as u128) * 100 < thresholds.unity_pct as u128 * tally.total_power as u128
}

/// Decide a proposal's fate from tallies, live thresholds, and whether the
/// voting window has closed. Pure; never mutates anything.
pub fn decide(tally: &Tally, thresholds: &Thresholds, window_closed: bool) -> Decision {
    if quorum_met(tally, thresholds) && unity_met(tally, thresholds) {
        return Decision::Passed;
    }
    if window_closed {
        return Decision::Rejected;
    }
    // Early rejection, gated on quorum so a quiet proposal is never
    // rejected while members could still show up and vote yes.
    if quorum_met(tally, thresholds) && unity_unreachable(tally, thresholds) {
        return Decision::Rejected;
    }
    Decision::Undecided
}
