//! Property tests over the threshold evaluator.

use proptest::prelude::*;

use super::threshold::{decide, quorum_met, required_quorum, Decision, Tally, Thresholds};

fn tallies() -> impl Strategy<Value = Tally> {
    (0u64..=1_000_000).prop_flat_map(|total| {
        (0..=total).prop_flat_map(move |yes| {
            (0..=total - yes).prop_map(move |no| Tally {
                yes,
                no,
                total_power: total,
            })
        })
    })
}

fn thresholds() -> impl Strategy<Value = Thresholds> {
    (0u64..=100, 0u64..=100).prop_map(|(quorum_pct, unity_pct)| Thresholds {
        quorum_pct,
        unity_pct,
    })
}

proptest! {
    /// Ceiling division never under-counts: the required quorum times 100
    /// is always at least quorum_pct * total_power, and exceeds it by less
    /// than one whole vote.
    #[test]
    fn required_quorum_is_exact_ceiling(pct in 0u64..=100, total in 0u64..=u64::MAX / 100) {
        let required = required_quorum(pct, total);
        let exact = pct as u128 * total as u128;
        prop_assert!(required as u128 * 100 >= exact);
        prop_assert!((required as u128) * 100 < exact + 100);
    }

    /// While the window is open, `Rejected` means the proposal could not
    /// pass no matter how the remaining power votes: pushing every unit of
    /// uncast power into the yes column still does not produce `Passed`.
    #[test]
    fn early_rejection_is_never_premature(tally in tallies(), th in thresholds()) {
        if decide(&tally, &th, false) == Decision::Rejected {
            let remaining = tally.total_power - tally.cast();
            let best = Tally {
                yes: tally.yes + remaining,
                no: tally.no,
                total_power: tally.total_power,
            };
            prop_assert_ne!(decide(&best, &th, false), Decision::Passed);
        }
    }

    /// A pass decision always has quorum behind it.
    #[test]
    fn passed_implies_quorum(tally in tallies(), th in thresholds(), closed in any::<bool>()) {
        if decide(&tally, &th, closed) == Decision::Passed {
            prop_assert!(quorum_met(&tally, &th));
        }
    }

    /// With the window closed the decision is never `Undecided`.
    #[test]
    fn closed_window_always_decides(tally in tallies(), th in thresholds()) {
        prop_assert_ne!(decide(&tally, &th, true), Decision::Undecided);
    }

    /// Adding a yes vote never turns a passing proposal into a failing one.
    #[test]
    fn yes_votes_are_monotone_toward_passing(tally in tallies(), th in thresholds()) {
        let remaining = tally.total_power - tally.cast();
        prop_assume!(remaining > 0);
        if decide(&tally, &th, false) == Decision::Passed {
            let more_yes = Tally {
                yes: tally.yes + 1,
                no: tally.no,
                total_power: tally.total_power,
            };
            prop_assert_eq!(decide(&more_yes, &th, false), Decision::Passed);
        }
    }
}
