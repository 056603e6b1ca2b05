//! Shared job state-machine contract. The adjacency table below is the
//! single source of truth for which transitions the scheduler and runner
//! may apply.

use crate::domain::Stage;

const TRANSITIONS: &[(Stage, &[Stage])] = &[
    (Stage::Queued, &[Stage::Probing, Stage::Cancelled]),
    (Stage::Probing, &[Stage::Planning, Stage::Failed, Stage::Cancelled]),
    (Stage::Planning, &[Stage::Running, Stage::Failed, Stage::Cancelled]),
    (Stage::Running, &[Stage::Completed, Stage::Failed, Stage::Cancelled]),
    (Stage::Completed, &[]),
    (Stage::Failed, &[]),
    (Stage::Cancelled, &[]),
];

pub fn can_transition(from: Stage, to: Stage) -> bool {
    TRANSITIONS
        .iter()
        .find(|(stage, _)| *stage == from)
        .is_some_and(|(_, allowed)| allowed.contains(&to))
}

/// Validate a transition before applying it. Aborts in debug builds so
/// lifecycle bugs surface during development; logs and refuses in release.
pub fn ensure_transition(from: Stage, to: Stage) -> bool {
    let ok = can_transition(from, to);
    if !ok {
        debug_assert!(false, "illegal job state transition: {from:?} -> {to:?}");
        tracing::error!(?from, ?to, "refusing illegal job state transition");
    }
    ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_table_is_exhaustive_over_all_stage_pairs() {
        let allowed: &[(Stage, Stage)] = &[
            (Stage::Queued, Stage::Probing),
            (Stage::Queued, Stage::Cancelled),
            (Stage::Probing, Stage::Planning),
            (Stage::Probing, Stage::Failed),
            (Stage::Probing, Stage::Cancelled),
            (Stage::Planning, Stage::Running),
            (Stage::Planning, Stage::Failed),
            (Stage::Planning, Stage::Cancelled),
            (Stage::Running, Stage::Completed),
            (Stage::Running, Stage::Failed),
            (Stage::Running, Stage::Cancelled),
        ];

        for from in Stage::ALL {
            for to in Stage::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    can_transition(from, to),
                    expected,
                    "transition {from:?} -> {to:?} must be {expected}"
                );
            }
        }
    }

    #[test]
    fn terminal_stages_have_no_outgoing_transitions() {
        for from in Stage::TERMINAL {
            for to in Stage::ALL {
                assert!(
                    !can_transition(from, to),
                    "terminal stage {from:?} must not transition to {to:?}"
                );
            }
        }
    }

    #[test]
    fn ensure_transition_accepts_legal_edges() {
        assert!(ensure_transition(Stage::Queued, Stage::Probing));
        assert!(ensure_transition(Stage::Running, Stage::Completed));
    }

    #[test]
    #[should_panic(expected = "illegal job state transition")]
    fn ensure_transition_aborts_on_illegal_edge_in_dev() {
        ensure_transition(Stage::Completed, Stage::Running);
    }
}
