//! Step-label projection: the PR's current phase, exposed as a `step/<phase>`
//! label replacing any previous one.

use crate::{context::Context, models::CheckStatus, models::QaStatus, sync::SyncState, Result};
use std::fmt;

const STEP_PREFIX: &str = "step/";

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StepLabel {
    Wip,
    AwaitingChanges,
    AwaitingChecks,
    AwaitingReview,
    AwaitingQa,
    Locked,
    AwaitingMerge,
    /// Reserved for a future extension; the ladder never yields it.
    Merged,
}

impl StepLabel {
    pub fn name(self) -> &'static str {
        match self {
            StepLabel::Wip => "wip",
            StepLabel::AwaitingChanges => "awaiting-changes",
            StepLabel::AwaitingChecks => "awaiting-checks",
            StepLabel::AwaitingReview => "awaiting-review",
            StepLabel::AwaitingQa => "awaiting-qa",
            StepLabel::Locked => "locked",
            StepLabel::AwaitingMerge => "awaiting-merge",
            StepLabel::Merged => "merged",
        }
    }
}

impl fmt::Display for StepLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decision ladder, first match wins.
pub fn step_label(state: &SyncState) -> StepLabel {
    if state.wip {
        StepLabel::Wip
    } else if !state.valid_pr_title {
        StepLabel::AwaitingChanges
    } else if state.check_status == CheckStatus::Fail {
        StepLabel::AwaitingChanges
    } else if state.check_status == CheckStatus::Waiting {
        StepLabel::AwaitingChecks
    } else if state.changes_requested() || (!state.mergeable && !state.merged) {
        StepLabel::AwaitingChanges
    } else if state.review_required() {
        StepLabel::AwaitingReview
    } else if state.qa_status == QaStatus::Fail {
        StepLabel::AwaitingChanges
    } else if state.qa_status == QaStatus::Waiting {
        StepLabel::AwaitingQa
    } else if state.locked {
        StepLabel::Locked
    } else {
        StepLabel::AwaitingMerge
    }
}

/// Replace the current `step/*` label with the computed one. The final label
/// set is sorted for determinism.
pub async fn project_step_label(ctx: &Context, state: &SyncState) -> Result<StepLabel> {
    let label = step_label(state);

    let existing = ctx.api.labels(&state.owner, &state.name, state.number).await?;
    let mut labels = apply_step_label(existing, label);
    labels.sort();

    ctx.api
        .replace_labels(&state.owner, &state.name, state.number, &labels)
        .await?;

    Ok(label)
}

fn apply_step_label(existing: Vec<String>, label: StepLabel) -> Vec<String> {
    let mut labels: Vec<String> = existing
        .into_iter()
        .filter(|name| !name.starts_with(STEP_PREFIX))
        .collect();
    labels.push(format!("{}{}", STEP_PREFIX, label));

    labels
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::sync_state_stub;

    #[test]
    fn ready_pr_awaits_merge() {
        assert_eq!(step_label(&sync_state_stub()), StepLabel::AwaitingMerge);
    }

    #[test]
    fn wip_wins_over_everything() {
        let mut state = sync_state_stub();
        state.wip = true;
        state.check_status = CheckStatus::Fail;
        assert_eq!(step_label(&state), StepLabel::Wip);
    }

    #[test]
    fn check_states_map_to_labels() {
        let mut state = sync_state_stub();
        state.check_status = CheckStatus::Fail;
        assert_eq!(step_label(&state), StepLabel::AwaitingChanges);

        state.check_status = CheckStatus::Waiting;
        assert_eq!(step_label(&state), StepLabel::AwaitingChecks);
    }

    #[test]
    fn review_states_map_to_labels() {
        let mut state = sync_state_stub();
        state.review_decision = Some(github::ReviewDecision::ChangesRequested);
        assert_eq!(step_label(&state), StepLabel::AwaitingChanges);

        state.review_decision = Some(github::ReviewDecision::ReviewRequired);
        assert_eq!(step_label(&state), StepLabel::AwaitingReview);
    }

    #[test]
    fn unmergeable_awaits_changes() {
        let mut state = sync_state_stub();
        state.mergeable = false;
        assert_eq!(step_label(&state), StepLabel::AwaitingChanges);
    }

    #[test]
    fn qa_states_map_to_labels() {
        let mut state = sync_state_stub();
        state.qa_status = QaStatus::Fail;
        assert_eq!(step_label(&state), StepLabel::AwaitingChanges);

        state.qa_status = QaStatus::Waiting;
        assert_eq!(step_label(&state), StepLabel::AwaitingQa);
    }

    #[test]
    fn locked_pr_is_labeled_locked() {
        let mut state = sync_state_stub();
        state.locked = true;
        assert_eq!(step_label(&state), StepLabel::Locked);
    }

    #[test]
    fn step_labels_are_swapped_not_stacked() {
        let existing = vec![
            "bug".to_owned(),
            "step/awaiting-qa".to_owned(),
            "a-label".to_owned(),
        ];

        let mut labels = apply_step_label(existing, StepLabel::AwaitingMerge);
        labels.sort();

        assert_eq!(labels, vec!["a-label", "bug", "step/awaiting-merge"]);
    }
}
