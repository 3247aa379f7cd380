//! Commit-status projection: a pure decision ladder over the sync state and
//! the side-effecting push to the platform.

use crate::{context::Context, models::CheckStatus, models::QaStatus, sync::SyncState, Result};
use github::CommitStatusState;

/// Context string of the commit status the bot maintains.
pub const VALIDATION_CONTEXT: &str = "Validation";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatusMessage {
    pub state: CommitStatusState,
    pub title: &'static str,
    pub message: &'static str,
}

/// Decision ladder, first match wins.
pub fn commit_status(state: &SyncState) -> StatusMessage {
    let (status_state, message) = if state.merged {
        (CommitStatusState::Success, "PR merged")
    } else if state.wip {
        (CommitStatusState::Pending, "PR is still in WIP")
    } else if !state.valid_pr_title {
        (CommitStatusState::Failure, "PR title is not valid")
    } else if state.check_status == CheckStatus::Fail {
        (CommitStatusState::Failure, "Checks failed")
    } else if state.check_status == CheckStatus::Waiting {
        (CommitStatusState::Pending, "Waiting for checks")
    } else if state.changes_requested() {
        (CommitStatusState::Failure, "Changes required")
    } else if !state.mergeable && !state.merged {
        (CommitStatusState::Pending, "PR is not mergeable yet")
    } else if state.review_required() {
        (CommitStatusState::Pending, "Waiting on reviews")
    } else if state.qa_status == QaStatus::Fail {
        (CommitStatusState::Failure, "Did not pass QA")
    } else if state.qa_status == QaStatus::Waiting {
        (CommitStatusState::Pending, "Waiting for QA")
    } else if state.locked {
        (
            CommitStatusState::Failure,
            "PR ready to merge, but is merge locked",
        )
    } else {
        (CommitStatusState::Success, "All good")
    };

    StatusMessage {
        state: status_state,
        title: VALIDATION_CONTEXT,
        message,
    }
}

/// Push the computed status onto the head commit.
pub async fn project_commit_status(ctx: &Context, state: &SyncState) -> Result<StatusMessage> {
    let status = commit_status(state);

    ctx.api
        .create_commit_status(
            &state.owner,
            &state.name,
            &state.head_sha,
            status.state,
            status.title,
            status.message,
        )
        .await?;

    Ok(status)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::sync_state_stub;

    #[test]
    fn all_good_when_everything_passes() {
        let state = sync_state_stub();
        let status = commit_status(&state);
        assert_eq!(status.state, CommitStatusState::Success);
        assert_eq!(status.message, "All good");
        assert_eq!(status.title, "Validation");
    }

    #[test]
    fn merged_wins_over_everything() {
        let mut state = sync_state_stub();
        state.merged = true;
        state.wip = true;
        state.check_status = CheckStatus::Fail;

        let status = commit_status(&state);
        assert_eq!(status.state, CommitStatusState::Success);
        assert_eq!(status.message, "PR merged");
    }

    #[test]
    fn wip_is_pending() {
        let mut state = sync_state_stub();
        state.wip = true;

        let status = commit_status(&state);
        assert_eq!(status.state, CommitStatusState::Pending);
        assert_eq!(status.message, "PR is still in WIP");
    }

    #[test]
    fn invalid_title_fails_before_checks() {
        let mut state = sync_state_stub();
        state.valid_pr_title = false;
        state.check_status = CheckStatus::Fail;

        let status = commit_status(&state);
        assert_eq!(status.state, CommitStatusState::Failure);
        assert_eq!(status.message, "PR title is not valid");
    }

    #[test]
    fn check_ladder() {
        let mut state = sync_state_stub();
        state.check_status = CheckStatus::Fail;
        assert_eq!(commit_status(&state).message, "Checks failed");

        state.check_status = CheckStatus::Waiting;
        assert_eq!(commit_status(&state).message, "Waiting for checks");
        assert_eq!(commit_status(&state).state, CommitStatusState::Pending);
    }

    #[test]
    fn review_ladder() {
        let mut state = sync_state_stub();
        state.review_decision = Some(github::ReviewDecision::ChangesRequested);
        assert_eq!(commit_status(&state).message, "Changes required");

        state.review_decision = Some(github::ReviewDecision::ReviewRequired);
        assert_eq!(commit_status(&state).message, "Waiting on reviews");
    }

    #[test]
    fn unmergeable_is_pending() {
        let mut state = sync_state_stub();
        state.mergeable = false;
        let status = commit_status(&state);
        assert_eq!(status.state, CommitStatusState::Pending);
        assert_eq!(status.message, "PR is not mergeable yet");
    }

    #[test]
    fn qa_ladder() {
        let mut state = sync_state_stub();
        state.qa_status = QaStatus::Fail;
        assert_eq!(commit_status(&state).message, "Did not pass QA");

        state.qa_status = QaStatus::Waiting;
        assert_eq!(commit_status(&state).message, "Waiting for QA");
    }

    #[test]
    fn locked_pr_fails_last() {
        let mut state = sync_state_stub();
        state.locked = true;
        let status = commit_status(&state);
        assert_eq!(status.state, CommitStatusState::Failure);
        assert_eq!(status.message, "PR ready to merge, but is merge locked");
    }
}
