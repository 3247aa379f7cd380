//! Auto-maintained summary comment: a pure Markdown renderer over the sync
//! state and a lock-guarded create-or-update projector.

use crate::{
    commit_status::commit_status,
    context::Context,
    database::store::PullRequestStore,
    message::message_footer,
    models::{CheckStatus, MergeStrategy, QaStatus, RepositoryRule},
    sync::SyncState,
    Result,
};
use log::error;

/// Render the whole summary body. The exact textual form is part of the
/// external contract; the comment is edited in place on every sync.
pub fn render_summary(state: &SyncState) -> String {
    format!(
        "_This is an auto-generated message summarizing this pull request._\n\
         \n\
         {rules}\n\
         \n\
         {checks}\n\
         \n\
         {config}\n\
         \n\
         {footer}\n\
         {message_footer}",
        rules = rules_section(state),
        checks = checks_section(state),
        config = config_section(state),
        footer = footer_section(state),
        message_footer = message_footer(),
    )
}

fn rules_section(state: &SyncState) -> String {
    format!(
        ":pencil: &mdash; **Rules**\n\
         \n\
         {title}\n\
         {regex}\n\
         {strategy}\n\
         {rules}",
        title = title_validation_line(state.valid_pr_title),
        regex = title_regex_line(&state.title_regex),
        strategy = merge_strategy_line(state.merge_strategy),
        rules = rule_list_line(&state.rules),
    )
}

fn title_validation_line(valid_pr_title: bool) -> String {
    let title_is_valid = if valid_pr_title {
        "_valid!_ :heavy_check_mark:"
    } else {
        "_invalid!_ :x:"
    };

    format!("> - :speech_balloon: **Title validation**: {}", title_is_valid)
}

fn title_regex_line(title_regex: &str) -> String {
    let validation_rgx = if title_regex.is_empty() {
        "None"
    } else {
        title_regex
    };

    format!(">   - _Rule_: {}", validation_rgx)
}

fn merge_strategy_line(strategy: MergeStrategy) -> String {
    format!(
        "> - :twisted_rightwards_arrows: **Merge strategy**: _{}_",
        strategy.title()
    )
}

fn rule_list_line(rules: &[RepositoryRule]) -> String {
    let rule_text = if rules.is_empty() {
        "None".to_owned()
    } else {
        rules
            .iter()
            .map(|rule| rule.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!("> - :straight_ruler: **Pull request rules**: _{}_", rule_text)
}

fn checks_section(state: &SyncState) -> String {
    format!(
        ":speech_balloon: &mdash; **Status comment**\n\
         \n\
         {wip}\n\
         {checks}\n\
         {reviews}\n\
         {qa}\n\
         {lock}\n\
         {mergeable}",
        wip = wip_line(state.wip),
        checks = checks_line(state.check_status),
        reviews = reviews_line(state),
        qa = qa_line(state.qa_status),
        lock = lock_line(state.locked),
        mergeable = mergeable_line(state),
    )
}

fn wip_line(wip: bool) -> String {
    let wip_message = if wip { "Yes :x:" } else { "No :heavy_check_mark:" };
    format!("> - :construction: **WIP?**: {}", wip_message)
}

fn checks_line(check_status: CheckStatus) -> String {
    let check_message = match check_status {
        CheckStatus::Pass => "_passed_! :heavy_check_mark:",
        CheckStatus::Waiting => "_waiting_... :clock2:",
        CheckStatus::Fail => "_failed_. :x:",
        CheckStatus::Skipped => "_skipped_. :heavy_check_mark:",
    };

    format!("> - :checkered_flag: **Checks**: {}", check_message)
}

fn reviews_line(state: &SyncState) -> String {
    let review_message = if state.changes_requested() {
        "_waiting on change requests..._ :x:"
    } else if state.review_required() {
        "_waiting..._ :clock2:"
    } else if state.review_skipped() {
        "_skipped._ :heavy_check_mark:"
    } else {
        "_passed!_ :heavy_check_mark:"
    };

    format!("> - :mag: **Code reviews**: {}", review_message)
}

fn qa_line(qa_status: QaStatus) -> String {
    let qa_message = match qa_status {
        QaStatus::Pass => "_passed_! :heavy_check_mark:",
        QaStatus::Waiting => "_waiting_... :clock2:",
        QaStatus::Fail => "_failed_. :x:",
        QaStatus::Skipped => "_skipped_. :heavy_check_mark:",
    };

    format!("> - :test_tube: **QA**: {}", qa_message)
}

fn lock_line(locked: bool) -> String {
    let lock_message = if locked { "Yes :x:" } else { "No :heavy_check_mark:" };
    format!("> - :lock: **Locked?**: {}", lock_message)
}

fn mergeable_line(state: &SyncState) -> String {
    let mergeable_message = if state.mergeable || state.merged {
        "Yes :heavy_check_mark:"
    } else {
        "No :x:"
    };

    format!(
        "> - :twisted_rightwards_arrows: **Mergeable?**: {}",
        mergeable_message
    )
}

fn config_section(state: &SyncState) -> String {
    let automerge_message = if state.automerge {
        "Yes :heavy_check_mark:"
    } else {
        "No :x:"
    };

    format!(
        ":gear: &mdash; **Configuration**\n\
         \n\
         > - :twisted_rightwards_arrows: **Automerge**: {}",
        automerge_message
    )
}

fn footer_section(state: &SyncState) -> String {
    let status = commit_status(state);

    format!(
        ":scroll: &mdash; **Current status**\n\
         \n\
         > {state}: {message}\n\
         \n\
         [_See checks output by clicking this link :triangular_flag_on_post:_]({url})",
        state = status.state.name(),
        message = status.message,
        url = state.check_url,
    )
}

/// Create or update the summary comment.
///
/// A known comment id means update-in-place. First creation runs under a
/// per-PR lock so at-least-once webhook delivery cannot produce duplicate
/// comments; losing the lock race means another worker is creating it, so
/// the projection is skipped.
pub async fn project_summary(ctx: &Context, state: &SyncState) -> Result<Option<String>> {
    let summary = render_summary(state);

    if state.status_comment_id > 0 {
        ctx.api
            .update_comment(&state.owner, &state.name, state.status_comment_id, &summary)
            .await?;
        return Ok(Some(summary));
    }

    let key = format!("summary.{}.{}.{}", state.owner, state.name, state.number);
    let guard = match ctx.lock.acquire(&key).await {
        Ok(guard) => guard,
        Err(err) => {
            error!(
                "could not obtain lock to create initial summary comment on {}/{}#{}, skipping: {}",
                state.owner, state.name, state.number, err
            );
            return Ok(None);
        }
    };

    let comment_id = ctx
        .api
        .create_comment(&state.owner, &state.name, state.number, &summary)
        .await?;
    ctx.pull_request_store
        .set_status_comment_id(&state.owner, &state.name, state.number, comment_id)
        .await?;

    if let Err(err) = ctx.lock.release(guard).await {
        error!("could not release summary lock for {}: {}", key, err);
    }

    Ok(Some(summary))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::{pull_request_rule, sync_state_stub, test_context};

    #[test]
    fn summary_renders_every_section() {
        let mut state = sync_state_stub();
        state.title_regex = r"\[PRB-\d+\]".to_owned();
        state.rules = vec![
            pull_request_rule("rule-a", vec![], vec![]),
            pull_request_rule("rule-b", vec![], vec![]),
        ];

        let summary = render_summary(&state);

        assert!(summary
            .starts_with("_This is an auto-generated message summarizing this pull request._"));
        assert!(summary.contains("> - :speech_balloon: **Title validation**: _valid!_ :heavy_check_mark:"));
        assert!(summary.contains(">   - _Rule_: \\[PRB-\\d+\\]"));
        assert!(summary.contains("> - :twisted_rightwards_arrows: **Merge strategy**: _Merge_"));
        assert!(summary.contains("> - :straight_ruler: **Pull request rules**: _rule-a, rule-b_"));
        assert!(summary.contains("> - :construction: **WIP?**: No :heavy_check_mark:"));
        assert!(summary.contains("> - :checkered_flag: **Checks**: _passed_! :heavy_check_mark:"));
        assert!(summary.contains("> - :mag: **Code reviews**: _passed!_ :heavy_check_mark:"));
        assert!(summary.contains("> - :test_tube: **QA**: _passed_! :heavy_check_mark:"));
        assert!(summary.contains("> - :lock: **Locked?**: No :heavy_check_mark:"));
        assert!(summary.contains("> - :twisted_rightwards_arrows: **Mergeable?**: Yes :heavy_check_mark:"));
        assert!(summary.contains("> - :twisted_rightwards_arrows: **Automerge**: No :x:"));
        assert!(summary.contains("> Success: All good"));
        assert!(summary.contains(
            "[_See checks output by clicking this link :triangular_flag_on_post:_]\
             (https://github.com/owner/name/pull/1/checks)"
        ));
        assert!(summary.ends_with(message_footer()));
    }

    #[test]
    fn summary_reflects_failures() {
        let mut state = sync_state_stub();
        state.valid_pr_title = false;
        state.wip = true;
        state.check_status = crate::models::CheckStatus::Waiting;
        state.qa_status = QaStatus::Fail;
        state.locked = true;
        state.mergeable = false;

        let summary = render_summary(&state);

        assert!(summary.contains("**Title validation**: _invalid!_ :x:"));
        assert!(summary.contains(">   - _Rule_: None"));
        assert!(summary.contains("**Pull request rules**: _None_"));
        assert!(summary.contains("**WIP?**: Yes :x:"));
        assert!(summary.contains("**Checks**: _waiting_... :clock2:"));
        assert!(summary.contains("**QA**: _failed_. :x:"));
        assert!(summary.contains("**Locked?**: Yes :x:"));
        assert!(summary.contains("**Mergeable?**: No :x:"));
        assert!(summary.contains("> Pending: PR is still in WIP"));
    }

    #[tokio::test]
    async fn first_projection_creates_comment_and_persists_id() {
        let (ctx, fixtures) = test_context();
        crate::test_support::seed_pull_request(&ctx).await;

        let state = sync_state_stub();
        let summary = project_summary(&ctx, &state).await.unwrap();

        assert!(summary.is_some());
        assert_eq!(fixtures.api.created_comments().len(), 1);

        let pr = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();
        assert!(pr.status_comment_id > 0);
    }

    #[tokio::test]
    async fn known_comment_is_updated_not_recreated() {
        let (ctx, fixtures) = test_context();
        crate::test_support::seed_pull_request(&ctx).await;

        let mut state = sync_state_stub();
        state.status_comment_id = 42;

        let summary = project_summary(&ctx, &state).await.unwrap();

        assert!(summary.is_some());
        assert!(fixtures.api.created_comments().is_empty());
        assert_eq!(fixtures.api.updated_comments(), vec![42]);
    }

    #[tokio::test]
    async fn contended_lock_skips_creation() {
        let (ctx, fixtures) = test_context();
        crate::test_support::seed_pull_request(&ctx).await;

        fixtures
            .lock
            .contended
            .lock()
            .unwrap()
            .insert("summary.owner.name.1".to_owned());

        let state = sync_state_stub();
        let summary = project_summary(&ctx, &state).await.unwrap();

        assert!(summary.is_none());
        assert!(fixtures.api.created_comments().is_empty());
    }
}
