//! Top-level synchronization pass: make sure local records exist, build the
//! sync state, project it onto the platform, then automerge when allowed.

use crate::{
    commit_status::project_commit_status,
    context::Context,
    database::store::{PullRequestStore, RepositoryStore},
    models::{PullRequest, Repository},
    step::{project_step_label, StepLabel},
    summary::project_summary,
    sync::state::{SyncState, SyncStateBuilder},
    Result,
};
use log::{error, info};

#[derive(Debug)]
pub enum SyncOutcome {
    Success {
        sync_state: SyncState,
        step_label: StepLabel,
        summary: Option<String>,
    },
    /// The PR is unknown and the repository requires manual interaction.
    Skipped,
}

pub struct SyncOrchestrator<'a> {
    ctx: &'a Context,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub async fn process(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        force_creation: bool,
    ) -> Result<SyncOutcome> {
        info!("synchronizing pull request {}/{}#{}", owner, name, number);
        self.ctx.api.ensure_installation(owner, name).await?;

        let repository = match self.ctx.repository_store.get(owner, name).await? {
            Some(repository) => repository,
            None => {
                let upstream = self.ctx.api.repository(owner, name).await?;
                self.ctx
                    .repository_store
                    .create(Repository::new(
                        upstream.owner.login.clone(),
                        upstream.name.clone(),
                    ))
                    .await?
            }
        };

        if self
            .ctx
            .pull_request_store
            .get(owner, name, number)
            .await?
            .is_none()
        {
            if repository.manual_interaction && !force_creation {
                info!(
                    "not syncing {}/{}#{} because of manual interaction settings",
                    owner, name, number
                );
                return Ok(SyncOutcome::Skipped);
            }

            self.ctx
                .pull_request_store
                .create(PullRequest::from_repository(&repository, number))
                .await?;
        }

        let sync_state = SyncStateBuilder::new(self.ctx)
            .build(owner, name, number)
            .await?;

        project_commit_status(self.ctx, &sync_state).await?;
        let step_label = project_step_label(self.ctx, &sync_state).await?;
        let summary = project_summary(self.ctx, &sync_state).await?;

        if sync_state.automerge && step_label == StepLabel::AwaitingMerge && !sync_state.merged {
            self.automerge(&sync_state).await?;
        }

        Ok(SyncOutcome::Success {
            sync_state,
            step_label,
            summary,
        })
    }

    /// Merge under a per-PR lock. A contended lock means another worker is
    /// already merging; any other merge failure disables automerge so
    /// subsequent syncs do not retry forever.
    async fn automerge(&self, state: &SyncState) -> Result<()> {
        let key = format!("automerge.{}.{}.{}", state.owner, state.name, state.number);
        let guard = match self.ctx.lock.acquire(&key).await {
            Ok(guard) => guard,
            Err(err) => {
                error!("could not obtain lock to merge pull request, skipping: {}", err);
                return Ok(());
            }
        };

        let commit_title = format!("{} (#{})", state.title, state.number);
        let result = self
            .ctx
            .api
            .merge_pull_request(
                &state.owner,
                &state.name,
                state.number,
                &commit_title,
                "",
                state.merge_strategy,
            )
            .await;

        if let Err(err) = self.ctx.lock.release(guard).await {
            error!("could not release automerge lock for {}: {}", key, err);
        }

        if let Err(err) = result {
            error!(
                "merge of {}/{}#{} failed, disabling automerge: {}",
                state.owner, state.name, state.number, err
            );
            self.ctx
                .pull_request_store
                .set_automerge(&state.owner, &state.name, state.number, false)
                .await?;
        } else {
            info!(
                "pull request {}/{}#{} automerged",
                state.owner, state.name, state.number
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::{MergeStrategy, QaStatus};
    use crate::test_support::{test_context, upstream_pull_request, ApiCall};
    use github::ReviewDecision;

    async fn ready_to_merge_fixture() -> (Context, crate::test_support::TestContext) {
        let (ctx, fixtures) = test_context();

        let repository = Repository::new("owner", "name");
        ctx.repository_store
            .create(repository.clone())
            .await
            .unwrap();

        let mut pr = PullRequest::new(repository.path(), 1);
        pr.qa_status = QaStatus::Pass;
        pr.automerge = true;
        ctx.pull_request_store.create(pr).await.unwrap();

        let mut upstream = upstream_pull_request("foo", "feature", "main");
        upstream.title = "Add feature".to_owned();
        fixtures.api.set_pull_request(upstream);
        fixtures.api.set_check_runs(vec![crate::test_support::check_run_success()]);
        fixtures.api.set_review_decision(Some(ReviewDecision::Approved));

        (ctx, fixtures)
    }

    #[tokio::test]
    async fn happy_path_merges_with_resolved_strategy() {
        let (ctx, fixtures) = ready_to_merge_fixture().await;

        let outcome = SyncOrchestrator::new(&ctx)
            .process("owner", "name", 1, false)
            .await
            .unwrap();

        match outcome {
            SyncOutcome::Success {
                sync_state,
                step_label,
                ..
            } => {
                assert_eq!(step_label, StepLabel::AwaitingMerge);
                assert!(sync_state.automerge);
            }
            SyncOutcome::Skipped => panic!("sync was skipped"),
        }

        // Commit status success, step label replaced, summary created, merge
        // called with the resolved strategy and generated commit title.
        let statuses = fixtures.api.commit_statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].1, "All good");

        let labels = fixtures.api.replaced_labels();
        assert_eq!(labels, vec![vec!["step/awaiting-merge".to_owned()]]);

        assert_eq!(fixtures.api.created_comments().len(), 1);

        let merges = fixtures.api.merges();
        assert_eq!(merges.len(), 1);
        assert_eq!(merges[0].0, "Add feature (#1)");
        assert_eq!(merges[0].1, MergeStrategy::Merge);
    }

    #[tokio::test]
    async fn merge_failure_disables_automerge() {
        let (ctx, fixtures) = ready_to_merge_fixture().await;
        fixtures.api.fail_next_merge("branch is out of date");

        SyncOrchestrator::new(&ctx)
            .process("owner", "name", 1, false)
            .await
            .unwrap();

        let pr = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();
        assert!(!pr.automerge);
    }

    #[tokio::test]
    async fn contended_automerge_lock_skips_merge_without_disabling() {
        let (ctx, fixtures) = ready_to_merge_fixture().await;
        fixtures
            .lock
            .contended
            .lock()
            .unwrap()
            .insert("automerge.owner.name.1".to_owned());

        SyncOrchestrator::new(&ctx)
            .process("owner", "name", 1, false)
            .await
            .unwrap();

        assert!(fixtures.api.merges().is_empty());
        let pr = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();
        assert!(pr.automerge);
    }

    #[tokio::test]
    async fn no_automerge_when_not_ready() {
        let (ctx, fixtures) = ready_to_merge_fixture().await;
        ctx.pull_request_store
            .set_qa_status("owner", "name", 1, QaStatus::Waiting)
            .await
            .unwrap();

        let outcome = SyncOrchestrator::new(&ctx)
            .process("owner", "name", 1, false)
            .await
            .unwrap();

        match outcome {
            SyncOutcome::Success { step_label, .. } => {
                assert_eq!(step_label, StepLabel::AwaitingQa)
            }
            SyncOutcome::Skipped => panic!("sync was skipped"),
        }
        assert!(fixtures.api.merges().is_empty());
    }

    #[tokio::test]
    async fn unknown_repository_is_created_from_upstream() {
        let (ctx, fixtures) = test_context();
        fixtures
            .api
            .set_pull_request(upstream_pull_request("foo", "feature", "main"));

        SyncOrchestrator::new(&ctx)
            .process("owner", "name", 1, false)
            .await
            .unwrap();

        assert!(ctx
            .repository_store
            .get("owner", "name")
            .await
            .unwrap()
            .is_some());
        assert!(ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn manual_interaction_skips_unknown_pull_requests() {
        let (ctx, fixtures) = test_context();

        let mut repository = Repository::new("owner", "name");
        repository.manual_interaction = true;
        ctx.repository_store.create(repository).await.unwrap();
        fixtures
            .api
            .set_pull_request(upstream_pull_request("foo", "feature", "main"));

        let outcome = SyncOrchestrator::new(&ctx)
            .process("owner", "name", 1, false)
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Skipped));

        // force_creation bypasses the manual interaction policy.
        let outcome = SyncOrchestrator::new(&ctx)
            .process("owner", "name", 1, true)
            .await
            .unwrap();
        assert!(matches!(outcome, SyncOutcome::Success { .. }));
    }

    #[tokio::test]
    async fn new_pull_request_follows_repository_defaults() {
        let (ctx, fixtures) = test_context();

        let mut repository = Repository::new("owner", "name");
        repository.default_enable_qa = false;
        ctx.repository_store.create(repository).await.unwrap();
        fixtures
            .api
            .set_pull_request(upstream_pull_request("foo", "feature", "main"));

        SyncOrchestrator::new(&ctx)
            .process("owner", "name", 1, false)
            .await
            .unwrap();

        let pr = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pr.qa_status, QaStatus::Skipped);
    }

    #[tokio::test]
    async fn projection_order_is_status_then_labels_then_summary() {
        let (ctx, fixtures) = ready_to_merge_fixture().await;

        SyncOrchestrator::new(&ctx)
            .process("owner", "name", 1, false)
            .await
            .unwrap();

        let kinds: Vec<&'static str> = fixtures
            .api
            .calls()
            .iter()
            .filter_map(|call| match call {
                ApiCall::CreateCommitStatus { .. } => Some("status"),
                ApiCall::ReplaceLabels { .. } => Some("labels"),
                ApiCall::CreateComment { .. } => Some("summary"),
                ApiCall::Merge { .. } => Some("merge"),
                _ => None,
            })
            .collect();

        assert_eq!(kinds, vec!["status", "labels", "summary", "merge"]);
    }
}
