//! Webhook event dispatch: route each event type to command processing
//! and/or a synchronization pass.

use crate::{
    command::process_command,
    context::Context,
    sync::SyncOrchestrator,
    Result,
};
use github::{
    CheckSuiteEvent, Event, IssueCommentEvent, PingEvent, PullRequestAction, PullRequestEvent,
    PullRequestReviewEvent,
};
use log::info;

pub struct EventProcessor<'a> {
    ctx: &'a Context,
}

impl<'a> EventProcessor<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub async fn process_event(&self, event: Event) -> Result<()> {
        match event {
            Event::Ping(e) => self.handle_ping(e),
            Event::CheckSuite(e) => self.handle_check_suite(e).await?,
            Event::IssueComment(e) => self.handle_issue_comment(e).await?,
            Event::PullRequest(e) => self.handle_pull_request(e).await?,
            Event::PullRequestReview(e) => self.handle_review(e).await?,
        }

        Ok(())
    }

    fn handle_ping(&self, event: PingEvent) {
        info!("processing ping event: zen = `{}`", event.zen);
    }

    async fn handle_pull_request(&self, event: PullRequestEvent) -> Result<()> {
        let owner = &event.repository.owner.login;
        let name = &event.repository.name;
        info!(
            "processing pull request event `{:?}` on {}/{}#{}",
            event.action, owner, name, event.pull_request.number
        );

        self.ctx.api.ensure_installation(owner, name).await?;

        // Label and assignee churn does not affect the sync state.
        if matches!(
            event.action,
            PullRequestAction::Assigned
                | PullRequestAction::Labeled
                | PullRequestAction::Unlabeled
                | PullRequestAction::Unassigned
        ) {
            return Ok(());
        }

        SyncOrchestrator::new(self.ctx)
            .process(
                owner,
                name,
                event.pull_request.number,
                event.action == PullRequestAction::Opened,
            )
            .await?;

        Ok(())
    }

    async fn handle_check_suite(&self, event: CheckSuiteEvent) -> Result<()> {
        let owner = &event.repository.owner.login;
        let name = &event.repository.name;
        info!("processing check suite event on {}/{}", owner, name);

        self.ctx.api.ensure_installation(owner, name).await?;

        for pull_request in &event.check_suite.pull_requests {
            SyncOrchestrator::new(self.ctx)
                .process(owner, name, pull_request.number, false)
                .await?;
        }

        Ok(())
    }

    async fn handle_issue_comment(&self, event: IssueCommentEvent) -> Result<()> {
        let owner = &event.repository.owner.login;
        let name = &event.repository.name;
        info!(
            "processing issue comment event on {}/{}#{}",
            owner, name, event.issue.number
        );

        if !event.action.is_created() {
            return Ok(());
        }

        self.ctx.api.ensure_installation(owner, name).await?;

        // Each line may carry one command; a single sync pass runs at the
        // end if any of them asked for it.
        let mut needs_sync = false;
        for line in event.comment.body.lines() {
            let output = process_command(
                self.ctx,
                owner,
                name,
                event.issue.number,
                &event.comment.user.login,
                line,
                Some(event.comment.id),
            )
            .await?;

            needs_sync = needs_sync || output.needs_sync;
        }

        if needs_sync {
            SyncOrchestrator::new(self.ctx)
                .process(owner, name, event.issue.number, false)
                .await?;
        }

        Ok(())
    }

    async fn handle_review(&self, event: PullRequestReviewEvent) -> Result<()> {
        let owner = &event.repository.owner.login;
        let name = &event.repository.name;
        info!(
            "processing review event on {}/{}#{}",
            owner, name, event.pull_request.number
        );

        self.ctx.api.ensure_installation(owner, name).await?;

        SyncOrchestrator::new(self.ctx)
            .process(owner, name, event.pull_request.number, false)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::database::store::{PullRequestStore, RepositoryStore};
    use crate::models::{PullRequest, QaStatus, Repository, RepositoryPath};
    use crate::test_support::{test_context, upstream_pull_request};
    use github::EventType;

    fn issue_comment_event(body: &str) -> Event {
        let json = serde_json::json!({
            "action": "created",
            "issue": {"number": 1, "title": "t", "user": {"login": "foo"}},
            "comment": {"id": 42, "user": {"login": "foo"}, "body": body},
            "repository": {
                "name": "name",
                "full_name": "owner/name",
                "owner": {"login": "owner"}
            },
            "sender": {"login": "foo"}
        });

        Event::from_json(EventType::IssueComment, json.to_string().as_bytes()).unwrap()
    }

    async fn seeded_context() -> (Context, crate::test_support::TestContext) {
        let (ctx, fixtures) = test_context();

        let repository = Repository::new("owner", "name");
        ctx.repository_store
            .create(repository.clone())
            .await
            .unwrap();
        ctx.pull_request_store
            .create(PullRequest::new(RepositoryPath::new("owner", "name"), 1))
            .await
            .unwrap();
        fixtures
            .api
            .set_pull_request(upstream_pull_request("foo", "feature", "main"));

        (ctx, fixtures)
    }

    #[tokio::test]
    async fn command_comment_triggers_single_sync() {
        let (ctx, fixtures) = seeded_context().await;

        let event = issue_comment_event("bot qa+\nbot automerge+");
        EventProcessor::new(&ctx).process_event(event).await.unwrap();

        let pr = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pr.qa_status, QaStatus::Pass);
        assert!(pr.automerge);

        // Two commands, one orchestrator pass: exactly one commit status.
        assert_eq!(fixtures.api.commit_statuses().len(), 1);
    }

    #[tokio::test]
    async fn non_command_comment_does_not_sync() {
        let (ctx, fixtures) = seeded_context().await;

        let event = issue_comment_event("thanks for the review!");
        EventProcessor::new(&ctx).process_event(event).await.unwrap();

        assert!(fixtures.api.commit_statuses().is_empty());
        assert!(fixtures.api.created_comments().is_empty());
    }

    #[tokio::test]
    async fn pull_request_label_events_are_ignored() {
        let (ctx, fixtures) = seeded_context().await;

        let json = serde_json::json!({
            "action": "labeled",
            "number": 1,
            "pull_request": {
                "number": 1,
                "title": "Add feature",
                "body": null,
                "user": {"login": "foo"},
                "draft": false,
                "head": {"ref": "feature", "sha": "abcdef"},
                "base": {"ref": "main", "sha": "123456"},
                "labels": [],
                "requested_reviewers": [],
                "merged": false,
                "mergeable": true
            },
            "label": {"name": "bug", "color": null, "description": null},
            "repository": {
                "name": "name",
                "full_name": "owner/name",
                "owner": {"login": "owner"}
            },
            "sender": {"login": "foo"}
        });
        let event = Event::from_json(EventType::PullRequest, json.to_string().as_bytes()).unwrap();

        EventProcessor::new(&ctx).process_event(event).await.unwrap();
        assert!(fixtures.api.commit_statuses().is_empty());
    }

    #[tokio::test]
    async fn check_suite_event_syncs_every_attached_pull_request() {
        let (ctx, fixtures) = seeded_context().await;
        ctx.pull_request_store
            .create(PullRequest::new(RepositoryPath::new("owner", "name"), 2))
            .await
            .unwrap();

        let json = serde_json::json!({
            "action": "completed",
            "check_suite": {
                "id": 5,
                "head_sha": "abcdef",
                "status": "completed",
                "conclusion": "success",
                "pull_requests": [
                    {"number": 1, "head": {"ref": "feature", "sha": "abcdef"},
                     "base": {"ref": "main", "sha": "123456"}},
                    {"number": 2, "head": {"ref": "other", "sha": "fedcba"},
                     "base": {"ref": "main", "sha": "123456"}}
                ]
            },
            "repository": {
                "name": "name",
                "full_name": "owner/name",
                "owner": {"login": "owner"}
            },
            "sender": {"login": "foo"}
        });
        let event = Event::from_json(EventType::CheckSuite, json.to_string().as_bytes()).unwrap();

        EventProcessor::new(&ctx).process_event(event).await.unwrap();
        assert_eq!(fixtures.api.commit_statuses().len(), 2);
    }
}
