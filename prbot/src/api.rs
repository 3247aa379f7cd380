//! Platform seam: the subset of the GitHub API the bot acts through.
//!
//! Core logic only ever talks to [`ApiClient`], so tests can swap in a
//! recording fake while production wires [`GithubApi`] over the real client.

use crate::{models::MergeStrategy, Result};
use async_trait::async_trait;
use github::{
    CheckRun, CommitStatusState, PullRequest, ReactionType, Repository, ReviewDecision,
};

#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Upgrade client authentication so it can act on the given repository
    /// (app → installation token exchange).
    async fn ensure_installation(&self, owner: &str, name: &str) -> Result<()>;

    async fn repository(&self, owner: &str, name: &str) -> Result<Repository>;

    async fn pull_request(&self, owner: &str, name: &str, number: u64) -> Result<PullRequest>;

    async fn check_runs(&self, owner: &str, name: &str, sha: &str) -> Result<Vec<CheckRun>>;

    async fn review_decision(
        &self,
        owner: &str,
        name: &str,
        number: u64,
    ) -> Result<Option<ReviewDecision>>;

    async fn merge_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        commit_title: &str,
        commit_message: &str,
        strategy: MergeStrategy,
    ) -> Result<()>;

    async fn labels(&self, owner: &str, name: &str, number: u64) -> Result<Vec<String>>;

    async fn add_labels(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        labels: &[String],
    ) -> Result<()>;

    async fn replace_labels(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        labels: &[String],
    ) -> Result<()>;

    async fn create_comment(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        body: &str,
    ) -> Result<u64>;

    async fn update_comment(
        &self,
        owner: &str,
        name: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<u64>;

    async fn add_reaction(
        &self,
        owner: &str,
        name: &str,
        comment_id: u64,
        reaction: ReactionType,
    ) -> Result<()>;

    async fn add_reviewers(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<()>;

    async fn remove_reviewers(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<()>;

    async fn create_commit_status(
        &self,
        owner: &str,
        name: &str,
        sha: &str,
        state: CommitStatusState,
        context: &str,
        description: &str,
    ) -> Result<()>;
}

/// Live implementation over [`github::Client`].
pub struct GithubApi {
    client: github::Client,
}

impl GithubApi {
    pub fn new(client: github::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ApiClient for GithubApi {
    async fn ensure_installation(&self, owner: &str, name: &str) -> Result<()> {
        Ok(self.client.ensure_installation(owner, name).await?)
    }

    async fn repository(&self, owner: &str, name: &str) -> Result<Repository> {
        Ok(self.client.repos().get(owner, name).await?)
    }

    async fn pull_request(&self, owner: &str, name: &str, number: u64) -> Result<PullRequest> {
        Ok(self.client.pulls().get(owner, name, number).await?)
    }

    async fn check_runs(&self, owner: &str, name: &str, sha: &str) -> Result<Vec<CheckRun>> {
        Ok(self.client.checks().list_for_commit(owner, name, sha).await?)
    }

    async fn review_decision(
        &self,
        owner: &str,
        name: &str,
        number: u64,
    ) -> Result<Option<ReviewDecision>> {
        Ok(self.client.pulls().review_decision(owner, name, number).await?)
    }

    async fn merge_pull_request(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        commit_title: &str,
        commit_message: &str,
        strategy: MergeStrategy,
    ) -> Result<()> {
        Ok(self
            .client
            .pulls()
            .merge(owner, name, number, commit_title, commit_message, strategy.name())
            .await?)
    }

    async fn labels(&self, owner: &str, name: &str, number: u64) -> Result<Vec<String>> {
        Ok(self.client.issues().labels(owner, name, number).await?)
    }

    async fn add_labels(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        labels: &[String],
    ) -> Result<()> {
        Ok(self.client.issues().add_labels(owner, name, number, labels).await?)
    }

    async fn replace_labels(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        labels: &[String],
    ) -> Result<()> {
        Ok(self
            .client
            .issues()
            .replace_labels(owner, name, number, labels)
            .await?)
    }

    async fn create_comment(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        body: &str,
    ) -> Result<u64> {
        Ok(self.client.issues().create_comment(owner, name, number, body).await?)
    }

    async fn update_comment(
        &self,
        owner: &str,
        name: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<u64> {
        Ok(self
            .client
            .issues()
            .update_comment(owner, name, comment_id, body)
            .await?)
    }

    async fn add_reaction(
        &self,
        owner: &str,
        name: &str,
        comment_id: u64,
        reaction: ReactionType,
    ) -> Result<()> {
        Ok(self
            .client
            .reactions()
            .add_for_comment(owner, name, comment_id, reaction)
            .await?)
    }

    async fn add_reviewers(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        Ok(self
            .client
            .pulls()
            .add_reviewers(owner, name, number, reviewers)
            .await?)
    }

    async fn remove_reviewers(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        Ok(self
            .client
            .pulls()
            .remove_reviewers(owner, name, number, reviewers)
            .await?)
    }

    async fn create_commit_status(
        &self,
        owner: &str,
        name: &str,
        sha: &str,
        state: CommitStatusState,
        context: &str,
        description: &str,
    ) -> Result<()> {
        Ok(self
            .client
            .repos()
            .create_commit_status(owner, name, sha, state, context, description)
            .await?)
    }
}
