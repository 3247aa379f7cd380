use crate::{
    client::{Client, Error, Result},
    PullRequest, ReviewDecision,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct MergeRequest<'a> {
    commit_title: &'a str,
    commit_message: &'a str,
    merge_method: &'a str,
}

#[derive(Debug, Serialize)]
struct ReviewersRequest<'a> {
    reviewers: &'a [String],
}

/// `PullsClient` handles communication with the pull request related methods
/// of the GitHub API.
///
/// GitHub API docs: https://docs.github.com/en/rest/pulls
pub struct PullsClient<'a> {
    inner: &'a Client,
}

impl<'a> PullsClient<'a> {
    pub(super) fn new(client: &'a Client) -> Self {
        Self { inner: client }
    }

    pub async fn get(&self, owner: &str, name: &str, number: u64) -> Result<PullRequest> {
        let url = format!("repos/{}/{}/pulls/{}", owner, name, number);
        let response = self.inner.send(self.inner.get(&url).await?).await?;
        self.inner.json(response).await
    }

    /// Merge a pull request. `merge_method` is one of `merge`, `squash` or
    /// `rebase`.
    ///
    /// GitHub API docs: https://docs.github.com/en/rest/pulls/pulls#merge-a-pull-request
    pub async fn merge(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        commit_title: &str,
        commit_message: &str,
        merge_method: &str,
    ) -> Result<()> {
        let url = format!("repos/{}/{}/pulls/{}/merge", owner, name, number);
        let request = self.inner.put(&url).await?.json(&MergeRequest {
            commit_title,
            commit_message,
            merge_method,
        });

        let response = self.inner.send(request).await?;
        self.inner.empty(response).await
    }

    pub async fn add_reviewers(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        let url = format!(
            "repos/{}/{}/pulls/{}/requested_reviewers",
            owner, name, number
        );
        let request = self
            .inner
            .post(&url)
            .await?
            .json(&ReviewersRequest { reviewers });

        let response = self.inner.send(request).await?;
        self.inner.empty(response).await
    }

    pub async fn remove_reviewers(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        let url = format!(
            "repos/{}/{}/pulls/{}/requested_reviewers",
            owner, name, number
        );
        let request = self
            .inner
            .delete(&url)
            .await?
            .json(&ReviewersRequest { reviewers });

        let response = self.inner.send(request).await?;
        self.inner.empty(response).await
    }

    /// Fetch the aggregated review decision through the GraphQL API.
    ///
    /// Returns `None` when the repository has no review requirements
    /// configured (`reviewDecision` is null).
    pub async fn review_decision(
        &self,
        owner: &str,
        name: &str,
        number: u64,
    ) -> Result<Option<ReviewDecision>> {
        let query = format!(
            r#"query {{
                repository(owner: "{owner}", name: "{name}") {{
                    pullRequest(number: {number}) {{
                        reviewDecision
                    }}
                }}
            }}"#,
            owner = owner,
            name = name,
            number = number
        );

        let request = self
            .inner
            .post("graphql")
            .await?
            .json(&serde_json::json!({ "query": query }));
        let response = self.inner.send(request).await?;
        let payload: serde_json::Value = self.inner.json(response).await?;

        if let Some(errors) = payload.get("errors") {
            if errors.as_array().map(|a| !a.is_empty()).unwrap_or(false) {
                return Err(Error::Graphql(errors.to_string()));
            }
        }

        let decision = payload
            .pointer("/data/repository/pullRequest/reviewDecision")
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        match decision {
            serde_json::Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }
}
