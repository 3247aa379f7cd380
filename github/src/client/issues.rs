use crate::{
    client::{Client, Result, MAX_PER_PAGE},
    Label,
};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct LabelsRequest<'a> {
    labels: &'a [String],
}

#[derive(Debug, Serialize)]
struct CommentRequest<'a> {
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    id: u64,
}

/// `IssuesClient` handles communication with the issues related methods of
/// the GitHub API. Pull requests are issues as far as labels, comments and
/// reactions are concerned.
///
/// GitHub API docs: https://docs.github.com/en/rest/issues
pub struct IssuesClient<'a> {
    inner: &'a Client,
}

impl<'a> IssuesClient<'a> {
    pub(super) fn new(client: &'a Client) -> Self {
        Self { inner: client }
    }

    /// List the label names on an issue, draining all pages.
    pub async fn labels(&self, owner: &str, name: &str, number: u64) -> Result<Vec<String>> {
        let url = format!("repos/{}/{}/issues/{}/labels", owner, name, number);

        let mut labels = Vec::new();
        let mut page = 1usize;
        loop {
            let request = self
                .inner
                .get(&url)
                .await?
                .query(&[("per_page", MAX_PER_PAGE), ("page", page)]);
            let response = self.inner.send(request).await?;
            let chunk: Vec<Label> = self.inner.json(response).await?;
            let chunk_len = chunk.len();

            labels.extend(chunk.into_iter().map(|label| label.name));

            if chunk_len < MAX_PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(labels)
    }

    pub async fn add_labels(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        labels: &[String],
    ) -> Result<()> {
        info!(
            "adding labels on {}/{}#{}: {:?}",
            owner, name, number, labels
        );

        let url = format!("repos/{}/{}/issues/{}/labels", owner, name, number);
        let request = self.inner.post(&url).await?.json(&LabelsRequest { labels });
        let response = self.inner.send(request).await?;
        self.inner.empty(response).await
    }

    /// Replace the whole label set of an issue.
    pub async fn replace_labels(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        labels: &[String],
    ) -> Result<()> {
        info!(
            "replacing labels on {}/{}#{}: {:?}",
            owner, name, number, labels
        );

        let url = format!("repos/{}/{}/issues/{}/labels", owner, name, number);
        let request = self.inner.put(&url).await?.json(&LabelsRequest { labels });
        let response = self.inner.send(request).await?;
        self.inner.empty(response).await
    }

    /// Create a comment on an issue, returning the new comment id.
    pub async fn create_comment(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        body: &str,
    ) -> Result<u64> {
        let url = format!("repos/{}/{}/issues/{}/comments", owner, name, number);
        let request = self.inner.post(&url).await?.json(&CommentRequest { body });
        let response = self.inner.send(request).await?;
        let comment: CommentResponse = self.inner.json(response).await?;

        Ok(comment.id)
    }

    /// Update an existing comment in place.
    pub async fn update_comment(
        &self,
        owner: &str,
        name: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<u64> {
        let url = format!("repos/{}/{}/issues/comments/{}", owner, name, comment_id);
        let request = self.inner.patch(&url).await?.json(&CommentRequest { body });
        let response = self.inner.send(request).await?;
        let comment: CommentResponse = self.inner.json(response).await?;

        Ok(comment.id)
    }
}
