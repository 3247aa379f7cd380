use crate::{
    client::{Client, Result},
    ReactionType,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ReactionRequest {
    content: ReactionType,
}

/// `ReactionsClient` handles communication with the reactions related methods
/// of the GitHub API.
///
/// GitHub API docs: https://docs.github.com/en/rest/reactions
pub struct ReactionsClient<'a> {
    inner: &'a Client,
}

impl<'a> ReactionsClient<'a> {
    pub(super) fn new(client: &'a Client) -> Self {
        Self { inner: client }
    }

    /// React to an issue comment.
    pub async fn add_for_comment(
        &self,
        owner: &str,
        name: &str,
        comment_id: u64,
        reaction: ReactionType,
    ) -> Result<()> {
        let url = format!(
            "repos/{}/{}/issues/comments/{}/reactions",
            owner, name, comment_id
        );
        let request = self
            .inner
            .post(&url)
            .await?
            .json(&ReactionRequest { content: reaction });

        let response = self.inner.send(request).await?;
        self.inner.empty(response).await
    }
}
