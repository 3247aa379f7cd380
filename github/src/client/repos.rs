use crate::{
    client::{Client, Result},
    CommitStatusState, Repository, RepositoryInstallation,
};
use serde::Serialize;

/// GitHub limits commit status descriptions to 140 characters.
const MAX_DESCRIPTION_LEN: usize = 139;

#[derive(Debug, Serialize)]
struct CommitStatusRequest<'a> {
    state: CommitStatusState,
    description: &'a str,
    context: &'a str,
}

/// `ReposClient` handles communication with the repository related methods of
/// the GitHub API.
///
/// GitHub API docs: https://docs.github.com/en/rest/repos
pub struct ReposClient<'a> {
    inner: &'a Client,
}

impl<'a> ReposClient<'a> {
    pub(super) fn new(client: &'a Client) -> Self {
        Self { inner: client }
    }

    pub async fn get(&self, owner: &str, name: &str) -> Result<Repository> {
        let url = format!("repos/{}/{}", owner, name);
        let response = self.inner.send(self.inner.get(&url).await?).await?;
        self.inner.json(response).await
    }

    /// Get the app installation covering a repository. Only meaningful when
    /// authenticated as an app.
    pub async fn installation(&self, owner: &str, name: &str) -> Result<RepositoryInstallation> {
        let url = format!("repos/{}/{}/installation", owner, name);
        let response = self.inner.send(self.inner.get(&url).await?).await?;
        self.inner.json(response).await
    }

    /// Create a commit status on a commit.
    ///
    /// GitHub API docs: https://docs.github.com/en/rest/commits/statuses#create-a-commit-status
    pub async fn create_commit_status(
        &self,
        owner: &str,
        name: &str,
        sha: &str,
        state: CommitStatusState,
        context: &str,
        description: &str,
    ) -> Result<()> {
        let description: String = description.chars().take(MAX_DESCRIPTION_LEN).collect();
        let url = format!("repos/{}/{}/statuses/{}", owner, name, sha);
        let request = self.inner.post(&url).await?.json(&CommitStatusRequest {
            state,
            description: &description,
            context,
        });

        let response = self.inner.send(request).await?;
        self.inner.empty(response).await
    }
}
