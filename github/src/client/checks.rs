use crate::{
    client::{Client, Result, MAX_PER_PAGE},
    CheckRun,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CheckRunsResponse {
    check_runs: Vec<CheckRun>,
}

/// `ChecksClient` handles communication with the checks related methods of
/// the GitHub API.
///
/// GitHub API docs: https://docs.github.com/en/rest/checks
pub struct ChecksClient<'a> {
    inner: &'a Client,
}

impl<'a> ChecksClient<'a> {
    pub(super) fn new(client: &'a Client) -> Self {
        Self { inner: client }
    }

    /// List every check run attached to a commit, draining all pages.
    pub async fn list_for_commit(
        &self,
        owner: &str,
        name: &str,
        sha: &str,
    ) -> Result<Vec<CheckRun>> {
        let url = format!("repos/{}/{}/commits/{}/check-runs", owner, name, sha);

        let mut runs = Vec::new();
        let mut page = 1usize;
        loop {
            let request = self
                .inner
                .get(&url)
                .await?
                .query(&[("per_page", MAX_PER_PAGE), ("page", page)]);
            let response = self.inner.send(request).await?;
            let chunk: CheckRunsResponse = self.inner.json(response).await?;
            let chunk_len = chunk.check_runs.len();

            runs.extend(chunk.check_runs);

            if chunk_len < MAX_PER_PAGE {
                break;
            }
            page += 1;
        }

        Ok(runs)
    }
}
