use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct User {
    pub login: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Repository {
    pub name: String,
    pub full_name: String,
    pub owner: User,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub user: User,
    pub body: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub user: User,
}

/// A branch reference on a pull request. `ref` is a keyword, hence the rename.
#[derive(Clone, Debug, Deserialize)]
pub struct PullRequestBranch {
    #[serde(rename = "ref")]
    pub branch: String,
    pub sha: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub user: User,
    pub draft: bool,
    pub head: PullRequestBranch,
    pub base: PullRequestBranch,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub requested_reviewers: Vec<User>,
    /// Only populated on full PR payloads, not on the short references
    /// embedded in check suites.
    pub merged: Option<bool>,
    pub mergeable: Option<bool>,
}

/// Short PR reference as embedded in check-run / check-suite payloads.
#[derive(Clone, Debug, Deserialize)]
pub struct PullRequestRef {
    pub number: u64,
    pub head: PullRequestBranch,
    pub base: PullRequestBranch,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Completed,
    InProgress,
    Queued,
    Requested,
    Pending,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckConclusion {
    ActionRequired,
    Cancelled,
    Failure,
    Neutral,
    Skipped,
    Stale,
    StartupFailure,
    Success,
    TimedOut,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckRun {
    pub id: u64,
    pub name: String,
    pub head_sha: String,
    pub status: CheckStatus,
    pub conclusion: Option<CheckConclusion>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckSuite {
    pub id: u64,
    pub head_sha: String,
    pub status: CheckStatus,
    pub conclusion: Option<CheckConclusion>,
    #[serde(default)]
    pub pull_requests: Vec<PullRequestRef>,
}

/// State of a commit status.
///
/// GitHub API docs: https://docs.github.com/en/rest/commits/statuses
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitStatusState {
    Error,
    Failure,
    Pending,
    Success,
}

impl CommitStatusState {
    pub fn name(self) -> &'static str {
        match self {
            CommitStatusState::Error => "Error",
            CommitStatusState::Failure => "Failure",
            CommitStatusState::Pending => "Pending",
            CommitStatusState::Success => "Success",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionType {
    #[serde(rename = "+1")]
    PlusOne,
    #[serde(rename = "-1")]
    MinusOne,
    Laugh,
    Confused,
    Heart,
    Hooray,
    Rocket,
    Eyes,
}

/// Aggregated review decision, only available through the GraphQL API.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub enum ReviewDecision {
    #[serde(rename = "APPROVED")]
    Approved,
    #[serde(rename = "CHANGES_REQUESTED")]
    ChangesRequested,
    #[serde(rename = "REVIEW_REQUIRED")]
    ReviewRequired,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RepositoryInstallation {
    pub id: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct InstallationToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pull_request_payload() {
        let json = r#"{
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
        }"#;

        let pr: PullRequest = serde_json::from_str(json).unwrap();
        assert_eq!(pr.number, 1);
        assert_eq!(pr.head.branch, "feature");
        assert_eq!(pr.base.branch, "main");
        assert_eq!(pr.mergeable, Some(true));
    }

    #[test]
    fn check_run_conclusion() {
        let json = r#"{
            "id": 10,
            "name": "ci",
            "head_sha": "abcdef",
            "status": "completed",
            "conclusion": "success",
            "started_at": "2024-01-01T00:00:00Z",
            "completed_at": "2024-01-01T00:05:00Z"
        }"#;

        let run: CheckRun = serde_json::from_str(json).unwrap();
        assert_eq!(run.conclusion, Some(CheckConclusion::Success));
    }

    #[test]
    fn reaction_wire_format() {
        assert_eq!(
            serde_json::to_string(&ReactionType::PlusOne).unwrap(),
            "\"+1\""
        );
        assert_eq!(
            serde_json::to_string(&ReactionType::Eyes).unwrap(),
            "\"eyes\""
        );
    }
}
