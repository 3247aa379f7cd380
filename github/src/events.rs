use super::{CheckSuite, Comment, Issue, Label, PullRequest, Repository, User};
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

/// Webhook event types handled by this crate. Everything else is rejected at
/// the door with a 412 by the intake layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventType {
    CheckSuite,
    IssueComment,
    Ping,
    PullRequest,
    PullRequestReview,
}

#[derive(Error, Debug)]
#[error("invalid github webhook event")]
pub struct ParseEventTypeError;

impl FromStr for EventType {
    type Err = ParseEventTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use EventType::*;

        match s {
            "check_suite" => Ok(CheckSuite),
            "issue_comment" => Ok(IssueComment),
            "ping" => Ok(Ping),
            "pull_request" => Ok(PullRequest),
            "pull_request_review" => Ok(PullRequestReview),
            _ => Err(ParseEventTypeError),
        }
    }
}

impl EventType {
    pub fn name(self) -> &'static str {
        match self {
            EventType::CheckSuite => "check_suite",
            EventType::IssueComment => "issue_comment",
            EventType::Ping => "ping",
            EventType::PullRequest => "pull_request",
            EventType::PullRequestReview => "pull_request_review",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct PingEvent {
    pub zen: String,
    pub hook_id: u64,
    pub repository: Option<Repository>,
    pub sender: Option<User>,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSuiteAction {
    Completed,
    Requested,
    Rerequested,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckSuiteEvent {
    pub action: CheckSuiteAction,
    pub check_suite: CheckSuite,
    pub repository: Repository,
    pub sender: User,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCommentAction {
    Created,
    Edited,
    Deleted,
}

impl IssueCommentAction {
    pub fn is_created(self) -> bool {
        matches!(self, IssueCommentAction::Created)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct IssueCommentEvent {
    pub action: IssueCommentAction,
    pub issue: Issue,
    pub comment: Comment,
    pub repository: Repository,
    pub sender: User,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullRequestAction {
    Assigned,
    Closed,
    ConvertedToDraft,
    Edited,
    Labeled,
    Locked,
    Opened,
    Reopened,
    ReadyForReview,
    ReviewRequested,
    ReviewRequestRemoved,
    Synchronize,
    Unassigned,
    Unlabeled,
    Unlocked,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PullRequestEvent {
    pub action: PullRequestAction,
    pub number: u64,
    pub pull_request: PullRequest,
    pub label: Option<Label>,
    pub repository: Repository,
    pub sender: User,
}

#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Submitted,
    Edited,
    Dismissed,
}

#[derive(Clone, Debug, Deserialize)]
pub struct PullRequestReviewEvent {
    pub action: ReviewAction,
    pub pull_request: PullRequest,
    pub repository: Repository,
    pub sender: User,
}

#[derive(Clone, Debug)]
pub enum Event {
    CheckSuite(CheckSuiteEvent),
    IssueComment(IssueCommentEvent),
    Ping(PingEvent),
    PullRequest(PullRequestEvent),
    PullRequestReview(PullRequestReviewEvent),
}

impl Event {
    pub fn from_json(event_type: EventType, json: &[u8]) -> Result<Self, serde_json::Error> {
        let event = match event_type {
            EventType::CheckSuite => Event::CheckSuite(serde_json::from_slice(json)?),
            EventType::IssueComment => Event::IssueComment(serde_json::from_slice(json)?),
            EventType::Ping => Event::Ping(serde_json::from_slice(json)?),
            EventType::PullRequest => Event::PullRequest(serde_json::from_slice(json)?),
            EventType::PullRequestReview => Event::PullRequestReview(serde_json::from_slice(json)?),
        };

        Ok(event)
    }

    pub fn event_type(&self) -> EventType {
        match self {
            Event::CheckSuite(_) => EventType::CheckSuite,
            Event::IssueComment(_) => EventType::IssueComment,
            Event::Ping(_) => EventType::Ping,
            Event::PullRequest(_) => EventType::PullRequest,
            Event::PullRequestReview(_) => EventType::PullRequestReview,
        }
    }

    /// The repository the event pertains to, when there is one.
    pub fn repository(&self) -> Option<&Repository> {
        match self {
            Event::CheckSuite(e) => Some(&e.repository),
            Event::IssueComment(e) => Some(&e.repository),
            Event::Ping(e) => e.repository.as_ref(),
            Event::PullRequest(e) => Some(&e.repository),
            Event::PullRequestReview(e) => Some(&e.repository),
        }
    }
}
