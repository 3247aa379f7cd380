//! Domain model: local repository and pull request records, merge rules and
//! the tagged condition/action variants evaluated by the sync engine.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("invalid path `{0}`")]
pub struct ParsePathError(pub String);

/// `(owner, name)` pair identifying a repository, rendered `owner/name`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryPath {
    pub owner: String,
    pub name: String,
}

impl RepositoryPath {
    pub fn new<S: Into<String>>(owner: S, name: S) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepositoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryPath {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => {
                Ok(Self::new(owner, name))
            }
            _ => Err(ParsePathError(s.to_owned())),
        }
    }
}

/// `owner/name#number` path of a single pull request.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PullRequestPath {
    pub owner: String,
    pub name: String,
    pub number: u64,
}

impl fmt::Display for PullRequestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.name, self.number)
    }
}

impl FromStr for PullRequestPath {
    type Err = ParsePathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (repository, number) = s.split_once('#').ok_or_else(|| ParsePathError(s.to_owned()))?;
        let path: RepositoryPath = repository.parse()?;
        let number = number.parse().map_err(|_| ParsePathError(s.to_owned()))?;

        Ok(Self {
            owner: path.owner,
            name: path.name,
            number,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    Merge,
    Squash,
    Rebase,
}

impl Default for MergeStrategy {
    fn default() -> Self {
        MergeStrategy::Merge
    }
}

impl MergeStrategy {
    /// Lowercase name, as persisted and as sent to the merge endpoint.
    pub fn name(self) -> &'static str {
        match self {
            MergeStrategy::Merge => "merge",
            MergeStrategy::Squash => "squash",
            MergeStrategy::Rebase => "rebase",
        }
    }

    /// Capitalized name for human-facing summaries.
    pub fn title(self) -> &'static str {
        match self {
            MergeStrategy::Merge => "Merge",
            MergeStrategy::Squash => "Squash",
            MergeStrategy::Rebase => "Rebase",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
#[error("invalid merge strategy `{0}`")]
pub struct ParseMergeStrategyError(pub String);

impl FromStr for MergeStrategy {
    type Err = ParseMergeStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(MergeStrategy::Merge),
            "squash" => Ok(MergeStrategy::Squash),
            "rebase" => Ok(MergeStrategy::Rebase),
            _ => Err(ParseMergeStrategyError(s.to_owned())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QaStatus {
    Waiting,
    Skipped,
    Pass,
    Fail,
}

impl QaStatus {
    pub fn name(self) -> &'static str {
        match self {
            QaStatus::Waiting => "waiting",
            QaStatus::Skipped => "skipped",
            QaStatus::Pass => "pass",
            QaStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for QaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Error, Debug)]
#[error("invalid qa status `{0}`")]
pub struct ParseQaStatusError(pub String);

impl FromStr for QaStatus {
    type Err = ParseQaStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(QaStatus::Waiting),
            "skipped" => Ok(QaStatus::Skipped),
            "pass" => Ok(QaStatus::Pass),
            "fail" => Ok(QaStatus::Fail),
            _ => Err(ParseQaStatusError(s.to_owned())),
        }
    }
}

/// Aggregate verdict over the upstream check runs of a head commit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Waiting,
    Skipped,
    Pass,
    Fail,
}

/// A branch matcher: either an exact name or the `*` wildcard. Persisted as
/// the literal name, `*` for the wildcard.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleBranch {
    Named(String),
    Wildcard,
}

impl RuleBranch {
    pub fn name(&self) -> &str {
        match self {
            RuleBranch::Named(name) => name,
            RuleBranch::Wildcard => "*",
        }
    }

    pub fn from_name(value: &str) -> Self {
        if value == "*" {
            RuleBranch::Wildcard
        } else {
            RuleBranch::Named(value.to_owned())
        }
    }
}

impl fmt::Display for RuleBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for RuleBranch {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RuleBranch::from_name(s))
    }
}

/// Condition of a repository rule, matched against the upstream PR snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleCondition {
    Author(String),
    BaseBranch(RuleBranch),
    HeadBranch(RuleBranch),
}

/// Action applied to the local PR record when a rule matches.
///
/// The `set_qa_enabled` discriminator is a legacy spelling kept for data
/// compatibility with existing exports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RuleAction {
    SetAutomerge(bool),
    #[serde(rename = "set_qa_enabled")]
    SetQaStatus(QaStatus),
    SetChecksEnabled(bool),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub manual_interaction: bool,
    /// Pattern matched against PR titles, anchored at the start. Empty means
    /// every title is valid.
    pub pr_title_validation_regex: String,
    pub default_strategy: MergeStrategy,
    pub default_automerge: bool,
    pub default_enable_qa: bool,
    pub default_enable_checks: bool,
}

impl Repository {
    pub fn new<S: Into<String>>(owner: S, name: S) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            manual_interaction: false,
            pr_title_validation_regex: String::new(),
            default_strategy: MergeStrategy::Merge,
            default_automerge: false,
            default_enable_qa: true,
            default_enable_checks: true,
        }
    }

    pub fn path(&self) -> RepositoryPath {
        RepositoryPath::new(self.owner.clone(), self.name.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub repository_path: RepositoryPath,
    pub number: u64,
    pub qa_status: QaStatus,
    /// Platform id of the auto-maintained summary comment. Zero means no
    /// comment has been created yet.
    pub status_comment_id: u64,
    pub checks_enabled: bool,
    pub automerge: bool,
    pub locked: bool,
    pub strategy_override: Option<MergeStrategy>,
}

impl PullRequest {
    pub fn new(repository_path: RepositoryPath, number: u64) -> Self {
        Self {
            repository_path,
            number,
            qa_status: QaStatus::Waiting,
            status_comment_id: 0,
            checks_enabled: true,
            automerge: false,
            locked: false,
            strategy_override: None,
        }
    }

    /// Initial record for a PR first seen through sync, seeded from the
    /// repository defaults.
    pub fn from_repository(repository: &Repository, number: u64) -> Self {
        Self {
            repository_path: repository.path(),
            number,
            qa_status: if repository.default_enable_qa {
                QaStatus::Waiting
            } else {
                QaStatus::Skipped
            },
            status_comment_id: 0,
            checks_enabled: repository.default_enable_checks,
            automerge: repository.default_automerge,
            locked: false,
            strategy_override: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MergeRule {
    pub repository_path: RepositoryPath,
    pub base_branch: RuleBranch,
    pub head_branch: RuleBranch,
    pub strategy: MergeStrategy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRule {
    pub repository_path: RepositoryPath,
    pub name: String,
    pub conditions: Vec<RuleCondition>,
    pub actions: Vec<RuleAction>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExternalAccount {
    pub username: String,
    pub public_key: String,
    pub private_key: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExternalAccountRight {
    pub repository_path: RepositoryPath,
    pub username: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn repository_path_round_trip() {
        let path: RepositoryPath = "owner/name".parse().unwrap();
        assert_eq!(path, RepositoryPath::new("owner", "name"));
        assert_eq!(path.to_string(), "owner/name");

        assert!("owner".parse::<RepositoryPath>().is_err());
        assert!("/name".parse::<RepositoryPath>().is_err());
    }

    #[test]
    fn pull_request_path_round_trip() {
        let path: PullRequestPath = "owner/name#12".parse().unwrap();
        assert_eq!(path.owner, "owner");
        assert_eq!(path.number, 12);

        assert!("owner/name".parse::<PullRequestPath>().is_err());
        assert!("owner/name#x".parse::<PullRequestPath>().is_err());
    }

    #[test]
    fn rule_branch_wire_format() {
        assert_eq!(
            serde_json::to_string(&RuleBranch::Named("main".into())).unwrap(),
            r#"{"type":"named","value":"main"}"#
        );
        assert_eq!(
            serde_json::to_string(&RuleBranch::Wildcard).unwrap(),
            r#"{"type":"wildcard"}"#
        );
        assert_eq!("*".parse::<RuleBranch>().unwrap(), RuleBranch::Wildcard);
    }

    #[test]
    fn rule_condition_wire_format() {
        let condition = RuleCondition::BaseBranch(RuleBranch::Named("main".into()));
        assert_eq!(
            serde_json::to_string(&condition).unwrap(),
            r#"{"type":"base_branch","value":{"type":"named","value":"main"}}"#
        );

        let condition: RuleCondition =
            serde_json::from_str(r#"{"type":"author","value":"foo"}"#).unwrap();
        assert_eq!(condition, RuleCondition::Author("foo".into()));
    }

    #[test]
    fn rule_action_keeps_legacy_qa_discriminator() {
        let action = RuleAction::SetQaStatus(QaStatus::Skipped);
        assert_eq!(
            serde_json::to_string(&action).unwrap(),
            r#"{"type":"set_qa_enabled","value":"skipped"}"#
        );

        let action: RuleAction =
            serde_json::from_str(r#"{"type":"set_automerge","value":true}"#).unwrap();
        assert_eq!(action, RuleAction::SetAutomerge(true));
    }

    #[test]
    fn pull_request_defaults_follow_repository() {
        let mut repository = Repository::new("owner", "name");
        let pr = PullRequest::from_repository(&repository, 1);
        assert_eq!(pr.qa_status, QaStatus::Waiting);
        assert!(pr.checks_enabled);
        assert!(!pr.automerge);

        repository.default_enable_qa = false;
        repository.default_automerge = true;
        let pr = PullRequest::from_repository(&repository, 2);
        assert_eq!(pr.qa_status, QaStatus::Skipped);
        assert!(pr.automerge);
    }
}
