//! The sync state: an immutable join of the local PR record, the upstream
//! snapshot, repository rules, check runs and the review decision. Everything
//! downstream (commit status, step label, summary, automerge) is a pure
//! function of this value.

use crate::{
    context::Context,
    database::store::{MergeRuleStore, PullRequestStore, RepositoryRuleStore, RepositoryStore},
    models::{
        CheckStatus, MergeStrategy, PullRequest, QaStatus, RepositoryRule, RuleAction, RuleBranch,
        RuleCondition,
    },
    Result,
};
use github::{CheckConclusion, CheckRun, ReviewDecision};
use regex::Regex;
use std::collections::HashMap;

#[derive(Clone, Debug)]
pub struct SyncState {
    pub owner: String,
    pub name: String,
    pub number: u64,
    pub status_comment_id: u64,

    pub check_status: CheckStatus,
    pub check_url: String,
    pub qa_status: QaStatus,

    pub rules: Vec<RepositoryRule>,

    pub review_decision: Option<ReviewDecision>,

    pub title: String,
    pub title_regex: String,
    pub valid_pr_title: bool,

    pub locked: bool,
    pub wip: bool,

    pub automerge: bool,
    pub mergeable: bool,
    pub merged: bool,
    pub merge_strategy: MergeStrategy,

    pub head_sha: String,
}

impl SyncState {
    pub fn changes_requested(&self) -> bool {
        self.review_decision == Some(ReviewDecision::ChangesRequested)
    }

    pub fn review_required(&self) -> bool {
        self.review_decision == Some(ReviewDecision::ReviewRequired)
    }

    pub fn review_skipped(&self) -> bool {
        self.review_decision.is_none()
    }
}

pub struct SyncStateBuilder<'a> {
    ctx: &'a Context,
}

impl<'a> SyncStateBuilder<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub async fn build(&self, owner: &str, name: &str, number: u64) -> Result<SyncState> {
        let repository = self.ctx.repository_store.get_or_raise(owner, name).await?;
        let local_pr = self
            .ctx
            .pull_request_store
            .get_or_raise(owner, name, number)
            .await?;

        let upstream_pr = self.ctx.api.pull_request(owner, name, number).await?;

        let rules = self.ctx.repository_rule_store.filter(owner, name).await?;
        let rules = matching_rules(&rules, &upstream_pr);

        let local_pr = self.apply_rules(owner, name, local_pr, &rules).await?;

        let check_status = if local_pr.checks_enabled {
            let runs = self
                .ctx
                .api
                .check_runs(owner, name, &upstream_pr.head.sha)
                .await?;
            aggregate_check_runs(runs)
        } else {
            CheckStatus::Skipped
        };

        let merge_strategy = self
            .resolve_strategy(
                owner,
                name,
                &upstream_pr.base.branch,
                &upstream_pr.head.branch,
                &local_pr,
                repository.default_strategy,
            )
            .await?;

        let review_decision = self.ctx.api.review_decision(owner, name, number).await?;

        let valid_pr_title =
            validate_pr_title(&upstream_pr.title, &repository.pr_title_validation_regex)?;

        Ok(SyncState {
            owner: owner.to_owned(),
            name: name.to_owned(),
            number,
            status_comment_id: local_pr.status_comment_id,
            check_status,
            check_url: checks_url(owner, name, number),
            qa_status: local_pr.qa_status,
            rules,
            review_decision,
            title: upstream_pr.title.clone(),
            title_regex: repository.pr_title_validation_regex.clone(),
            valid_pr_title,
            locked: local_pr.locked,
            wip: upstream_pr.draft,
            automerge: local_pr.automerge,
            mergeable: upstream_pr.mergeable.unwrap_or(true),
            merged: upstream_pr.merged == Some(true),
            merge_strategy,
            head_sha: upstream_pr.head.sha,
        })
    }

    /// Apply the actions of every matched rule to the local record, writing
    /// only fields whose target value differs. Re-reads the PR when anything
    /// changed.
    async fn apply_rules(
        &self,
        owner: &str,
        name: &str,
        pull_request: PullRequest,
        rules: &[RepositoryRule],
    ) -> Result<PullRequest> {
        let number = pull_request.number;
        let mut needs_update = false;

        for rule in rules {
            for action in &rule.actions {
                match action {
                    RuleAction::SetAutomerge(value) => {
                        if pull_request.automerge != *value {
                            self.ctx
                                .pull_request_store
                                .set_automerge(owner, name, number, *value)
                                .await?;
                            needs_update = true;
                        }
                    }
                    RuleAction::SetQaStatus(value) => {
                        if pull_request.qa_status != *value {
                            self.ctx
                                .pull_request_store
                                .set_qa_status(owner, name, number, *value)
                                .await?;
                            needs_update = true;
                        }
                    }
                    RuleAction::SetChecksEnabled(value) => {
                        if pull_request.checks_enabled != *value {
                            self.ctx
                                .pull_request_store
                                .set_checks_enabled(owner, name, number, *value)
                                .await?;
                            needs_update = true;
                        }
                    }
                }
            }
        }

        if needs_update {
            self.ctx
                .pull_request_store
                .get_or_raise(owner, name, number)
                .await
        } else {
            Ok(pull_request)
        }
    }

    /// Merge strategy precedence: PR override, then a merge rule for the
    /// branch pair (exact first, wildcards as fallback), then the repository
    /// default.
    async fn resolve_strategy(
        &self,
        owner: &str,
        name: &str,
        base: &str,
        head: &str,
        pull_request: &PullRequest,
        default_strategy: MergeStrategy,
    ) -> Result<MergeStrategy> {
        if let Some(strategy) = pull_request.strategy_override {
            return Ok(strategy);
        }

        let base = RuleBranch::from_name(base);
        let head = RuleBranch::from_name(head);
        let candidates = [
            (base.clone(), head.clone()),
            (base, RuleBranch::Wildcard),
            (RuleBranch::Wildcard, head),
            (RuleBranch::Wildcard, RuleBranch::Wildcard),
        ];

        for (base, head) in &candidates {
            if let Some(rule) = self.ctx.merge_rule_store.get(owner, name, base, head).await? {
                return Ok(rule.strategy);
            }
        }

        Ok(default_strategy)
    }
}

fn checks_url(owner: &str, name: &str, number: u64) -> String {
    format!("https://github.com/{}/{}/pull/{}/checks", owner, name, number)
}

/// Anchored-at-start title validation. An empty pattern matches the empty
/// prefix of any title, so it always validates.
pub fn validate_pr_title(title: &str, pattern: &str) -> Result<bool> {
    let regex = Regex::new(&format!(r"\A(?:{})", pattern))?;
    Ok(regex.is_match(title))
}

/// Resolve the rules applying to an upstream PR snapshot.
///
/// A rule with no conditions or no actions is ignored. For the others, each
/// condition is evaluated independently and the rule is appended once per
/// condition that matches, so a rule whose conditions both match appears
/// twice in the output. Downstream only reads rule names and actions, and
/// action application is idempotent, so duplicates are harmless; they are
/// kept for compatibility with existing deployments.
pub fn matching_rules(
    rules: &[RepositoryRule],
    upstream_pr: &github::PullRequest,
) -> Vec<RepositoryRule> {
    let mut output = Vec::new();

    for rule in rules {
        if rule.actions.is_empty() || rule.conditions.is_empty() {
            continue;
        }

        for condition in &rule.conditions {
            match condition {
                RuleCondition::Author(login) => {
                    if login != &upstream_pr.user.login {
                        continue;
                    }
                }
                RuleCondition::BaseBranch(branch) => {
                    if let RuleBranch::Named(branch_name) = branch {
                        if branch_name != &upstream_pr.base.branch {
                            continue;
                        }
                    }
                }
                RuleCondition::HeadBranch(branch) => {
                    if let RuleBranch::Named(branch_name) = branch {
                        if branch_name != &upstream_pr.head.branch {
                            continue;
                        }
                    }
                }
            }

            output.push(rule.clone());
        }
    }

    output
}

/// Reduce upstream check runs to a single verdict.
///
/// Only the latest run per check name counts. A failure wins outright, a
/// not-yet-concluded run forces `Waiting`, and the other conclusion values
/// (neutral, skipped, cancelled, ...) advance nothing.
pub fn aggregate_check_runs(check_runs: Vec<CheckRun>) -> CheckStatus {
    let mut latest: HashMap<String, CheckRun> = HashMap::new();
    for run in check_runs {
        match latest.get(&run.name) {
            Some(existing) if existing.started_at >= run.started_at => {}
            _ => {
                latest.insert(run.name.clone(), run);
            }
        }
    }

    let mut runs: Vec<CheckRun> = latest.into_iter().map(|(_, run)| run).collect();
    runs.sort_by(|a, b| a.name.cmp(&b.name));

    let mut current: Option<CheckStatus> = None;
    for run in &runs {
        match run.conclusion {
            Some(CheckConclusion::Failure) => return CheckStatus::Fail,
            Some(CheckConclusion::Success) => {
                if current.is_none() || current == Some(CheckStatus::Pass) {
                    current = Some(CheckStatus::Pass);
                }
            }
            None => {
                current = Some(CheckStatus::Waiting);
            }
            // Neutral, skipped, stale, cancelled, action_required, timed_out
            // and startup_failure neither pass nor fail the aggregate.
            Some(_) => {}
        }
    }

    current.unwrap_or(CheckStatus::Waiting)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::models::{MergeRule, QaStatus, Repository, RepositoryPath};
    use crate::test_support::{
        pull_request_rule, test_context, upstream_pull_request, TestContext,
    };
    use chrono::{TimeZone, Utc};
    use github::CheckStatus as GhCheckStatus;

    fn check_run(name: &str, started_at: &str, conclusion: Option<CheckConclusion>) -> CheckRun {
        CheckRun {
            id: 1,
            name: name.to_owned(),
            head_sha: "abcdef".to_owned(),
            status: GhCheckStatus::Completed,
            conclusion,
            started_at: started_at.parse().unwrap(),
            completed_at: None,
        }
    }

    #[test]
    fn title_validation_empty_pattern_always_matches() {
        assert!(validate_pr_title("anything", "").unwrap());
        assert!(validate_pr_title("", "").unwrap());
    }

    #[test]
    fn title_validation_is_anchored_at_start() {
        assert!(validate_pr_title("feat: thing", r"feat:").unwrap());
        assert!(!validate_pr_title("my feat: thing", r"feat:").unwrap());
        assert!(validate_pr_title("WIP-123 fix", r"WIP-\d+").unwrap());
    }

    #[test]
    fn aggregate_empty_is_waiting() {
        assert_eq!(aggregate_check_runs(vec![]), CheckStatus::Waiting);
    }

    #[test]
    fn aggregate_failure_wins() {
        let runs = vec![
            check_run("a", "2024-01-01T00:00:00Z", Some(CheckConclusion::Success)),
            check_run("b", "2024-01-01T00:00:00Z", Some(CheckConclusion::Failure)),
            check_run("c", "2024-01-01T00:00:00Z", None),
        ];
        assert_eq!(aggregate_check_runs(runs), CheckStatus::Fail);
    }

    #[test]
    fn aggregate_all_success_is_pass() {
        let runs = vec![
            check_run("a", "2024-01-01T00:00:00Z", Some(CheckConclusion::Success)),
            check_run("b", "2024-01-01T00:00:00Z", Some(CheckConclusion::Success)),
        ];
        assert_eq!(aggregate_check_runs(runs), CheckStatus::Pass);
    }

    #[test]
    fn aggregate_unconcluded_forces_waiting() {
        let runs = vec![
            check_run("a", "2024-01-01T00:00:00Z", None),
            check_run("b", "2024-01-01T00:00:00Z", Some(CheckConclusion::Success)),
        ];
        assert_eq!(aggregate_check_runs(runs), CheckStatus::Waiting);
    }

    #[test]
    fn aggregate_neutral_conclusions_advance_nothing() {
        let runs = vec![
            check_run("a", "2024-01-01T00:00:00Z", Some(CheckConclusion::Neutral)),
            check_run("b", "2024-01-01T00:00:00Z", Some(CheckConclusion::Skipped)),
        ];
        assert_eq!(aggregate_check_runs(runs), CheckStatus::Waiting);
    }

    #[test]
    fn aggregate_keeps_latest_run_per_name() {
        // Three runs for `a`, three for `b`; only the latest of each counts.
        let runs = vec![
            check_run("a", "2024-01-01T00:00:00Z", Some(CheckConclusion::Failure)),
            check_run("a", "2024-03-01T00:00:00Z", Some(CheckConclusion::Success)),
            check_run("a", "2024-02-01T00:00:00Z", Some(CheckConclusion::Failure)),
            check_run("b", "2024-03-01T01:00:00Z", Some(CheckConclusion::Failure)),
            check_run("b", "2024-02-01T00:00:00Z", Some(CheckConclusion::Success)),
            check_run("b", "2024-03-01T00:00:00Z", Some(CheckConclusion::Success)),
        ];
        assert_eq!(aggregate_check_runs(runs.clone()), CheckStatus::Fail);

        // Same shape with the `b` tail succeeding aggregates to Pass.
        let runs: Vec<CheckRun> = runs
            .into_iter()
            .map(|mut run| {
                if run.name == "b"
                    && run.started_at == Utc.with_ymd_and_hms(2024, 3, 1, 1, 0, 0).unwrap()
                {
                    run.conclusion = Some(CheckConclusion::Success);
                }
                run
            })
            .collect();
        assert_eq!(aggregate_check_runs(runs), CheckStatus::Pass);
    }

    #[test]
    fn rule_with_wrong_author_does_not_match() {
        let rule = pull_request_rule(
            "only-nop",
            vec![RuleCondition::Author("nop".into())],
            vec![RuleAction::SetAutomerge(true)],
        );
        let upstream = upstream_pull_request("foo", "feature", "main");

        assert!(matching_rules(&[rule], &upstream).is_empty());
    }

    #[test]
    fn rule_without_actions_is_ignored() {
        let rule = pull_request_rule("noop", vec![RuleCondition::Author("foo".into())], vec![]);
        let upstream = upstream_pull_request("foo", "feature", "main");

        assert!(matching_rules(&[rule], &upstream).is_empty());
    }

    #[test]
    fn wildcard_branch_conditions_match_everything() {
        let rule = pull_request_rule(
            "wildcard",
            vec![RuleCondition::BaseBranch(RuleBranch::Wildcard)],
            vec![RuleAction::SetChecksEnabled(false)],
        );
        let upstream = upstream_pull_request("foo", "feature", "whatever");

        assert_eq!(matching_rules(&[rule], &upstream).len(), 1);
    }

    #[test]
    fn rule_is_appended_once_per_matching_condition() {
        // Historical behavior: two matching conditions append the rule twice.
        let rule = pull_request_rule(
            "double",
            vec![
                RuleCondition::Author("foo".into()),
                RuleCondition::BaseBranch(RuleBranch::Named("main".into())),
            ],
            vec![RuleAction::SetAutomerge(true)],
        );
        let upstream = upstream_pull_request("foo", "feature", "main");

        let matched = matching_rules(&[rule], &upstream);
        assert_eq!(matched.len(), 2);
        assert_eq!(matched[0].name, "double");
        assert_eq!(matched[1].name, "double");
    }

    #[test]
    fn mixed_conditions_append_only_matching_ones() {
        let rule = pull_request_rule(
            "mixed",
            vec![
                RuleCondition::Author("nop".into()),
                RuleCondition::HeadBranch(RuleBranch::Named("feature".into())),
            ],
            vec![RuleAction::SetAutomerge(true)],
        );
        let upstream = upstream_pull_request("foo", "feature", "main");

        assert_eq!(matching_rules(&[rule], &upstream).len(), 1);
    }

    async fn builder_fixture() -> (crate::context::Context, TestContext) {
        let (ctx, fixtures) = test_context();

        ctx.repository_store
            .create(Repository::new("owner", "name"))
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
    async fn build_produces_check_url_and_defaults() {
        let (ctx, _fixtures) = builder_fixture().await;

        let state = SyncStateBuilder::new(&ctx)
            .build("owner", "name", 1)
            .await
            .unwrap();

        assert_eq!(
            state.check_url,
            "https://github.com/owner/name/pull/1/checks"
        );
        assert_eq!(state.check_status, CheckStatus::Waiting);
        assert_eq!(state.qa_status, QaStatus::Waiting);
        assert_eq!(state.merge_strategy, MergeStrategy::Merge);
        assert!(state.valid_pr_title);
        assert!(state.mergeable);
        assert!(!state.merged);
        assert!(state.review_skipped());
    }

    #[tokio::test]
    async fn build_applies_matching_rule_actions_once() {
        let (ctx, _fixtures) = builder_fixture().await;

        ctx.repository_rule_store
            .create(pull_request_rule(
                "automerge-for-foo",
                vec![RuleCondition::Author("foo".into())],
                vec![RuleAction::SetAutomerge(true)],
            ))
            .await
            .unwrap();

        let state = SyncStateBuilder::new(&ctx)
            .build("owner", "name", 1)
            .await
            .unwrap();

        assert!(state.automerge);
        assert_eq!(state.rules.len(), 1);

        let pr = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();
        assert!(pr.automerge);
    }

    #[tokio::test]
    async fn rule_application_is_idempotent() {
        let (ctx, _fixtures) = builder_fixture().await;

        ctx.repository_rule_store
            .create(pull_request_rule(
                "keep-qa-waiting",
                vec![RuleCondition::Author("foo".into())],
                vec![RuleAction::SetQaStatus(QaStatus::Waiting)],
            ))
            .await
            .unwrap();

        // The PR already has qa_status = waiting: the rule matches but the
        // action writes nothing.
        let before = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();

        let state = SyncStateBuilder::new(&ctx)
            .build("owner", "name", 1)
            .await
            .unwrap();

        assert_eq!(state.qa_status, QaStatus::Waiting);
        let after = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn strategy_override_beats_merge_rules() {
        let (ctx, _fixtures) = builder_fixture().await;

        ctx.merge_rule_store
            .create(MergeRule {
                repository_path: RepositoryPath::new("owner", "name"),
                base_branch: RuleBranch::Named("main".into()),
                head_branch: RuleBranch::Wildcard,
                strategy: MergeStrategy::Rebase,
            })
            .await
            .unwrap();
        ctx.pull_request_store
            .set_strategy_override("owner", "name", 1, Some(MergeStrategy::Squash))
            .await
            .unwrap();

        let state = SyncStateBuilder::new(&ctx)
            .build("owner", "name", 1)
            .await
            .unwrap();

        assert_eq!(state.merge_strategy, MergeStrategy::Squash);
    }

    #[tokio::test]
    async fn merge_rule_applies_without_override() {
        let (ctx, _fixtures) = builder_fixture().await;

        ctx.merge_rule_store
            .create(MergeRule {
                repository_path: RepositoryPath::new("owner", "name"),
                base_branch: RuleBranch::Named("main".into()),
                head_branch: RuleBranch::Wildcard,
                strategy: MergeStrategy::Rebase,
            })
            .await
            .unwrap();

        let state = SyncStateBuilder::new(&ctx)
            .build("owner", "name", 1)
            .await
            .unwrap();

        assert_eq!(state.merge_strategy, MergeStrategy::Rebase);
    }

    #[tokio::test]
    async fn checks_disabled_skips_check_fetch() {
        let (ctx, fixtures) = builder_fixture().await;

        ctx.pull_request_store
            .set_checks_enabled("owner", "name", 1, false)
            .await
            .unwrap();
        fixtures.api.set_check_runs(vec![check_run(
            "ci",
            "2024-01-01T00:00:00Z",
            Some(CheckConclusion::Failure),
        )]);

        let state = SyncStateBuilder::new(&ctx)
            .build("owner", "name", 1)
            .await
            .unwrap();

        assert_eq!(state.check_status, CheckStatus::Skipped);
    }

    #[tokio::test]
    async fn unknown_pull_request_fails_build() {
        let (ctx, _fixtures) = builder_fixture().await;

        let err = SyncStateBuilder::new(&ctx)
            .build("owner", "name", 99)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
