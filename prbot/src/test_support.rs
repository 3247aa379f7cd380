//! Shared fixtures for the unit tests: a recording platform fake, an
//! in-memory lock and GIF client, and context builders.

use crate::{
    api::ApiClient,
    config::Config,
    context::Context,
    database::memory::MemoryDatabase,
    database::store::{PullRequestStore, RepositoryStore},
    gif::GifClient,
    models::{
        CheckStatus, MergeStrategy, PullRequest, QaStatus, Repository, RepositoryPath,
        RepositoryRule, RuleAction, RuleCondition,
    },
    sync::SyncState,
    Result,
};
use async_trait::async_trait;
use chrono::Utc;
use github::{CheckConclusion, CheckRun, CommitStatusState, ReactionType, ReviewDecision};
use rsa::{
    pkcs1::EncodeRsaPublicKey,
    pkcs8::{EncodePrivateKey, LineEnding},
    RsaPrivateKey, RsaPublicKey,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

pub use crate::lock::test_lock::MemoryLockClient;

#[derive(Clone, Debug, PartialEq)]
pub enum ApiCall {
    EnsureInstallation,
    GetRepository,
    GetPullRequest {
        number: u64,
    },
    GetCheckRuns,
    GetReviewDecision,
    Merge {
        commit_title: String,
        strategy: MergeStrategy,
    },
    GetLabels,
    AddLabels {
        labels: Vec<String>,
    },
    ReplaceLabels {
        labels: Vec<String>,
    },
    CreateComment {
        body: String,
    },
    UpdateComment {
        comment_id: u64,
        body: String,
    },
    AddReaction {
        comment_id: u64,
        reaction: ReactionType,
    },
    AddReviewers {
        reviewers: Vec<String>,
    },
    RemoveReviewers {
        reviewers: Vec<String>,
    },
    CreateCommitStatus {
        state: CommitStatusState,
        context: String,
        description: String,
    },
}

#[derive(Default)]
struct FakeApiState {
    pull_request: Option<github::PullRequest>,
    check_runs: Vec<CheckRun>,
    review_decision: Option<ReviewDecision>,
    labels: Vec<String>,
    merge_error: Option<String>,
    calls: Vec<ApiCall>,
}

/// Recording fake for the platform seam.
pub struct FakeApi {
    state: Mutex<FakeApiState>,
    next_comment_id: AtomicU64,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeApiState::default()),
            next_comment_id: AtomicU64::new(100),
        }
    }
}

impl FakeApi {
    pub fn set_pull_request(&self, pull_request: github::PullRequest) {
        self.state.lock().unwrap().pull_request = Some(pull_request);
    }

    pub fn set_check_runs(&self, check_runs: Vec<CheckRun>) {
        self.state.lock().unwrap().check_runs = check_runs;
    }

    pub fn set_review_decision(&self, decision: Option<ReviewDecision>) {
        self.state.lock().unwrap().review_decision = decision;
    }

    pub fn set_labels(&self, labels: Vec<String>) {
        self.state.lock().unwrap().labels = labels;
    }

    pub fn fail_next_merge(&self, message: &str) {
        self.state.lock().unwrap().merge_error = Some(message.to_owned());
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn created_comments(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::CreateComment { body } => Some(body),
                _ => None,
            })
            .collect()
    }

    pub fn updated_comments(&self) -> Vec<u64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::UpdateComment { comment_id, .. } => Some(comment_id),
                _ => None,
            })
            .collect()
    }

    pub fn reactions(&self) -> Vec<(u64, ReactionType)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::AddReaction {
                    comment_id,
                    reaction,
                } => Some((comment_id, reaction)),
                _ => None,
            })
            .collect()
    }

    pub fn merges(&self) -> Vec<(String, MergeStrategy)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::Merge {
                    commit_title,
                    strategy,
                } => Some((commit_title, strategy)),
                _ => None,
            })
            .collect()
    }

    pub fn replaced_labels(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::ReplaceLabels { labels } => Some(labels),
                _ => None,
            })
            .collect()
    }

    pub fn commit_statuses(&self) -> Vec<(CommitStatusState, String)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::CreateCommitStatus {
                    state, description, ..
                } => Some((state, description)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: ApiCall) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl ApiClient for FakeApi {
    async fn ensure_installation(&self, _owner: &str, _name: &str) -> Result<()> {
        self.record(ApiCall::EnsureInstallation);
        Ok(())
    }

    async fn repository(&self, owner: &str, name: &str) -> Result<github::Repository> {
        self.record(ApiCall::GetRepository);
        Ok(github::Repository {
            name: name.to_owned(),
            full_name: format!("{}/{}", owner, name),
            owner: github::User {
                login: owner.to_owned(),
            },
        })
    }

    async fn pull_request(
        &self,
        _owner: &str,
        _name: &str,
        number: u64,
    ) -> Result<github::PullRequest> {
        self.record(ApiCall::GetPullRequest { number });
        self.state
            .lock()
            .unwrap()
            .pull_request
            .clone()
            .ok_or_else(|| "no upstream pull request configured in FakeApi".into())
    }

    async fn check_runs(&self, _owner: &str, _name: &str, _sha: &str) -> Result<Vec<CheckRun>> {
        self.record(ApiCall::GetCheckRuns);
        Ok(self.state.lock().unwrap().check_runs.clone())
    }

    async fn review_decision(
        &self,
        _owner: &str,
        _name: &str,
        _number: u64,
    ) -> Result<Option<ReviewDecision>> {
        self.record(ApiCall::GetReviewDecision);
        Ok(self.state.lock().unwrap().review_decision)
    }

    async fn merge_pull_request(
        &self,
        _owner: &str,
        _name: &str,
        _number: u64,
        commit_title: &str,
        _commit_message: &str,
        strategy: MergeStrategy,
    ) -> Result<()> {
        self.record(ApiCall::Merge {
            commit_title: commit_title.to_owned(),
            strategy,
        });

        let error = self.state.lock().unwrap().merge_error.take();
        match error {
            Some(message) => Err(message.into()),
            None => Ok(()),
        }
    }

    async fn labels(&self, _owner: &str, _name: &str, _number: u64) -> Result<Vec<String>> {
        self.record(ApiCall::GetLabels);
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn add_labels(
        &self,
        _owner: &str,
        _name: &str,
        _number: u64,
        labels: &[String],
    ) -> Result<()> {
        self.record(ApiCall::AddLabels {
            labels: labels.to_vec(),
        });
        Ok(())
    }

    async fn replace_labels(
        &self,
        _owner: &str,
        _name: &str,
        _number: u64,
        labels: &[String],
    ) -> Result<()> {
        self.record(ApiCall::ReplaceLabels {
            labels: labels.to_vec(),
        });
        self.state.lock().unwrap().labels = labels.to_vec();
        Ok(())
    }

    async fn create_comment(
        &self,
        _owner: &str,
        _name: &str,
        _number: u64,
        body: &str,
    ) -> Result<u64> {
        self.record(ApiCall::CreateComment {
            body: body.to_owned(),
        });
        Ok(self.next_comment_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn update_comment(
        &self,
        _owner: &str,
        _name: &str,
        comment_id: u64,
        body: &str,
    ) -> Result<u64> {
        self.record(ApiCall::UpdateComment {
            comment_id,
            body: body.to_owned(),
        });
        Ok(comment_id)
    }

    async fn add_reaction(
        &self,
        _owner: &str,
        _name: &str,
        comment_id: u64,
        reaction: ReactionType,
    ) -> Result<()> {
        self.record(ApiCall::AddReaction {
            comment_id,
            reaction,
        });
        Ok(())
    }

    async fn add_reviewers(
        &self,
        _owner: &str,
        _name: &str,
        _number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        self.record(ApiCall::AddReviewers {
            reviewers: reviewers.to_vec(),
        });
        Ok(())
    }

    async fn remove_reviewers(
        &self,
        _owner: &str,
        _name: &str,
        _number: u64,
        reviewers: &[String],
    ) -> Result<()> {
        self.record(ApiCall::RemoveReviewers {
            reviewers: reviewers.to_vec(),
        });
        Ok(())
    }

    async fn create_commit_status(
        &self,
        _owner: &str,
        _name: &str,
        _sha: &str,
        state: CommitStatusState,
        context: &str,
        description: &str,
    ) -> Result<()> {
        self.record(ApiCall::CreateCommitStatus {
            state,
            context: context.to_owned(),
            description: description.to_owned(),
        });
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeGif {
    result: Mutex<Option<String>>,
    queries: Mutex<Vec<String>>,
}

impl FakeGif {
    pub fn set_result(&self, result: Option<String>) {
        *self.result.lock().unwrap() = result;
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl GifClient for FakeGif {
    async fn query_first_match(&self, query: &str) -> Result<Option<String>> {
        self.queries.lock().unwrap().push(query.to_owned());
        Ok(self.result.lock().unwrap().clone())
    }
}

pub struct TestContext {
    pub api: Arc<FakeApi>,
    pub lock: Arc<MemoryLockClient>,
    pub gif: Arc<FakeGif>,
}

pub fn test_config() -> Config {
    Config {
        bot_nickname: "bot".to_owned(),
        database_url: String::new(),
        lock_url: String::new(),
        tenor_key: String::new(),
        log_level: "info".to_owned(),
        github_webhook_secret: "test-secret".to_owned(),
        github_personal_token: "test-token".to_owned(),
        github_app_client_id: String::new(),
        github_app_private_key: String::new(),
        server_ip: "127.0.0.1".to_owned(),
        server_port: 8000,
    }
}

/// Build a context wired to fakes, returning the fakes for assertions.
pub fn test_context() -> (Context, TestContext) {
    let api = Arc::new(FakeApi::default());
    let lock = Arc::new(MemoryLockClient::default());
    let gif = Arc::new(FakeGif::default());
    let db = Arc::new(MemoryDatabase::new());

    let ctx = Context {
        config: test_config(),
        api: api.clone(),
        lock: lock.clone(),
        gif: gif.clone(),
        repository_store: db.clone(),
        pull_request_store: db.clone(),
        merge_rule_store: db.clone(),
        repository_rule_store: db.clone(),
        external_account_store: db.clone(),
        external_account_right_store: db.clone(),
    };

    (ctx, TestContext { api, lock, gif })
}

pub async fn seed_pull_request(ctx: &Context) {
    let repository = Repository::new("owner", "name");
    ctx.repository_store
        .create(repository.clone())
        .await
        .unwrap();
    ctx.pull_request_store
        .create(PullRequest::new(repository.path(), 1))
        .await
        .unwrap();
}

pub fn upstream_pull_request(author: &str, head: &str, base: &str) -> github::PullRequest {
    github::PullRequest {
        number: 1,
        title: "Add feature".to_owned(),
        body: None,
        user: github::User {
            login: author.to_owned(),
        },
        draft: false,
        head: github::PullRequestBranch {
            branch: head.to_owned(),
            sha: "abcdef".to_owned(),
        },
        base: github::PullRequestBranch {
            branch: base.to_owned(),
            sha: "123456".to_owned(),
        },
        labels: vec![],
        requested_reviewers: vec![],
        merged: Some(false),
        mergeable: Some(true),
    }
}

pub fn pull_request_rule(
    name: &str,
    conditions: Vec<RuleCondition>,
    actions: Vec<RuleAction>,
) -> RepositoryRule {
    RepositoryRule {
        repository_path: RepositoryPath::new("owner", "name"),
        name: name.to_owned(),
        conditions,
        actions,
    }
}

pub fn check_run_success() -> CheckRun {
    CheckRun {
        id: 1,
        name: "ci".to_owned(),
        head_sha: "abcdef".to_owned(),
        status: github::CheckStatus::Completed,
        conclusion: Some(CheckConclusion::Success),
        started_at: Utc::now(),
        completed_at: Some(Utc::now()),
    }
}

/// A fully green sync state for owner/name#1.
pub fn sync_state_stub() -> SyncState {
    SyncState {
        owner: "owner".to_owned(),
        name: "name".to_owned(),
        number: 1,
        status_comment_id: 0,
        check_status: CheckStatus::Pass,
        check_url: "https://github.com/owner/name/pull/1/checks".to_owned(),
        qa_status: QaStatus::Pass,
        rules: vec![],
        review_decision: Some(ReviewDecision::Approved),
        title: "Add feature".to_owned(),
        title_regex: String::new(),
        valid_pr_title: true,
        locked: false,
        wip: false,
        automerge: false,
        mergeable: true,
        merged: false,
        merge_strategy: MergeStrategy::Merge,
        head_sha: "abcdef".to_owned(),
    }
}

/// Fresh RSA keypair in PEM form. 2048 bits keeps tests fast.
pub fn test_rsa_keypair() -> (String, String) {
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let public_key = RsaPublicKey::from(&private_key);

    (
        private_key
            .to_pkcs8_pem(LineEnding::LF)
            .unwrap()
            .to_string(),
        public_key.to_pkcs1_pem(LineEnding::LF).unwrap(),
    )
}
