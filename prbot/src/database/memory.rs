//! In-memory database used by the unit tests. One struct implements every
//! store trait so a single `Arc` can be cloned into each seam.

use crate::{
    database::store::{
        ExternalAccountRightStore, ExternalAccountStore, MergeRuleStore, PullRequestStore,
        RepositoryRuleStore, RepositoryStore,
    },
    error::DomainError,
    models::{
        ExternalAccount, ExternalAccountRight, MergeRule, MergeStrategy, PullRequest, QaStatus,
        Repository, RepositoryRule, RuleBranch,
    },
    Result,
};
use async_trait::async_trait;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryDatabase {
    repositories: Mutex<Vec<Repository>>,
    pull_requests: Mutex<Vec<PullRequest>>,
    merge_rules: Mutex<Vec<MergeRule>>,
    repository_rules: Mutex<Vec<RepositoryRule>>,
    external_accounts: Mutex<Vec<ExternalAccount>>,
    external_account_rights: Mutex<Vec<ExternalAccountRight>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_pull_request<T>(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        mutate: impl FnOnce(&mut PullRequest) -> T,
    ) -> Result<T> {
        let mut pull_requests = self.pull_requests.lock().unwrap();
        let pull_request = pull_requests
            .iter_mut()
            .find(|pr| {
                pr.repository_path.owner == owner
                    && pr.repository_path.name == name
                    && pr.number == number
            })
            .ok_or_else(|| DomainError::UnknownPullRequest {
                owner: owner.to_owned(),
                name: name.to_owned(),
                number,
            })?;

        Ok(mutate(pull_request))
    }
}

#[async_trait]
impl RepositoryStore for MemoryDatabase {
    async fn all(&self) -> Result<Vec<Repository>> {
        Ok(self.repositories.lock().unwrap().clone())
    }

    async fn get(&self, owner: &str, name: &str) -> Result<Option<Repository>> {
        Ok(self
            .repositories
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.owner == owner && r.name == name)
            .cloned())
    }

    async fn create(&self, repository: Repository) -> Result<Repository> {
        self.repositories.lock().unwrap().push(repository.clone());
        Ok(repository)
    }

    async fn update(&self, repository: Repository) -> Result<Repository> {
        let mut repositories = self.repositories.lock().unwrap();
        let existing = repositories
            .iter_mut()
            .find(|r| r.owner == repository.owner && r.name == repository.name)
            .ok_or_else(|| DomainError::UnknownRepository {
                owner: repository.owner.clone(),
                name: repository.name.clone(),
            })?;

        *existing = repository.clone();
        Ok(repository)
    }

    async fn delete(&self, owner: &str, name: &str) -> Result<bool> {
        let mut repositories = self.repositories.lock().unwrap();
        let before = repositories.len();
        repositories.retain(|r| !(r.owner == owner && r.name == name));

        // FK cascade
        self.pull_requests
            .lock()
            .unwrap()
            .retain(|pr| !(pr.repository_path.owner == owner && pr.repository_path.name == name));

        Ok(repositories.len() != before)
    }

    async fn set_manual_interaction(&self, owner: &str, name: &str, value: bool) -> Result<()> {
        self.update_repository_field(owner, name, |r| r.manual_interaction = value)
    }

    async fn set_pr_title_validation_regex(
        &self,
        owner: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        self.update_repository_field(owner, name, |r| {
            r.pr_title_validation_regex = value.to_owned()
        })
    }

    async fn set_default_strategy(
        &self,
        owner: &str,
        name: &str,
        strategy: MergeStrategy,
    ) -> Result<()> {
        self.update_repository_field(owner, name, |r| r.default_strategy = strategy)
    }

    async fn set_default_automerge(&self, owner: &str, name: &str, value: bool) -> Result<()> {
        self.update_repository_field(owner, name, |r| r.default_automerge = value)
    }

    async fn set_default_enable_qa(&self, owner: &str, name: &str, value: bool) -> Result<()> {
        self.update_repository_field(owner, name, |r| r.default_enable_qa = value)
    }

    async fn set_default_enable_checks(&self, owner: &str, name: &str, value: bool) -> Result<()> {
        self.update_repository_field(owner, name, |r| r.default_enable_checks = value)
    }
}

impl MemoryDatabase {
    fn update_repository_field(
        &self,
        owner: &str,
        name: &str,
        mutate: impl FnOnce(&mut Repository),
    ) -> Result<()> {
        let mut repositories = self.repositories.lock().unwrap();
        let repository = repositories
            .iter_mut()
            .find(|r| r.owner == owner && r.name == name)
            .ok_or_else(|| DomainError::UnknownRepository {
                owner: owner.to_owned(),
                name: name.to_owned(),
            })?;

        mutate(repository);
        Ok(())
    }
}

#[async_trait]
impl PullRequestStore for MemoryDatabase {
    async fn all(&self) -> Result<Vec<PullRequest>> {
        Ok(self.pull_requests.lock().unwrap().clone())
    }

    async fn filter(&self, owner: &str, name: &str) -> Result<Vec<PullRequest>> {
        Ok(self
            .pull_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|pr| pr.repository_path.owner == owner && pr.repository_path.name == name)
            .cloned()
            .collect())
    }

    async fn get(&self, owner: &str, name: &str, number: u64) -> Result<Option<PullRequest>> {
        Ok(self
            .pull_requests
            .lock()
            .unwrap()
            .iter()
            .find(|pr| {
                pr.repository_path.owner == owner
                    && pr.repository_path.name == name
                    && pr.number == number
            })
            .cloned())
    }

    async fn create(&self, pull_request: PullRequest) -> Result<PullRequest> {
        self.pull_requests
            .lock()
            .unwrap()
            .push(pull_request.clone());
        Ok(pull_request)
    }

    async fn update(&self, pull_request: PullRequest) -> Result<PullRequest> {
        self.with_pull_request(
            &pull_request.repository_path.owner.clone(),
            &pull_request.repository_path.name.clone(),
            pull_request.number,
            |pr| *pr = pull_request.clone(),
        )?;
        Ok(pull_request)
    }

    async fn delete(&self, owner: &str, name: &str, number: u64) -> Result<bool> {
        let mut pull_requests = self.pull_requests.lock().unwrap();
        let before = pull_requests.len();
        pull_requests.retain(|pr| {
            !(pr.repository_path.owner == owner
                && pr.repository_path.name == name
                && pr.number == number)
        });

        Ok(pull_requests.len() != before)
    }

    async fn set_qa_status(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        qa_status: QaStatus,
    ) -> Result<()> {
        self.with_pull_request(owner, name, number, |pr| pr.qa_status = qa_status)
    }

    async fn set_checks_enabled(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        value: bool,
    ) -> Result<()> {
        self.with_pull_request(owner, name, number, |pr| pr.checks_enabled = value)
    }

    async fn set_status_comment_id(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        status_comment_id: u64,
    ) -> Result<()> {
        self.with_pull_request(owner, name, number, |pr| {
            pr.status_comment_id = status_comment_id
        })
    }

    async fn set_strategy_override(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        strategy: Option<MergeStrategy>,
    ) -> Result<()> {
        self.with_pull_request(owner, name, number, |pr| pr.strategy_override = strategy)
    }

    async fn set_automerge(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        automerge: bool,
    ) -> Result<()> {
        self.with_pull_request(owner, name, number, |pr| pr.automerge = automerge)
    }

    async fn set_locked(&self, owner: &str, name: &str, number: u64, locked: bool) -> Result<()> {
        self.with_pull_request(owner, name, number, |pr| pr.locked = locked)
    }
}

#[async_trait]
impl MergeRuleStore for MemoryDatabase {
    async fn all(&self) -> Result<Vec<MergeRule>> {
        Ok(self.merge_rules.lock().unwrap().clone())
    }

    async fn filter(&self, owner: &str, name: &str) -> Result<Vec<MergeRule>> {
        Ok(self
            .merge_rules
            .lock()
            .unwrap()
            .iter()
            .filter(|rule| {
                rule.repository_path.owner == owner && rule.repository_path.name == name
            })
            .cloned()
            .collect())
    }

    async fn get(
        &self,
        owner: &str,
        name: &str,
        base_branch: &RuleBranch,
        head_branch: &RuleBranch,
    ) -> Result<Option<MergeRule>> {
        Ok(self
            .merge_rules
            .lock()
            .unwrap()
            .iter()
            .find(|rule| {
                rule.repository_path.owner == owner
                    && rule.repository_path.name == name
                    && &rule.base_branch == base_branch
                    && &rule.head_branch == head_branch
            })
            .cloned())
    }

    async fn create(&self, merge_rule: MergeRule) -> Result<MergeRule> {
        self.merge_rules.lock().unwrap().push(merge_rule.clone());
        Ok(merge_rule)
    }

    async fn update(&self, merge_rule: MergeRule) -> Result<MergeRule> {
        let mut merge_rules = self.merge_rules.lock().unwrap();
        let existing = merge_rules
            .iter_mut()
            .find(|rule| {
                rule.repository_path == merge_rule.repository_path
                    && rule.base_branch == merge_rule.base_branch
                    && rule.head_branch == merge_rule.head_branch
            })
            .ok_or_else(|| DomainError::UnknownMergeRule {
                owner: merge_rule.repository_path.owner.clone(),
                name: merge_rule.repository_path.name.clone(),
                base: merge_rule.base_branch.clone(),
                head: merge_rule.head_branch.clone(),
            })?;

        *existing = merge_rule.clone();
        Ok(merge_rule)
    }

    async fn delete(
        &self,
        owner: &str,
        name: &str,
        base_branch: &RuleBranch,
        head_branch: &RuleBranch,
    ) -> Result<bool> {
        let mut merge_rules = self.merge_rules.lock().unwrap();
        let before = merge_rules.len();
        merge_rules.retain(|rule| {
            !(rule.repository_path.owner == owner
                && rule.repository_path.name == name
                && &rule.base_branch == base_branch
                && &rule.head_branch == head_branch)
        });

        Ok(merge_rules.len() != before)
    }
}

#[async_trait]
impl RepositoryRuleStore for MemoryDatabase {
    async fn all(&self) -> Result<Vec<RepositoryRule>> {
        Ok(self.repository_rules.lock().unwrap().clone())
    }

    async fn filter(&self, owner: &str, name: &str) -> Result<Vec<RepositoryRule>> {
        Ok(self
            .repository_rules
            .lock()
            .unwrap()
            .iter()
            .filter(|rule| {
                rule.repository_path.owner == owner && rule.repository_path.name == name
            })
            .cloned()
            .collect())
    }

    async fn get(
        &self,
        owner: &str,
        name: &str,
        rule_name: &str,
    ) -> Result<Option<RepositoryRule>> {
        Ok(self
            .repository_rules
            .lock()
            .unwrap()
            .iter()
            .find(|rule| {
                rule.repository_path.owner == owner
                    && rule.repository_path.name == name
                    && rule.name == rule_name
            })
            .cloned())
    }

    async fn create(&self, rule: RepositoryRule) -> Result<RepositoryRule> {
        self.repository_rules.lock().unwrap().push(rule.clone());
        Ok(rule)
    }

    async fn update(&self, rule: RepositoryRule) -> Result<RepositoryRule> {
        let mut repository_rules = self.repository_rules.lock().unwrap();
        let existing = repository_rules
            .iter_mut()
            .find(|r| r.repository_path == rule.repository_path && r.name == rule.name)
            .ok_or_else(|| DomainError::UnknownRepositoryRule {
                owner: rule.repository_path.owner.clone(),
                name: rule.repository_path.name.clone(),
                rule_name: rule.name.clone(),
            })?;

        *existing = rule.clone();
        Ok(rule)
    }

    async fn delete(&self, owner: &str, name: &str, rule_name: &str) -> Result<bool> {
        let mut repository_rules = self.repository_rules.lock().unwrap();
        let before = repository_rules.len();
        repository_rules.retain(|rule| {
            !(rule.repository_path.owner == owner
                && rule.repository_path.name == name
                && rule.name == rule_name)
        });

        Ok(repository_rules.len() != before)
    }
}

#[async_trait]
impl ExternalAccountStore for MemoryDatabase {
    async fn all(&self) -> Result<Vec<ExternalAccount>> {
        Ok(self.external_accounts.lock().unwrap().clone())
    }

    async fn get(&self, username: &str) -> Result<Option<ExternalAccount>> {
        Ok(self
            .external_accounts
            .lock()
            .unwrap()
            .iter()
            .find(|account| account.username == username)
            .cloned())
    }

    async fn create(&self, account: ExternalAccount) -> Result<ExternalAccount> {
        self.external_accounts.lock().unwrap().push(account.clone());
        Ok(account)
    }

    async fn update(&self, account: ExternalAccount) -> Result<ExternalAccount> {
        let mut accounts = self.external_accounts.lock().unwrap();
        let existing = accounts
            .iter_mut()
            .find(|a| a.username == account.username)
            .ok_or_else(|| DomainError::UnknownExternalAccount {
                username: account.username.clone(),
            })?;

        *existing = account.clone();
        Ok(account)
    }

    async fn delete(&self, username: &str) -> Result<bool> {
        let mut accounts = self.external_accounts.lock().unwrap();
        let before = accounts.len();
        accounts.retain(|account| account.username != username);

        Ok(accounts.len() != before)
    }
}

#[async_trait]
impl ExternalAccountRightStore for MemoryDatabase {
    async fn all(&self) -> Result<Vec<ExternalAccountRight>> {
        Ok(self.external_account_rights.lock().unwrap().clone())
    }

    async fn filter(&self, username: &str) -> Result<Vec<ExternalAccountRight>> {
        Ok(self
            .external_account_rights
            .lock()
            .unwrap()
            .iter()
            .filter(|right| right.username == username)
            .cloned()
            .collect())
    }

    async fn get(
        &self,
        owner: &str,
        name: &str,
        username: &str,
    ) -> Result<Option<ExternalAccountRight>> {
        Ok(self
            .external_account_rights
            .lock()
            .unwrap()
            .iter()
            .find(|right| {
                right.repository_path.owner == owner
                    && right.repository_path.name == name
                    && right.username == username
            })
            .cloned())
    }

    async fn create(&self, right: ExternalAccountRight) -> Result<ExternalAccountRight> {
        self.external_account_rights
            .lock()
            .unwrap()
            .push(right.clone());
        Ok(right)
    }

    async fn delete(&self, owner: &str, name: &str, username: &str) -> Result<bool> {
        let mut rights = self.external_account_rights.lock().unwrap();
        let before = rights.len();
        rights.retain(|right| {
            !(right.repository_path.owner == owner
                && right.repository_path.name == name
                && right.username == username)
        });

        Ok(rights.len() != before)
    }
}
