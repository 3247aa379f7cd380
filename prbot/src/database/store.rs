//! Store traits, one per entity. Implemented by the Postgres layer and, in
//! tests, by the in-memory database.

use crate::{
    error::DomainError,
    models::{
        ExternalAccount, ExternalAccountRight, MergeRule, MergeStrategy, PullRequest, QaStatus,
        Repository, RepositoryRule, RuleBranch,
    },
    Result,
};
use async_trait::async_trait;

#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn all(&self) -> Result<Vec<Repository>>;
    async fn get(&self, owner: &str, name: &str) -> Result<Option<Repository>>;
    async fn create(&self, repository: Repository) -> Result<Repository>;
    async fn update(&self, repository: Repository) -> Result<Repository>;
    async fn delete(&self, owner: &str, name: &str) -> Result<bool>;

    async fn set_manual_interaction(&self, owner: &str, name: &str, value: bool) -> Result<()>;
    async fn set_pr_title_validation_regex(
        &self,
        owner: &str,
        name: &str,
        value: &str,
    ) -> Result<()>;
    async fn set_default_strategy(
        &self,
        owner: &str,
        name: &str,
        strategy: MergeStrategy,
    ) -> Result<()>;
    async fn set_default_automerge(&self, owner: &str, name: &str, value: bool) -> Result<()>;
    async fn set_default_enable_qa(&self, owner: &str, name: &str, value: bool) -> Result<()>;
    async fn set_default_enable_checks(&self, owner: &str, name: &str, value: bool) -> Result<()>;

    async fn get_or_raise(&self, owner: &str, name: &str) -> Result<Repository> {
        self.get(owner, name).await?.ok_or_else(|| {
            DomainError::UnknownRepository {
                owner: owner.to_owned(),
                name: name.to_owned(),
            }
            .into()
        })
    }

    async fn create_or_update(&self, repository: Repository) -> Result<Repository> {
        if self
            .get(&repository.owner, &repository.name)
            .await?
            .is_some()
        {
            self.update(repository).await
        } else {
            self.create(repository).await
        }
    }
}

#[async_trait]
pub trait PullRequestStore: Send + Sync {
    async fn all(&self) -> Result<Vec<PullRequest>>;
    async fn filter(&self, owner: &str, name: &str) -> Result<Vec<PullRequest>>;
    async fn get(&self, owner: &str, name: &str, number: u64) -> Result<Option<PullRequest>>;
    async fn create(&self, pull_request: PullRequest) -> Result<PullRequest>;
    async fn update(&self, pull_request: PullRequest) -> Result<PullRequest>;
    async fn delete(&self, owner: &str, name: &str, number: u64) -> Result<bool>;

    async fn set_qa_status(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        qa_status: QaStatus,
    ) -> Result<()>;
    async fn set_checks_enabled(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        value: bool,
    ) -> Result<()>;
    async fn set_status_comment_id(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        status_comment_id: u64,
    ) -> Result<()>;
    async fn set_strategy_override(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        strategy: Option<MergeStrategy>,
    ) -> Result<()>;
    async fn set_automerge(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        automerge: bool,
    ) -> Result<()>;
    async fn set_locked(&self, owner: &str, name: &str, number: u64, locked: bool) -> Result<()>;

    async fn get_or_raise(&self, owner: &str, name: &str, number: u64) -> Result<PullRequest> {
        self.get(owner, name, number).await?.ok_or_else(|| {
            DomainError::UnknownPullRequest {
                owner: owner.to_owned(),
                name: name.to_owned(),
                number,
            }
            .into()
        })
    }

    async fn create_or_update(&self, pull_request: PullRequest) -> Result<PullRequest> {
        if self
            .get(
                &pull_request.repository_path.owner,
                &pull_request.repository_path.name,
                pull_request.number,
            )
            .await?
            .is_some()
        {
            self.update(pull_request).await
        } else {
            self.create(pull_request).await
        }
    }
}

#[async_trait]
pub trait MergeRuleStore: Send + Sync {
    async fn all(&self) -> Result<Vec<MergeRule>>;
    async fn filter(&self, owner: &str, name: &str) -> Result<Vec<MergeRule>>;
    async fn get(
        &self,
        owner: &str,
        name: &str,
        base_branch: &RuleBranch,
        head_branch: &RuleBranch,
    ) -> Result<Option<MergeRule>>;
    async fn create(&self, merge_rule: MergeRule) -> Result<MergeRule>;
    async fn update(&self, merge_rule: MergeRule) -> Result<MergeRule>;
    async fn delete(
        &self,
        owner: &str,
        name: &str,
        base_branch: &RuleBranch,
        head_branch: &RuleBranch,
    ) -> Result<bool>;

    async fn get_or_raise(
        &self,
        owner: &str,
        name: &str,
        base_branch: &RuleBranch,
        head_branch: &RuleBranch,
    ) -> Result<MergeRule> {
        self.get(owner, name, base_branch, head_branch)
            .await?
            .ok_or_else(|| {
                DomainError::UnknownMergeRule {
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                    base: base_branch.clone(),
                    head: head_branch.clone(),
                }
                .into()
            })
    }

    async fn create_or_update(&self, merge_rule: MergeRule) -> Result<MergeRule> {
        if self
            .get(
                &merge_rule.repository_path.owner,
                &merge_rule.repository_path.name,
                &merge_rule.base_branch,
                &merge_rule.head_branch,
            )
            .await?
            .is_some()
        {
            self.update(merge_rule).await
        } else {
            self.create(merge_rule).await
        }
    }
}

#[async_trait]
pub trait RepositoryRuleStore: Send + Sync {
    async fn all(&self) -> Result<Vec<RepositoryRule>>;
    async fn filter(&self, owner: &str, name: &str) -> Result<Vec<RepositoryRule>>;
    async fn get(&self, owner: &str, name: &str, rule_name: &str)
        -> Result<Option<RepositoryRule>>;
    async fn create(&self, rule: RepositoryRule) -> Result<RepositoryRule>;
    async fn update(&self, rule: RepositoryRule) -> Result<RepositoryRule>;
    async fn delete(&self, owner: &str, name: &str, rule_name: &str) -> Result<bool>;

    async fn get_or_raise(
        &self,
        owner: &str,
        name: &str,
        rule_name: &str,
    ) -> Result<RepositoryRule> {
        self.get(owner, name, rule_name).await?.ok_or_else(|| {
            DomainError::UnknownRepositoryRule {
                owner: owner.to_owned(),
                name: name.to_owned(),
                rule_name: rule_name.to_owned(),
            }
            .into()
        })
    }

    async fn create_or_update(&self, rule: RepositoryRule) -> Result<RepositoryRule> {
        if self
            .get(
                &rule.repository_path.owner,
                &rule.repository_path.name,
                &rule.name,
            )
            .await?
            .is_some()
        {
            self.update(rule).await
        } else {
            self.create(rule).await
        }
    }
}

#[async_trait]
pub trait ExternalAccountStore: Send + Sync {
    async fn all(&self) -> Result<Vec<ExternalAccount>>;
    async fn get(&self, username: &str) -> Result<Option<ExternalAccount>>;
    async fn create(&self, account: ExternalAccount) -> Result<ExternalAccount>;
    async fn update(&self, account: ExternalAccount) -> Result<ExternalAccount>;
    async fn delete(&self, username: &str) -> Result<bool>;

    async fn get_or_raise(&self, username: &str) -> Result<ExternalAccount> {
        self.get(username).await?.ok_or_else(|| {
            DomainError::UnknownExternalAccount {
                username: username.to_owned(),
            }
            .into()
        })
    }

    async fn create_or_update(&self, account: ExternalAccount) -> Result<ExternalAccount> {
        if self.get(&account.username).await?.is_some() {
            self.update(account).await
        } else {
            self.create(account).await
        }
    }
}

#[async_trait]
pub trait ExternalAccountRightStore: Send + Sync {
    async fn all(&self) -> Result<Vec<ExternalAccountRight>>;
    async fn filter(&self, username: &str) -> Result<Vec<ExternalAccountRight>>;
    async fn get(
        &self,
        owner: &str,
        name: &str,
        username: &str,
    ) -> Result<Option<ExternalAccountRight>>;
    async fn create(&self, right: ExternalAccountRight) -> Result<ExternalAccountRight>;
    async fn delete(&self, owner: &str, name: &str, username: &str) -> Result<bool>;

    async fn get_or_raise(
        &self,
        owner: &str,
        name: &str,
        username: &str,
    ) -> Result<ExternalAccountRight> {
        self.get(owner, name, username).await?.ok_or_else(|| {
            DomainError::UnknownExternalAccountRight {
                owner: owner.to_owned(),
                name: name.to_owned(),
                username: username.to_owned(),
            }
            .into()
        })
    }

    async fn get_or_create(&self, right: ExternalAccountRight) -> Result<ExternalAccountRight> {
        match self
            .get(
                &right.repository_path.owner,
                &right.repository_path.name,
                &right.username,
            )
            .await?
        {
            Some(existing) => Ok(existing),
            None => self.create(right).await,
        }
    }
}
