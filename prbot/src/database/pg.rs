//! Postgres implementations of the store traits.

use crate::{
    database::store::{
        ExternalAccountRightStore, ExternalAccountStore, MergeRuleStore, PullRequestStore,
        RepositoryRuleStore, RepositoryStore,
    },
    error::DomainError,
    models::{
        ExternalAccount, ExternalAccountRight, MergeRule, MergeStrategy, PullRequest, QaStatus,
        Repository, RepositoryPath, RepositoryRule, RuleBranch,
    },
    Error, Result,
};
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

/// Handle over the connection pool. One instance implements every store
/// trait; the service registry clones the `Arc` into each seam.
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Apply pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Cheap connectivity probe for health checks.
    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    async fn repository_id(&self, owner: &str, name: &str) -> Result<i64> {
        let id: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM repository WHERE owner = $1 AND name = $2")
                .bind(owner)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        id.map(|(id,)| id).ok_or_else(|| {
            DomainError::UnknownRepository {
                owner: owner.to_owned(),
                name: name.to_owned(),
            }
            .into()
        })
    }
}

#[derive(FromRow)]
struct RepositoryRow {
    owner: String,
    name: String,
    manual_interaction: bool,
    pr_title_validation_regex: String,
    default_strategy: String,
    default_automerge: bool,
    default_enable_qa: bool,
    default_enable_checks: bool,
}

impl RepositoryRow {
    fn into_model(self) -> Result<Repository> {
        Ok(Repository {
            owner: self.owner,
            name: self.name,
            manual_interaction: self.manual_interaction,
            pr_title_validation_regex: self.pr_title_validation_regex,
            default_strategy: parse_strategy(&self.default_strategy)?,
            default_automerge: self.default_automerge,
            default_enable_qa: self.default_enable_qa,
            default_enable_checks: self.default_enable_checks,
        })
    }
}

#[derive(FromRow)]
struct PullRequestRow {
    owner: String,
    name: String,
    number: i64,
    qa_status: String,
    status_comment_id: i64,
    checks_enabled: bool,
    automerge: bool,
    locked: bool,
    strategy_override: Option<String>,
}

impl PullRequestRow {
    fn into_model(self) -> Result<PullRequest> {
        Ok(PullRequest {
            repository_path: RepositoryPath::new(self.owner, self.name),
            number: self.number as u64,
            qa_status: self
                .qa_status
                .parse::<QaStatus>()
                .map_err(|e| Error::Message(e.to_string().into()))?,
            status_comment_id: self.status_comment_id as u64,
            checks_enabled: self.checks_enabled,
            automerge: self.automerge,
            locked: self.locked,
            strategy_override: self
                .strategy_override
                .as_deref()
                .map(parse_strategy)
                .transpose()?,
        })
    }
}

#[derive(FromRow)]
struct MergeRuleRow {
    owner: String,
    name: String,
    base_branch: String,
    head_branch: String,
    strategy: String,
}

impl MergeRuleRow {
    fn into_model(self) -> Result<MergeRule> {
        Ok(MergeRule {
            repository_path: RepositoryPath::new(self.owner, self.name),
            base_branch: branch_from_str(&self.base_branch),
            head_branch: branch_from_str(&self.head_branch),
            strategy: parse_strategy(&self.strategy)?,
        })
    }
}

#[derive(FromRow)]
struct RepositoryRuleRow {
    owner: String,
    name: String,
    rule_name: String,
    conditions: String,
    actions: String,
}

impl RepositoryRuleRow {
    fn into_model(self) -> Result<RepositoryRule> {
        Ok(RepositoryRule {
            repository_path: RepositoryPath::new(self.owner, self.name),
            name: self.rule_name,
            conditions: serde_json::from_str(&self.conditions)?,
            actions: serde_json::from_str(&self.actions)?,
        })
    }
}

#[derive(FromRow)]
struct ExternalAccountRow {
    username: String,
    public_key: String,
    private_key: String,
}

#[derive(FromRow)]
struct ExternalAccountRightRow {
    owner: String,
    name: String,
    username: String,
}

fn parse_strategy(value: &str) -> Result<MergeStrategy> {
    value
        .parse()
        .map_err(|e: crate::models::ParseMergeStrategyError| Error::Message(e.to_string().into()))
}

fn branch_from_str(value: &str) -> RuleBranch {
    RuleBranch::from_name(value)
}

#[async_trait]
impl RepositoryStore for Database {
    async fn all(&self) -> Result<Vec<Repository>> {
        let rows: Vec<RepositoryRow> =
            sqlx::query_as("SELECT * FROM repository ORDER BY owner, name")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(RepositoryRow::into_model).collect()
    }

    async fn get(&self, owner: &str, name: &str) -> Result<Option<Repository>> {
        let row: Option<RepositoryRow> =
            sqlx::query_as("SELECT * FROM repository WHERE owner = $1 AND name = $2")
                .bind(owner)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;

        row.map(RepositoryRow::into_model).transpose()
    }

    async fn create(&self, repository: Repository) -> Result<Repository> {
        sqlx::query(
            "INSERT INTO repository (owner, name, manual_interaction, pr_title_validation_regex, \
             default_strategy, default_automerge, default_enable_qa, default_enable_checks) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&repository.owner)
        .bind(&repository.name)
        .bind(repository.manual_interaction)
        .bind(&repository.pr_title_validation_regex)
        .bind(repository.default_strategy.name())
        .bind(repository.default_automerge)
        .bind(repository.default_enable_qa)
        .bind(repository.default_enable_checks)
        .execute(&self.pool)
        .await?;

        Ok(repository)
    }

    async fn update(&self, repository: Repository) -> Result<Repository> {
        let result = sqlx::query(
            "UPDATE repository SET manual_interaction = $3, pr_title_validation_regex = $4, \
             default_strategy = $5, default_automerge = $6, default_enable_qa = $7, \
             default_enable_checks = $8 WHERE owner = $1 AND name = $2",
        )
        .bind(&repository.owner)
        .bind(&repository.name)
        .bind(repository.manual_interaction)
        .bind(&repository.pr_title_validation_regex)
        .bind(repository.default_strategy.name())
        .bind(repository.default_automerge)
        .bind(repository.default_enable_qa)
        .bind(repository.default_enable_checks)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::UnknownRepository {
                owner: repository.owner,
                name: repository.name,
            }
            .into());
        }

        Ok(repository)
    }

    async fn delete(&self, owner: &str, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM repository WHERE owner = $1 AND name = $2")
            .bind(owner)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_manual_interaction(&self, owner: &str, name: &str, value: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repository SET manual_interaction = $3 WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;

        repository_affected(result, owner, name)
    }

    async fn set_pr_title_validation_regex(
        &self,
        owner: &str,
        name: &str,
        value: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repository SET pr_title_validation_regex = $3 WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;

        repository_affected(result, owner, name)
    }

    async fn set_default_strategy(
        &self,
        owner: &str,
        name: &str,
        strategy: MergeStrategy,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repository SET default_strategy = $3 WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .bind(strategy.name())
        .execute(&self.pool)
        .await?;

        repository_affected(result, owner, name)
    }

    async fn set_default_automerge(&self, owner: &str, name: &str, value: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repository SET default_automerge = $3 WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;

        repository_affected(result, owner, name)
    }

    async fn set_default_enable_qa(&self, owner: &str, name: &str, value: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repository SET default_enable_qa = $3 WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;

        repository_affected(result, owner, name)
    }

    async fn set_default_enable_checks(&self, owner: &str, name: &str, value: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE repository SET default_enable_checks = $3 WHERE owner = $1 AND name = $2",
        )
        .bind(owner)
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;

        repository_affected(result, owner, name)
    }
}

fn repository_affected(
    result: sqlx::postgres::PgQueryResult,
    owner: &str,
    name: &str,
) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(DomainError::UnknownRepository {
            owner: owner.to_owned(),
            name: name.to_owned(),
        }
        .into());
    }

    Ok(())
}

const PULL_REQUEST_SELECT: &str = "SELECT r.owner, r.name, pr.number, pr.qa_status, \
     pr.status_comment_id, pr.checks_enabled, pr.automerge, pr.locked, pr.strategy_override \
     FROM pull_request pr JOIN repository r ON r.id = pr.repository_id";

#[async_trait]
impl PullRequestStore for Database {
    async fn all(&self) -> Result<Vec<PullRequest>> {
        let sql = format!("{} ORDER BY r.owner, r.name, pr.number", PULL_REQUEST_SELECT);
        let rows: Vec<PullRequestRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(PullRequestRow::into_model).collect()
    }

    async fn filter(&self, owner: &str, name: &str) -> Result<Vec<PullRequest>> {
        let sql = format!(
            "{} WHERE r.owner = $1 AND r.name = $2 ORDER BY pr.number",
            PULL_REQUEST_SELECT
        );
        let rows: Vec<PullRequestRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(PullRequestRow::into_model).collect()
    }

    async fn get(&self, owner: &str, name: &str, number: u64) -> Result<Option<PullRequest>> {
        let sql = format!(
            "{} WHERE r.owner = $1 AND r.name = $2 AND pr.number = $3",
            PULL_REQUEST_SELECT
        );
        let row: Option<PullRequestRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(name)
            .bind(number as i64)
            .fetch_optional(&self.pool)
            .await?;

        row.map(PullRequestRow::into_model).transpose()
    }

    async fn create(&self, pull_request: PullRequest) -> Result<PullRequest> {
        let repository_id = self
            .repository_id(
                &pull_request.repository_path.owner,
                &pull_request.repository_path.name,
            )
            .await?;

        sqlx::query(
            "INSERT INTO pull_request (repository_id, number, qa_status, status_comment_id, \
             checks_enabled, automerge, locked, strategy_override) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(repository_id)
        .bind(pull_request.number as i64)
        .bind(pull_request.qa_status.name())
        .bind(pull_request.status_comment_id as i64)
        .bind(pull_request.checks_enabled)
        .bind(pull_request.automerge)
        .bind(pull_request.locked)
        .bind(pull_request.strategy_override.map(MergeStrategy::name))
        .execute(&self.pool)
        .await?;

        Ok(pull_request)
    }

    async fn update(&self, pull_request: PullRequest) -> Result<PullRequest> {
        let result = sqlx::query(
            "UPDATE pull_request pr SET qa_status = $4, status_comment_id = $5, \
             checks_enabled = $6, automerge = $7, locked = $8, strategy_override = $9 \
             FROM repository r WHERE pr.repository_id = r.id AND r.owner = $1 AND r.name = $2 \
             AND pr.number = $3",
        )
        .bind(&pull_request.repository_path.owner)
        .bind(&pull_request.repository_path.name)
        .bind(pull_request.number as i64)
        .bind(pull_request.qa_status.name())
        .bind(pull_request.status_comment_id as i64)
        .bind(pull_request.checks_enabled)
        .bind(pull_request.automerge)
        .bind(pull_request.locked)
        .bind(pull_request.strategy_override.map(MergeStrategy::name))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::UnknownPullRequest {
                owner: pull_request.repository_path.owner,
                name: pull_request.repository_path.name,
                number: pull_request.number,
            }
            .into());
        }

        Ok(pull_request)
    }

    async fn delete(&self, owner: &str, name: &str, number: u64) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM pull_request pr USING repository r WHERE pr.repository_id = r.id \
             AND r.owner = $1 AND r.name = $2 AND pr.number = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(number as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_qa_status(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        qa_status: QaStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pull_request pr SET qa_status = $4 FROM repository r \
             WHERE pr.repository_id = r.id AND r.owner = $1 AND r.name = $2 AND pr.number = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(number as i64)
        .bind(qa_status.name())
        .execute(&self.pool)
        .await?;

        pull_request_affected(result, owner, name, number)
    }

    async fn set_checks_enabled(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        value: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pull_request pr SET checks_enabled = $4 FROM repository r \
             WHERE pr.repository_id = r.id AND r.owner = $1 AND r.name = $2 AND pr.number = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(number as i64)
        .bind(value)
        .execute(&self.pool)
        .await?;

        pull_request_affected(result, owner, name, number)
    }

    async fn set_status_comment_id(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        status_comment_id: u64,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pull_request pr SET status_comment_id = $4 FROM repository r \
             WHERE pr.repository_id = r.id AND r.owner = $1 AND r.name = $2 AND pr.number = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(number as i64)
        .bind(status_comment_id as i64)
        .execute(&self.pool)
        .await?;

        pull_request_affected(result, owner, name, number)
    }

    async fn set_strategy_override(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        strategy: Option<MergeStrategy>,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pull_request pr SET strategy_override = $4 FROM repository r \
             WHERE pr.repository_id = r.id AND r.owner = $1 AND r.name = $2 AND pr.number = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(number as i64)
        .bind(strategy.map(MergeStrategy::name))
        .execute(&self.pool)
        .await?;

        pull_request_affected(result, owner, name, number)
    }

    async fn set_automerge(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        automerge: bool,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pull_request pr SET automerge = $4 FROM repository r \
             WHERE pr.repository_id = r.id AND r.owner = $1 AND r.name = $2 AND pr.number = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(number as i64)
        .bind(automerge)
        .execute(&self.pool)
        .await?;

        pull_request_affected(result, owner, name, number)
    }

    async fn set_locked(&self, owner: &str, name: &str, number: u64, locked: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pull_request pr SET locked = $4 FROM repository r \
             WHERE pr.repository_id = r.id AND r.owner = $1 AND r.name = $2 AND pr.number = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(number as i64)
        .bind(locked)
        .execute(&self.pool)
        .await?;

        pull_request_affected(result, owner, name, number)
    }
}

fn pull_request_affected(
    result: sqlx::postgres::PgQueryResult,
    owner: &str,
    name: &str,
    number: u64,
) -> Result<()> {
    if result.rows_affected() == 0 {
        return Err(DomainError::UnknownPullRequest {
            owner: owner.to_owned(),
            name: name.to_owned(),
            number,
        }
        .into());
    }

    Ok(())
}

const MERGE_RULE_SELECT: &str = "SELECT r.owner, r.name, mr.base_branch, mr.head_branch, \
     mr.strategy FROM merge_rule mr JOIN repository r ON r.id = mr.repository_id";

#[async_trait]
impl MergeRuleStore for Database {
    async fn all(&self) -> Result<Vec<MergeRule>> {
        let sql = format!("{} ORDER BY r.owner, r.name", MERGE_RULE_SELECT);
        let rows: Vec<MergeRuleRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(MergeRuleRow::into_model).collect()
    }

    async fn filter(&self, owner: &str, name: &str) -> Result<Vec<MergeRule>> {
        let sql = format!("{} WHERE r.owner = $1 AND r.name = $2", MERGE_RULE_SELECT);
        let rows: Vec<MergeRuleRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(MergeRuleRow::into_model).collect()
    }

    async fn get(
        &self,
        owner: &str,
        name: &str,
        base_branch: &RuleBranch,
        head_branch: &RuleBranch,
    ) -> Result<Option<MergeRule>> {
        let sql = format!(
            "{} WHERE r.owner = $1 AND r.name = $2 AND mr.base_branch = $3 AND mr.head_branch = $4",
            MERGE_RULE_SELECT
        );
        let row: Option<MergeRuleRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(name)
            .bind(base_branch.name())
            .bind(head_branch.name())
            .fetch_optional(&self.pool)
            .await?;

        row.map(MergeRuleRow::into_model).transpose()
    }

    async fn create(&self, merge_rule: MergeRule) -> Result<MergeRule> {
        let repository_id = self
            .repository_id(
                &merge_rule.repository_path.owner,
                &merge_rule.repository_path.name,
            )
            .await?;

        sqlx::query(
            "INSERT INTO merge_rule (repository_id, base_branch, head_branch, strategy) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(repository_id)
        .bind(merge_rule.base_branch.name())
        .bind(merge_rule.head_branch.name())
        .bind(merge_rule.strategy.name())
        .execute(&self.pool)
        .await?;

        Ok(merge_rule)
    }

    async fn update(&self, merge_rule: MergeRule) -> Result<MergeRule> {
        let result = sqlx::query(
            "UPDATE merge_rule mr SET strategy = $5 FROM repository r \
             WHERE mr.repository_id = r.id AND r.owner = $1 AND r.name = $2 \
             AND mr.base_branch = $3 AND mr.head_branch = $4",
        )
        .bind(&merge_rule.repository_path.owner)
        .bind(&merge_rule.repository_path.name)
        .bind(merge_rule.base_branch.name())
        .bind(merge_rule.head_branch.name())
        .bind(merge_rule.strategy.name())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::UnknownMergeRule {
                owner: merge_rule.repository_path.owner,
                name: merge_rule.repository_path.name,
                base: merge_rule.base_branch,
                head: merge_rule.head_branch,
            }
            .into());
        }

        Ok(merge_rule)
    }

    async fn delete(
        &self,
        owner: &str,
        name: &str,
        base_branch: &RuleBranch,
        head_branch: &RuleBranch,
    ) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM merge_rule mr USING repository r WHERE mr.repository_id = r.id \
             AND r.owner = $1 AND r.name = $2 AND mr.base_branch = $3 AND mr.head_branch = $4",
        )
        .bind(owner)
        .bind(name)
        .bind(base_branch.name())
        .bind(head_branch.name())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

const REPOSITORY_RULE_SELECT: &str = "SELECT r.owner, r.name, rr.name AS rule_name, \
     rr.conditions, rr.actions FROM repository_rule rr JOIN repository r ON r.id = rr.repository_id";

#[async_trait]
impl RepositoryRuleStore for Database {
    async fn all(&self) -> Result<Vec<RepositoryRule>> {
        let sql = format!("{} ORDER BY r.owner, r.name, rr.name", REPOSITORY_RULE_SELECT);
        let rows: Vec<RepositoryRuleRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        rows.into_iter().map(RepositoryRuleRow::into_model).collect()
    }

    async fn filter(&self, owner: &str, name: &str) -> Result<Vec<RepositoryRule>> {
        let sql = format!(
            "{} WHERE r.owner = $1 AND r.name = $2 ORDER BY rr.name",
            REPOSITORY_RULE_SELECT
        );
        let rows: Vec<RepositoryRuleRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(name)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(RepositoryRuleRow::into_model).collect()
    }

    async fn get(
        &self,
        owner: &str,
        name: &str,
        rule_name: &str,
    ) -> Result<Option<RepositoryRule>> {
        let sql = format!(
            "{} WHERE r.owner = $1 AND r.name = $2 AND rr.name = $3",
            REPOSITORY_RULE_SELECT
        );
        let row: Option<RepositoryRuleRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(name)
            .bind(rule_name)
            .fetch_optional(&self.pool)
            .await?;

        row.map(RepositoryRuleRow::into_model).transpose()
    }

    async fn create(&self, rule: RepositoryRule) -> Result<RepositoryRule> {
        let repository_id = self
            .repository_id(&rule.repository_path.owner, &rule.repository_path.name)
            .await?;

        sqlx::query(
            "INSERT INTO repository_rule (repository_id, name, conditions, actions) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(repository_id)
        .bind(&rule.name)
        .bind(serde_json::to_string(&rule.conditions)?)
        .bind(serde_json::to_string(&rule.actions)?)
        .execute(&self.pool)
        .await?;

        Ok(rule)
    }

    async fn update(&self, rule: RepositoryRule) -> Result<RepositoryRule> {
        let result = sqlx::query(
            "UPDATE repository_rule rr SET conditions = $4, actions = $5 FROM repository r \
             WHERE rr.repository_id = r.id AND r.owner = $1 AND r.name = $2 AND rr.name = $3",
        )
        .bind(&rule.repository_path.owner)
        .bind(&rule.repository_path.name)
        .bind(&rule.name)
        .bind(serde_json::to_string(&rule.conditions)?)
        .bind(serde_json::to_string(&rule.actions)?)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::UnknownRepositoryRule {
                owner: rule.repository_path.owner,
                name: rule.repository_path.name,
                rule_name: rule.name,
            }
            .into());
        }

        Ok(rule)
    }

    async fn delete(&self, owner: &str, name: &str, rule_name: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM repository_rule rr USING repository r WHERE rr.repository_id = r.id \
             AND r.owner = $1 AND r.name = $2 AND rr.name = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(rule_name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ExternalAccountStore for Database {
    async fn all(&self) -> Result<Vec<ExternalAccount>> {
        let rows: Vec<ExternalAccountRow> =
            sqlx::query_as("SELECT * FROM external_account ORDER BY username")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|row| ExternalAccount {
                username: row.username,
                public_key: row.public_key,
                private_key: row.private_key,
            })
            .collect())
    }

    async fn get(&self, username: &str) -> Result<Option<ExternalAccount>> {
        let row: Option<ExternalAccountRow> =
            sqlx::query_as("SELECT * FROM external_account WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|row| ExternalAccount {
            username: row.username,
            public_key: row.public_key,
            private_key: row.private_key,
        }))
    }

    async fn create(&self, account: ExternalAccount) -> Result<ExternalAccount> {
        sqlx::query(
            "INSERT INTO external_account (username, public_key, private_key) VALUES ($1, $2, $3)",
        )
        .bind(&account.username)
        .bind(&account.public_key)
        .bind(&account.private_key)
        .execute(&self.pool)
        .await?;

        Ok(account)
    }

    async fn update(&self, account: ExternalAccount) -> Result<ExternalAccount> {
        let result = sqlx::query(
            "UPDATE external_account SET public_key = $2, private_key = $3 WHERE username = $1",
        )
        .bind(&account.username)
        .bind(&account.public_key)
        .bind(&account.private_key)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::UnknownExternalAccount {
                username: account.username,
            }
            .into());
        }

        Ok(account)
    }

    async fn delete(&self, username: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM external_account WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

const RIGHT_SELECT: &str = "SELECT r.owner, r.name, er.username FROM external_account_right er \
     JOIN repository r ON r.id = er.repository_id";

#[async_trait]
impl ExternalAccountRightStore for Database {
    async fn all(&self) -> Result<Vec<ExternalAccountRight>> {
        let sql = format!("{} ORDER BY er.username, r.owner, r.name", RIGHT_SELECT);
        let rows: Vec<ExternalAccountRightRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;

        Ok(rows
            .into_iter()
            .map(|row| ExternalAccountRight {
                repository_path: RepositoryPath::new(row.owner, row.name),
                username: row.username,
            })
            .collect())
    }

    async fn filter(&self, username: &str) -> Result<Vec<ExternalAccountRight>> {
        let sql = format!("{} WHERE er.username = $1", RIGHT_SELECT);
        let rows: Vec<ExternalAccountRightRow> = sqlx::query_as(&sql)
            .bind(username)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| ExternalAccountRight {
                repository_path: RepositoryPath::new(row.owner, row.name),
                username: row.username,
            })
            .collect())
    }

    async fn get(
        &self,
        owner: &str,
        name: &str,
        username: &str,
    ) -> Result<Option<ExternalAccountRight>> {
        let sql = format!(
            "{} WHERE r.owner = $1 AND r.name = $2 AND er.username = $3",
            RIGHT_SELECT
        );
        let row: Option<ExternalAccountRightRow> = sqlx::query_as(&sql)
            .bind(owner)
            .bind(name)
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| ExternalAccountRight {
            repository_path: RepositoryPath::new(row.owner, row.name),
            username: row.username,
        }))
    }

    async fn create(&self, right: ExternalAccountRight) -> Result<ExternalAccountRight> {
        let repository_id = self
            .repository_id(&right.repository_path.owner, &right.repository_path.name)
            .await?;

        sqlx::query("INSERT INTO external_account_right (repository_id, username) VALUES ($1, $2)")
            .bind(repository_id)
            .bind(&right.username)
            .execute(&self.pool)
            .await?;

        Ok(right)
    }

    async fn delete(&self, owner: &str, name: &str, username: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM external_account_right er USING repository r \
             WHERE er.repository_id = r.id AND r.owner = $1 AND r.name = $2 AND er.username = $3",
        )
        .bind(owner)
        .bind(name)
        .bind(username)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
