//! Database import/export as a single JSON document.
//!
//! The compatibility import accepts the older export shape where entities
//! reference repositories by integer id and repository rules live under a
//! `pull_request_rules` key.

use crate::{
    context::Context,
    database::store::{
        ExternalAccountRightStore, ExternalAccountStore, MergeRuleStore, PullRequestStore,
        RepositoryRuleStore, RepositoryStore,
    },
    models::{
        ExternalAccount, ExternalAccountRight, MergeRule, MergeStrategy, PullRequest, QaStatus,
        Repository, RepositoryPath, RepositoryRule, RuleAction, RuleBranch, RuleCondition,
    },
    Error, Result,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ImportExportData {
    pub repositories: Vec<Repository>,
    pub pull_requests: Vec<PullRequest>,
    pub repository_rules: Vec<RepositoryRule>,
    pub merge_rules: Vec<MergeRule>,
    pub external_accounts: Vec<ExternalAccount>,
    pub external_account_rights: Vec<ExternalAccountRight>,
}

/// Dump every entity from the stores.
pub async fn export_data(ctx: &Context) -> Result<ImportExportData> {
    Ok(ImportExportData {
        repositories: ctx.repository_store.all().await?,
        pull_requests: ctx.pull_request_store.all().await?,
        repository_rules: ctx.repository_rule_store.all().await?,
        merge_rules: ctx.merge_rule_store.all().await?,
        external_accounts: ctx.external_account_store.all().await?,
        external_account_rights: ctx.external_account_right_store.all().await?,
    })
}

/// Load a dump into the stores, upserting every entity.
pub async fn import_data(ctx: &Context, data: ImportExportData) -> Result<()> {
    for repository in data.repositories {
        ctx.repository_store.create_or_update(repository).await?;
    }

    for pull_request in data.pull_requests {
        ctx.pull_request_store.create_or_update(pull_request).await?;
    }

    for rule in data.repository_rules {
        ctx.repository_rule_store.create_or_update(rule).await?;
    }

    for merge_rule in data.merge_rules {
        ctx.merge_rule_store.create_or_update(merge_rule).await?;
    }

    for account in data.external_accounts {
        ctx.external_account_store.create_or_update(account).await?;
    }

    for right in data.external_account_rights {
        ctx.external_account_right_store.get_or_create(right).await?;
    }

    Ok(())
}

/// Convert the older integer-id export shape to [`ImportExportData`].
pub fn convert_compatibility_data(previous: &Value) -> Result<ImportExportData> {
    let mut data = ImportExportData::default();
    let mut repository_ids: HashMap<i64, RepositoryPath> = HashMap::new();

    for repository in array_of(previous, "repositories")? {
        let path = RepositoryPath::new(str_field(repository, "owner")?, str_field(repository, "name")?);
        repository_ids.insert(int_field(repository, "id")?, path.clone());

        data.repositories.push(Repository {
            owner: path.owner,
            name: path.name,
            manual_interaction: bool_field(repository, "manual_interaction")?,
            pr_title_validation_regex: str_field(repository, "pr_title_validation_regex")?,
            default_strategy: strategy_field(repository, "default_strategy")?,
            default_automerge: bool_field(repository, "default_automerge")?,
            default_enable_qa: bool_field(repository, "default_enable_qa")?,
            default_enable_checks: bool_field(repository, "default_enable_checks")?,
        });
    }

    for pull_request in array_of(previous, "pull_requests")? {
        // Some historic dumps hold garbage comment ids outside the platform
        // range; normalize them to "no comment".
        let status_comment_id = match pull_request
            .get("status_comment_id")
            .and_then(Value::as_u64)
        {
            Some(id) if id > i64::MAX as u64 => 0,
            Some(id) => id,
            None => 0,
        };

        let strategy_override = match pull_request.get("strategy_override") {
            Some(Value::String(value)) => Some(
                value
                    .parse::<MergeStrategy>()
                    .map_err(|e| Error::Message(e.to_string().into()))?,
            ),
            _ => None,
        };

        data.pull_requests.push(PullRequest {
            repository_path: referenced_path(&repository_ids, pull_request)?,
            number: int_field(pull_request, "number")? as u64,
            qa_status: str_field(pull_request, "qa_status")?
                .parse::<QaStatus>()
                .map_err(|e| Error::Message(e.to_string().into()))?,
            status_comment_id,
            checks_enabled: bool_field(pull_request, "checks_enabled")?,
            automerge: bool_field(pull_request, "automerge")?,
            locked: bool_field(pull_request, "locked")?,
            strategy_override,
        });
    }

    for merge_rule in array_of(previous, "merge_rules")? {
        data.merge_rules.push(MergeRule {
            repository_path: referenced_path(&repository_ids, merge_rule)?,
            base_branch: RuleBranch::from_name(&str_field(merge_rule, "base_branch")?),
            head_branch: RuleBranch::from_name(&str_field(merge_rule, "head_branch")?),
            strategy: strategy_field(merge_rule, "strategy")?,
        });
    }

    for account in array_of(previous, "external_accounts")? {
        data.external_accounts.push(ExternalAccount {
            username: str_field(account, "username")?,
            public_key: str_field(account, "public_key")?,
            private_key: str_field(account, "private_key")?,
        });
    }

    for right in array_of(previous, "external_account_rights")? {
        data.external_account_rights.push(ExternalAccountRight {
            repository_path: referenced_path(&repository_ids, right)?,
            username: str_field(right, "username")?,
        });
    }

    // Repository rules were named "pull request rules" in the old shape.
    for rule in array_of(previous, "pull_request_rules")? {
        let conditions: Vec<RuleCondition> = serde_json::from_value(
            rule.get("conditions").cloned().unwrap_or(Value::Array(vec![])),
        )?;
        let actions: Vec<RuleAction> =
            serde_json::from_value(rule.get("actions").cloned().unwrap_or(Value::Array(vec![])))?;

        data.repository_rules.push(RepositoryRule {
            repository_path: referenced_path(&repository_ids, rule)?,
            name: str_field(rule, "name")?,
            conditions,
            actions,
        });
    }

    Ok(data)
}

fn array_of<'a>(value: &'a Value, key: &str) -> Result<Vec<&'a Value>> {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(|array| array.iter().collect())
        .ok_or_else(|| Error::Message(format!("missing `{}` array in import data", key).into()))
}

fn str_field(value: &Value, key: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::Message(format!("missing string field `{}`", key).into()))
}

fn bool_field(value: &Value, key: &str) -> Result<bool> {
    value
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| Error::Message(format!("missing boolean field `{}`", key).into()))
}

fn int_field(value: &Value, key: &str) -> Result<i64> {
    value
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| Error::Message(format!("missing integer field `{}`", key).into()))
}

fn strategy_field(value: &Value, key: &str) -> Result<MergeStrategy> {
    str_field(value, key)?
        .parse()
        .map_err(|e: crate::models::ParseMergeStrategyError| Error::Message(e.to_string().into()))
}

fn referenced_path(
    repository_ids: &HashMap<i64, RepositoryPath>,
    value: &Value,
) -> Result<RepositoryPath> {
    let id = int_field(value, "repository_id")?;
    repository_ids
        .get(&id)
        .cloned()
        .ok_or_else(|| Error::Message(format!("unknown repository id `{}` in import data", id).into()))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_support::test_context;
    use crate::models::RuleBranch;

    #[tokio::test]
    async fn export_import_round_trip() {
        let (ctx, _fixtures) = test_context();

        let repository = Repository::new("owner", "name");
        ctx.repository_store
            .create(repository.clone())
            .await
            .unwrap();
        ctx.pull_request_store
            .create(PullRequest::new(repository.path(), 1))
            .await
            .unwrap();
        ctx.merge_rule_store
            .create(MergeRule {
                repository_path: repository.path(),
                base_branch: RuleBranch::Named("main".into()),
                head_branch: RuleBranch::Wildcard,
                strategy: MergeStrategy::Squash,
            })
            .await
            .unwrap();

        let data = export_data(&ctx).await.unwrap();
        let serialized = serde_json::to_string(&data).unwrap();

        let (other_ctx, _other_fixtures) = test_context();
        let parsed: ImportExportData = serde_json::from_str(&serialized).unwrap();
        import_data(&other_ctx, parsed).await.unwrap();

        assert_eq!(
            other_ctx.repository_store.all().await.unwrap(),
            vec![repository.clone()]
        );
        assert_eq!(other_ctx.pull_request_store.all().await.unwrap().len(), 1);
        assert_eq!(
            other_ctx
                .merge_rule_store
                .get(
                    "owner",
                    "name",
                    &RuleBranch::Named("main".into()),
                    &RuleBranch::Wildcard
                )
                .await
                .unwrap()
                .unwrap()
                .strategy,
            MergeStrategy::Squash
        );
    }

    #[tokio::test]
    async fn compatibility_import_resolves_integer_ids() {
        let previous = serde_json::json!({
            "repositories": [{
                "id": 4,
                "owner": "owner",
                "name": "name",
                "manual_interaction": false,
                "pr_title_validation_regex": "",
                "default_strategy": "merge",
                "default_automerge": false,
                "default_enable_qa": true,
                "default_enable_checks": true
            }],
            "pull_requests": [{
                "repository_id": 4,
                "number": 7,
                "qa_status": "pass",
                "status_comment_id": 1234,
                "checks_enabled": true,
                "automerge": false,
                "locked": false,
                "strategy_override": null
            }],
            "merge_rules": [{
                "repository_id": 4,
                "base_branch": "*",
                "head_branch": "feature",
                "strategy": "rebase"
            }],
            "external_accounts": [],
            "external_account_rights": [],
            "pull_request_rules": [{
                "repository_id": 4,
                "name": "ci-only",
                "conditions": [{"type": "author", "value": "bot"}],
                "actions": [{"type": "set_checks_enabled", "value": false}]
            }]
        });

        let data = convert_compatibility_data(&previous).unwrap();

        assert_eq!(data.repositories.len(), 1);
        assert_eq!(
            data.pull_requests[0].repository_path,
            RepositoryPath::new("owner", "name")
        );
        assert_eq!(data.pull_requests[0].qa_status, QaStatus::Pass);
        assert_eq!(data.merge_rules[0].base_branch, RuleBranch::Wildcard);
        assert_eq!(data.repository_rules[0].name, "ci-only");
        assert_eq!(
            data.repository_rules[0].actions,
            vec![RuleAction::SetChecksEnabled(false)]
        );
    }
}
