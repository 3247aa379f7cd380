//! Service registry threaded through the whole bot: configuration, the
//! platform client, the stores, the lock service and the GIF client.

use crate::{
    api::ApiClient,
    config::Config,
    database::store::{
        ExternalAccountRightStore, ExternalAccountStore, MergeRuleStore, PullRequestStore,
        RepositoryRuleStore, RepositoryStore,
    },
    gif::GifClient,
    lock::LockClient,
};
use std::sync::Arc;

pub struct Context {
    pub config: Config,
    pub api: Arc<dyn ApiClient>,
    pub lock: Arc<dyn LockClient>,
    pub gif: Arc<dyn GifClient>,
    pub repository_store: Arc<dyn RepositoryStore>,
    pub pull_request_store: Arc<dyn PullRequestStore>,
    pub merge_rule_store: Arc<dyn MergeRuleStore>,
    pub repository_rule_store: Arc<dyn RepositoryRuleStore>,
    pub external_account_store: Arc<dyn ExternalAccountStore>,
    pub external_account_right_store: Arc<dyn ExternalAccountRightStore>,
}
