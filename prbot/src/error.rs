use crate::models::RuleBranch;
use std::{borrow::Cow, io};
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Io error")]
    Io(#[from] io::Error),

    #[error("github client error")]
    Github(#[from] github::client::Error),

    #[error("database error")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("json error")]
    Json(#[from] serde_json::Error),

    #[error("regex error")]
    Regex(#[from] regex::Error),

    #[error("http error")]
    Http(#[from] hyper::http::Error),

    #[error("hyper error")]
    Hyper(#[from] hyper::Error),

    #[error("reqwest error")]
    Reqwest(#[from] reqwest::Error),

    #[error("jwt error")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Lock(#[from] crate::lock::LockError),

    #[error("`{0}`")]
    Message(Cow<'static, str>),
}

impl Error {
    /// Whether this is a domain-level "not found" error. The CLI maps these
    /// to exit code 1.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Domain(_))
    }
}

impl From<&'static str> for Error {
    fn from(error: &'static str) -> Self {
        Error::Message(error.into())
    }
}

impl From<String> for Error {
    fn from(error: String) -> Self {
        Error::Message(error.into())
    }
}

/// Domain lookups that came up empty. The message text is part of the
/// command-reply contract, so keep it stable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Unknown repository {owner}/{name}")]
    UnknownRepository { owner: String, name: String },

    #[error("Unknown pull request {owner}/{name} #{number}")]
    UnknownPullRequest {
        owner: String,
        name: String,
        number: u64,
    },

    #[error("Unknown merge rule {owner}/{name} with base {base} and head {head}")]
    UnknownMergeRule {
        owner: String,
        name: String,
        base: RuleBranch,
        head: RuleBranch,
    },

    #[error("Unknown repository rule {owner}/{name} named {rule_name}")]
    UnknownRepositoryRule {
        owner: String,
        name: String,
        rule_name: String,
    },

    #[error("Unknown external account {username}")]
    UnknownExternalAccount { username: String },

    #[error("Unknown external account right {username} on {owner}/{name}")]
    UnknownExternalAccountRight {
        owner: String,
        name: String,
        username: String,
    },
}
