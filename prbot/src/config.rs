use crate::{Error, Result};
use std::env;

/// Environment variables are prefixed to avoid collisions, e.g.
/// `prbot_database_url`.
const ENV_PREFIX: &str = "prbot_";

#[derive(Clone, Debug)]
pub struct Config {
    pub bot_nickname: String,
    pub database_url: String,
    pub lock_url: String,
    pub tenor_key: String,
    pub log_level: String,

    pub github_webhook_secret: String,
    pub github_personal_token: String,
    pub github_app_client_id: String,
    pub github_app_private_key: String,

    pub server_ip: String,
    pub server_port: u16,
}

impl Config {
    /// Read the configuration from the environment (a `.env` file is loaded
    /// first when present).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Self {
            bot_nickname: var("bot_nickname").unwrap_or_else(|| "bot".to_owned()),
            database_url: required("database_url")?,
            lock_url: required("lock_url")?,
            tenor_key: var("tenor_key").unwrap_or_default(),
            log_level: var("log_level").unwrap_or_else(|| "info".to_owned()),
            github_webhook_secret: required("github_webhook_secret")?,
            github_personal_token: var("github_personal_token").unwrap_or_default(),
            github_app_client_id: var("github_app_client_id").unwrap_or_default(),
            // Private keys are passed as single-line variables with literal
            // `\n` sequences standing in for newlines.
            github_app_private_key: var("github_app_private_key")
                .map(|key| key.replace("\\n", "\n"))
                .unwrap_or_default(),
            server_ip: var("server_ip").unwrap_or_else(|| "0.0.0.0".to_owned()),
            server_port: var("server_port")
                .map(|port| {
                    port.parse()
                        .map_err(|_| Error::from(format!("invalid server port `{}`", port)))
                })
                .transpose()?
                .unwrap_or(8000),
        };

        if config.github_personal_token.is_empty()
            && (config.github_app_client_id.is_empty() || config.github_app_private_key.is_empty())
        {
            return Err(
                "missing GitHub credentials: set prbot_github_personal_token or \
                 prbot_github_app_client_id + prbot_github_app_private_key"
                    .into(),
            );
        }

        Ok(config)
    }

    /// Build the GitHub client matching the configured credentials. App
    /// credentials win over a personal token.
    pub fn github_client(&self) -> Result<github::Client> {
        let builder = github::Client::builder();

        let builder = if !self.github_app_client_id.is_empty()
            && !self.github_app_private_key.is_empty()
        {
            builder.app(
                self.github_app_client_id.clone(),
                self.github_app_private_key.clone(),
            )
        } else {
            builder.personal_token(self.github_personal_token.clone())
        };

        Ok(builder.build()?)
    }
}

fn var(name: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn required(name: &str) -> Result<String> {
    var(name).ok_or_else(|| Error::from(format!("missing required setting `{}{}`", ENV_PREFIX, name)))
}
