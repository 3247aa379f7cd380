use crate::{
    auth::{AppAuth, Auth},
    InstallationToken,
};
use chrono::Utc;
use log::{debug, warn};
use reqwest::{header, Client as ReqwestClient, Method, RequestBuilder};
use std::{sync::Mutex, time::Duration};

mod error;

mod checks;
mod issues;
mod pulls;
mod reactions;
mod repos;

pub use checks::ChecksClient;
pub use error::{Error, Result};
pub use issues::IssuesClient;
pub use pulls::PullsClient;
pub use reactions::ReactionsClient;
pub use repos::ReposClient;

// Constants
const DEFAULT_BASE_URL: &str = "https://api.github.com/";
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

const MEDIA_TYPE_V3: &str = "application/vnd.github.v3+json";
// Header names built from static strings must be lowercase.
const API_VERSION_HEADER: &str = "x-github-api-version";
const API_VERSION: &str = "2022-11-28";

/// Listing endpoints are drained page by page with this page size.
pub(crate) const MAX_PER_PAGE: usize = 100;

/// Requests hitting an HTTP status error are retried up to this many times in
/// total, with exponential backoff in between.
const MAX_RETRIES: u32 = 2;
const BACKOFF_BASE: Duration = Duration::from_millis(100);

#[derive(Debug, Default)]
pub struct ClientBuilder {
    base_url: Option<String>,
    user_agent: Option<String>,
    auth: Option<Auth>,
}

impl ClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Authenticate with a static personal token.
    pub fn personal_token<S: Into<String>>(mut self, token: S) -> Self {
        self.auth = Some(Auth::User {
            token: token.into(),
        });
        self
    }

    /// Authenticate as a GitHub App; requests are signed with a per-request
    /// JWT until the client is upgraded to an installation.
    pub fn app<S: Into<String>>(mut self, client_id: S, private_key: S) -> Self {
        self.auth = Some(Auth::App(AppAuth {
            client_id: client_id.into(),
            private_key: private_key.into(),
        }));
        self
    }

    pub fn build(self) -> Result<Client> {
        let base_url = self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let user_agent = self.user_agent.unwrap_or_else(|| USER_AGENT.to_owned());

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static(MEDIA_TYPE_V3));
        headers.insert(
            API_VERSION_HEADER,
            header::HeaderValue::from_static(API_VERSION),
        );

        let client = ReqwestClient::builder()
            .user_agent(&user_agent)
            .default_headers(headers)
            .build()?;

        Ok(Client {
            base_url,
            client,
            auth: Mutex::new(self.auth.unwrap_or(Auth::Anonymous)),
        })
    }
}

#[derive(Debug)]
pub struct Client {
    /// Base URL to use for API requests. Defaults to the public GitHub API,
    /// but can be overridden for use with GitHub Enterprise or a test
    /// server. Must always be terminated with a trailing slash.
    base_url: String,

    /// Client used to make http requests
    client: ReqwestClient,

    /// Authentication state. Mutated in place when an installation token is
    /// exchanged or refreshed; in-flight requests keep the token they
    /// resolved.
    auth: Mutex<Auth>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub fn repos(&self) -> ReposClient<'_> {
        ReposClient::new(self)
    }

    pub fn pulls(&self) -> PullsClient<'_> {
        PullsClient::new(self)
    }

    pub fn issues(&self) -> IssuesClient<'_> {
        IssuesClient::new(self)
    }

    pub fn checks(&self) -> ChecksClient<'_> {
        ChecksClient::new(self)
    }

    pub fn reactions(&self) -> ReactionsClient<'_> {
        ReactionsClient::new(self)
    }

    /// Make sure the client can act on the given repository.
    ///
    /// In app mode this resolves the repository installation and exchanges
    /// the app JWT for an installation access token. User and installation
    /// modes are left untouched; an anonymous client is refused.
    pub async fn ensure_installation(&self, owner: &str, name: &str) -> Result<()> {
        let (anonymous, is_app) = {
            let auth = self.auth.lock().unwrap();
            (auth.is_anonymous(), auth.is_app())
        };

        if anonymous {
            return Err(Error::NotAuthenticated);
        }

        if is_app {
            let installation = self.repos().installation(owner, name).await?;
            self.upgrade_to_installation(installation.id).await?;
        }

        Ok(())
    }

    /// Exchange the app JWT for an installation access token and switch the
    /// client to installation mode.
    pub async fn upgrade_to_installation(&self, installation_id: u64) -> Result<()> {
        let app = match &*self.auth.lock().unwrap() {
            Auth::App(app) => app.clone(),
            _ => {
                warn!("cannot upgrade non-app authentication, leaving as-is");
                return Ok(());
            }
        };

        debug!(
            "generating installation access token: installation_id = {}",
            installation_id
        );
        let token = self.exchange_installation_token(&app, installation_id).await?;

        self.auth.lock().unwrap().upgrade_to_installation(
            installation_id,
            token.token,
            token.expires_at,
        );
        Ok(())
    }

    async fn exchange_installation_token(
        &self,
        app: &AppAuth,
        installation_id: u64,
    ) -> Result<InstallationToken> {
        let jwt = app.generate_jwt()?;
        let url = format!(
            "{}app/installations/{}/access_tokens",
            self.base_url, installation_id
        );
        let request = self.client.request(Method::POST, &url).bearer_auth(jwt);
        let response = self.send(request).await?;
        self.json(response).await
    }

    /// Resolve the bearer token for the next request, refreshing an expired
    /// installation token first.
    async fn bearer_token(&self) -> Result<String> {
        let refresh = {
            let mut auth = self.auth.lock().unwrap();
            let (installation_id, token, expires_at) = match &*auth {
                Auth::Anonymous => return Err(Error::NotAuthenticated),
                Auth::User { token } => return Ok(token.clone()),
                Auth::App(app) => return Ok(app.generate_jwt()?),
                Auth::Installation {
                    installation_id,
                    token,
                    expires_at,
                    ..
                } => (*installation_id, token.clone(), *expires_at),
            };

            if !auth.needs_refresh(Utc::now()) {
                return Ok(token);
            }

            warn!(
                "installation token expired: installation_id = {}, expires_at = {}",
                installation_id, expires_at
            );
            auth.downgrade_to_app();
            installation_id
        };

        self.upgrade_to_installation(refresh).await?;

        match &*self.auth.lock().unwrap() {
            Auth::Installation { token, .. } => Ok(token.clone()),
            // The upgrade failed to stick; surface it as an auth error.
            _ => Err(Error::NotAuthenticated),
        }
    }

    pub(crate) async fn get(&self, url: &str) -> Result<RequestBuilder> {
        self.request(Method::GET, url).await
    }

    pub(crate) async fn post(&self, url: &str) -> Result<RequestBuilder> {
        self.request(Method::POST, url).await
    }

    pub(crate) async fn put(&self, url: &str) -> Result<RequestBuilder> {
        self.request(Method::PUT, url).await
    }

    pub(crate) async fn patch(&self, url: &str) -> Result<RequestBuilder> {
        self.request(Method::PATCH, url).await
    }

    pub(crate) async fn delete(&self, url: &str) -> Result<RequestBuilder> {
        self.request(Method::DELETE, url).await
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let token = self.bearer_token().await?;
        let url = format!("{}{}", self.base_url, url);
        Ok(self.client.request(method, &url).bearer_auth(token))
    }

    /// Send a request, retrying on HTTP status errors with exponential
    /// backoff. Transport errors are not retried.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            let cloned = request.try_clone();
            let response = match cloned {
                Some(request) => request.send().await?,
                // Unclonable request bodies get a single attempt.
                None => return Ok(request.send().await?),
            };

            debug!("github response: {:?}", response.status());

            if response.status().is_success() || attempt + 1 >= MAX_RETRIES {
                return Ok(response);
            }

            attempt += 1;
            tokio::time::sleep(BACKOFF_BASE * 2u32.pow(attempt - 1)).await;
        }
    }

    /// Check for an error status and deserialize the JSON payload.
    pub(crate) async fn json<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let payload = response.text().await?;

        if !status.is_success() {
            return Err(Error::Status(status, payload));
        }

        Ok(serde_json::from_str(&payload)?)
    }

    /// Check for an error status, discarding the payload.
    pub(crate) async fn empty(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status, response.text().await?));
        }

        Ok(())
    }
}
