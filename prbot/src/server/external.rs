//! External-caller endpoint: QA tooling authenticated by per-account RSA
//! keypairs can flip the QA status of pull requests.

use crate::{
    command::{Command, CommandContext},
    context::Context,
    database::store::{ExternalAccountRightStore, ExternalAccountStore},
    models::QaStatus,
    sync::SyncOrchestrator,
    Result,
};
use chrono::Utc;
use hyper::{body, header::AUTHORIZATION, Body, Request, Response, StatusCode};
use jsonwebtoken::{
    decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct QaStatusRequest {
    repository_path: String,
    pull_request_numbers: Vec<u64>,
    author: String,
    status: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    iss: Option<String>,
    iat: Option<i64>,
}

/// Issue a token for an external account, signed with its private key. The
/// `iss` claim carries the account name so the server can find the matching
/// public key.
pub fn create_access_token(username: &str, private_key: &str) -> Result<String> {
    let claims = TokenClaims {
        iss: Some(username.to_owned()),
        iat: Some(Utc::now().timestamp()),
    };

    let key = EncodingKey::from_rsa_pem(private_key.as_bytes())?;
    Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
}

/// Tokens carry no expiry; only the RS256 signature is checked.
fn token_validation() -> Validation {
    let mut validation = Validation::new(Algorithm::RS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    validation
}

async fn authenticate(ctx: &Context, token: &str) -> Result<Option<String>> {
    // First extract the account name from the unverified claims; the
    // signature is checked below against that account's public key.
    let mut unverified = token_validation();
    unverified.insecure_disable_signature_validation();

    let username = match decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &unverified)
    {
        Ok(data) => match data.claims.iss {
            Some(username) => username,
            None => {
                warn!("external token is missing the `iss` claim");
                return Ok(None);
            }
        },
        Err(err) => {
            warn!("could not decode external token: {}", err);
            return Ok(None);
        }
    };

    let account = match ctx.external_account_store.get(&username).await? {
        Some(account) => account,
        None => {
            warn!("unknown external account `{}`", username);
            return Ok(None);
        }
    };

    let key = match DecodingKey::from_rsa_pem(account.public_key.as_bytes()) {
        Ok(key) => key,
        Err(err) => {
            warn!("invalid public key for external account `{}`: {}", username, err);
            return Ok(None);
        }
    };

    match decode::<TokenClaims>(token, &key, &token_validation()) {
        Ok(_) => Ok(Some(username)),
        Err(err) => {
            warn!("invalid external token for `{}`: {}", username, err);
            Ok(None)
        }
    }
}

pub(super) async fn set_qa_status(
    ctx: &Context,
    request: Request<Body>,
) -> Result<Response<Body>> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_owned);

    let token = match token {
        Some(token) => token,
        None => return unauthorized(),
    };

    let username = match authenticate(ctx, &token).await? {
        Some(username) => username,
        None => return unauthorized(),
    };

    let payload = body::to_bytes(request.into_body()).await?;
    let qa_request: QaStatusRequest = match serde_json::from_slice(&payload) {
        Ok(request) => request,
        Err(err) => {
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Body::from(format!("Invalid payload: {}", err)))?)
        }
    };

    let (owner, name) = match qa_request.repository_path.split_once('/') {
        Some((owner, name)) => (owner.to_owned(), name.to_owned()),
        None => {
            return Ok(Response::builder()
                .status(StatusCode::BAD_REQUEST)
                .body(Body::from("Invalid repository path"))?)
        }
    };

    // The account also needs an explicit right on the target repository.
    if ctx
        .external_account_right_store
        .get(&owner, &name, &username)
        .await?
        .is_none()
    {
        warn!(
            "external account `{}` has no right on {}/{}",
            username, owner, name
        );
        return unauthorized();
    }

    let qa_status = match qa_request.status {
        Some(true) => QaStatus::Pass,
        Some(false) => QaStatus::Fail,
        None => QaStatus::Waiting,
    };

    info!(
        "external QA status change: account = {}, author = {}, repository = {}/{}, status = {}",
        username, qa_request.author, owner, name, qa_status
    );

    for number in qa_request.pull_request_numbers {
        let command_ctx = CommandContext {
            ctx,
            owner: &owner,
            name: &name,
            number,
            author: &qa_request.author,
            comment_id: None,
            command: None,
        };

        Command::SetQa(qa_status).execute(&command_ctx).await?;

        SyncOrchestrator::new(ctx)
            .process(&owner, &name, number, false)
            .await?;
    }

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(Body::empty())?)
}

fn unauthorized() -> Result<Response<Body>> {
    Ok(Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header("WWW-Authenticate", "Bearer")
        .body(Body::from("Could not validate credentials"))?)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::database::store::{PullRequestStore, RepositoryStore};
    use crate::models::{
        ExternalAccount, ExternalAccountRight, PullRequest, Repository, RepositoryPath,
    };
    use crate::test_support::{test_context, test_rsa_keypair, upstream_pull_request};
    use hyper::Method;

    async fn seeded(ctx: &Context, fixtures: &crate::test_support::TestContext) -> ExternalAccount {
        let repository = Repository::new("owner", "name");
        ctx.repository_store
            .create(repository.clone())
            .await
            .unwrap();
        ctx.pull_request_store
            .create(PullRequest::new(RepositoryPath::new("owner", "name"), 1))
            .await
            .unwrap();
        fixtures
            .api
            .set_pull_request(upstream_pull_request("foo", "feature", "main"));

        let (private_key, public_key) = test_rsa_keypair();
        let account = ExternalAccount {
            username: "qa-bot".to_owned(),
            public_key,
            private_key,
        };
        ctx.external_account_store
            .create(account.clone())
            .await
            .unwrap();
        ctx.external_account_right_store
            .create(ExternalAccountRight {
                repository_path: RepositoryPath::new("owner", "name"),
                username: "qa-bot".to_owned(),
            })
            .await
            .unwrap();

        account
    }

    fn qa_request(token: &str, status: Option<bool>) -> Request<Body> {
        let payload = serde_json::json!({
            "repository_path": "owner/name",
            "pull_request_numbers": [1],
            "author": "external-qa",
            "status": status
        });

        Request::builder()
            .method(Method::POST)
            .uri("/external/set-qa-status")
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn valid_token_sets_qa_and_syncs() {
        let (ctx, fixtures) = test_context();
        let account = seeded(&ctx, &fixtures).await;

        let token = create_access_token(&account.username, &account.private_key).unwrap();
        let response = set_qa_status(&ctx, qa_request(&token, Some(true)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let pr = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pr.qa_status, QaStatus::Pass);
        assert!(!fixtures.api.commit_statuses().is_empty());
    }

    #[tokio::test]
    async fn unknown_account_is_rejected() {
        let (ctx, fixtures) = test_context();
        let account = seeded(&ctx, &fixtures).await;
        ctx.external_account_store.delete("qa-bot").await.unwrap();

        let token = create_access_token(&account.username, &account.private_key).unwrap();
        let response = set_qa_status(&ctx, qa_request(&token, Some(true)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn token_signed_with_wrong_key_is_rejected() {
        let (ctx, fixtures) = test_context();
        let account = seeded(&ctx, &fixtures).await;

        // A different keypair signs a token claiming to be qa-bot.
        let (other_private, _other_public) = test_rsa_keypair();
        assert_ne!(other_private, account.private_key);

        let token = create_access_token(&account.username, &other_private).unwrap();
        let response = set_qa_status(&ctx, qa_request(&token, Some(true)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_repository_right_is_rejected() {
        let (ctx, fixtures) = test_context();
        let account = seeded(&ctx, &fixtures).await;
        ctx.external_account_right_store
            .delete("owner", "name", "qa-bot")
            .await
            .unwrap();

        let token = create_access_token(&account.username, &account.private_key).unwrap();
        let response = set_qa_status(&ctx, qa_request(&token, Some(true)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn null_status_means_waiting() {
        let (ctx, fixtures) = test_context();
        let account = seeded(&ctx, &fixtures).await;
        ctx.pull_request_store
            .set_qa_status("owner", "name", 1, QaStatus::Pass)
            .await
            .unwrap();

        let token = create_access_token(&account.username, &account.private_key).unwrap();
        set_qa_status(&ctx, qa_request(&token, None)).await.unwrap();

        let pr = ctx
            .pull_request_store
            .get("owner", "name", 1)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pr.qa_status, QaStatus::Waiting);
    }
}
