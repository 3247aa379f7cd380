use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::{debug, error};
use serde::Serialize;

/// Safety margin before an installation token expiration triggers a refresh.
const EXPIRATION_MARGIN_SECONDS: i64 = 60;

#[derive(Clone, Debug)]
pub struct AppAuth {
    pub client_id: String,
    pub private_key: String,
}

#[derive(Debug, Serialize)]
struct AppClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

impl AppAuth {
    /// Issue the short-lived RS256 JWT GitHub Apps authenticate with.
    pub fn generate_jwt(&self) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now().timestamp();
        let claims = AppClaims {
            // 60 seconds in the past to allow for clock drift
            iat: now - 60,
            // 10 minutes maximum
            exp: now + 600,
            iss: self.client_id.clone(),
        };

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
    }
}

/// Authentication state of a [`Client`](crate::Client).
///
/// `Anonymous` rejects every request. `App` issues a fresh JWT per request.
/// `Installation` is derived from `App` by exchanging the JWT for an
/// installation access token, and falls back to `App` once that token nears
/// expiry.
#[derive(Clone, Debug)]
pub enum Auth {
    Anonymous,
    User {
        token: String,
    },
    App(AppAuth),
    Installation {
        app: AppAuth,
        installation_id: u64,
        token: String,
        expires_at: DateTime<Utc>,
    },
}

impl Auth {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Auth::Anonymous)
    }

    pub fn is_app(&self) -> bool {
        matches!(self, Auth::App(_))
    }

    /// Whether an installation token is expired or about to expire.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        match self {
            Auth::Installation { expires_at, .. } => {
                *expires_at <= now + Duration::seconds(EXPIRATION_MARGIN_SECONDS)
            }
            _ => false,
        }
    }

    pub fn upgrade_to_installation(
        &mut self,
        installation_id: u64,
        token: String,
        expires_at: DateTime<Utc>,
    ) {
        match self {
            Auth::App(app) => {
                debug!(
                    "auth upgraded to installation mode: client_id = {}, installation_id = {}, expires_at = {}",
                    app.client_id, installation_id, expires_at
                );
                *self = Auth::Installation {
                    app: app.clone(),
                    installation_id,
                    token,
                    expires_at,
                };
            }
            _ => error!("cannot upgrade non-app authentication to installation"),
        }
    }

    pub fn downgrade_to_app(&mut self) {
        match self {
            Auth::Installation { app, .. } => {
                debug!("auth downgraded to app mode: client_id = {}", app.client_id);
                *self = Auth::App(app.clone());
            }
            _ => error!("cannot downgrade non-installation authentication"),
        }
    }
}
