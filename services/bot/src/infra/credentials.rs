use anyhow::Context as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::repository::TokenSource;
use crate::error::BotError;

/// OAuth scope for the Firestore REST API.
const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime requested for each signed assertion.
const ASSERTION_TTL_SECS: i64 = 3600;

/// Refresh cached tokens this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

/// Bearer credentials for the code pool store.
pub enum Credentials {
    ServiceAccount(ServiceAccountTokens),
    /// Fixed token, e.g. `"owner"` for the Firestore emulator.
    Static(String),
}

impl Credentials {
    pub fn service_account(client: Client, key_json: &str) -> Result<Self, BotError> {
        Ok(Self::ServiceAccount(ServiceAccountTokens::from_json(
            client, key_json,
        )?))
    }
}

impl TokenSource for Credentials {
    async fn bearer(&self) -> Result<String, BotError> {
        match self {
            Self::ServiceAccount(tokens) => tokens.bearer().await,
            Self::Static(token) => Ok(token.clone()),
        }
    }
}

/// Fields of a Google service-account key file this client needs.
#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_owned()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Exchanges signed JWT assertions for short-lived access tokens and caches them.
pub struct ServiceAccountTokens {
    client: Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountTokens {
    pub fn from_json(client: Client, key_json: &str) -> Result<Self, BotError> {
        let key: ServiceAccountKey = serde_json::from_str(key_json)
            .map_err(|e| BotError::Credentials(format!("invalid service account JSON: {e}")))?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| BotError::Credentials(format!("invalid service account key: {e}")))?;
        Ok(Self {
            client,
            key,
            signing_key,
            cached: Mutex::new(None),
        })
    }

    pub async fn bearer(&self) -> Result<String, BotError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = cached
            .as_ref()
            .filter(|t| t.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now)
        {
            return Ok(token.token.clone());
        }

        let fresh = self.exchange(now).await?;
        debug!(expires_at = %fresh.expires_at, "service account token refreshed");
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn exchange(&self, now: DateTime<Utc>) -> Result<CachedToken, BotError> {
        let iat = now.timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: DATASTORE_SCOPE,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_TTL_SECS,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
            .context("sign service account assertion")?;

        let resp = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", &assertion)])
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(BotError::Credentials(format!(
                "token exchange failed ({status}): {body}"
            )));
        }
        let body: TokenResponse = resp.json().await.context("parse token response")?;
        Ok(CachedToken {
            token: body.access_token,
            expires_at: now + Duration::seconds(body.expires_in),
        })
    }
}
