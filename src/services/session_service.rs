use std::time::Duration;

use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::telegram::TelegramIdentity;

/// Token pair plus the provider-side account id for one issued session.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user_id: Uuid,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Credentials rejected, which for the synthetic pair means the backing
    /// account does not exist yet.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Create refused because the login identifier is already registered.
    #[error("account already exists")]
    AlreadyExists,

    #[error("request timed out")]
    Timeout,

    #[error("{0}")]
    Other(String),
}

/// The subset of an identity provider this service needs: authenticate by
/// credential pair, and create an account carrying the Telegram identity as
/// metadata.
#[trait_variant::make(IdentityProvider: Send)]
pub trait LocalIdentityProvider {
    async fn sign_in(
        &self,
        login: &str,
        secret: &str,
    ) -> std::result::Result<ProviderSession, ProviderError>;

    async fn create_account(
        &self,
        login: &str,
        secret: &str,
        identity: &TelegramIdentity,
    ) -> std::result::Result<(), ProviderError>;
}

/// Synthetic login identifier for a Telegram id. The id is embedded, so
/// distinct ids never collide.
pub fn derive_login(telegram_id: i64) -> String {
    format!("telegram_{}@placeholder.com", telegram_id)
}

/// Synthetic account secret: stable per id, unguessable without the
/// server-side signing secret.
pub fn derive_secret(telegram_id: i64, signing_secret: &str) -> String {
    format!("telegram_{}_{}", telegram_id, signing_secret)
}

/// Exchanges a verified Telegram identity for provider session tokens,
/// creating the backing account on first contact.
#[derive(Clone)]
pub struct SessionService<P> {
    provider: P,
    signing_secret: String,
}

impl<P: IdentityProvider> SessionService<P> {
    pub fn new(provider: P, signing_secret: String) -> Self {
        Self {
            provider,
            signing_secret,
        }
    }

    pub async fn create_session(&self, identity: &TelegramIdentity) -> Result<ProviderSession> {
        let login = derive_login(identity.id);
        let secret = derive_secret(identity.id, &self.signing_secret);

        match self.provider.sign_in(&login, &secret).await {
            Ok(session) => return Ok(session),
            Err(ProviderError::InvalidCredentials) => {}
            Err(err) => return Err(map_provider_error(err)),
        }

        match self.provider.create_account(&login, &secret, identity).await {
            Ok(()) => {}
            // Lost a first-contact race: another call created the account
            // between our sign-in and this create. Retry sign-in as usual.
            Err(ProviderError::AlreadyExists) => {
                warn!(
                    telegram_id = identity.id,
                    "backing account appeared concurrently"
                );
            }
            Err(err) => return Err(map_provider_error(err)),
        }

        self.provider
            .sign_in(&login, &secret)
            .await
            .map_err(map_provider_error)
    }
}

fn map_provider_error(err: ProviderError) -> Error {
    match err {
        ProviderError::Timeout => Error::UpstreamTimeout,
        other => Error::SessionCreationFailed(other.to_string()),
    }
}

/// HTTP client for a GoTrue-style identity provider (password grant plus an
/// admin create endpoint behind a service-role key).
#[derive(Clone)]
pub struct GoTrueProvider {
    client: Client,
    base_url: String,
    service_key: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    user: TokenUser,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: Uuid,
}

impl GoTrueProvider {
    pub fn new(base_url: String, service_key: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client for identity provider");
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
        }
    }
}

impl IdentityProvider for GoTrueProvider {
    async fn sign_in(
        &self,
        login: &str,
        secret: &str,
    ) -> std::result::Result<ProviderSession, ProviderError> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.base_url);
        let res = self
            .client
            .post(&url)
            .header("apikey", &self.service_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
            .json(&json!({ "email": login, "password": secret }))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = res.status();
        if status.is_success() {
            let body: TokenResponse = res
                .json()
                .await
                .map_err(|e| ProviderError::Other(format!("malformed token response: {}", e)))?;
            return Ok(ProviderSession {
                access_token: body.access_token,
                refresh_token: body.refresh_token,
                user_id: body.user.id,
            });
        }

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(ProviderError::InvalidCredentials);
        }

        let body = res.text().await.unwrap_or_default();
        Err(ProviderError::Other(format!(
            "sign-in failed with {}: {}",
            status, body
        )))
    }

    async fn create_account(
        &self,
        login: &str,
        secret: &str,
        identity: &TelegramIdentity,
    ) -> std::result::Result<(), ProviderError> {
        let url = format!("{}/auth/v1/admin/users", self.base_url);
        let telegram_id = identity.id.to_string();
        let res = self
            .client
            .post(&url)
            .header("apikey", &self.service_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key))
            .json(&json!({
                "email": login,
                "password": secret,
                "email_confirm": true,
                "user_metadata": {
                    "telegram_id": telegram_id,
                    "username": identity.username,
                    "first_name": identity.first_name,
                },
                "app_metadata": {
                    "telegram_id": telegram_id,
                },
            }))
            .send()
            .await
            .map_err(classify_transport)?;

        let status = res.status();
        if status.is_success() {
            return Ok(());
        }

        let body = res.text().await.unwrap_or_default();
        if status == StatusCode::UNPROCESSABLE_ENTITY
            && (body.contains("email_exists") || body.contains("already been registered"))
        {
            return Err(ProviderError::AlreadyExists);
        }

        Err(ProviderError::Other(format!(
            "create account failed with {}: {}",
            status, body
        )))
    }
}

fn classify_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Other(err.to_string())
    }
}
