pub mod config;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::time::Duration;

use crate::services::session_service::{GoTrueProvider, IdentityProvider, SessionService};

#[derive(Clone)]
pub struct AppState<P = GoTrueProvider> {
    pub bot_token: String,
    pub session_service: SessionService<P>,
}

impl AppState<GoTrueProvider> {
    pub fn new() -> Self {
        let config = crate::config::get_config();
        let provider = GoTrueProvider::new(
            config.auth_api_url.clone(),
            config.auth_service_key.clone(),
            Duration::from_secs(config.auth_timeout_secs),
        );
        Self::with_provider(
            provider,
            config.telegram_bot_token.clone(),
            config.jwt_secret.clone(),
        )
    }
}

impl<P: IdentityProvider> AppState<P> {
    /// Secrets are injected here once; nothing below this layer reads the
    /// process-wide configuration.
    pub fn with_provider(provider: P, bot_token: String, signing_secret: String) -> Self {
        Self {
            bot_token,
            session_service: SessionService::new(provider, signing_secret),
        }
    }
}
