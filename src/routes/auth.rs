use axum::{extract::State, Extension, Json};

use crate::{
    dto::auth_dto::{
        SessionStatusResponse, SessionUser, TelegramAuthRequest, TelegramAuthResponse,
    },
    error::{Error, Result},
    middleware::auth::Claims,
    services::session_service::IdentityProvider,
    utils::telegram_auth,
    AppState,
};

/// POST /api/auth/telegram
///
/// Verifies the Mini App initData signature, then exchanges the embedded
/// identity for a provider session. Rejections happen before any identity
/// provider traffic.
pub async fn authenticate<P>(
    State(state): State<AppState<P>>,
    Json(payload): Json<TelegramAuthRequest>,
) -> Result<Json<TelegramAuthResponse>>
where
    P: IdentityProvider + Clone + Send + Sync + 'static,
{
    let init_data = payload
        .init_data
        .as_deref()
        .filter(|raw| !raw.is_empty())
        .ok_or(Error::MissingInput)?;

    let fields = telegram_auth::verify_init_data(init_data, &state.bot_token)?;
    let identity = telegram_auth::extract_identity(&fields)?;

    let payload_age_secs = fields
        .get("auth_date")
        .and_then(|raw| raw.parse::<i64>().ok())
        .map(|issued| chrono::Utc::now().timestamp() - issued);
    tracing::info!(
        telegram_id = identity.id,
        payload_age_secs,
        "initData verified"
    );

    let session = state.session_service.create_session(&identity).await?;

    Ok(Json(TelegramAuthResponse {
        access_token: session.access_token,
        refresh_token: session.refresh_token,
        user: SessionUser {
            id: session.user_id,
            telegram_id: identity.id.to_string(),
            username: identity.username,
            first_name: identity.first_name,
        },
    }))
}

#[utoipa::path(
    get,
    path = "/api/auth/session",
    responses(
        (status = 200, description = "Session token is valid", body = Json<serde_json::Value>),
        (status = 401, description = "Missing or invalid bearer token"),
    ),
)]
pub async fn get_session(
    Extension(claims): Extension<Claims>,
) -> Result<Json<SessionStatusResponse>> {
    let metadata = claims.user_metadata.unwrap_or_default();
    Ok(Json(SessionStatusResponse {
        id: claims.sub,
        telegram_id: metadata.telegram_id,
        username: metadata.username,
        first_name: metadata.first_name,
    }))
}
