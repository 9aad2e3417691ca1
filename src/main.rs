use axum::{
    routing::{get, post},
    Router,
};
use plate_registry_backend::services::session_service::GoTrueProvider;
use plate_registry_backend::{
    config::{get_config, init_config},
    middleware, routes, AppState,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    init_config()?;
    let config = get_config();

    let app_state = AppState::new();

    let base_routes = Router::new().route("/health", get(routes::health::health));

    let auth_api = Router::new()
        .route(
            "/api/auth/telegram",
            post(routes::auth::authenticate::<GoTrueProvider>),
        )
        .route(
            "/api/auth/session",
            get(routes::auth::get_session)
                .layer(axum::middleware::from_fn(middleware::auth::require_bearer_auth)),
        )
        .layer(axum::middleware::from_fn_with_state(
            middleware::rate_limit::new_rps_state(config.auth_rps),
            middleware::rate_limit::rps_middleware,
        ));

    let app = base_routes
        .merge(auth_api)
        .with_state(app_state)
        .layer(middleware::cors::permissive_cors())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.server_address.parse()?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
