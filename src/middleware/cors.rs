use tower_http::cors::{Any, CorsLayer};

/// Mini App WebViews launch from Telegram-controlled origins, so preflight
/// answers stay permissive.
pub fn permissive_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_origin(Any)
}
