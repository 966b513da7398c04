pub mod api_key;
pub mod assets;
pub mod auth;
pub mod stories;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::storage::PUBLIC_PREFIX;

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .merge(api_key::router())
        .merge(stories::router(&state.config.uploads));

    let router = Router::new()
        .nest("/api", api)
        .nest_service(
            &format!("/{}", PUBLIC_PREFIX),
            ServeDir::new(state.media.root()),
        );
    let router = assets::with_frontend(router, state.config.server.frontend_dir.as_deref());

    let router = match cors_layer(state.config.server.cors_origin.as_deref()) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

fn cors_layer(origin: Option<&str>) -> Option<CorsLayer> {
    let origin = origin?;
    match HeaderValue::from_str(origin) {
        Ok(value) => Some(
            CorsLayer::new()
                .allow_origin(value)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]),
        ),
        Err(e) => {
            tracing::warn!(origin, error = %e, "Ignoring invalid CORS origin");
            None
        }
    }
}
