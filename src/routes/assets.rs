use std::path::Path;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tower_http::services::{ServeDir, ServeFile};

use crate::state::AppState;

/// Serve the pre-built front-end bundle, falling back to `index.html` so
/// client-side routes resolve. Without a bundle every unknown path is a 404.
pub fn with_frontend(router: Router<AppState>, dir: Option<&Path>) -> Router<AppState> {
    match dir {
        Some(dir) => {
            tracing::info!("Serving front-end from {}", dir.display());
            let index = ServeFile::new(dir.join("index.html"));
            router.fallback_service(ServeDir::new(dir).fallback(index))
        }
        None => router.fallback(frontend_unavailable),
    }
}

async fn frontend_unavailable() -> Response {
    (StatusCode::NOT_FOUND, "Front-end not available.").into_response()
}
