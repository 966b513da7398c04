use axum::routing::{any, get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/auth/register",
            post(handlers::register).get(handlers::register_get),
        )
        .route("/auth/login", post(handlers::login).get(handlers::login_get))
        .route("/auth/logout", any(handlers::logout))
        .route("/auth/password", post(handlers::set_password))
        .route("/auth/me", get(handlers::me))
        .route("/auth/token", post(handlers::regenerate_token))
}
