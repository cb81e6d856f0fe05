//! # Routing
//!
//! Three chains decide what runs around each handler:
//!
//! | Chain      | Interceptors                                       | Routes                         |
//! |------------|----------------------------------------------------|--------------------------------|
//! | standard   | recover panic, log request, security headers       | everything, including 404/405  |
//! | dynamic    | session load/save, CSRF guard, authenticate        | pages that use the session     |
//! | protected  | dynamic + require authentication                   | create snippet, logout         |
//!
//! `/ping` and `/static/*` only get the standard chain, so they never touch the
//! session store. A chain is one composed `tower::Layer`; the same value is attached
//! to every route of its class.

use std::path::Path;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;

use crate::db::UserStore;
use crate::handlers::{auth, health, not_found, snippets};
use crate::middleware::{
    Authenticate, Chain, CsrfGuard, LoadAndSave, LogRequest, RecoverPanic, RequireAuthentication,
    SecureHeaders, SessionConfig,
};
use crate::session::SessionBackend;
use crate::state::AppState;

/// Applied to every request, matched or not
pub fn standard_chain() -> Chain {
    Chain::new()
        .with(RecoverPanic)
        .with(LogRequest)
        .with(SecureHeaders)
}

/// Session, CSRF and auth context for pages that need them
pub fn dynamic_chain(
    sessions: Arc<dyn SessionBackend>,
    session_config: SessionConfig,
    users: Arc<dyn UserStore>,
) -> Chain {
    Chain::new()
        .with(LoadAndSave::new(sessions, session_config))
        .with(CsrfGuard)
        .with(Authenticate::new(users))
}

/// `dynamic` plus the login requirement
pub fn protected_chain(dynamic: &Chain) -> Chain {
    dynamic.append(&Chain::new().with(RequireAuthentication))
}

/// The complete application router
pub fn router(
    state: AppState,
    sessions: Arc<dyn SessionBackend>,
    session_config: SessionConfig,
    static_dir: impl AsRef<Path>,
) -> Router {
    let dynamic = dynamic_chain(sessions, session_config, state.users.clone());
    let protected = protected_chain(&dynamic);

    // Chains go on each MethodRouter rather than on the Router, so a request with the
    // wrong method gets the plain 405 (with `Allow`) instead of running the chain.
    Router::new()
        .route("/ping", get(health::ping))
        .nest_service("/static", ServeDir::new(static_dir))
        .route("/", get(snippets::home).route_layer(dynamic.clone()))
        .route(
            "/snippet/view/:id",
            get(snippets::snippet_view).route_layer(dynamic.clone()),
        )
        .route(
            "/user/signup",
            get(auth::user_signup)
                .post(auth::user_signup_post)
                .route_layer(dynamic.clone()),
        )
        .route(
            "/user/login",
            get(auth::user_login)
                .post(auth::user_login_post)
                .route_layer(dynamic),
        )
        .route(
            "/snippet/create",
            get(snippets::snippet_create)
                .post(snippets::snippet_create_post)
                .route_layer(protected.clone()),
        )
        .route(
            "/user/logout",
            post(auth::user_logout_post).route_layer(protected),
        )
        .fallback(not_found)
        .layer(standard_chain())
        .with_state(state)
}
