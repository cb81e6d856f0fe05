use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

use super::csrf::CsrfToken;
use super::{Interceptor, Next};
use crate::db::UserStore;
use crate::error::{status_response, AppError};
use crate::session::Session;

pub const LOGIN_PATH: &str = "/user/login";

/// Who is making the request, as established by [`Authenticate`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    pub is_authenticated: bool,
    pub user_id: Option<i64>,
    pub csrf_token: String,
    pub flash: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::Internal("route is not behind the authenticate step".to_string()))
    }
}

/// Builds the [`AuthContext`] once per request
///
/// A user id left in the session for a user who no longer exists is removed and the
/// request carries on anonymously. Store failures are logged and also treated as
/// anonymous; this step never aborts the request.
#[derive(Clone)]
pub struct Authenticate {
    users: Arc<dyn UserStore>,
}

impl Authenticate {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    async fn resolve(&self, session: &Session) -> Option<i64> {
        let id = session.user_id()?;

        match self.users.exists_by_id(id).await {
            Ok(true) => Some(id),
            Ok(false) => {
                tracing::info!(user_id = id, "session refers to a missing user; clearing");
                session.clear_user_id();
                None
            }
            Err(err) => {
                tracing::error!(user_id = id, error = %err, "could not confirm session user");
                None
            }
        }
    }
}

#[async_trait]
impl Interceptor for Authenticate {
    async fn intercept(&self, mut req: Request, next: Next) -> Response {
        let Some(session) = req.extensions().get::<Session>().cloned() else {
            tracing::error!("authenticate needs a session; is it outside the session interceptor?");
            return status_response(StatusCode::INTERNAL_SERVER_ERROR);
        };

        let user_id = self.resolve(&session).await;

        let csrf_token = req
            .extensions()
            .get::<CsrfToken>()
            .map(|CsrfToken(token)| token.clone())
            .unwrap_or_default();

        // Only a GET renders a page the visitor sees.
        let flash = if req.method() == Method::GET {
            session.pop_flash()
        } else {
            None
        };

        req.extensions_mut().insert(AuthContext {
            is_authenticated: user_id.is_some(),
            user_id,
            csrf_token,
            flash,
        });

        next.run(req).await
    }
}

/// Sends anonymous visitors to the login page
///
/// GET requests remember where the visitor was going so login can send them back.
/// A flash taken for this request goes back into the session, since the redirect
/// shows no page. Responses for authenticated visitors are marked `Cache-Control: no-store`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireAuthentication;

#[async_trait]
impl Interceptor for RequireAuthentication {
    async fn intercept(&self, req: Request, next: Next) -> Response {
        let ctx = req.extensions().get::<AuthContext>().cloned().unwrap_or_default();

        if !ctx.is_authenticated {
            if let Some(session) = req.extensions().get::<Session>() {
                if req.method() == Method::GET {
                    let target = req
                        .uri()
                        .path_and_query()
                        .map(|pq| pq.as_str().to_string())
                        .unwrap_or_else(|| req.uri().path().to_string());
                    session.set_redirect_after_login(target);
                }
                if let Some(flash) = ctx.flash {
                    session.put_flash(flash);
                }
            }

            tracing::debug!(uri = %req.uri(), "anonymous request to protected route");
            return Redirect::to(LOGIN_PATH).into_response();
        }

        let mut response = next.run(req).await;
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}
