//! # CSRF Protection
//!
//! Each session holds a random 32-byte secret. Pages never embed the secret itself
//! but a *masked* token: a fresh random pad followed by `pad XOR secret`, base64url
//! encoded. Every rendered form therefore carries a different string, and all of them
//! unmask to the same secret.
//!
//! State-changing requests must present a token, either in the `X-CSRF-Token` header
//! or in the `csrf_token` field of a urlencoded form body. A missing or mismatched
//! token ends the request with 400 before any handler runs.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderName, Method, StatusCode};
use axum::response::Response;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::RngCore;

use super::{Interceptor, Next};
use crate::error::{status_response, AppError};
use crate::session::Session;

const SECRET_LEN: usize = 32;

/// Name of the hidden form field carrying the token
pub const FORM_FIELD: &str = "csrf_token";

pub static HEADER_NAME: HeaderName = HeaderName::from_static("x-csrf-token");

/// Largest form body the guard will buffer to look for the token
pub const MAX_FORM_BYTES: usize = 2 * 1024 * 1024;

/// Masked token for the current request, ready to embed in a form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for CsrfToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CsrfToken>()
            .cloned()
            .ok_or_else(|| AppError::Internal("csrf token not issued for this route".to_string()))
    }
}

fn random_bytes() -> [u8; SECRET_LEN] {
    let mut bytes = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

fn decode_secret(secret: &str) -> Option<[u8; SECRET_LEN]> {
    STANDARD.decode(secret).ok()?.try_into().ok()
}

/// Mask `secret` with a fresh one-time pad
pub fn mask(secret: &[u8; SECRET_LEN]) -> String {
    let pad = random_bytes();
    let mut token = Vec::with_capacity(SECRET_LEN * 2);
    token.extend_from_slice(&pad);
    token.extend(pad.iter().zip(secret).map(|(p, s)| p ^ s));
    URL_SAFE_NO_PAD.encode(token)
}

/// Recover the secret from a masked token
pub fn unmask(token: &str) -> Option<[u8; SECRET_LEN]> {
    let bytes = URL_SAFE_NO_PAD.decode(token.trim()).ok()?;
    if bytes.len() != SECRET_LEN * 2 {
        return None;
    }

    let (pad, masked) = bytes.split_at(SECRET_LEN);
    let mut secret = [0u8; SECRET_LEN];
    for (i, byte) in secret.iter_mut().enumerate() {
        *byte = pad[i] ^ masked[i];
    }
    Some(secret)
}

/// Compare without leaking the position of the first difference through timing
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Whether `token` unmasks to `secret`
pub fn verify(token: &str, secret: &str) -> bool {
    match (unmask(token), decode_secret(secret)) {
        (Some(submitted), Some(expected)) => constant_time_eq(&submitted, &expected),
        _ => false,
    }
}

fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

fn is_urlencoded_form(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Pull the submitted token out of the request, buffering a form body if needed
///
/// The request handed back carries the same body bytes for the handler.
async fn submitted_token(req: Request) -> Result<(Request, Option<String>), Response> {
    let from_header = req
        .headers()
        .get(&HEADER_NAME)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    if from_header.is_some() {
        return Ok((req, from_header));
    }

    if !is_urlencoded_form(&req) {
        return Ok((req, None));
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_FORM_BYTES).await.map_err(|err| {
        tracing::debug!(error = %err, "could not buffer form body");
        status_response(StatusCode::BAD_REQUEST)
    })?;

    let token = url::form_urlencoded::parse(&bytes)
        .find(|(key, _)| key == FORM_FIELD)
        .map(|(_, value)| value.into_owned());

    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}

/// Rejects state-changing requests whose token doesn't match the session secret
///
/// Must run inside the session interceptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsrfGuard;

#[async_trait]
impl Interceptor for CsrfGuard {
    async fn intercept(&self, req: Request, next: Next) -> Response {
        let Some(session) = req.extensions().get::<Session>().cloned() else {
            tracing::error!("csrf guard needs a session; is it outside the session interceptor?");
            return status_response(StatusCode::INTERNAL_SERVER_ERROR);
        };

        let mut req = if is_safe(req.method()) {
            req
        } else {
            let (req, token) = match submitted_token(req).await {
                Ok(found) => found,
                Err(response) => return response,
            };

            let valid = match (token, session.csrf_secret()) {
                (Some(token), Some(secret)) => verify(&token, &secret),
                _ => false,
            };

            if !valid {
                tracing::warn!(
                    method = %req.method(),
                    uri = %req.uri(),
                    "csrf token missing or invalid"
                );
                return status_response(StatusCode::BAD_REQUEST);
            }

            req
        };

        let secret = match session.csrf_secret().as_deref().and_then(decode_secret) {
            Some(secret) => secret,
            None => {
                let secret = random_bytes();
                session.set_csrf_secret(STANDARD.encode(secret));
                secret
            }
        };

        req.extensions_mut().insert(CsrfToken(mask(&secret)));
        next.run(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Chain, LoadAndSave, SessionConfig};
    use parking_lot::Mutex;
    use std::convert::Infallible;
    use std::sync::Arc;
    use tower::util::BoxCloneService;
    use tower::{service_fn, ServiceExt};
    use tower_sessions::MemoryStore;

    fn generate_secret() -> String {
        STANDARD.encode(random_bytes())
    }

    #[test]
    fn masked_tokens_differ_but_verify_against_the_same_secret() {
        let secret = generate_secret();
        let raw = decode_secret(&secret).unwrap();

        let a = mask(&raw);
        let b = mask(&raw);

        assert_ne!(a, b);
        assert!(verify(&a, &secret));
        assert!(verify(&b, &secret));
    }

    #[test]
    fn tokens_for_another_secret_are_rejected() {
        let secret = generate_secret();
        let other = decode_secret(&generate_secret()).unwrap();

        assert!(!verify(&mask(&other), &secret));
        assert!(!verify("", &secret));
        assert!(!verify("definitely not base64!", &secret));
        assert!(!verify(&URL_SAFE_NO_PAD.encode([0u8; 10]), &secret));
    }

    #[test]
    fn constant_time_eq_compares_content_and_length() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    struct Inject(Session);

    #[async_trait]
    impl Interceptor for Inject {
        async fn intercept(&self, mut req: Request, next: Next) -> Response {
            req.extensions_mut().insert(self.0.clone());
            next.run(req).await
        }
    }

    /// Session + CSRF chain around a handler that counts calls and echoes the body
    fn guarded(
        calls: Arc<Mutex<usize>>,
        session: Session,
    ) -> BoxCloneService<Request, Response, Infallible> {
        BoxCloneService::new(Chain::new().with(Inject(session)).with(CsrfGuard).then(
            service_fn(move |req: Request| {
                let calls = calls.clone();
                async move {
                    *calls.lock() += 1;
                    let body = to_bytes(req.into_body(), usize::MAX).await.unwrap();
                    Ok::<_, Infallible>(Response::new(Body::from(body)))
                }
            }),
        ))
    }

    fn post_form(body: &str) -> Request {
        Request::builder()
            .method(Method::POST)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn get_issues_a_token_and_stores_a_secret() {
        let seen = Arc::new(Mutex::new(None));
        let seen_in_handler = seen.clone();

        let service = Chain::new()
            .with(LoadAndSave::new(Arc::new(MemoryStore::default()), SessionConfig::default()))
            .with(CsrfGuard)
            .then(service_fn(move |req: Request| {
                let seen = seen_in_handler.clone();
                async move {
                    *seen.lock() = req.extensions().get::<CsrfToken>().cloned();
                    Ok::<_, Infallible>(Response::new(Body::empty()))
                }
            }));

        let response = service.oneshot(Request::new(Body::empty())).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(seen.lock().is_some());
        // The new secret makes the session worth persisting.
        assert!(response.headers().get(header::SET_COOKIE).is_some());
    }

    #[tokio::test]
    async fn post_without_token_is_rejected_before_the_handler() {
        let calls = Arc::new(Mutex::new(0));
        let session = Session::fresh();
        session.set_csrf_secret(generate_secret());

        let response = guarded(calls.clone(), session)
            .oneshot(post_form("title=T&content=C"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test]
    async fn form_body_over_the_limit_is_rejected() {
        let calls = Arc::new(Mutex::new(0));
        let session = Session::fresh();
        let secret = generate_secret();
        let token = mask(&decode_secret(&secret).unwrap());
        session.set_csrf_secret(secret);

        let body = format!(
            "csrf_token={}&content={}",
            token,
            "a".repeat(MAX_FORM_BYTES)
        );
        let response = guarded(calls.clone(), session)
            .oneshot(post_form(&body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test]
    async fn post_without_a_session_secret_is_rejected() {
        let calls = Arc::new(Mutex::new(0));
        let foreign = mask(&decode_secret(&generate_secret()).unwrap());

        let response = guarded(calls.clone(), Session::fresh())
            .oneshot(post_form(&format!("csrf_token={}", foreign)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*calls.lock(), 0);
    }

    #[tokio::test]
    async fn post_with_matching_form_token_reaches_handler_with_body_intact() {
        let calls = Arc::new(Mutex::new(0));
        let session = Session::fresh();
        let secret = generate_secret();
        session.set_csrf_secret(secret.clone());
        let token = mask(&decode_secret(&secret).unwrap());
        let body = format!("title=T&csrf_token={}&content=C", token);

        let response = guarded(calls.clone(), session)
            .oneshot(post_form(&body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*calls.lock(), 1);
        let echoed = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(echoed, body.as_bytes());
    }

    #[tokio::test]
    async fn header_token_is_accepted() {
        let calls = Arc::new(Mutex::new(0));
        let session = Session::fresh();
        let secret = generate_secret();
        session.set_csrf_secret(secret.clone());

        let request = Request::builder()
            .method(Method::DELETE)
            .header(HEADER_NAME.clone(), mask(&decode_secret(&secret).unwrap()))
            .body(Body::empty())
            .unwrap();

        let response = guarded(calls.clone(), session).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(*calls.lock(), 1);
    }
}
