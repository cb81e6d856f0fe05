//! Session load/persist interceptor.
//!
//! Exactly one load before the inner chain and one persist after it, whatever the
//! inner chain produced: a success, an error status, or a panic. A panic is caught
//! only long enough to persist, then resumed so the recovery interceptor further out
//! still turns it into a 500.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use cookie::{Cookie, SameSite};
use futures::FutureExt;
use time::{Duration, OffsetDateTime};
use tower_sessions::session::Id;

use super::{Interceptor, Next};
use crate::error::status_response;
use crate::session::{Session, SessionBackend, SessionError};

/// Session cookie settings
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub cookie_name: String,
    /// Inactivity lifetime; every persisted request pushes expiry this far out
    pub lifetime: Duration,
    pub secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "session".to_string(),
            lifetime: Duration::hours(12),
            secure: true,
        }
    }
}

/// Loads the visitor's session before the inner chain and persists it afterwards
#[derive(Clone)]
pub struct LoadAndSave {
    backend: Arc<dyn SessionBackend>,
    config: SessionConfig,
}

impl LoadAndSave {
    pub fn new(backend: Arc<dyn SessionBackend>, config: SessionConfig) -> Self {
        Self { backend, config }
    }

    fn token_from(&self, headers: &HeaderMap) -> Option<Id> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(Cookie::split_parse)
            .filter_map(Result::ok)
            .find(|cookie| cookie.name() == self.config.cookie_name)
            .and_then(|cookie| cookie.value().parse::<Id>().ok())
    }

    async fn load(&self, token: Option<Id>) -> Result<Session, SessionError> {
        let Some(token) = token else {
            return Ok(Session::fresh());
        };

        match self.backend.load(&token).await? {
            Some(data) => Ok(Session::loaded(token, data)),
            None => {
                tracing::debug!("session token unknown or expired, starting a new session");
                Ok(Session::fresh())
            }
        }
    }

    /// Write the session back, returning the `Set-Cookie` value to send, if any
    async fn persist(&self, session: &Session) -> Result<Option<String>, SessionError> {
        let snapshot = session.snapshot();

        if snapshot.destroyed {
            if let Some(token) = snapshot.token {
                self.backend.delete(&token).await?;
            }
            return Ok(Some(self.removal_cookie()));
        }

        if snapshot.token.is_none() && snapshot.data.is_empty() {
            // Nothing was ever stored; don't hand out a token.
            return Ok(None);
        }

        let token = match snapshot.token {
            Some(current) if !snapshot.rotate => current,
            previous => {
                if let Some(old) = previous {
                    self.backend.delete(&old).await?;
                }
                Id::default()
            }
        };

        let expiry = OffsetDateTime::now_utc() + self.config.lifetime;
        self.backend.commit(&token, &snapshot.data, expiry).await?;

        Ok(Some(self.session_cookie(&token)))
    }

    fn session_cookie(&self, token: &Id) -> String {
        Cookie::build((self.config.cookie_name.clone(), token.to_string()))
            .path("/")
            .http_only(true)
            .secure(self.config.secure)
            .same_site(SameSite::Lax)
            .max_age(self.config.lifetime)
            .build()
            .to_string()
    }

    fn removal_cookie(&self) -> String {
        Cookie::build((self.config.cookie_name.clone(), ""))
            .path("/")
            .http_only(true)
            .secure(self.config.secure)
            .same_site(SameSite::Lax)
            .max_age(Duration::ZERO)
            .build()
            .to_string()
    }
}

#[async_trait]
impl Interceptor for LoadAndSave {
    async fn intercept(&self, mut req: Request, next: Next) -> Response {
        let token = self.token_from(req.headers());

        let session = match self.load(token).await {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(error = %err, "failed to load session");
                return status_response(StatusCode::INTERNAL_SERVER_ERROR);
            }
        };

        req.extensions_mut().insert(session.clone());

        let outcome = AssertUnwindSafe(next.run(req)).catch_unwind().await;

        let cookie = match self.persist(&session).await {
            Ok(cookie) => cookie,
            Err(err) => {
                tracing::error!(error = %err, "failed to persist session");
                match outcome {
                    Ok(_) => return status_response(StatusCode::INTERNAL_SERVER_ERROR),
                    Err(payload) => std::panic::resume_unwind(payload),
                }
            }
        };

        let mut response = match outcome {
            Ok(response) => response,
            Err(payload) => std::panic::resume_unwind(payload),
        };

        if let Some(cookie) = cookie {
            match HeaderValue::from_str(&cookie) {
                Ok(value) => {
                    response.headers_mut().append(header::SET_COOKIE, value);
                    // The response varies per visitor; keep shared caches out of it.
                    response
                        .headers_mut()
                        .append(header::VARY, HeaderValue::from_static("Cookie"));
                }
                Err(err) => {
                    tracing::error!(error = %err, "session cookie is not a valid header value");
                    return status_response(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::Chain;
    use axum::body::Body;
    use parking_lot::Mutex;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};
    use tower_sessions::MemoryStore;

    /// Backend wrapper that counts calls
    #[derive(Default)]
    struct Counting {
        inner: MemoryStore,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl SessionBackend for Counting {
        async fn load(&self, token: &Id) -> Result<Option<crate::session::SessionData>, SessionError> {
            self.calls.lock().push("load");
            SessionBackend::load(&self.inner, token).await
        }

        async fn commit(
            &self,
            token: &Id,
            data: &crate::session::SessionData,
            expiry: OffsetDateTime,
        ) -> Result<(), SessionError> {
            self.calls.lock().push("commit");
            SessionBackend::commit(&self.inner, token, data, expiry).await
        }

        async fn delete(&self, token: &Id) -> Result<(), SessionError> {
            self.calls.lock().push("delete");
            SessionBackend::delete(&self.inner, token).await
        }
    }

    fn layer(backend: Arc<Counting>) -> Chain {
        Chain::new().with(LoadAndSave::new(backend, SessionConfig::default()))
    }

    fn cookie_token(response: &Response) -> Id {
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        let cookie = Cookie::parse(set_cookie.to_string()).unwrap();
        cookie.value().parse().unwrap()
    }

    fn with_cookie(token: &Id) -> Request {
        Request::builder()
            .header(header::COOKIE, format!("session={}", token))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn untouched_new_session_sets_no_cookie() {
        let backend = Arc::new(Counting::default());
        let service = layer(backend.clone()).then(service_fn(|_req: Request| async {
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let response = service.oneshot(Request::new(Body::empty())).await.unwrap();

        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(backend.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn written_session_is_committed_and_cookie_is_secure() {
        let backend = Arc::new(Counting::default());
        let service = layer(backend.clone()).then(service_fn(|req: Request| async move {
            let session = req.extensions().get::<Session>().cloned().unwrap();
            session.put_flash("hello");
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let response = service.oneshot(Request::new(Body::empty())).await.unwrap();

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("session="));
        assert!(set_cookie.contains("Secure"));
        assert!(set_cookie.contains("HttpOnly"));
        assert_eq!(*backend.calls.lock(), vec!["commit"]);

        let token = cookie_token(&response);
        let stored = SessionBackend::load(&backend.inner, &token).await.unwrap().unwrap();
        assert_eq!(stored["flash"], "hello");
    }

    #[tokio::test]
    async fn existing_session_is_loaded_once_and_persisted_once() {
        let backend = Arc::new(Counting::default());
        let token = Id::default();
        let mut data = crate::session::SessionData::new();
        data.insert("authenticated_user_id".into(), serde_json::json!(5));
        SessionBackend::commit(
            &backend.inner,
            &token,
            &data,
            OffsetDateTime::now_utc() + Duration::hours(1),
        )
        .await
        .unwrap();

        let seen = Arc::new(Mutex::new(None));
        let seen_in_handler = seen.clone();
        let service = layer(backend.clone()).then(service_fn(move |req: Request| {
            let seen = seen_in_handler.clone();
            async move {
                let session = req.extensions().get::<Session>().cloned().unwrap();
                *seen.lock() = session.user_id();
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::UNPROCESSABLE_ENTITY;
                Ok::<_, Infallible>(response)
            }
        }));

        let response = service.oneshot(with_cookie(&token)).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(*seen.lock(), Some(5));
        assert_eq!(*backend.calls.lock(), vec!["load", "commit"]);
        assert_eq!(cookie_token(&response), token);
    }

    #[tokio::test]
    async fn renew_rotates_the_token_and_deletes_the_old_record() {
        let backend = Arc::new(Counting::default());
        let old = Id::default();
        SessionBackend::commit(
            &backend.inner,
            &old,
            &crate::session::SessionData::new(),
            OffsetDateTime::now_utc() + Duration::hours(1),
        )
        .await
        .unwrap();

        let service = layer(backend.clone()).then(service_fn(|req: Request| async move {
            let session = req.extensions().get::<Session>().cloned().unwrap();
            session.renew();
            session.set_user_id(9);
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let response = service.oneshot(with_cookie(&old)).await.unwrap();
        let new = cookie_token(&response);

        assert_ne!(new, old);
        assert!(SessionBackend::load(&backend.inner, &old).await.unwrap().is_none());
        let stored = SessionBackend::load(&backend.inner, &new).await.unwrap().unwrap();
        assert_eq!(stored["authenticated_user_id"], 9);
    }

    #[tokio::test]
    async fn destroy_deletes_and_clears_the_cookie() {
        let backend = Arc::new(Counting::default());
        let token = Id::default();
        SessionBackend::commit(
            &backend.inner,
            &token,
            &crate::session::SessionData::new(),
            OffsetDateTime::now_utc() + Duration::hours(1),
        )
        .await
        .unwrap();

        let service = layer(backend.clone()).then(service_fn(|req: Request| async move {
            req.extensions().get::<Session>().cloned().unwrap().destroy();
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let response = service.oneshot(with_cookie(&token)).await.unwrap();

        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.contains("Max-Age=0"));
        assert!(SessionBackend::load(&backend.inner, &token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn session_is_persisted_even_when_the_handler_panics() {
        let backend = Arc::new(Counting::default());
        let service = Chain::new()
            .with(crate::middleware::RecoverPanic)
            .append(&layer(backend.clone()))
            .then(service_fn(|req: Request| async move {
                let session = req.extensions().get::<Session>().cloned().unwrap();
                session.put_flash("written before the panic");
                if true {
                    panic!("boom");
                }
                Ok::<_, Infallible>(Response::new(Body::empty()))
            }));

        let response = service.oneshot(Request::new(Body::empty())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(*backend.calls.lock(), vec!["commit"]);
    }

    /// Backend whose commit panics
    struct PanickingCommit;

    #[async_trait]
    impl SessionBackend for PanickingCommit {
        async fn load(&self, _token: &Id) -> Result<Option<crate::session::SessionData>, SessionError> {
            Ok(None)
        }

        async fn commit(
            &self,
            _token: &Id,
            _data: &crate::session::SessionData,
            _expiry: OffsetDateTime,
        ) -> Result<(), SessionError> {
            panic!("session store went away")
        }

        async fn delete(&self, _token: &Id) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn panic_while_persisting_is_recovered_as_500() {
        let service = Chain::new()
            .with(crate::middleware::RecoverPanic)
            .with(LoadAndSave::new(Arc::new(PanickingCommit), SessionConfig::default()))
            .then(service_fn(|req: Request| async move {
                let session = req.extensions().get::<Session>().cloned().unwrap();
                session.put_flash("needs saving");
                Ok::<_, Infallible>(Response::new(Body::empty()))
            }));

        let response = service.oneshot(Request::new(Body::empty())).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::CONNECTION], "close");
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn garbage_cookie_starts_a_fresh_session() {
        let backend = Arc::new(Counting::default());
        let service = layer(backend.clone()).then(service_fn(|req: Request| async move {
            let session = req.extensions().get::<Session>().cloned().unwrap();
            assert!(session.token().is_none());
            Ok::<_, Infallible>(Response::new(Body::empty()))
        }));

        let request = Request::builder()
            .header(header::COOKIE, "session=!!not-base64!!; other=1")
            .body(Body::empty())
            .unwrap();
        let response = service.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(backend.calls.lock().is_empty());
    }
}
