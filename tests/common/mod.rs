//! Test harness: the full router over in-memory stores, driven with `oneshot`,
//! plus a one-cookie jar so consecutive requests share a session.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use once_cell::sync::Lazy;
use regex::Regex;
use tower::ServiceExt;
use tower_sessions::MemoryStore;

use snippetbox::db::memory::MemoryDatabase;
use snippetbox::db::UserStore;
use snippetbox::middleware::SessionConfig;
use snippetbox::routes;
use snippetbox::state::AppState;
use snippetbox::templates::TemplateCache;

static CSRF_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"name='csrf_token' value='([^']+)'").unwrap());

pub const PASSWORD: &str = "pa$$word123";

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    /// The CSRF token embedded in the page's forms
    pub fn csrf_token(&self) -> String {
        CSRF_RX
            .captures(&self.body)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| panic!("no csrf token in page:\n{}", self.body))
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: MemoryDatabase,
    cookie: Option<String>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_router(|router| router)
    }

    /// Build the app, letting the caller adjust the router first
    pub fn with_router(adjust: impl FnOnce(Router) -> Router) -> Self {
        let db = MemoryDatabase::new();
        let state = AppState::new(
            Arc::new(db.clone()),
            Arc::new(db.clone()),
            TemplateCache::new().unwrap(),
        );
        let router = routes::router(
            state,
            Arc::new(MemoryStore::default()),
            SessionConfig::default(),
            "./ui/static",
        );

        Self {
            router: adjust(router),
            db,
            cookie: None,
        }
    }

    pub async fn request(&mut self, method: Method, uri: &str, form: Option<String>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match form {
            Some(form) => {
                builder = builder.header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
                Body::from(form)
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        self.remember_cookie(&headers);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        TestResponse {
            status,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        }
    }

    fn remember_cookie(&mut self, headers: &HeaderMap) {
        for value in headers.get_all(header::SET_COOKIE) {
            let Ok(raw) = value.to_str() else { continue };
            let cookie = cookie::Cookie::parse(raw.to_string()).unwrap();
            if cookie.name() != "session" {
                continue;
            }
            if cookie.max_age() == Some(time::Duration::ZERO) {
                self.cookie = None;
            } else {
                self.cookie = Some(format!("session={}", cookie.value()));
            }
        }
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        self.request(Method::GET, uri, None).await
    }

    pub async fn post(&mut self, uri: &str, form: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(form)
            .finish();
        self.request(Method::POST, uri, Some(body)).await
    }

    /// Fetch `page` for a token, then post `form` with it
    pub async fn submit(&mut self, page: &str, form: &[(&str, &str)]) -> TestResponse {
        let token = self.get(page).await.csrf_token();
        let mut fields = vec![("csrf_token", token.as_str())];
        fields.extend_from_slice(form);
        self.post(page, &fields).await
    }

    pub async fn signup(&mut self, name: &str, email: &str) -> TestResponse {
        self.submit(
            "/user/signup",
            &[("name", name), ("email", email), ("password", PASSWORD)],
        )
        .await
    }

    pub async fn login(&mut self, email: &str) -> TestResponse {
        self.submit("/user/login", &[("email", email), ("password", PASSWORD)])
            .await
    }

    /// Create a user directly in the store
    pub async fn db_user(&self, email: &str) -> i64 {
        self.db
            .insert_user("Test User", email, PASSWORD)
            .await
            .unwrap()
    }

    /// Create a user directly in the store and log in through the form
    pub async fn logged_in_user(&mut self, email: &str) -> i64 {
        let id = self.db_user(email).await;
        let response = self.login(email).await;
        assert_eq!(response.status, StatusCode::SEE_OTHER, "{}", response.body);
        id
    }
}
