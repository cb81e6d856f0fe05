//! # Session Context
//!
//! A [`Session`] is the request-scoped view over one visitor's session data. The
//! session interceptor loads it once, places it in the request extensions, and
//! persists it once after the rest of the chain has run. Everything in between
//! (CSRF guard, authenticate, handlers) reads and writes through the typed accessors
//! below.
//!
//! ## Lifecycle flags
//! - *rotate*: a new token must be issued and the old record deleted
//!   (privilege changes: login, logout)
//! - *destroyed*: the record must be deleted and the cookie cleared

mod backend;

pub use backend::{SessionBackend, SessionData};

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tower_sessions::session::Id;

use crate::error::AppError;

const FLASH_KEY: &str = "flash";
const USER_ID_KEY: &str = "authenticated_user_id";
const CSRF_SECRET_KEY: &str = "csrf_secret";
const REDIRECT_KEY: &str = "redirect_after_login";

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session store error: {0}")]
    Store(#[from] tower_sessions::session_store::Error),

    #[error("session value error: {0}")]
    Value(#[from] serde_json::Error),
}

#[derive(Debug, Default)]
struct State {
    token: Option<Id>,
    data: SessionData,
    rotate: bool,
    destroyed: bool,
}

/// What the session interceptor needs to persist a session
#[derive(Debug, Clone)]
pub(crate) struct Snapshot {
    pub token: Option<Id>,
    pub data: SessionData,
    pub rotate: bool,
    pub destroyed: bool,
}

/// Request-scoped handle to the visitor's session
///
/// Clones share state, so a value written by a handler is visible to the
/// interceptor that persists it.
#[derive(Debug, Clone, Default)]
pub struct Session {
    inner: Arc<Mutex<State>>,
}

impl Session {
    /// A session for `token` holding previously stored `data`
    pub(crate) fn loaded(token: Id, data: SessionData) -> Self {
        Self::from_state(State {
            token: Some(token),
            data,
            ..State::default()
        })
    }

    /// An empty session that has no token yet
    pub(crate) fn fresh() -> Self {
        Self::default()
    }

    fn from_state(state: State) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let state = self.inner.lock();
        Snapshot {
            token: state.token,
            data: state.data.clone(),
            rotate: state.rotate,
            destroyed: state.destroyed,
        }
    }

    /// Token the session was loaded under, if it already existed
    pub fn token(&self) -> Option<Id> {
        self.inner.lock().token
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().data.is_empty()
    }

    fn get_value(&self, key: &str) -> Option<Value> {
        self.inner.lock().data.get(key).cloned()
    }

    fn set_value(&self, key: &str, value: Value) {
        let mut state = self.inner.lock();
        if state.destroyed {
            // Writing after destroy starts over under a new token.
            state.destroyed = false;
            state.rotate = true;
        }
        state.data.insert(key.to_string(), value);
    }

    /// Deserialize the value stored under `key`
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, SessionError> {
        self.get_value(key)
            .map(serde_json::from_value)
            .transpose()
            .map_err(SessionError::from)
    }

    /// Serialize `value` under `key`
    pub fn insert<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        self.set_value(key, value);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.inner.lock().data.remove(key)
    }

    /// Issue a new token on the next persist, keeping the data
    pub fn renew(&self) {
        let mut state = self.inner.lock();
        state.rotate = true;
    }

    /// Drop all data and delete the stored record on the next persist
    pub fn destroy(&self) {
        let mut state = self.inner.lock();
        state.data.clear();
        state.destroyed = true;
        state.rotate = false;
    }

    // Typed accessors

    /// Read and clear the one-time flash message
    pub fn pop_flash(&self) -> Option<String> {
        match self.remove(FLASH_KEY)? {
            Value::String(message) => Some(message),
            _ => None,
        }
    }

    pub fn put_flash(&self, message: impl Into<String>) {
        self.set_value(FLASH_KEY, Value::String(message.into()));
    }

    pub fn user_id(&self) -> Option<i64> {
        self.get_value(USER_ID_KEY).and_then(|v| v.as_i64())
    }

    pub fn set_user_id(&self, id: i64) {
        self.set_value(USER_ID_KEY, Value::from(id));
    }

    pub fn clear_user_id(&self) {
        self.remove(USER_ID_KEY);
    }

    pub fn csrf_secret(&self) -> Option<String> {
        self.get_value(CSRF_SECRET_KEY)
            .and_then(|v| v.as_str().map(str::to_owned))
    }

    pub fn set_csrf_secret(&self, secret: impl Into<String>) {
        self.set_value(CSRF_SECRET_KEY, Value::String(secret.into()));
    }

    /// Remember where to send the visitor once they have logged in
    pub fn set_redirect_after_login(&self, path: impl Into<String>) {
        self.set_value(REDIRECT_KEY, Value::String(path.into()));
    }

    pub fn take_redirect_after_login(&self) -> Option<String> {
        match self.remove(REDIRECT_KEY)? {
            Value::String(path) => Some(path),
            _ => None,
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Session>()
            .cloned()
            .ok_or_else(|| AppError::Internal("session not loaded for this route".to_string()))
    }
}
