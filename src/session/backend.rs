//! Storage seam for session data.
//!
//! The pipeline only needs three operations from wherever sessions live: load a
//! token's data, commit data under a token with an expiry, and delete a token. Any
//! `tower_sessions::SessionStore` provides them, so `MemoryStore` and the sqlx
//! `SqliteStore` both plug in unchanged.

use std::collections::HashMap;

use async_trait::async_trait;
use time::OffsetDateTime;
use tower_sessions::session::{Id, Record};
use tower_sessions::SessionStore;

use super::SessionError;

/// Key/value payload of one session
pub type SessionData = HashMap<String, serde_json::Value>;

#[async_trait]
pub trait SessionBackend: Send + Sync + 'static {
    /// Data stored under `token`, or `None` if the token is unknown or expired
    async fn load(&self, token: &Id) -> Result<Option<SessionData>, SessionError>;

    /// Store `data` under `token` until `expiry`, replacing anything already there
    async fn commit(
        &self,
        token: &Id,
        data: &SessionData,
        expiry: OffsetDateTime,
    ) -> Result<(), SessionError>;

    async fn delete(&self, token: &Id) -> Result<(), SessionError>;
}

#[async_trait]
impl<S> SessionBackend for S
where
    S: SessionStore,
{
    async fn load(&self, token: &Id) -> Result<Option<SessionData>, SessionError> {
        let record = SessionStore::load(self, token).await?;
        let now = OffsetDateTime::now_utc();

        Ok(record
            .filter(|record| record.expiry_date > now)
            .map(|record| record.data))
    }

    async fn commit(
        &self,
        token: &Id,
        data: &SessionData,
        expiry: OffsetDateTime,
    ) -> Result<(), SessionError> {
        let record = Record {
            id: *token,
            data: data.clone(),
            expiry_date: expiry,
        };
        SessionStore::save(self, &record).await?;
        Ok(())
    }

    async fn delete(&self, token: &Id) -> Result<(), SessionError> {
        SessionStore::delete(self, token).await?;
        Ok(())
    }
}
