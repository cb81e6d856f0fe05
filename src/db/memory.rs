//! # In-Memory Store
//!
//! [`MemoryDatabase`] implements [`SnippetStore`] and [`UserStore`] over plain vectors
//! behind a mutex. It keeps the SQLite store's semantics (expiry filtering, unique
//! emails, bcrypt hashes) and is what the end-to-end tests run against.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use parking_lot::Mutex;

use crate::db::models::{Snippet, User};
use crate::db::users::{hash_password, verify_password};
use crate::db::{ModelError, ModelResult, SnippetStore, UserStore, MIN_HASH_COST};

#[derive(Debug, Default)]
struct Tables {
    snippets: Vec<Snippet>,
    users: Vec<User>,
    next_snippet_id: i64,
    next_user_id: i64,
}

/// Shared in-memory store; clones see the same data
#[derive(Debug, Clone)]
pub struct MemoryDatabase {
    tables: Arc<Mutex<Tables>>,
    hash_cost: u32,
}

impl Default for MemoryDatabase {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            hash_cost: MIN_HASH_COST,
        }
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    /// Insert a snippet with explicit timestamps, bypassing the expiry rules
    ///
    /// Used to seed rows that are already expired.
    pub fn insert_raw(
        &self,
        title: &str,
        content: &str,
        created: NaiveDateTime,
        expires: NaiveDateTime,
    ) -> i64 {
        let mut tables = self.tables.lock();
        tables.next_snippet_id += 1;
        let id = tables.next_snippet_id;
        tables.snippets.push(Snippet {
            id,
            title: title.to_string(),
            content: content.to_string(),
            created,
            expires,
        });
        id
    }

    /// Number of stored snippets, live or expired
    pub fn snippet_count(&self) -> usize {
        self.tables.lock().snippets.len()
    }

    /// Remove a user, leaving any session that references it stale
    pub fn delete_user(&self, id: i64) -> bool {
        let mut tables = self.tables.lock();
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        tables.users.len() != before
    }
}

#[async_trait]
impl SnippetStore for MemoryDatabase {
    async fn insert(&self, title: &str, content: &str, expires_days: i64) -> ModelResult<i64> {
        let created = Self::now();
        let expires = created + Duration::days(expires_days);
        Ok(self.insert_raw(title, content, created, expires))
    }

    async fn get(&self, id: i64) -> ModelResult<Snippet> {
        let now = Self::now();
        self.tables
            .lock()
            .snippets
            .iter()
            .find(|s| s.id == id && s.is_live_at(now))
            .cloned()
            .ok_or(ModelError::NoRecord)
    }

    async fn latest(&self, limit: i64) -> ModelResult<Vec<Snippet>> {
        let now = Self::now();
        let limit = usize::try_from(limit).unwrap_or(0);
        let tables = self.tables.lock();

        let mut live: Vec<Snippet> = tables
            .snippets
            .iter()
            .filter(|s| s.is_live_at(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| b.id.cmp(&a.id));
        live.truncate(limit);

        Ok(live)
    }
}

#[async_trait]
impl UserStore for MemoryDatabase {
    async fn insert_user(&self, name: &str, email: &str, password: &str) -> ModelResult<i64> {
        // Hash before taking the lock; the guard is not held across an await.
        let hashed_password = hash_password(password, self.hash_cost).await?;

        let mut tables = self.tables.lock();
        if tables.users.iter().any(|u| u.email == email) {
            return Err(ModelError::DuplicateEmail);
        }

        tables.next_user_id += 1;
        let id = tables.next_user_id;
        tables.users.push(User {
            id,
            name: name.to_string(),
            email: email.to_string(),
            hashed_password,
            created: Self::now(),
        });

        Ok(id)
    }

    async fn authenticate(&self, email: &str, password: &str) -> ModelResult<i64> {
        let found = self
            .tables
            .lock()
            .users
            .iter()
            .find(|u| u.email == email)
            .map(|u| (u.id, u.hashed_password.clone()));

        let (id, hashed_password) = found.ok_or(ModelError::InvalidCredentials)?;

        if !verify_password(password, &hashed_password).await? {
            return Err(ModelError::InvalidCredentials);
        }

        Ok(id)
    }

    async fn exists_by_id(&self, id: i64) -> ModelResult<bool> {
        Ok(self.tables.lock().users.iter().any(|u| u.id == id))
    }
}
