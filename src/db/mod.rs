//! # Database Module
//!
//! Persistence for snippets and users, seen by the rest of the crate only through the
//! [`SnippetStore`] and [`UserStore`] traits:
//! - `models`: row types (`Snippet`, `User`)
//! - `snippets`: SQLite implementation of [`SnippetStore`]
//! - `users`: SQLite implementation of [`UserStore`] plus password hashing
//! - `memory`: in-process implementation of both traits
//!
//! Handlers and interceptors hold `Arc<dyn SnippetStore>` / `Arc<dyn UserStore>`, so
//! the SQLite pool can be swapped for [`memory::MemoryDatabase`] in tests.

pub mod memory;
pub mod models;
pub mod snippets;
pub mod users;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;

use self::models::Snippet;

/// Lowest cost bcrypt accepts; used where hashing speed matters more than strength
pub(crate) const MIN_HASH_COST: u32 = 4;

/// Conditions a store reports to its callers
///
/// `NoRecord`, `InvalidCredentials` and `DuplicateEmail` are expected outcomes that
/// handlers turn into 404/422 responses. The remaining variants are server faults.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no matching record found")]
    NoRecord,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type ModelResult<T> = Result<T, ModelError>;

/// Snippet persistence
#[async_trait]
pub trait SnippetStore: Send + Sync + 'static {
    /// Store a new snippet that expires `expires_days` days from now, returning its id
    async fn insert(&self, title: &str, content: &str, expires_days: i64) -> ModelResult<i64>;

    /// Fetch a live snippet; expired and unknown ids are both [`ModelError::NoRecord`]
    async fn get(&self, id: i64) -> ModelResult<Snippet>;

    /// Up to `limit` live snippets, most recent first
    async fn latest(&self, limit: i64) -> ModelResult<Vec<Snippet>>;
}

/// User persistence and credential checks
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    /// Create an account; an email already in use is [`ModelError::DuplicateEmail`]
    async fn insert_user(&self, name: &str, email: &str, password: &str) -> ModelResult<i64>;

    /// Resolve an email/password pair to a user id, or [`ModelError::InvalidCredentials`]
    async fn authenticate(&self, email: &str, password: &str) -> ModelResult<i64>;

    /// Whether a user with this id still exists
    async fn exists_by_id(&self, id: i64) -> ModelResult<bool>;
}

/// SQLite-backed store
///
/// Cloning is cheap: `SqlitePool` is itself a handle to a shared pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    hash_cost: u32,
}

impl Database {
    /// Wrap an existing pool, hashing passwords at bcrypt's default cost
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Open a pool for `database_url` and bring the schema up to date
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self::new(pool))
    }

    /// Override the bcrypt cost (tests use the minimum to stay fast)
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
