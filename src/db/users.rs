use crate::db::{Database, ModelError, ModelResult, UserStore};
use async_trait::async_trait;

/// Hash a password with bcrypt on the blocking thread pool
pub async fn hash_password(password: &str, cost: u32) -> ModelResult<String> {
    let password = password.to_owned();
    let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost)).await??;
    Ok(hash)
}

/// Check a password against a stored bcrypt hash on the blocking thread pool
pub async fn verify_password(password: &str, hash: &str) -> ModelResult<bool> {
    let password = password.to_owned();
    let hash = hash.to_owned();
    let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await??;
    Ok(matches)
}

#[async_trait]
impl UserStore for Database {
    async fn insert_user(&self, name: &str, email: &str, password: &str) -> ModelResult<i64> {
        let hashed_password = hash_password(password, self.hash_cost).await?;

        let result = sqlx::query(
            "INSERT INTO users (name, email, hashed_password, created)
             VALUES (?, ?, ?, datetime('now'))",
        )
        .bind(name)
        .bind(email)
        .bind(&hashed_password)
        .execute(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                ModelError::DuplicateEmail
            }
            _ => ModelError::Database(e),
        })?;

        Ok(result.last_insert_rowid())
    }

    async fn authenticate(&self, email: &str, password: &str) -> ModelResult<i64> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, hashed_password FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(self.pool())
                .await?;

        let (id, hashed_password) = row.ok_or(ModelError::InvalidCredentials)?;

        if !verify_password(password, &hashed_password).await? {
            return Err(ModelError::InvalidCredentials);
        }

        Ok(id)
    }

    async fn exists_by_id(&self, id: i64) -> ModelResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(id)
            .fetch_one(self.pool())
            .await?;

        Ok(exists)
    }
}
