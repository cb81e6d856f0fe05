use crate::db::models::Snippet;
use crate::db::{Database, ModelError, ModelResult, SnippetStore};
use async_trait::async_trait;

#[async_trait]
impl SnippetStore for Database {
    async fn insert(&self, title: &str, content: &str, expires_days: i64) -> ModelResult<i64> {
        let result = sqlx::query(
            "INSERT INTO snippets (title, content, created, expires)
             VALUES (?, ?, datetime('now'), datetime('now', ?))",
        )
        .bind(title)
        .bind(content)
        .bind(format!("+{} days", expires_days))
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> ModelResult<Snippet> {
        let snippet = sqlx::query_as::<_, Snippet>(
            "SELECT id, title, content, created, expires FROM snippets
             WHERE expires > datetime('now') AND id = ?",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => ModelError::NoRecord,
            _ => ModelError::Database(e),
        })?;

        Ok(snippet)
    }

    async fn latest(&self, limit: i64) -> ModelResult<Vec<Snippet>> {
        let snippets = sqlx::query_as::<_, Snippet>(
            "SELECT id, title, content, created, expires FROM snippets
             WHERE expires > datetime('now')
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(snippets)
    }
}
