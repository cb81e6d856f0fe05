//! # Database Models
//!
//! Rows of the `snippets` and `users` tables.
//!
//! Timestamps are stored as SQLite `DATETIME` text in UTC (`YYYY-MM-DD HH:MM:SS`)
//! and decoded into [`NaiveDateTime`]; every value in these structs is UTC.

use chrono::NaiveDateTime;

/// A piece of text shared on the site
///
/// Snippets are immutable once inserted. A snippet whose `expires` lies in the past
/// still exists in the table but is never returned by a store.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Snippet {
    /// Primary key, assigned by the store on insert
    pub id: i64,

    pub title: String,

    pub content: String,

    /// When the snippet was inserted
    pub created: NaiveDateTime,

    /// After this instant the snippet is hidden from `get` and `latest`
    /// Always later than `created`
    pub expires: NaiveDateTime,
}

impl Snippet {
    /// Format a timestamp the way pages display it, e.g. "19 Oct 2026 at 14:05"
    pub fn human_date(value: &NaiveDateTime) -> String {
        value.format("%d %b %Y at %H:%M").to_string()
    }

    pub fn created_display(&self) -> String {
        Self::human_date(&self.created)
    }

    pub fn expires_display(&self) -> String {
        Self::human_date(&self.expires)
    }

    /// Whether the snippet is still visible at `now`
    pub fn is_live_at(&self, now: NaiveDateTime) -> bool {
        self.expires > now
    }
}

/// A registered account
///
/// ## Security Note
/// Only the bcrypt hash of the password is ever stored. The struct is not
/// `Serialize` so the hash cannot end up in a rendered page by accident.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,

    /// Display name chosen at signup
    pub name: String,

    /// Login identifier, unique across all users
    pub email: String,

    /// bcrypt hash, including salt and cost
    pub hashed_password: String,

    pub created: NaiveDateTime,
}
