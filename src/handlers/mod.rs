//! # HTTP Request Handlers
//!
//! This module contains all the HTTP route handlers.
//!
//! ## Submodules
//! - `health`: liveness endpoint (for monitoring)
//! - `snippets`: home page, snippet view and snippet creation
//! - `auth`: signup, login and logout
//!
//! ## Handler Pattern
//! Handlers are async functions that:
//! 1. Extract what they need: path params, the [`AuthContext`](crate::middleware::AuthContext),
//!    the [`Session`](crate::session::Session), a decoded [`Form`](crate::forms::Form)
//! 2. Call the stores
//! 3. Render a page through the template cache, or redirect with 303
//!
//! Failures are returned as [`AppError`]; its `IntoResponse` turns them into a status
//! page and logs server-side faults.

pub mod auth;
pub mod health;
pub mod snippets;

use crate::error::AppError;

/// Fallback for paths no route matches
pub async fn not_found() -> AppError {
    AppError::NotFound
}
