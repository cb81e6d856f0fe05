//! # Application State
//!
//! This module defines the shared state that's accessible to all request handlers.
//! In Axum, state is how you share resources (stores, templates, etc.) across
//! different parts of your application.
//!
//! ## The State Pattern
//! Instead of creating resources for each request, we:
//! 1. Create the stores and the template cache once at startup
//! 2. Store them in AppState
//! 3. Share them across all request handlers
//! 4. Axum clones the state for each request (cheap because everything is behind Arc)

use std::sync::Arc;

use crate::db::{SnippetStore, UserStore};
use crate::templates::TemplateCache;

/// Shared application state
///
/// The stores are trait objects so the same router runs on SQLite in production and
/// on the in-memory store in tests.
#[derive(Clone)]
pub struct AppState {
    /// Snippet persistence
    pub snippets: Arc<dyn SnippetStore>,

    /// User persistence and credential checks
    pub users: Arc<dyn UserStore>,

    /// Page renderers, immutable after startup
    pub templates: Arc<TemplateCache>,
}

impl AppState {
    pub fn new(
        snippets: Arc<dyn SnippetStore>,
        users: Arc<dyn UserStore>,
        templates: TemplateCache,
    ) -> Self {
        Self {
            snippets,
            users,
            templates: Arc::new(templates),
        }
    }
}
