//! # HTML Rendering
//!
//! Pages are askama templates under `ui/html/`, compiled into the binary. At startup
//! they are collected into a [`TemplateCache`], an immutable map from page name to
//! renderer which is shared by every request through the application state.
//!
//! ## Startup validation
//! Building the cache renders every page once with empty data. A page that can't
//! render stops the server from starting rather than failing on first use.
//!
//! ## Buffered output
//! [`TemplateCache::render`] renders into a buffer first. Only a complete page is sent;
//! a rendering failure produces a plain 500 with none of the partial output.

mod pages;

use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use chrono::Datelike;
use thiserror::Error;

use crate::db::models::Snippet;
use crate::error::{AppError, AppResult};
use crate::forms::FormView;
use crate::middleware::AuthContext;

pub use pages::{CREATE, HOME, LOGIN, SIGNUP, VIEW};

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("the template {0} does not exist")]
    Missing(String),

    #[error("rendering {page}: {source}")]
    Render {
        page: String,
        #[source]
        source: askama::Error,
    },
}

/// Everything a page can show
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub current_year: i32,
    pub flash: Option<String>,
    pub is_authenticated: bool,
    pub csrf_token: String,
    pub snippet: Option<Snippet>,
    pub snippets: Vec<Snippet>,
    pub form: FormView,
}

impl TemplateData {
    /// Data common to every page for the current request
    pub fn new(ctx: &AuthContext) -> Self {
        Self {
            current_year: chrono::Utc::now().year(),
            flash: ctx.flash.clone(),
            is_authenticated: ctx.is_authenticated,
            csrf_token: ctx.csrf_token.clone(),
            ..Self::default()
        }
    }

    pub fn with_form(mut self, form: FormView) -> Self {
        self.form = form;
        self
    }
}

pub(crate) type Renderer = fn(&TemplateData, &mut String) -> askama::Result<()>;

/// Page name to renderer, built once at startup
pub struct TemplateCache {
    pages: HashMap<&'static str, Renderer>,
}

impl TemplateCache {
    /// Collect and validate every page
    pub fn new() -> Result<Self, TemplateError> {
        let mut cache = Self {
            pages: HashMap::new(),
        };
        for (name, renderer) in pages::all() {
            cache.register(name, renderer);
        }
        cache.validate()?;
        Ok(cache)
    }

    pub(crate) fn register(&mut self, name: &'static str, renderer: Renderer) {
        self.pages.insert(name, renderer);
    }

    fn validate(&self) -> Result<(), TemplateError> {
        let empty = TemplateData::default();
        for name in self.pages.keys() {
            self.render_to_string(name, &empty)?;
            tracing::debug!(page = name, "template ready");
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn render_to_string(&self, page: &str, data: &TemplateData) -> Result<String, TemplateError> {
        let renderer = self
            .pages
            .get(page)
            .ok_or_else(|| TemplateError::Missing(page.to_string()))?;

        let mut buf = String::with_capacity(4096);
        renderer(data, &mut buf).map_err(|source| TemplateError::Render {
            page: page.to_string(),
            source,
        })?;
        Ok(buf)
    }

    /// Render `page` with `status`, or a 500 if it can't be rendered completely
    pub fn render(&self, page: &str, status: StatusCode, data: &TemplateData) -> AppResult<Response> {
        let html = self
            .render_to_string(page, data)
            .map_err(|err| AppError::Template(err.to_string()))?;
        Ok((status, Html(html)).into_response())
    }
}
