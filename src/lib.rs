//! # Snippetbox
//!
//! A snippet sharing site: visitors read recent snippets, signed-up users create them.
//! The interesting part is the request pipeline around the handlers.
//!
//! ## Request flow
//! 1. The standard chain catches panics, logs the request and sets security headers
//! 2. Pages that use the session also run the dynamic chain: load the session,
//!    check the CSRF token on state-changing requests, establish who is asking
//! 3. Protected pages additionally redirect anonymous visitors to the login page
//! 4. The handler decodes and validates input, calls a store, and renders a page
//!    from the template cache or redirects
//! 5. The session is persisted on the way out, whatever the handler returned
//!
//! See [`routes`] for which chain applies to which route.

pub mod config;
pub mod db;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod session;
pub mod state;
pub mod templates;
