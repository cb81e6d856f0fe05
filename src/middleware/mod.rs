//! # Middleware Module
//!
//! Request interceptors and the [`Chain`] that composes them.
//!
//! An [`Interceptor`] receives the request together with a [`Next`] handle to
//! the rest of the chain. It may:
//! - pass the request through unchanged (`next.run(req).await`)
//! - change request-scoped context (extensions, body) and then pass it through
//! - short-circuit by returning its own response without ever calling `next`
//!
//! Code before `next.run` is the *before* phase, code after it the *after* phase.
//! The first interceptor added to a chain is the outermost one, so before phases run
//! in registration order and after phases in reverse.
//!
//! ## Our Interceptors
//! - `recover`: turns panics into a logged 500 (outermost, standard chain)
//! - `logging`: records every request (standard chain)
//! - `headers`: security headers (standard chain)
//! - `session`: loads the session before, persists it after (dynamic chain)
//! - `csrf`: rejects state-changing requests without a valid token (dynamic chain)
//! - `auth`: derives the [`auth::AuthContext`] and guards protected routes

pub mod auth;
pub mod csrf;
pub mod headers;
pub mod logging;
pub mod recover;
pub mod session;

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use axum::extract::Request;
use axum::response::Response;
use futures::future::BoxFuture;
use tower::util::BoxCloneService;
use tower::{Layer, Service, ServiceExt};

pub use self::auth::{AuthContext, Authenticate, RequireAuthentication};
pub use self::csrf::{CsrfGuard, CsrfToken};
pub use self::headers::SecureHeaders;
pub use self::logging::LogRequest;
pub use self::recover::RecoverPanic;
pub use self::session::{LoadAndSave, SessionConfig};

/// One step of a request pipeline
#[async_trait]
pub trait Interceptor: Send + Sync + 'static {
    async fn intercept(&self, req: Request, next: Next) -> Response;
}

/// The remainder of a chain, as seen from inside an interceptor
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    position: usize,
    endpoint: BoxCloneService<Request, Response, Infallible>,
}

impl Next {
    /// Run the remaining interceptors and then the terminal handler
    pub fn run(mut self, req: Request) -> BoxFuture<'static, Response> {
        let current = self.interceptors.get(self.position).cloned();
        match current {
            Some(interceptor) => {
                self.position += 1;
                Box::pin(async move { interceptor.intercept(req, self).await })
            }
            None => Box::pin(async move {
                match self.endpoint.oneshot(req).await {
                    Ok(response) => response,
                    Err(never) => match never {},
                }
            }),
        }
    }
}

/// An ordered list of interceptors
///
/// A chain is a `tower::Layer`; wrapping a service with it yields a single composed
/// service that can be handed to the router with `Router::layer` or
/// `Router::route_layer`.
#[derive(Clone, Default)]
pub struct Chain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interceptor inside all the ones already in the chain
    pub fn with<I: Interceptor>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// A new chain running `self` first and then `other`
    pub fn append(&self, other: &Chain) -> Self {
        let mut interceptors = self.interceptors.clone();
        interceptors.extend(other.interceptors.iter().cloned());
        Self { interceptors }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Wrap a terminal handler service
    pub fn then<S>(&self, endpoint: S) -> Chained<S> {
        Chained {
            interceptors: self.interceptors.clone().into(),
            endpoint,
        }
    }
}

impl<S> Layer<S> for Chain {
    type Service = Chained<S>;

    fn layer(&self, inner: S) -> Self::Service {
        self.then(inner)
    }
}

/// A terminal service wrapped in a chain of interceptors
#[derive(Clone)]
pub struct Chained<S> {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    endpoint: S,
}

impl<S> Service<Request> for Chained<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // The endpoint is driven with `oneshot`, which waits for its readiness.
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let next = Next {
            interceptors: self.interceptors.clone(),
            position: 0,
            endpoint: BoxCloneService::new(self.endpoint.clone()),
        };

        Box::pin(async move { Ok(next.run(req).await) })
    }
}
