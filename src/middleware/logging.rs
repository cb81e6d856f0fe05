use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::{ConnectInfo, Request};
use axum::response::Response;

use super::{Interceptor, Next};

/// Logs every request before dispatch, and its outcome at debug level afterwards
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRequest;

#[async_trait]
impl Interceptor for LogRequest {
    async fn intercept(&self, req: Request, next: Next) -> Response {
        let remote_addr = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_else(|| "-".to_string());
        let method = req.method().clone();
        let uri = req.uri().clone();

        tracing::info!(
            remote_addr = %remote_addr,
            proto = ?req.version(),
            method = %method,
            uri = %uri,
            "received request"
        );

        let started = Instant::now();
        let response = next.run(req).await;

        tracing::debug!(
            method = %method,
            uri = %uri,
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "finished request"
        );

        response
    }
}
