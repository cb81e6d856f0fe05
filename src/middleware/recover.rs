use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use futures::FutureExt;

use super::{headers, Interceptor, Next};
use crate::error::status_response;

/// Outermost interceptor: a panic anywhere further down becomes a logged 500
///
/// The response carries `Connection: close` so the connection that saw the panic is
/// not reused for keep-alive. It also gets the security headers, since the unwind
/// skipped `SecureHeaders`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoverPanic;

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[async_trait]
impl Interceptor for RecoverPanic {
    async fn intercept(&self, req: Request, next: Next) -> Response {
        let method = req.method().clone();
        let uri = req.uri().clone();

        match AssertUnwindSafe(next.run(req)).catch_unwind().await {
            Ok(response) => response,
            Err(payload) => {
                tracing::error!(
                    panic = %panic_message(payload.as_ref()),
                    method = %method,
                    uri = %uri,
                    backtrace = %Backtrace::force_capture(),
                    "recovered from panic"
                );

                let mut response = status_response(StatusCode::INTERNAL_SERVER_ERROR);
                headers::apply(response.headers_mut());
                response
                    .headers_mut()
                    .insert(header::CONNECTION, HeaderValue::from_static("close"));
                response
            }
        }
    }
}
