use async_trait::async_trait;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;

use super::{Interceptor, Next};

const CONTENT_SECURITY_POLICY: &str =
    "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com";

/// Security headers set on every response, overwriting whatever the handler set
const SECURITY_HEADERS: [(HeaderName, &str); 5] = [
    (header::CONTENT_SECURITY_POLICY, CONTENT_SECURITY_POLICY),
    (header::REFERRER_POLICY, "origin-when-cross-origin"),
    (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
    (header::X_FRAME_OPTIONS, "deny"),
    (header::X_XSS_PROTECTION, "0"),
];

/// Write the security headers into `headers`
///
/// Also used by `RecoverPanic`, whose 500 never passed back through `SecureHeaders`.
pub(crate) fn apply(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SecureHeaders;

#[async_trait]
impl Interceptor for SecureHeaders {
    async fn intercept(&self, req: Request, next: Next) -> Response {
        let mut response = next.run(req).await;
        apply(response.headers_mut());
        response
    }
}
