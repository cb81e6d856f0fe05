//! # Liveness Check
//!
//! Simple endpoint to check if the server is running.
//! Used by load balancers and monitoring systems.

/// Liveness endpoint
///
/// ## Route
/// GET /ping
///
/// ## Response
/// `200 OK` with the body `OK`, whether or not the visitor is signed in. The route
/// sits outside the session chain, so it never touches the session store.
pub async fn ping() -> &'static str {
    "OK"
}
