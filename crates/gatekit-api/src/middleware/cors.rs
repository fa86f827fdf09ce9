//! CORS for browser callers. Preflight requests are answered here and never
//! reach the gates.

use axum::http::Method;
use tower_http::cors::{Any, CorsLayer};

/// Any origin, any header, the five dispatcher methods.
///
/// Credentials are not advertised: `Access-Control-Allow-Credentials` is
/// invalid together with a wildcard origin.
pub fn layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
}
