use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// CORS layer from the configured `access-control-allow-origins` list. A
/// `*` entry (or an empty list) allows any origin.
pub(crate) fn layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() || allowed_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any);
    }

    let origins: Vec<_> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_headers(Any)
        .allow_methods(Any)
}
