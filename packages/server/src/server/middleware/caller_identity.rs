use axum::{
    extract::{ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;

/// Extension key for the caller identity used by the rate limiter.
#[derive(Clone, Debug)]
pub struct CallerIdentity(pub String);

/// Resolve the caller identity from request parts.
///
/// Priority:
/// 1. First comma-separated token of X-Forwarded-For (requests via proxies)
/// 2. Peer socket address (direct connection)
/// 3. "unknown"
pub fn resolve_identity(forwarded_for: Option<&str>, peer: Option<SocketAddr>) -> String {
    if let Some(token) = forwarded_for
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return token.to_string();
    }
    match peer {
        Some(addr) => addr.ip().to_string(),
        None => "unknown".to_string(),
    }
}

/// Middleware storing the caller identity in request extensions.
pub async fn extract_caller_identity(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Response {
    let forwarded_for = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let identity = resolve_identity(forwarded_for.as_deref(), Some(addr));
    request.extensions_mut().insert(CallerIdentity(identity));

    next.run(request).await
}
