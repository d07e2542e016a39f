//! Client address resolution for rate limiting
//!
//! Behind load balancers the socket peer is the last proxy, so the client is
//! read from `X-Forwarded-For`. Each trusted proxy appends the address it saw,
//! so only the trailing entries written by those proxies are believed.

use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// Resolve the client address: `X-Forwarded-For` (with `trusted_proxy_count`
/// trusted trailing hops), then `X-Real-IP`, then the socket peer.
///
/// With no trusted proxies both headers are caller-controlled and ignored.
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: Option<&SocketAddr>,
    trusted_proxy_count: usize,
) -> Option<IpAddr> {
    if trusted_proxy_count > 0 {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| from_forwarded_for(v, trusted_proxy_count));
        if forwarded.is_some() {
            return forwarded;
        }

        let real_ip = headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<IpAddr>().ok());
        if real_ip.is_some() {
            return real_ip;
        }
    }

    socket_addr.map(SocketAddr::ip)
}

/// Pick the client out of `[spoofed..., ]client, proxy1, ..., proxyN-1`.
///
/// The outermost of N trusted proxies appends the peer it accepted the
/// connection from, which lands N entries from the end. Anything to the left
/// of it was supplied by the caller. A chain shorter than N means some proxy
/// did not append, so the leftmost entry is the best remaining guess.
fn from_forwarded_for(header_value: &str, trusted_proxy_count: usize) -> Option<IpAddr> {
    if trusted_proxy_count == 0 {
        return None;
    }

    let hops: Vec<&str> = header_value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    let candidate = if hops.len() >= trusted_proxy_count {
        hops.get(hops.len() - trusted_proxy_count)
    } else {
        hops.first()
    }?;

    candidate.parse().ok()
}
