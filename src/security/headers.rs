//! Header sanitisation for forwarded requests.
//!
//! # Responsibilities
//! - Strip connection-management (hop-by-hop) headers before forwarding
//!
//! # Design Decisions
//! - Fixed denylist; the `Connection` header's token list is not consulted
//! - Matching is case-insensitive (`HeaderName` is already normalised)
//! - Every other header is kept, duplicates included, in iteration order

use axum::http::HeaderMap;

/// Headers that manage a single connection and must not be forwarded.
pub const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "upgrade",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
];

/// Returns true if `name` is on the hop-by-hop denylist.
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|denied| denied.eq_ignore_ascii_case(name))
}

/// Copy `headers` into a new map without any hop-by-hop header.
pub fn filter_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers.iter() {
        if !is_hop_by_hop(name.as_str()) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}
