//! WebSocket upgrade detection.
//!
//! # Responsibilities
//! - Decide from headers alone whether a request asks for a WebSocket upgrade
//!
//! # Design Decisions
//! - `Connection` is tokenized on commas: Firefox sends `keep-alive, Upgrade`
//! - Only the first value of each header is considered
//! - Case-insensitive on both tokens

use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::HeaderMap;

/// True iff the headers describe a WebSocket upgrade.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    let connection = first_value(headers, CONNECTION);
    let wants_upgrade = connection
        .split(',')
        .any(|token| token.trim().eq_ignore_ascii_case("upgrade"));
    if !wants_upgrade {
        return false;
    }
    first_value(headers, UPGRADE).eq_ignore_ascii_case("websocket")
}

fn first_value(headers: &HeaderMap, name: axum::http::HeaderName) -> &str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.append(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn chrome_handshake() {
        let h = headers(&[
            ("accept-encoding", "gzip, deflate, sdch"),
            ("cache-control", "no-cache"),
            ("connection", "Upgrade"),
            ("host", "localhost:1337"),
            ("origin", "http://localhost:1337"),
            ("sec-websocket-extensions", "permessage-deflate; client_max_window_bits"),
            ("sec-websocket-key", "oGfEAZmfO5EsHn1whKQRTw=="),
            ("sec-websocket-version", "13"),
            ("upgrade", "websocket"),
        ]);
        assert!(is_websocket_upgrade(&h));
    }

    #[test]
    fn firefox_composite_connection() {
        let h = headers(&[
            ("host", "localhost:1337"),
            ("connection", "keep-alive, Upgrade"),
            ("upgrade", "websocket"),
            ("sec-websocket-version", "13"),
        ]);
        assert!(is_websocket_upgrade(&h));
    }

    #[test]
    fn case_insensitive_tokens() {
        let h = headers(&[("connection", "UPGRADE"), ("upgrade", "WebSocket")]);
        assert!(is_websocket_upgrade(&h));
    }

    #[test]
    fn plain_keep_alive_is_http() {
        assert!(!is_websocket_upgrade(&headers(&[("connection", "keep-alive")])));
        assert!(!is_websocket_upgrade(&headers(&[("upgrade", "websocket")])));
        assert!(!is_websocket_upgrade(&HeaderMap::new()));
    }

    #[test]
    fn upgrade_header_required() {
        assert!(!is_websocket_upgrade(&headers(&[("connection", "Upgrade")])));
        assert!(!is_websocket_upgrade(&headers(&[
            ("connection", "Upgrade"),
            ("upgrade", "h2c"),
        ])));
    }

    #[test]
    fn only_first_connection_value_counts() {
        let h = headers(&[
            ("connection", "keep-alive"),
            ("connection", "Upgrade"),
            ("upgrade", "websocket"),
        ]);
        assert!(!is_websocket_upgrade(&h));
    }
}
