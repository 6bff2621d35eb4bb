//! Login gate for the proxied surface.
//!
//! # Responsibilities
//! - Let logged-in sessions through to the forwarder or relay
//! - Send everyone else to the login page, or refuse upgrades outright
//!
//! # Design Decisions
//! - The decision is a pure function of session and headers
//! - A redirect or rejection ends the request; nothing is proxied after it
//! - Upgrades get 401 rather than a redirect, browsers cannot follow one
//!   during a WebSocket handshake

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};

use crate::http::detect::is_websocket_upgrade;
use crate::session::cookie::{Session, SessionStore};

/// Where unauthenticated browsers are sent.
pub const LOGIN_PATH: &str = "/proxy/login";

/// Body of the 401 sent to unauthenticated upgrade requests.
pub const UNAUTHORIZED_MESSAGE: &str = "You need to login first.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Session is logged in.
    Allow,
    /// Plain request without a login: 307 to [`LOGIN_PATH`].
    Redirect,
    /// Upgrade request without a login: 401.
    Reject,
}

pub fn evaluate(session: &Session, headers: &HeaderMap) -> GateDecision {
    if session.logged_in {
        GateDecision::Allow
    } else if is_websocket_upgrade(headers) {
        GateDecision::Reject
    } else {
        GateDecision::Redirect
    }
}

/// Middleware guarding every proxied route.
pub async fn require_login(State(sessions): State<SessionStore>, request: Request, next: Next) -> Response {
    let session = sessions.load(request.headers());
    let decision = evaluate(&session, request.headers());
    if decision == GateDecision::Allow {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();

    match decision {
        GateDecision::Reject => {
            tracing::info!(
                method = %request.method(),
                url = %request.uri(),
                client = %client,
                status = StatusCode::UNAUTHORIZED.as_u16(),
                "Client not logged in, refusing upgrade"
            );
            (StatusCode::UNAUTHORIZED, UNAUTHORIZED_MESSAGE).into_response()
        }
        _ => {
            tracing::info!(
                method = %request.method(),
                url = %request.uri(),
                client = %client,
                redirect = LOGIN_PATH,
                status = StatusCode::TEMPORARY_REDIRECT.as_u16(),
                "Client not logged in"
            );
            Redirect::temporary(LOGIN_PATH).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn upgrade_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive, Upgrade"));
        headers.insert("upgrade", HeaderValue::from_static("websocket"));
        headers
    }

    #[test]
    fn logged_in_sessions_pass() {
        let session = Session { logged_in: true };
        assert_eq!(evaluate(&session, &HeaderMap::new()), GateDecision::Allow);
        assert_eq!(evaluate(&session, &upgrade_headers()), GateDecision::Allow);
    }

    #[test]
    fn anonymous_http_is_redirected() {
        assert_eq!(evaluate(&Session::default(), &HeaderMap::new()), GateDecision::Redirect);
    }

    #[test]
    fn anonymous_upgrade_is_rejected() {
        assert_eq!(evaluate(&Session::default(), &upgrade_headers()), GateDecision::Reject);
    }
}
