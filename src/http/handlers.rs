//! Request handlers: auth endpoints and the proxy dispatcher.
//!
//! # Responsibilities
//! - Login, registration, logout and menu pages under `/proxy/`
//! - Hand every other (gated) request to the forwarder or the relay
//!
//! # Design Decisions
//! - Credential store calls run on the blocking pool
//! - Unknown user and wrong password produce the same response
//! - Registration never touches the store unless the input and captcha pass

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use axum::Form;
use serde::Deserialize;

use crate::auth::AuthError;
use crate::captcha::RESPONSE_FIELD;
use crate::http::detect::is_websocket_upgrade;
use crate::http::pages::View;
use crate::http::server::AppState;
use crate::http::websocket::requested_protocols;
use crate::observability::metrics;
use crate::session::Session;

pub const CAPTCHA_FAILED_MESSAGE: &str =
    "Failed to verify the reCaptcha. Please verify that you are human and try again.";
pub const USER_EXISTS_MESSAGE: &str =
    "The user already exists. Please try again with a different username.";
pub const EMPTY_INPUT_MESSAGE: &str = "Username and password must not be empty.";
pub const NAME_TOO_LONG_MESSAGE: &str = "Username is too long.";

/// Longest username accepted at registration, in bytes.
pub const MAX_USERNAME_LEN: usize = 256;
pub const LOGIN_FAILED_NOTICE: &str = "Login failed";

/// Login form body.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Registration form body.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(rename = "g-recaptcha-response", default)]
    pub captcha_response: String,
}

/// Access log line for the auth endpoints.
pub async fn log_access(request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_default();
    tracing::info!(
        method = %request.method(),
        url = %request.uri(),
        client = %client,
        "HTTP Request"
    );
    next.run(request).await
}

pub async fn menu(State(state): State<AppState>) -> Html<String> {
    state.pages.render(View::Menu)
}

pub async fn get_login(State(state): State<AppState>, headers: HeaderMap) -> Html<String> {
    if state.sessions.load(&headers).logged_in {
        return state.pages.render(View::AlreadyLoggedIn);
    }
    state.pages.render(View::Login)
}

pub async fn post_login(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    Form(form): Form<LoginForm>,
) -> Response {
    let store = state.credentials.clone();
    let username = form.username.clone();
    let outcome = tokio::task::spawn_blocking(move || store.check(&username, &form.password))
        .await
        .unwrap_or_else(|e| Err(AuthError::Storage(e.to_string())));

    match outcome {
        Ok(()) => {}
        Err(AuthError::UnknownUser | AuthError::WrongPassword) => {
            tracing::info!(client = %client, user = %form.username, "Client failed to log in");
            metrics::record_login("failure");
            return (
                StatusCode::UNAUTHORIZED,
                state.pages.render_with_notice(View::Login, LOGIN_FAILED_NOTICE),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!(user = %form.username, error = %e, "Credential check failed");
            metrics::record_login("error");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
        }
    }

    let mut headers = HeaderMap::new();
    if let Err(e) = state.sessions.save(&Session { logged_in: true }, &mut headers) {
        tracing::error!(error = %e, user = %form.username, "Failed to save session");
        metrics::record_login("error");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
    }

    tracing::info!(client = %client, user = %form.username, "Client logged in");
    metrics::record_login("success");
    (headers, state.pages.render(View::LoginSuccess)).into_response()
}

pub async fn get_register(State(state): State<AppState>) -> Html<String> {
    state.pages.render(View::Register)
}

pub async fn post_register(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    Form(form): Form<RegisterForm>,
) -> Response {
    if form.username.is_empty() || form.password.is_empty() {
        metrics::record_registration("invalid");
        return (StatusCode::BAD_REQUEST, EMPTY_INPUT_MESSAGE).into_response();
    }
    if form.username.len() > MAX_USERNAME_LEN {
        metrics::record_registration("invalid");
        return (StatusCode::BAD_REQUEST, NAME_TOO_LONG_MESSAGE).into_response();
    }

    if !state.captcha.verify(&form.captcha_response, Some(client.ip())).await {
        tracing::error!(
            user = %form.username,
            field = RESPONSE_FIELD,
            "Failed to verify reCaptcha during registration"
        );
        metrics::record_registration("captcha_failed");
        return (StatusCode::BAD_REQUEST, CAPTCHA_FAILED_MESSAGE).into_response();
    }

    let store = state.credentials.clone();
    let username = form.username.clone();
    let result = tokio::task::spawn_blocking(move || store.register(&username, &form.password))
        .await
        .unwrap_or_else(|e| Err(AuthError::Storage(e.to_string())));

    match result {
        Ok(()) => {
            tracing::info!(client = %client, user = %form.username, "User registration");
            metrics::record_registration("success");
            state.pages.render(View::RegisterSuccess).into_response()
        }
        Err(AuthError::UserExists) => {
            tracing::info!(client = %client, user = %form.username, "Registration for existing user");
            metrics::record_registration("exists");
            (StatusCode::PRECONDITION_FAILED, USER_EXISTS_MESSAGE).into_response()
        }
        Err(e) => {
            tracing::error!(user = %form.username, error = %e, "Registration failed");
            metrics::record_registration("error");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub async fn get_logout(State(state): State<AppState>) -> Response {
    let mut headers = HeaderMap::new();
    if let Err(e) = state.sessions.save(&Session { logged_in: false }, &mut headers) {
        tracing::error!(error = %e, "Failed to save session");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response();
    }
    (headers, state.pages.render(View::Logout)).into_response()
}

/// `/` when a root redirect is configured.
pub async fn root_redirect(State(state): State<AppState>) -> Response {
    match state.root_redirect.as_deref() {
        Some(target) => (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, target.to_string())]).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Proxy a request that already passed the login gate.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    // The auth surface owns /proxy/; unknown paths there are not proxied.
    if request.uri().path().starts_with("/proxy/") {
        return StatusCode::NOT_FOUND.into_response();
    }

    if !is_websocket_upgrade(request.headers()) {
        return state.forwarder.forward(request).await;
    }

    let (mut parts, _body) = request.into_parts();
    let upgrade = match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::warn!(url = %parts.uri, error = %rejection, "Malformed websocket upgrade");
            return rejection.into_response();
        }
    };
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    tracing::info!(url = %parts.uri, destination = %state.forwarder.destination(), "Relaying websocket");
    state.relay.accept(upgrade, target, requested_protocols(&parts.headers))
}
