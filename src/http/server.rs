//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the gateway context once and inject it into every handler
//! - Create Axum Router: auth routes, static assets, gated proxy surface
//! - Wire up middleware (request ID, tracing, login gate)
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderName, HeaderValue};
use axum::middleware;
use axum::routing::{any, get};
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::auth::CredentialStore;
use crate::captcha::CaptchaVerifier;
use crate::config::GatewayConfig;
use crate::http::forward::ReverseForwarder;
use crate::http::handlers;
use crate::http::pages::Pages;
use crate::http::websocket::DuplexRelay;
use crate::session::{require_login, SessionError, SessionStore};

const STATIC_CACHE_CONTROL: &str = "public, max-age=360000";

/// Gateway context injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: SessionStore,
    pub captcha: Arc<dyn CaptchaVerifier>,
    pub pages: Arc<Pages>,
    pub forwarder: ReverseForwarder,
    pub relay: DuplexRelay,
    pub root_redirect: Option<Arc<str>>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("cannot load page overrides: {0}")]
    Pages(#[from] std::io::Error),
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server from validated configuration.
    pub fn new(
        config: &GatewayConfig,
        credentials: Arc<dyn CredentialStore>,
        captcha: Arc<dyn CaptchaVerifier>,
    ) -> Result<Self, ServerError> {
        let sessions = SessionStore::new(
            config.keys.authentication_key.as_bytes(),
            config.keys.encryption_key.as_bytes(),
            &config.session,
        )?;

        let mut pages = Pages::new(config.keys.recaptcha_site_key.clone());
        if let Some(dir) = &config.web.pages_dir {
            pages = pages.with_overrides(dir)?;
        }

        let destination = config.upstream.destination.clone();
        let state = AppState {
            credentials,
            sessions,
            captcha,
            pages: Arc::new(pages),
            forwarder: ReverseForwarder::new(destination.clone()),
            relay: DuplexRelay::new(destination, &config.relay),
            root_redirect: config.web.root_redirect.as_deref().map(Arc::from),
        };

        let router = Self::build_router(config, state);
        Ok(Self { router })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let mut auth = Router::new()
            .route("/proxy/", get(handlers::menu))
            .route("/proxy/login", get(handlers::get_login).post(handlers::post_login))
            .route("/proxy/register", get(handlers::get_register).post(handlers::post_register))
            .route("/proxy/logout", get(handlers::get_logout));

        if let Some(dir) = &config.web.static_dir {
            let files = ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static(STATIC_CACHE_CONTROL),
                ))
                .service(ServeDir::new(dir));
            auth = auth.nest_service("/proxy/static", files);
            tracing::info!(dir = %dir.display(), "Static route setup");
        }
        let auth = auth.layer(middleware::from_fn(handlers::log_access));

        let mut proxied = Router::new().route("/{*path}", any(handlers::dispatch));
        let root = if state.root_redirect.is_some() {
            Router::new().route("/", any(handlers::root_redirect))
        } else {
            proxied = proxied.route("/", any(handlers::dispatch));
            Router::new()
        };
        let proxied = proxied.route_layer(middleware::from_fn_with_state(
            state.sessions.clone(),
            require_login,
        ));

        let x_request_id = HeaderName::from_static("x-request-id");
        Router::new()
            .merge(auth)
            .merge(root)
            .merge(proxied)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::new(x_request_id)),
            )
    }

    /// The fully layered router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        // Serve with graceful shutdown
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
