//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use authprox::auth::{AuthError, CredentialStore, User};
use authprox::captcha::{AcceptAll, CaptchaVerifier};
use authprox::config::loader::generate_keys;
use authprox::config::GatewayConfig;
use authprox::http::HttpServer;
use authprox::lifecycle::Shutdown;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::header::{COOKIE, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

/// Plain HTTP backend answering every request with its own request line.
pub struct MockBackend {
    pub addr: SocketAddr,
    pub hits: Arc<AtomicUsize>,
}

pub async fn start_mock_backend() -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let counter = counter.clone();
            tokio::spawn(async move {
                let head = read_head(&mut socket).await;
                counter.fetch_add(1, Ordering::SeqCst);
                let request_line = head.lines().next().unwrap_or_default().to_string();
                let forwarded = head
                    .lines()
                    .find(|l| l.to_ascii_lowercase().starts_with("x-forwarded-for:"))
                    .map(|l| l.to_string())
                    .unwrap_or_default();
                let body = format!("{}\n{}", request_line, forwarded);
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    MockBackend { addr, hits }
}

async fn read_head(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// What a mock WebSocket upstream does with each connection.
#[derive(Debug, Clone, Copy)]
pub enum WsBehavior {
    /// Echo every data frame until the peer closes.
    Echo,
    /// Send a greeting first, then echo.
    Greet(&'static str),
    /// Echo the first data frame, then close from the upstream side.
    EchoOnceThenClose,
}

pub struct WsBackend {
    pub addr: SocketAddr,
    pub connections: Arc<AtomicUsize>,
    /// Set once a connection's handler has observed the socket closing.
    pub closed: Arc<AtomicBool>,
}

pub async fn start_ws_backend(behavior: WsBehavior) -> WsBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicUsize::new(0));
    let closed = Arc::new(AtomicBool::new(false));
    let (conn_count, closed_flag) = (connections.clone(), closed.clone());

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let (conn_count, closed_flag) = (conn_count.clone(), closed_flag.clone());
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, select_first_protocol).await else {
                    return;
                };
                conn_count.fetch_add(1, Ordering::SeqCst);

                if let WsBehavior::Greet(greeting) = behavior {
                    let _ = ws.send(Message::text(greeting.to_string())).await;
                }
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Text(_) | Message::Binary(_) => {
                            if ws.send(message).await.is_err() {
                                break;
                            }
                            if let WsBehavior::EchoOnceThenClose = behavior {
                                let _ = ws.close(None).await;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                // Drain until the transport is gone.
                while let Some(Ok(_)) = ws.next().await {}
                closed_flag.store(true, Ordering::SeqCst);
            });
        }
    });

    WsBackend {
        addr,
        connections,
        closed,
    }
}

fn select_first_protocol(request: &Request, mut response: Response) -> Result<Response, tokio_tungstenite::tungstenite::handshake::server::ErrorResponse> {
    let chosen = request
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|p| p.trim().to_string());
    if let Some(protocol) = chosen {
        if let Ok(value) = HeaderValue::from_str(&protocol) {
            response.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }
    }
    Ok(response)
}

/// Gateway config pointed at `destination`, with fresh keys.
pub fn gateway_config(destination: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.upstream.destination = destination.to_string();
    config.relay.close_grace_ms = 500;
    generate_keys(&mut config);
    config
}

pub struct Gateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a gateway on an ephemeral port, accepting every captcha.
pub async fn spawn_gateway(config: GatewayConfig, store: Arc<dyn CredentialStore>) -> Gateway {
    spawn_gateway_with(config, store, Arc::new(AcceptAll)).await
}

pub async fn spawn_gateway_with(
    config: GatewayConfig,
    store: Arc<dyn CredentialStore>,
    captcha: Arc<dyn CaptchaVerifier>,
) -> Gateway {
    let server = HttpServer::new(&config, store, captcha).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    Gateway { addr, shutdown }
}

/// Captcha verifier that turns everyone away.
pub struct RejectAll;

#[async_trait]
impl CaptchaVerifier for RejectAll {
    async fn verify(&self, _token: &str, _remote_ip: Option<IpAddr>) -> bool {
        false
    }
}

/// Credential store whose backing storage is gone.
pub struct BrokenStore;

impl CredentialStore for BrokenStore {
    fn register(&self, _username: &str, _password: &str) -> Result<(), AuthError> {
        Err(AuthError::Storage("disk on fire".into()))
    }

    fn get(&self, _username: &str) -> Result<User, AuthError> {
        Err(AuthError::Storage("disk on fire".into()))
    }

    fn update(&self, _user: User) -> Result<(), AuthError> {
        Err(AuthError::Storage("disk on fire".into()))
    }
}

/// Client that neither follows redirects nor keeps connections around.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// `name=value` from a `Set-Cookie` header.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

/// Log in and return the session cookie.
pub async fn login(client: &reqwest::Client, gateway: &Gateway, username: &str, password: &str) -> String {
    let response = client
        .post(gateway.url("/proxy/login"))
        .form(&[("username", username), ("password", password)])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200, "login should succeed");
    session_cookie(&response).expect("login sets a session cookie")
}

/// Open a WebSocket through the gateway.
pub async fn connect_ws(
    url: &str,
    cookie: Option<&str>,
    protocols: Option<&str>,
) -> Result<(ClientSocket, tokio_tungstenite::tungstenite::handshake::client::Response), tokio_tungstenite::tungstenite::Error> {
    let mut request = url.into_client_request()?;
    if let Some(cookie) = cookie {
        request.headers_mut().insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
    }
    if let Some(protocols) = protocols {
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_str(protocols).unwrap());
    }
    tokio::time::timeout(WAIT, tokio_tungstenite::connect_async(request))
        .await
        .expect("websocket handshake timed out")
}

/// Poll `flag` until it is set or [`WAIT`] elapses.
pub async fn wait_for(flag: &AtomicBool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
