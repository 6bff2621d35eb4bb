//! WebSocket proxy handling.
//!
//! # Responsibilities
//! - Complete upgrade handshake with client
//! - Establish WebSocket connection to the upstream
//! - Bidirectional frame forwarding
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Gateway ←──── WebSocket frames ────→ Upstream
//! ```
//!
//! # Design Decisions
//! - WebSocket handled separately from HTTP request/response
//! - Frame-level forwarding, no transformation and no buffering
//! - One spawned task per relay: client → upstream runs there, upstream → client
//!   runs on the upgrade task
//! - Close frames propagated in both directions; once one direction stops the
//!   other gets a bounded grace period, then it is cancelled
//! - Every exit path drops both halves of both sockets

use std::time::Duration;

use axum::extract::ws::{self, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::observability::metrics;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Relay failures. Each one ends a single relay session only.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to dial upstream {url}: {reason}")]
    UpstreamDial { url: String, reason: String },
    #[error("relay {direction} failed: {reason}")]
    Io { direction: Direction, reason: String },
}

/// Which way a copy loop moves frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ClientToUpstream,
    UpstreamToClient,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::ClientToUpstream => write!(f, "client->upstream"),
            Direction::UpstreamToClient => write!(f, "upstream->client"),
        }
    }
}

/// Bridges upgraded client connections to freshly dialed upstream ones.
#[derive(Debug, Clone)]
pub struct DuplexRelay {
    destination: String,
    handshake_timeout: Duration,
    close_grace: Duration,
}

impl DuplexRelay {
    pub fn new(destination: impl Into<String>, config: &RelayConfig) -> Self {
        Self {
            destination: destination.into(),
            handshake_timeout: Duration::from_millis(config.handshake_timeout_ms),
            close_grace: Duration::from_millis(config.close_grace_ms),
        }
    }

    /// Accept the client's upgrade and relay it to `target` on the upstream.
    ///
    /// `protocols` is offered to the client and requested from the upstream.
    pub fn accept(&self, upgrade: WebSocketUpgrade, target: String, protocols: Vec<String>) -> Response {
        let relay = self.clone();
        let upgrade = if protocols.is_empty() {
            upgrade
        } else {
            upgrade.protocols(protocols.clone())
        };
        tracing::debug!(path = %target, "Upgrading websocket connection");

        upgrade
            .on_failed_upgrade(|e| tracing::error!(error = %e, "WebSocket upgrade failed"))
            .on_upgrade(move |socket| async move {
                relay.run(socket, &target, &protocols).await;
            })
    }

    /// Relay an already upgraded client socket until either side goes away.
    pub async fn run(&self, mut client: WebSocket, target: &str, protocols: &[String]) {
        let relay_id = Uuid::new_v4();
        let url = self.upstream_url(target);

        let upstream = match self.dial(&url, protocols).await {
            Ok(upstream) => upstream,
            Err(e) => {
                tracing::error!(relay_id = %relay_id, error = %e, "Aborting websocket relay");
                metrics::record_relay("dial_failure");
                let close = ws::Message::Close(Some(ws::CloseFrame {
                    code: ws::close_code::ERROR,
                    reason: ws::Utf8Bytes::from_static("upstream unavailable"),
                }));
                let _ = client.send(close).await;
                let _ = SinkExt::close(&mut client).await;
                return;
            }
        };
        tracing::debug!(relay_id = %relay_id, url = %url, "Connected to upstream websocket");

        let _active = metrics::ActiveRelay::enter();
        let (client_tx, client_rx) = client.split();
        let (upstream_tx, upstream_rx) = upstream.split();

        let mut outbound = tokio::spawn(pump(client_rx, upstream_tx, Direction::ClientToUpstream));
        let inbound = pump(upstream_rx, client_tx, Direction::UpstreamToClient);
        tokio::pin!(inbound);

        let mut failed = false;
        tokio::select! {
            joined = &mut outbound => {
                failed |= report(&url, flatten(joined, Direction::ClientToUpstream));
                match tokio::time::timeout(self.close_grace, &mut inbound).await {
                    Ok(result) => failed |= report(&url, result),
                    Err(_) => tracing::warn!(
                        url = %url,
                        direction = %Direction::UpstreamToClient,
                        "Relay direction did not stop in time, dropping it"
                    ),
                }
            }
            result = &mut inbound => {
                failed |= report(&url, result);
                match tokio::time::timeout(self.close_grace, &mut outbound).await {
                    Ok(joined) => failed |= report(&url, flatten(joined, Direction::ClientToUpstream)),
                    Err(_) => {
                        tracing::warn!(
                            url = %url,
                            direction = %Direction::ClientToUpstream,
                            "Relay direction did not stop in time, cancelling it"
                        );
                        outbound.abort();
                        let _ = outbound.await;
                    }
                }
            }
        }

        metrics::record_relay(if failed { "error" } else { "closed" });
        tracing::debug!(relay_id = %relay_id, url = %url, "Websocket relay finished");
    }

    /// `ws://<destination><target>`, normalized.
    fn upstream_url(&self, target: &str) -> String {
        let raw = format!("ws://{}{}", self.destination, target);
        match Url::parse(&raw) {
            Ok(url) => url.into(),
            Err(_) => raw,
        }
    }

    /// Dial the upstream with the configured handshake timeout.
    pub async fn dial(&self, url: &str, protocols: &[String]) -> Result<UpstreamSocket, RelayError> {
        let dial_error = |reason: String| RelayError::UpstreamDial {
            url: url.to_string(),
            reason,
        };

        let mut request = url
            .into_client_request()
            .map_err(|e| dial_error(e.to_string()))?;
        if !protocols.is_empty() {
            let value = HeaderValue::from_str(&protocols.join(", "))
                .map_err(|e| dial_error(e.to_string()))?;
            request.headers_mut().insert(SEC_WEBSOCKET_PROTOCOL, value);
        }

        tracing::debug!(url = %url, "Dialing upstream websocket");
        match tokio::time::timeout(self.handshake_timeout, tokio_tungstenite::connect_async(request)).await {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(e)) => Err(dial_error(e.to_string())),
            Err(_) => Err(dial_error(format!(
                "handshake timed out after {:?}",
                self.handshake_timeout
            ))),
        }
    }
}

/// Subprotocols listed by the client in `Sec-WebSocket-Protocol`.
pub fn requested_protocols(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SEC_WEBSOCKET_PROTOCOL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// A message that can cross to the other side of the relay.
trait RelayFrame: Sized {
    type Peer;

    fn is_close(&self) -> bool;

    fn into_peer(self) -> Option<Self::Peer>;
}

impl RelayFrame for ws::Message {
    type Peer = Message;

    fn is_close(&self) -> bool {
        matches!(self, ws::Message::Close(_))
    }

    fn into_peer(self) -> Option<Message> {
        match self {
            ws::Message::Text(text) => Some(Message::Text(text.as_str().to_owned().into())),
            ws::Message::Binary(data) => Some(Message::Binary(data)),
            // Each side answers its own pings.
            ws::Message::Ping(_) | ws::Message::Pong(_) => None,
            ws::Message::Close(frame) => Some(Message::Close(frame.map(|f| CloseFrame {
                code: CloseCode::from(f.code),
                reason: f.reason.as_str().to_owned().into(),
            }))),
        }
    }
}

impl RelayFrame for Message {
    type Peer = ws::Message;

    fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }

    fn into_peer(self) -> Option<ws::Message> {
        match self {
            Message::Text(text) => Some(ws::Message::Text(text.as_str().to_owned().into())),
            Message::Binary(data) => Some(ws::Message::Binary(data)),
            Message::Ping(_) | Message::Pong(_) => None,
            Message::Close(frame) => Some(ws::Message::Close(frame.map(|f| ws::CloseFrame {
                code: u16::from(f.code),
                reason: f.reason.as_str().to_owned().into(),
            }))),
            // Raw frames never come out of a read.
            Message::Frame(_) => None,
        }
    }
}

/// Copy frames from `source` to `sink` until the source ends or fails.
///
/// A read error after a close frame has been seen counts as a clean close.
async fn pump<S, K, M, E>(mut source: S, mut sink: K, direction: Direction) -> Result<(), RelayError>
where
    S: Stream<Item = Result<M, E>> + Unpin,
    E: std::fmt::Display,
    M: RelayFrame,
    K: Sink<M::Peer> + Unpin,
    K::Error: std::fmt::Display,
{
    let mut saw_close = false;
    let outcome = loop {
        match source.next().await {
            Some(Ok(message)) => {
                saw_close |= message.is_close();
                let Some(message) = message.into_peer() else {
                    continue;
                };
                if let Err(e) = sink.send(message).await {
                    if saw_close {
                        break Ok(());
                    }
                    break Err(RelayError::Io {
                        direction,
                        reason: format!("write: {}", e),
                    });
                }
            }
            Some(Err(e)) if saw_close => {
                tracing::trace!(direction = %direction, error = %e, "Read error after close frame");
                break Ok(());
            }
            Some(Err(e)) => {
                break Err(RelayError::Io {
                    direction,
                    reason: format!("read: {}", e),
                })
            }
            None => break Ok(()),
        }
    };

    // Closing our destination prompts that peer to close too, which ends
    // the opposite copy loop.
    let _ = sink.close().await;
    outcome.map(|()| {
        tracing::trace!(direction = %direction, "Copy loop finished");
    })
}

fn flatten(
    joined: Result<Result<(), RelayError>, tokio::task::JoinError>,
    direction: Direction,
) -> Result<(), RelayError> {
    joined.unwrap_or_else(|e| {
        Err(RelayError::Io {
            direction,
            reason: format!("task: {}", e),
        })
    })
}

/// Log a copy loop's outcome. Returns true if it failed.
fn report(url: &str, result: Result<(), RelayError>) -> bool {
    match result {
        Ok(()) => {
            tracing::debug!(url = %url, "Source closed connection during WS proxying");
            false
        }
        Err(e) => {
            tracing::error!(url = %url, error = %e, "Error while proxying WS data");
            true
        }
    }
}
