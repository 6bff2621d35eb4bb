//! Plain HTTP forwarding to the fixed upstream.
//!
//! # Responsibilities
//! - Rewrite the request URI to `http://<destination><path?query>`
//! - Forward method, headers and streaming body
//! - Stream the upstream response back unmodified
//!
//! # Design Decisions
//! - Hop-by-hop headers are stripped in both directions
//! - Client address appended to `X-Forwarded-For`
//! - No retries: a failed upstream call is a 502 for this request only

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Instant;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::observability::metrics;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Stateless forwarder bound to one destination.
#[derive(Clone)]
pub struct ReverseForwarder {
    client: Client<HttpConnector, Body>,
    destination: String,
}

impl ReverseForwarder {
    pub fn new(destination: impl Into<String>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Forward `request` upstream and return the upstream response.
    pub async fn forward(&self, request: Request<Body>) -> Response {
        let start_time = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let (mut parts, body) = request.into_parts();
        let uri = match self.upstream_uri(&parts.uri) {
            Ok(uri) => uri,
            Err(e) => {
                tracing::error!(destination = %self.destination, error = %e, "Invalid upstream URI");
                metrics::record_proxied(&method, 502, start_time);
                return (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response();
            }
        };
        tracing::debug!(path = %path, destination = %self.destination, "Directing reverse-proxy");

        strip_hop_by_hop(&mut parts.headers);
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut parts.headers, addr);
        }
        parts.uri = uri;
        parts.version = Version::HTTP_11;

        match self.client.request(Request::from_parts(parts, body)).await {
            Ok(response) => {
                metrics::record_proxied(&method, response.status().as_u16(), start_time);
                into_client_response(response)
            }
            Err(e) => {
                tracing::error!(
                    method = %method,
                    path = %path,
                    destination = %self.destination,
                    error = %e,
                    "Upstream error"
                );
                metrics::record_proxied(&method, 502, start_time);
                (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
            }
        }
    }

    fn upstream_uri(&self, original: &Uri) -> Result<Uri, axum::http::Error> {
        let mut uri_parts = original.clone().into_parts();
        uri_parts.scheme = Some(Scheme::HTTP);
        uri_parts.authority = Some(Authority::from_str(&self.destination)?);
        if uri_parts.path_and_query.is_none() {
            uri_parts.path_and_query = Some("/".parse()?);
        }
        Ok(Uri::from_parts(uri_parts)?)
    }
}

fn into_client_response(response: hyper::Response<Incoming>) -> Response {
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named by `Connection` are connection-scoped too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_str(token.trim()).ok())
        .collect();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, ip),
        None => ip,
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_to_destination() {
        let forwarder = ReverseForwarder::new("127.0.0.1:3000");
        let uri: Uri = "/app/data?x=1".parse().unwrap();
        assert_eq!(
            forwarder.upstream_uri(&uri).unwrap().to_string(),
            "http://127.0.0.1:3000/app/data?x=1"
        );

        let absolute: Uri = "https://public.example/a".parse().unwrap();
        assert_eq!(
            forwarder.upstream_uri(&absolute).unwrap().to_string(),
            "http://127.0.0.1:3000/a"
        );
    }

    #[test]
    fn strips_connection_scoped_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-trace"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-trace", HeaderValue::from_static("1"));
        headers.insert(header::COOKIE, HeaderValue::from_static("auth=abc"));

        strip_hop_by_hop(&mut headers);
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get("keep-alive").is_none());
        assert!(headers.get("x-trace").is_none());
        assert_eq!(headers.get(header::COOKIE).unwrap(), "auth=abc");
    }

    #[test]
    fn forwarded_for_accumulates() {
        let mut headers = HeaderMap::new();
        let addr: SocketAddr = "10.0.0.7:5555".parse().unwrap();
        append_forwarded_for(&mut headers, addr);
        assert_eq!(headers.get(&X_FORWARDED_FOR).unwrap(), "10.0.0.7");

        append_forwarded_for(&mut headers, "10.0.0.8:1".parse().unwrap());
        assert_eq!(headers.get(&X_FORWARDED_FOR).unwrap(), "10.0.0.7, 10.0.0.8");
    }
}
