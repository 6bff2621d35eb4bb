//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (logins, registrations, proxied traffic, relays)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `authprox_logins_total` (counter): login attempts by outcome
//! - `authprox_registrations_total` (counter): registrations by outcome
//! - `authprox_proxied_requests_total` (counter): forwarded requests by method, status
//! - `authprox_proxy_request_duration_seconds` (histogram): forwarding latency
//! - `authprox_relay_sessions_total` (counter): finished relays by outcome
//! - `authprox_active_relays` (gauge): relays currently open
//!
//! # Design Decisions
//! - Without an installed exporter every call is a no-op
//! - Labels carry small fixed vocabularies, never usernames

use std::net::SocketAddr;
use std::time::Instant;

use axum::http::Method;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_login(outcome: &'static str) {
    counter!("authprox_logins_total", "outcome" => outcome).increment(1);
}

pub fn record_registration(outcome: &'static str) {
    counter!("authprox_registrations_total", "outcome" => outcome).increment(1);
}

/// Record one forwarded request.
pub fn record_proxied(method: &Method, status: u16, start_time: Instant) {
    counter!(
        "authprox_proxied_requests_total",
        "method" => method_label(method),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("authprox_proxy_request_duration_seconds").record(start_time.elapsed().as_secs_f64());
}

/// Standard methods by name; extension methods share one label.
fn method_label(method: &Method) -> &'static str {
    match method.as_str() {
        "GET" => "GET",
        "POST" => "POST",
        "PUT" => "PUT",
        "DELETE" => "DELETE",
        "HEAD" => "HEAD",
        "OPTIONS" => "OPTIONS",
        "CONNECT" => "CONNECT",
        "PATCH" => "PATCH",
        "TRACE" => "TRACE",
        _ => "other",
    }
}

pub fn record_relay(outcome: &'static str) {
    counter!("authprox_relay_sessions_total", "outcome" => outcome).increment(1);
}

/// Keeps `authprox_active_relays` raised while alive.
pub struct ActiveRelay(());

impl ActiveRelay {
    pub fn enter() -> Self {
        gauge!("authprox_active_relays").increment(1.0);
        Self(())
    }
}

impl Drop for ActiveRelay {
    fn drop(&mut self) {
        gauge!("authprox_active_relays").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_methods_share_a_label() {
        assert_eq!(method_label(&Method::GET), "GET");
        assert_eq!(method_label(&Method::PATCH), "PATCH");
        let custom = Method::from_bytes(b"PURGE-ABC123").unwrap();
        assert_eq!(method_label(&custom), "other");
    }
}
