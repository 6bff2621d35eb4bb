//! Human verification for registration.
//!
//! # Responsibilities
//! - Decide whether a registration form came from a human
//!
//! # Design Decisions
//! - Verifier is a trait object in the gateway context so tests can swap it
//! - Any transport or decoding failure counts as "not verified"
//! - An empty secret disables verification entirely (startup warns)

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Form field carrying the widget's response token.
pub const RESPONSE_FIELD: &str = "g-recaptcha-response";

const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

#[async_trait]
pub trait CaptchaVerifier: Send + Sync {
    /// True iff `token` proves a human submitted the form.
    async fn verify(&self, token: &str, remote_ip: Option<IpAddr>) -> bool;
}

/// Verifier used when no secret is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl CaptchaVerifier for AcceptAll {
    async fn verify(&self, _token: &str, _remote_ip: Option<IpAddr>) -> bool {
        true
    }
}

#[derive(Debug, Error)]
pub enum CaptchaError {
    #[error("no captcha response in form")]
    MissingResponse,
    #[error("siteverify request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("siteverify rejected the response: {0:?}")]
    Rejected(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(rename = "error-codes", default)]
    error_codes: Vec<String>,
}

/// Google reCAPTCHA `siteverify` client.
#[derive(Debug, Clone)]
pub struct Recaptcha {
    client: reqwest::Client,
    secret: String,
    endpoint: String,
}

impl Recaptcha {
    pub fn new(secret: impl Into<String>) -> Result<Self, CaptchaError> {
        Self::with_endpoint(secret, SITEVERIFY_URL)
    }

    /// Point the verifier at another `siteverify`-compatible endpoint.
    pub fn with_endpoint(secret: impl Into<String>, endpoint: impl Into<String>) -> Result<Self, CaptchaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            client,
            secret: secret.into(),
            endpoint: endpoint.into(),
        })
    }

    pub async fn check(&self, token: &str, remote_ip: Option<IpAddr>) -> Result<(), CaptchaError> {
        if token.is_empty() {
            return Err(CaptchaError::MissingResponse);
        }
        let mut form = vec![("secret", self.secret.clone()), ("response", token.to_string())];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip.to_string()));
        }

        let answer: SiteVerifyResponse = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if answer.success {
            Ok(())
        } else {
            Err(CaptchaError::Rejected(answer.error_codes))
        }
    }
}

#[async_trait]
impl CaptchaVerifier for Recaptcha {
    async fn verify(&self, token: &str, remote_ip: Option<IpAddr>) -> bool {
        match self.check(token, remote_ip).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to verify reCaptcha");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::post, Form, Json, Router};
    use std::collections::HashMap;

    async fn fake_siteverify() -> String {
        let app = Router::new().route(
            "/siteverify",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                let ok = form.get("secret").map(String::as_str) == Some("s3cret")
                    && form.get("response").map(String::as_str) == Some("human");
                Json(serde_json::json!({
                    "success": ok,
                    "error-codes": if ok { vec![] } else { vec!["invalid-input-response"] },
                }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/siteverify", addr)
    }

    #[tokio::test]
    async fn accepts_valid_token() {
        let endpoint = fake_siteverify().await;
        let verifier = Recaptcha::with_endpoint("s3cret", endpoint).unwrap();
        assert!(verifier.verify("human", None).await);
    }

    #[tokio::test]
    async fn rejects_bad_or_missing_token() {
        let endpoint = fake_siteverify().await;
        let verifier = Recaptcha::with_endpoint("s3cret", endpoint).unwrap();
        assert!(matches!(
            verifier.check("robot", None).await,
            Err(CaptchaError::Rejected(codes)) if codes == ["invalid-input-response"]
        ));
        assert!(matches!(verifier.check("", None).await, Err(CaptchaError::MissingResponse)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_not_verified() {
        let verifier = Recaptcha::with_endpoint("s3cret", "http://127.0.0.1:1/siteverify").unwrap();
        assert!(!verifier.verify("human", None).await);
    }
}
