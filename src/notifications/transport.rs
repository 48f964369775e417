//! Outbound web push delivery (RFC 8030) with VAPID authentication (RFC 8292).
//!
//! [`PushTransport`] is the seam the dispatcher sends through. The shipped
//! implementation, [`WebPushTransport`], uses the `web-push` crate for RFC 8291
//! payload encryption and VAPID signing, and sends the HTTP request itself
//! via a shared `reqwest::Client`.

// Rust guideline compliant 2026-02

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::vapid::SigningKeyMaterial;
use crate::constants::{PUSH_REQUEST_TIMEOUT, PUSH_TTL_SECS};

/// How bad a failed delivery is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The endpoint is gone and will never accept deliveries again.
    Permanent,
    /// Anything else; the endpoint may work next time.
    Transient,
}

/// Per-endpoint delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?} push failure: {reason}")]
pub struct TransportFailure {
    /// Drives pruning.
    pub kind: FailureKind,
    /// Diagnostic text (status code, response body, network error).
    pub reason: String,
}

impl TransportFailure {
    /// Endpoint is gone (404/410).
    pub fn permanent(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Permanent,
            reason: reason.into(),
        }
    }

    /// Any other failure.
    pub fn transient(reason: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            reason: reason.into(),
        }
    }

    /// Whether the endpoint should be pruned.
    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }
}

/// Everything needed to deliver one message to one endpoint.
#[derive(Debug, Clone, Copy)]
pub struct PushRequest<'a> {
    /// Push service endpoint URL.
    pub endpoint: &'a str,
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: &'a str,
    /// Shared auth secret (base64url).
    pub auth: &'a str,
    /// Serialized notification payload (plaintext; the transport encrypts).
    pub payload: &'a [u8],
    /// VAPID signing material.
    pub signing: &'a SigningKeyMaterial,
    /// VAPID `sub` claim (`mailto:` or `https:` contact).
    pub subject: &'a str,
}

/// Sends one push message.
#[async_trait]
pub trait PushTransport: Send + Sync {
    /// Deliver `request`, classifying any failure as permanent or transient.
    async fn send(&self, request: &PushRequest<'_>) -> Result<(), TransportFailure>;
}

/// Map a push service status code to an outcome.
///
/// 2xx delivered; 404/410 the subscription is gone; everything else,
/// including 429 rate limiting, is worth trying again later.
pub fn classify_status(status: u16, body: &str) -> Result<(), TransportFailure> {
    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(TransportFailure::permanent(format!(
            "subscription expired (HTTP {status})"
        ))),
        429 => Err(TransportFailure::transient("rate limited (HTTP 429)")),
        _ => Err(TransportFailure::transient(format!(
            "web push send failed (HTTP {status}): {body}"
        ))),
    }
}

/// Web push transport over HTTP.
///
/// Reuse one instance across dispatches for connection pooling.
#[derive(Debug, Clone)]
pub struct WebPushTransport {
    client: reqwest::Client,
    ttl: u32,
}

impl WebPushTransport {
    /// Transport with default timeout and TTL.
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_settings(PUSH_REQUEST_TIMEOUT, PUSH_TTL_SECS)
    }

    /// Transport with an explicit request timeout and message TTL.
    pub fn with_settings(timeout: Duration, ttl: u32) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("vapid-dispatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, ttl })
    }

    /// Transport over an existing client.
    pub fn with_client(client: reqwest::Client, ttl: u32) -> Self {
        Self { client, ttl }
    }

    fn build_message(
        &self,
        request: &PushRequest<'_>,
    ) -> Result<web_push::WebPushMessage, web_push::WebPushError> {
        use web_push::{
            ContentEncoding, SubscriptionInfo, VapidSignatureBuilder, WebPushMessageBuilder,
        };

        let sub_info = SubscriptionInfo::new(request.endpoint, request.p256dh, request.auth);

        let mut sig_builder =
            VapidSignatureBuilder::from_base64(request.signing.private_key_base64url(), &sub_info)?;
        sig_builder.add_claim("sub", request.subject);
        let sig = sig_builder.build()?;

        let mut builder = WebPushMessageBuilder::new(&sub_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, request.payload);
        builder.set_vapid_signature(sig);
        builder.set_ttl(self.ttl);

        builder.build()
    }
}

#[async_trait]
impl PushTransport for WebPushTransport {
    async fn send(&self, request: &PushRequest<'_>) -> Result<(), TransportFailure> {
        let message = self
            .build_message(request)
            .map_err(|e| TransportFailure::transient(format!("failed to build web push message: {e}")))?;

        let mut http = self
            .client
            .post(message.endpoint.to_string())
            .header("TTL", message.ttl.to_string());

        if let Some(urgency) = message.urgency {
            http = http.header("Urgency", urgency.to_string());
        }

        if let Some(topic) = message.topic {
            http = http.header("Topic", topic);
        }

        if let Some(push_payload) = message.payload {
            http = http
                .header("Content-Encoding", push_payload.content_encoding.to_str())
                .header("Content-Type", "application/octet-stream");

            for (key, value) in &push_payload.crypto_headers {
                http = http.header(*key, value.as_str());
            }

            http = http.body(push_payload.content);
        }

        let response = http
            .send()
            .await
            .map_err(|e| TransportFailure::transient(format!("web push HTTP request failed: {e}")))?;
        let status = response.status().as_u16();

        if (200..300).contains(&status) {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        classify_status(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(201, ""), Ok(()));
        assert!(classify_status(410, "").unwrap_err().is_permanent());
        assert!(classify_status(404, "").unwrap_err().is_permanent());

        let rate_limited = classify_status(429, "").unwrap_err();
        assert_eq!(rate_limited.kind, FailureKind::Transient);

        let server_error = classify_status(500, "boom").unwrap_err();
        assert_eq!(server_error.kind, FailureKind::Transient);
        assert!(server_error.reason.contains("boom"));

        assert_eq!(
            classify_status(400, "bad").unwrap_err().kind,
            FailureKind::Transient
        );
    }

    #[test]
    fn test_failure_display_includes_reason() {
        let failure = TransportFailure::permanent("gone");
        assert_eq!(failure.to_string(), "Permanent push failure: gone");
    }
}
