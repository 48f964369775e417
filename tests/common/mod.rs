//! Shared fixtures for integration tests: a scripted transport that never
//! touches the network, and real P-256 client keys.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use vapid_dispatch::notifications::transport::{PushRequest, PushTransport, TransportFailure};
use vapid_dispatch::notifications::{KeyMaterialCache, SigningKeyMaterial};

/// What the scripted transport does for an endpoint.
#[derive(Debug, Clone, Copy)]
pub enum Script {
    Accept,
    Gone,
    ServerError,
    Hang,
}

/// In-memory [`PushTransport`] with per-endpoint scripted responses.
///
/// Unscripted endpoints are accepted. Records every call and the peak
/// number of sends in flight.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: HashMap<String, Script>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    payloads: Mutex<Vec<Vec<u8>>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(mut self, endpoint: &str, script: Script) -> Self {
        self.scripts.insert(endpoint.to_string(), script);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn send(&self, request: &PushRequest<'_>) -> Result<(), TransportFailure> {
        self.calls.lock().unwrap().push(request.endpoint.to_string());
        self.payloads.lock().unwrap().push(request.payload.to_vec());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let script = self
            .scripts
            .get(request.endpoint)
            .copied()
            .unwrap_or(Script::Accept);
        if matches!(script, Script::Hang) {
            std::future::pending::<()>().await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match script {
            Script::Accept | Script::Hang => Ok(()),
            Script::Gone => Err(TransportFailure::permanent("subscription expired (HTTP 410)")),
            Script::ServerError => Err(TransportFailure::transient(
                "web push send failed (HTTP 500): boom",
            )),
        }
    }
}

/// Key cache holding a freshly generated keypair.
pub fn ready_keys() -> Arc<KeyMaterialCache> {
    Arc::new(KeyMaterialCache::from_material(SigningKeyMaterial::generate()))
}

/// Browser-side subscription keys: a real P-256 point and a 16-byte auth secret.
pub fn client_keys() -> (String, String) {
    let secret = p256::SecretKey::random(&mut OsRng);
    let point = secret.public_key().to_encoded_point(false);
    let mut auth = [0u8; 16];
    OsRng.fill_bytes(&mut auth);
    (
        URL_SAFE_NO_PAD.encode(point.as_bytes()),
        URL_SAFE_NO_PAD.encode(auth),
    )
}
