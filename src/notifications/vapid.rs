//! VAPID key material for Web Push (RFC 8292).
//!
//! The private key may be configured in several textual encodings (PKCS#8 or
//! SEC1 PEM, possibly mangled; base64url raw scalar; base64url legacy DER).
//! All of them resolve to one [`SigningKeyMaterial`] holding the raw 32-byte
//! scalar, which is what `web-push`'s `VapidSignatureBuilder::from_base64()`
//! expects, and the uncompressed public point subscribers need as their
//! `applicationServerKey`.

// Rust guideline compliant 2026-02

use std::fmt;

use base64::{
    engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD as BASE64URL},
    Engine,
};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, LineEnding};

use super::pem::{normalize_pem, pem_label};
use crate::constants::{
    P256_SCALAR_LEN, P256_UNCOMPRESSED_POINT_LEN, PEM_BEGIN_MARKER, SEC1_UNCOMPRESSED_TAG,
};
use crate::error::{KeyMaterialError, KeyResult};

/// Decode base64 the way keys show up in practice: url-safe or standard
/// alphabet, padding optional.
pub(crate) fn decode_base64_lenient(text: &str) -> Option<Vec<u8>> {
    let stripped = text.trim().trim_end_matches('=');
    BASE64URL
        .decode(stripped)
        .or_else(|_| STANDARD_NO_PAD.decode(stripped))
        .ok()
}

/// An independently provisioned VAPID public key.
///
/// Resolved once at configuration load, so nothing downstream has to guess
/// which encoding it is holding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKeySource {
    /// Uncompressed SEC1 point bytes.
    RawBytes(Vec<u8>),
    /// Base64url text of the uncompressed point, distributed exactly as given.
    Base64Url(String),
    /// SubjectPublicKeyInfo PEM (`-----BEGIN PUBLIC KEY-----`).
    Pem(String),
}

impl PublicKeySource {
    /// Public key given as raw point bytes.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::RawBytes(bytes.into())
    }

    /// Public key given as base64url text.
    pub fn from_base64url(text: impl Into<String>) -> Self {
        Self::Base64Url(text.into().trim().to_string())
    }

    /// Public key given as PEM text.
    pub fn from_pem(text: impl Into<String>) -> Self {
        Self::Pem(text.into())
    }

    /// Pick the variant for configured text: PEM if it carries a PEM header,
    /// base64url otherwise.
    pub fn parse(text: &str) -> Self {
        let normalized = normalize_pem(text);
        if normalized.trim_start().starts_with(PEM_BEGIN_MARKER) {
            Self::from_pem(normalized)
        } else {
            Self::from_base64url(text)
        }
    }

    /// Checked base64url text to hand to subscribers.
    pub fn to_base64url(&self) -> KeyResult<String> {
        self.resolve().map(|(_, distributed)| distributed)
    }

    /// Decode to the 65-byte uncompressed point and the base64url string to
    /// hand to subscribers.
    fn resolve(&self) -> KeyResult<([u8; P256_UNCOMPRESSED_POINT_LEN], String)> {
        match self {
            Self::RawBytes(bytes) => {
                let point = validate_point(bytes)?;
                Ok((point, BASE64URL.encode(point)))
            }
            Self::Base64Url(text) => {
                let bytes = decode_base64_lenient(text).ok_or_else(|| {
                    KeyMaterialError::InvalidPublicKey("not valid base64url".to_string())
                })?;
                let point = validate_point(&bytes)?;
                Ok((point, text.clone()))
            }
            Self::Pem(pem) => {
                let key = p256::PublicKey::from_public_key_pem(&normalize_pem(pem))
                    .map_err(|e| KeyMaterialError::InvalidPublicKey(e.to_string()))?;
                let encoded = key.to_encoded_point(false);
                let point = validate_point(encoded.as_bytes())?;
                Ok((point, BASE64URL.encode(point)))
            }
        }
    }
}

/// Check that bytes are an uncompressed point on P-256.
fn validate_point(bytes: &[u8]) -> KeyResult<[u8; P256_UNCOMPRESSED_POINT_LEN]> {
    let point: [u8; P256_UNCOMPRESSED_POINT_LEN] = bytes.try_into().map_err(|_| {
        KeyMaterialError::InvalidPublicKey(format!(
            "expected {P256_UNCOMPRESSED_POINT_LEN} bytes, got {}",
            bytes.len()
        ))
    })?;
    if point[0] != SEC1_UNCOMPRESSED_TAG {
        return Err(KeyMaterialError::InvalidPublicKey(
            "must be an uncompressed point (0x04 prefix)".to_string(),
        ));
    }
    p256::PublicKey::from_sec1_bytes(&point)
        .map_err(|_| KeyMaterialError::InvalidPublicKey("point is not on P-256".to_string()))?;
    Ok(point)
}

/// The application's VAPID identity.
///
/// The private half is the raw 32-byte P-256 scalar (base64url). It is only
/// readable inside the crate, where the push transport signs with it.
pub struct SigningKeyMaterial {
    signing_key: SigningKey,
    /// Raw 32-byte P-256 private key scalar (base64url).
    private_key_b64: String,
    /// Uncompressed public key bytes (base64url, 65 bytes decoded).
    public_key_b64: String,
}

impl fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyMaterial")
            .field("private_key", &"[REDACTED]")
            .field("public_key", &self.public_key_b64)
            .finish()
    }
}

impl SigningKeyMaterial {
    /// Generate a fresh VAPID keypair.
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Resolve configured key text into signing material.
    ///
    /// `private_key` goes through [`normalize_pem`] first. When
    /// `public_key` is supplied it must match the private key.
    pub fn from_config(
        private_key: Option<&str>,
        public_key: Option<&PublicKeySource>,
    ) -> KeyResult<Self> {
        let raw = private_key
            .filter(|k| !k.trim().is_empty())
            .ok_or(KeyMaterialError::Missing)?;

        let mut material = Self::from_signing_key(parse_private_key(raw)?);

        if let Some(source) = public_key {
            let (point, distributed) = source.resolve()?;
            let derived = material.public_key_bytes();
            if point[..] != derived[..] {
                return Err(KeyMaterialError::PublicKeyMismatch);
            }
            material.public_key_b64 = distributed;
        }

        Ok(material)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        // SEC1 uncompressed public key (65 bytes: 0x04 || x || y)
        let public_bytes = signing_key.verifying_key().to_encoded_point(false);
        let public_key_b64 = BASE64URL.encode(public_bytes.as_bytes());

        // Raw 32-byte private key scalar for web-push from_base64()
        let private_key_b64 = BASE64URL.encode(signing_key.to_bytes().as_slice());

        Self {
            signing_key,
            private_key_b64,
            public_key_b64,
        }
    }

    /// Base64url-encoded uncompressed public key (65 bytes decoded).
    ///
    /// This is sent to browsers as the VAPID `applicationServerKey`.
    pub fn public_key_base64url(&self) -> &str {
        &self.public_key_b64
    }

    /// Uncompressed public key bytes (65 bytes).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Base64url-encoded raw 32-byte private key scalar.
    pub(crate) fn private_key_base64url(&self) -> &str {
        &self.private_key_b64
    }

    /// PKCS#8 PEM export of the private key, for `keys generate`.
    pub fn to_pkcs8_pem(&self) -> KeyResult<String> {
        let secret: p256::SecretKey = self.signing_key.clone().into();
        secret
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.as_str().to_owned())
            .map_err(|e| KeyMaterialError::InvalidPrivateKey(e.to_string()))
    }

    /// Base64url raw scalar export, for `keys generate`.
    pub fn export_private_base64url(&self) -> &str {
        &self.private_key_b64
    }
}

/// Parse any supported private key encoding into a P-256 signing key.
fn parse_private_key(raw: &str) -> KeyResult<SigningKey> {
    let normalized = normalize_pem(raw);
    let trimmed = normalized.trim();

    if trimmed.starts_with(PEM_BEGIN_MARKER) {
        return match pem_label(trimmed) {
            Some("PRIVATE KEY") => SigningKey::from_pkcs8_pem(&normalized)
                .map_err(|e| KeyMaterialError::InvalidPrivateKey(e.to_string())),
            Some("EC PRIVATE KEY") => p256::SecretKey::from_sec1_pem(&normalized)
                .map(SigningKey::from)
                .map_err(|e| KeyMaterialError::InvalidPrivateKey(e.to_string())),
            Some(other) => Err(KeyMaterialError::UnsupportedLabel(other.to_string())),
            None => Err(KeyMaterialError::MalformedPem(
                "header has no label".to_string(),
            )),
        };
    }

    let bytes = decode_base64_lenient(trimmed).ok_or_else(|| {
        KeyMaterialError::MalformedPem("not PEM and not valid base64url".to_string())
    })?;

    if bytes.len() == P256_SCALAR_LEN {
        return SigningKey::from_bytes(bytes.as_slice().into())
            .map_err(|_| KeyMaterialError::InvalidPrivateKey("scalar out of range".to_string()));
    }

    // Legacy stores kept SEC1 DER (~121 bytes) or PKCS8 DER (~138 bytes).
    if let Ok(secret) = p256::SecretKey::from_sec1_der(&bytes) {
        log::info!(
            "[Keys] Migrated VAPID key from SEC1 DER ({} bytes) to raw scalar",
            bytes.len()
        );
        return Ok(SigningKey::from(secret));
    }
    let key = SigningKey::from_pkcs8_der(&bytes).map_err(|e| {
        KeyMaterialError::InvalidPrivateKey(format!(
            "{} bytes is not a raw scalar, SEC1 DER, or PKCS8 DER: {e}",
            bytes.len()
        ))
    })?;
    log::info!(
        "[Keys] Migrated VAPID key from PKCS8 DER ({} bytes) to raw scalar",
        bytes.len()
    );
    Ok(key)
}
