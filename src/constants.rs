//! Application-wide constants for vapid-dispatch.
//!
//! Centralizes the magic numbers used by key handling, delivery and
//! configuration so they can be found in one place.
//!
//! # Categories
//!
//! - **Keys**: PEM framing and VAPID key sizes
//! - **Delivery**: timeouts, TTL and fan-out concurrency
//! - **Configuration**: defaults used when nothing is configured

use std::time::Duration;

// ============================================================================
// Keys
// ============================================================================

/// Marker every PEM document starts with.
pub const PEM_BEGIN_MARKER: &str = "-----BEGIN";

/// Marker that opens a PEM footer line.
pub const PEM_END_MARKER: &str = "-----END";

/// Closing dashes of a PEM header or footer line.
pub const PEM_DASHES: &str = "-----";

/// Width of a PEM body line (RFC 7468).
pub const PEM_LINE_WIDTH: usize = 64;

/// Length of a raw P-256 private scalar.
pub const P256_SCALAR_LEN: usize = 32;

/// Length of an uncompressed SEC1 P-256 point (`0x04 || X || Y`).
pub const P256_UNCOMPRESSED_POINT_LEN: usize = 65;

/// SEC1 tag byte for an uncompressed point.
pub const SEC1_UNCOMPRESSED_TAG: u8 = 0x04;

// ============================================================================
// Delivery
// ============================================================================

/// Upper bound for a single push service request.
///
/// Expiry is classified as a transient failure so one unresponsive
/// endpoint cannot stall the rest of a fan-out.
pub const PUSH_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// How long the push service should hold an undelivered message.
pub const PUSH_TTL_SECS: u32 = 86_400;

/// Deliveries in flight at once within a single dispatch.
pub const DISPATCH_CONCURRENCY: usize = 8;

/// Endpoint prefix length kept in log lines.
pub const ENDPOINT_LOG_PREFIX: usize = 48;

// ============================================================================
// Configuration
// ============================================================================

/// VAPID contact claim used when none is configured.
pub const DEFAULT_VAPID_SUBJECT: &str = "mailto:admin@example.com";

/// Directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "vapid-dispatch";

/// Subscription store file name inside the config dir.
pub const STORE_FILE_NAME: &str = "subscriptions.json";

/// Truncate an endpoint for logging.
///
/// Push service endpoints embed a per-device token; logs only keep a prefix.
pub fn endpoint_for_log(endpoint: &str) -> &str {
    match endpoint.char_indices().nth(ENDPOINT_LOG_PREFIX) {
        Some((idx, _)) => &endpoint[..idx],
        None => endpoint,
    }
}
