//! Web push notification delivery.
//!
//! Stores browser push subscriptions per user and fans one notification out
//! to every device a user has registered, signing each request with the
//! server's VAPID key.
//!
//! # Architecture
//!
//! ```text
//! Caller asks to notify a user
//!     ↓
//! Dispatcher loads that user's subscriptions
//!     ↓
//! WebPushTransport encrypts + signs, POSTs to each push service (RFC 8030)
//!     ↓
//! 404/410 responses prune the dead subscription
//!     ↓
//! DeliverySummary back to the caller
//! ```
//!
//! # VAPID Keys
//!
//! The server holds one P-256 ECDSA keypair (VAPID, RFC 8292). The private
//! key arrives from configuration in whatever shape the operator pasted it:
//! PEM with real or escaped newlines, PEM collapsed onto one line, a raw
//! base64url scalar, or legacy DER. [`pem`] and [`vapid`] turn all of these
//! into one signing key; [`keys`] parses it once per process.
//!
//! # Push Subscriptions
//!
//! Browsers register their subscription (endpoint + keys) against the
//! authenticated user. The endpoint URL is the identity of a subscription:
//! registering the same endpoint again replaces its keys and owner.

// Rust guideline compliant 2026-02

pub mod dispatch;
pub mod keys;
pub mod payload;
pub mod pem;
pub mod store;
pub mod transport;
pub mod vapid;

pub use dispatch::{DeliveryOutcome, DeliverySummary, DispatchSettings, DispatchStatus, Dispatcher};
pub use keys::KeyMaterialCache;
pub use payload::{NotificationPayload, NotificationRequest};
pub use store::{JsonFileSubscriptionStore, MemorySubscriptionStore, Subscription, SubscriptionRepository};
pub use transport::{FailureKind, PushRequest, PushTransport, TransportFailure, WebPushTransport};
pub use vapid::{PublicKeySource, SigningKeyMaterial};
