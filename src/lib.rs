//! vapid-dispatch - VAPID web push dispatch.
//!
//! Stores browser push subscriptions per user and delivers notifications to
//! every device a user has registered, signed with the server's VAPID key.
//!
//! # Architecture
//!
//! - **Identity** - Verified caller handle; every operation requires one
//! - **Key material** - Configured signing key, normalized and parsed once
//! - **Store** - Subscriptions keyed by endpoint, owned by one user
//! - **Dispatcher** - Bounded concurrent fan-out, prunes dead endpoints
//! - **Service** - Caller-facing operations and target policy
//!
//! # Modules
//!
//! - [`notifications`] - Keys, payload, storage, transport and fan-out
//! - [`service`] - [`PushService`], the entry point for callers
//! - [`identity`] - Caller identity
//! - [`config`] - Configuration loading

pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod notifications;
pub mod service;

// Re-export commonly used types
pub use config::{Config, VapidConfig};
pub use error::{KeyMaterialError, PushError, PushResult};
pub use identity::{Identity, IdentityProvider, StaticIdentityProvider, UserId};
pub use notifications::{
    DeliverySummary, Dispatcher, KeyMaterialCache, NotificationPayload, NotificationRequest,
    PushTransport, SigningKeyMaterial, Subscription, SubscriptionRepository,
};
pub use service::{PushService, SubscribeRequest, TargetPolicy};
