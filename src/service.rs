//! Caller-facing push operations.
//!
//! [`PushService`] is what an HTTP layer (or the bundled CLI) calls. It
//! checks who is asking, canonicalizes what browsers send, decides whom a
//! notification may go to, and hands delivery to the [`Dispatcher`].

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::constants::{endpoint_for_log, P256_UNCOMPRESSED_POINT_LEN, SEC1_UNCOMPRESSED_TAG};
use crate::error::{PushError, PushResult};
use crate::identity::{Identity, UserId};
use crate::notifications::dispatch::{DeliverySummary, DispatchSettings, Dispatcher};
use crate::notifications::keys::KeyMaterialCache;
use crate::notifications::payload::NotificationRequest;
use crate::notifications::store::{Subscription, SubscriptionRepository};
use crate::notifications::transport::PushTransport;
use crate::notifications::vapid::decode_base64_lenient;

/// Who may be named as the recipient of a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPolicy {
    /// Users notify themselves; administrators may notify anyone.
    #[default]
    SelfOnly,
    /// Any authenticated user may notify any user.
    AnyAuthenticated,
}

impl fmt::Display for TargetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SelfOnly => f.write_str("self_only"),
            Self::AnyAuthenticated => f.write_str("any_authenticated"),
        }
    }
}

impl FromStr for TargetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "self_only" | "self" => Ok(Self::SelfOnly),
            "any_authenticated" | "any" => Ok(Self::AnyAuthenticated),
            other => Err(format!(
                "unknown target policy '{other}' (expected self_only or any_authenticated)"
            )),
        }
    }
}

/// Client keys of a browser `PushSubscription`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    /// Browser's ECDH public key.
    #[serde(default)]
    pub p256dh: String,
    /// Auth secret.
    #[serde(default)]
    pub auth: String,
}

/// `PushSubscription.toJSON()` as the browser sends it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Client keys.
    pub keys: SubscriptionKeys,
}

impl SubscribeRequest {
    /// Request from loose parts.
    pub fn new(
        endpoint: impl Into<String>,
        p256dh: impl Into<String>,
        auth: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            keys: SubscriptionKeys {
                p256dh: p256dh.into(),
                auth: auth.into(),
            },
        }
    }
}

/// Re-encode a client key as unpadded base64url.
///
/// Browsers hand out base64url, but hand-rolled clients often `btoa()` the
/// raw bytes instead.
fn canonical_key(field: &'static str, value: &str) -> PushResult<Vec<u8>> {
    if value.trim().is_empty() {
        return Err(PushError::validation(field, "missing"));
    }
    decode_base64_lenient(value)
        .filter(|bytes| !bytes.is_empty())
        .ok_or_else(|| PushError::validation(field, "not valid base64"))
}

/// Subscription, notification and key operations for authenticated callers.
pub struct PushService {
    repository: Arc<dyn SubscriptionRepository>,
    keys: Arc<KeyMaterialCache>,
    dispatcher: Dispatcher,
    policy: TargetPolicy,
    admins: HashSet<UserId>,
}

impl fmt::Debug for PushService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushService")
            .field("dispatcher", &self.dispatcher)
            .field("policy", &self.policy)
            .field("admins", &self.admins)
            .finish_non_exhaustive()
    }
}

impl PushService {
    /// Service with the default `self_only` policy and no administrators.
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        transport: Arc<dyn PushTransport>,
        keys: Arc<KeyMaterialCache>,
        settings: DispatchSettings,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            Arc::clone(&repository),
            transport,
            Arc::clone(&keys),
            settings,
        );
        Self {
            repository,
            keys,
            dispatcher,
            policy: TargetPolicy::default(),
            admins: HashSet::new(),
        }
    }

    /// Service configured from [`Config`]. Builds and initializes the key cache.
    pub fn from_config(
        config: &Config,
        repository: Arc<dyn SubscriptionRepository>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        let keys = Arc::new(KeyMaterialCache::new(&config.vapid));
        keys.initialize();
        Self::new(repository, transport, keys, config.dispatch_settings())
            .with_policy(config.target_policy)
            .with_admins(config.admin_users.iter().cloned())
    }

    /// Set the target policy.
    pub fn with_policy(mut self, policy: TargetPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Grant administrator rights.
    pub fn with_admins(mut self, admins: impl IntoIterator<Item = UserId>) -> Self {
        self.admins.extend(admins);
        self
    }

    /// Whether `user` is an administrator.
    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admins.contains(user)
    }

    /// Register the caller's browser subscription.
    ///
    /// Re-registering an endpoint replaces its keys and moves it to the caller.
    pub async fn subscribe(
        &self,
        identity: &Identity,
        request: SubscribeRequest,
    ) -> PushResult<Subscription> {
        let owner = identity.require()?;
        let endpoint = request.endpoint.trim();
        if endpoint.is_empty() {
            return Err(PushError::validation("endpoint", "must not be empty"));
        }

        let p256dh = canonical_key("p256dh", &request.keys.p256dh)?;
        if p256dh.len() != P256_UNCOMPRESSED_POINT_LEN || p256dh[0] != SEC1_UNCOMPRESSED_TAG {
            return Err(PushError::validation(
                "p256dh",
                format!(
                    "expected a {P256_UNCOMPRESSED_POINT_LEN}-byte uncompressed P-256 point, got {} bytes",
                    p256dh.len()
                ),
            ));
        }
        let auth = canonical_key("auth", &request.keys.auth)?;

        let subscription = self
            .repository
            .upsert(
                endpoint,
                &BASE64URL.encode(p256dh),
                &BASE64URL.encode(auth),
                owner,
            )
            .await?;
        log::info!(
            "[Store] {owner} subscribed {}",
            endpoint_for_log(&subscription.endpoint)
        );
        Ok(subscription)
    }

    /// Remove one of the caller's subscriptions.
    ///
    /// Idempotent: an unknown endpoint, or one owned by someone else, is a
    /// no-op. Returns whether anything was removed.
    pub async fn unsubscribe(&self, identity: &Identity, endpoint: &str) -> PushResult<bool> {
        let owner = identity.require()?;
        let removed = self.repository.delete(endpoint.trim(), owner).await?;
        if removed {
            log::info!("[Store] {owner} unsubscribed {}", endpoint_for_log(endpoint));
        }
        Ok(removed)
    }

    /// The caller's own subscriptions.
    pub async fn my_subscriptions(&self, identity: &Identity) -> PushResult<Vec<Subscription>> {
        let owner = identity.require()?;
        self.repository.list_by_owner(owner).await
    }

    /// Every subscription. Administrators only.
    pub async fn list_all(&self, identity: &Identity) -> PushResult<Vec<Subscription>> {
        let caller = identity.require()?;
        if !self.is_admin(caller) {
            log::warn!("[Dispatch] {caller} tried to list all subscriptions");
            return Err(PushError::unauthorized(
                "listing all subscriptions requires administrator rights",
            ));
        }
        self.repository.list_all().await
    }

    /// Base64url VAPID public key for `pushManager.subscribe()`.
    pub fn vapid_public_key(&self) -> PushResult<String> {
        Ok(self.keys.public_key()?)
    }

    /// Send a notification to the requester or, where allowed, another user.
    pub async fn send(
        &self,
        identity: &Identity,
        request: NotificationRequest,
    ) -> PushResult<DeliverySummary> {
        let target = self.resolve_target(identity, request.target.as_ref())?;
        self.dispatcher
            .dispatch(&target, &request.payload, identity)
            .await
    }

    /// Apply the target policy.
    fn resolve_target(
        &self,
        identity: &Identity,
        target: Option<&UserId>,
    ) -> PushResult<UserId> {
        let requester = identity.require()?;
        let target = match target {
            Some(target) if !target.is_empty() => target,
            _ => return Ok(requester.clone()),
        };
        if target == requester
            || self.policy == TargetPolicy::AnyAuthenticated
            || self.is_admin(requester)
        {
            return Ok(target.clone());
        }
        log::warn!("[Dispatch] {requester} may not notify {target} under {} policy", self.policy);
        Err(PushError::unauthorized(format!(
            "{requester} may not send notifications to {target}"
        )))
    }
}
