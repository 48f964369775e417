//! Push subscription storage.
//!
//! [`SubscriptionRepository`] is the CRUD contract the dispatcher and the
//! service layer depend on. Records are keyed by endpoint: an endpoint
//! belongs to exactly one user, and re-registering it (by anyone) replaces
//! the previous record.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemorySubscriptionStore`] keeps everything in a map behind an async lock
//! - [`JsonFileSubscriptionStore`] adds persistence to a JSON file, rewritten
//!   after each mutation, so subscriptions survive restarts

// Rust guideline compliant 2026-02

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::constants::endpoint_for_log;
use crate::error::{PushError, PushResult, StoreError};
use crate::identity::UserId;

/// A browser's push subscription, owned by one user.
///
/// Contains everything needed to send a web push message to that browser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
    /// User that registered the endpoint most recently.
    pub owner: UserId,
    /// First registration of this endpoint.
    pub created_at: DateTime<Utc>,
    /// Last re-registration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Validate the fields of an upsert.
fn validate(endpoint: &str, p256dh: &str, auth: &str) -> PushResult<()> {
    if endpoint.trim().is_empty() {
        return Err(PushError::validation("endpoint", "must not be empty"));
    }
    if p256dh.trim().is_empty() {
        return Err(PushError::validation("p256dh", "client public key is missing"));
    }
    if auth.trim().is_empty() {
        return Err(PushError::validation("auth", "auth secret is missing"));
    }
    Ok(())
}

/// CRUD contract over subscription records.
///
/// `upsert` and the deletes are atomic per call; concurrent writers to the
/// same endpoint resolve as last writer wins.
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert or overwrite the record for `endpoint`, reassigning ownership.
    ///
    /// Fails with `Validation` when the endpoint is empty or a key is missing.
    async fn upsert(
        &self,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
        owner: &UserId,
    ) -> PushResult<Subscription>;

    /// Remove `endpoint` if `owner` owns it. Anything else is a no-op.
    ///
    /// Returns whether a record was removed.
    async fn delete(&self, endpoint: &str, owner: &UserId) -> PushResult<bool>;

    /// Remove `endpoint` regardless of owner. Used to prune dead endpoints.
    ///
    /// Returns whether a record was removed.
    async fn delete_by_endpoint(&self, endpoint: &str) -> PushResult<bool>;

    /// All subscriptions owned by `owner`, ordered by endpoint.
    async fn list_by_owner(&self, owner: &UserId) -> PushResult<Vec<Subscription>>;

    /// Every subscription, ordered by endpoint.
    async fn list_all(&self) -> PushResult<Vec<Subscription>>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// Subscriptions held in memory.
#[derive(Debug, Default)]
pub struct MemorySubscriptionStore {
    /// Maps endpoint → subscription.
    subscriptions: RwLock<BTreeMap<String, Subscription>>,
}

impl MemorySubscriptionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with records (loaded from disk, fixtures).
    pub fn with_subscriptions(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        Self {
            subscriptions: RwLock::new(
                subscriptions
                    .into_iter()
                    .map(|s| (s.endpoint.clone(), s))
                    .collect(),
            ),
        }
    }

    /// Number of stored subscriptions.
    pub async fn len(&self) -> usize {
        self.subscriptions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.subscriptions.read().await.is_empty()
    }

    /// Check if an endpoint is registered.
    pub async fn contains(&self, endpoint: &str) -> bool {
        self.subscriptions.read().await.contains_key(endpoint)
    }

    fn upsert_locked(
        map: &mut BTreeMap<String, Subscription>,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
        owner: &UserId,
    ) -> Subscription {
        let now = Utc::now();
        let record = match map.get(endpoint) {
            Some(existing) => {
                if existing.owner != *owner {
                    log::info!(
                        "[Store] Endpoint {} moves from {} to {}",
                        endpoint_for_log(endpoint),
                        existing.owner,
                        owner
                    );
                }
                Subscription {
                    endpoint: endpoint.to_string(),
                    p256dh: p256dh.to_string(),
                    auth: auth.to_string(),
                    owner: owner.clone(),
                    created_at: existing.created_at,
                    updated_at: Some(now),
                }
            }
            None => Subscription {
                endpoint: endpoint.to_string(),
                p256dh: p256dh.to_string(),
                auth: auth.to_string(),
                owner: owner.clone(),
                created_at: now,
                updated_at: None,
            },
        };
        map.insert(endpoint.to_string(), record.clone());
        record
    }

    fn delete_locked(
        map: &mut BTreeMap<String, Subscription>,
        endpoint: &str,
        owner: Option<&UserId>,
    ) -> bool {
        let owned = match (map.get(endpoint), owner) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(existing), Some(owner)) => existing.owner == *owner,
        };
        if owned {
            map.remove(endpoint);
        }
        owned
    }
}

#[async_trait]
impl SubscriptionRepository for MemorySubscriptionStore {
    async fn upsert(
        &self,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
        owner: &UserId,
    ) -> PushResult<Subscription> {
        validate(endpoint, p256dh, auth)?;
        let mut map = self.subscriptions.write().await;
        Ok(Self::upsert_locked(&mut map, endpoint, p256dh, auth, owner))
    }

    async fn delete(&self, endpoint: &str, owner: &UserId) -> PushResult<bool> {
        let mut map = self.subscriptions.write().await;
        Ok(Self::delete_locked(&mut map, endpoint, Some(owner)))
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> PushResult<bool> {
        let mut map = self.subscriptions.write().await;
        Ok(Self::delete_locked(&mut map, endpoint, None))
    }

    async fn list_by_owner(&self, owner: &UserId) -> PushResult<Vec<Subscription>> {
        let map = self.subscriptions.read().await;
        Ok(map.values().filter(|s| s.owner == *owner).cloned().collect())
    }

    async fn list_all(&self) -> PushResult<Vec<Subscription>> {
        Ok(self.subscriptions.read().await.values().cloned().collect())
    }
}

// ============================================================================
// JSON file store
// ============================================================================

/// On-disk format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    subscriptions: Vec<Subscription>,
}

/// Subscriptions persisted to a JSON file.
///
/// The file is read once on open and rewritten after every mutation while
/// the write lock is held, so the file never lags behind a completed call.
/// Mutations are staged on a copy; a failed write leaves memory unchanged.
#[derive(Debug)]
pub struct JsonFileSubscriptionStore {
    path: PathBuf,
    subscriptions: RwLock<BTreeMap<String, Subscription>>,
}

impl JsonFileSubscriptionStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let subscriptions = match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                let file: StoreFile = serde_json::from_str(&content)?;
                file.subscriptions
                    .into_iter()
                    .map(|s| (s.endpoint.clone(), s))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        log::info!(
            "[Store] Loaded {} push subscription(s) from {}",
            subscriptions.len(),
            path.display()
        );

        Ok(Self {
            path,
            subscriptions: RwLock::new(subscriptions),
        })
    }

    /// Backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove `endpoint` (owner-scoped when `owner` is given). The map only
    /// changes once the file has been rewritten.
    async fn remove(&self, endpoint: &str, owner: Option<&UserId>) -> PushResult<bool> {
        let mut map = self.subscriptions.write().await;
        let mut staged = map.clone();
        if !MemorySubscriptionStore::delete_locked(&mut staged, endpoint, owner) {
            return Ok(false);
        }
        self.persist(&staged).await?;
        *map = staged;
        Ok(true)
    }

    async fn persist(&self, map: &BTreeMap<String, Subscription>) -> Result<(), StoreError> {
        let file = StoreFile {
            subscriptions: map.values().cloned().collect(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, content).await?;

        // Endpoints and auth secrets are credentials: owner read/write only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            tokio::fs::set_permissions(&self.path, perms).await?;
        }

        log::debug!(
            "[Store] Saved {} push subscription(s) to {}",
            map.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl SubscriptionRepository for JsonFileSubscriptionStore {
    async fn upsert(
        &self,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
        owner: &UserId,
    ) -> PushResult<Subscription> {
        validate(endpoint, p256dh, auth)?;
        let mut map = self.subscriptions.write().await;
        let mut staged = map.clone();
        let record =
            MemorySubscriptionStore::upsert_locked(&mut staged, endpoint, p256dh, auth, owner);
        self.persist(&staged).await?;
        *map = staged;
        Ok(record)
    }

    async fn delete(&self, endpoint: &str, owner: &UserId) -> PushResult<bool> {
        self.remove(endpoint, Some(owner)).await
    }

    async fn delete_by_endpoint(&self, endpoint: &str) -> PushResult<bool> {
        self.remove(endpoint, None).await
    }

    async fn list_by_owner(&self, owner: &UserId) -> PushResult<Vec<Subscription>> {
        let map = self.subscriptions.read().await;
        Ok(map.values().filter(|s| s.owner == *owner).cloned().collect())
    }

    async fn list_all(&self) -> PushResult<Vec<Subscription>> {
        Ok(self.subscriptions.read().await.values().cloned().collect())
    }
}
