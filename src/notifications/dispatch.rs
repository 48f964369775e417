//! Fan-out delivery of one notification to every device of a user.
//!
//! # Flow
//!
//! ```text
//! dispatch(target, payload, requester)
//!     ↓ requester must be authenticated
//!     ↓ signing material must be available (fail fast otherwise)
//!     ↓ list_by_owner(target)
//!     ↓ one transport send per subscription, bounded concurrency, per-send timeout
//!     ↓ 404/410 → delete_by_endpoint right away
//! DeliverySummary
//! ```
//!
//! Individual delivery failures are data in the summary. The call itself
//! only fails for a missing caller, unusable key material, an unserializable
//! payload, or a repository error while loading subscriptions.

// Rust guideline compliant 2026-02

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use super::keys::KeyMaterialCache;
use super::payload::NotificationPayload;
use super::store::{Subscription, SubscriptionRepository};
use super::transport::{FailureKind, PushRequest, PushTransport, TransportFailure};
use super::vapid::SigningKeyMaterial;
use crate::constants::{endpoint_for_log, DISPATCH_CONCURRENCY, PUSH_REQUEST_TIMEOUT};
use crate::error::PushResult;
use crate::identity::{Identity, UserId};

/// Overall result of a dispatch call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// The fan-out ran; see the counts for how it went.
    Sent,
    /// The target has no subscriptions. Nothing was attempted.
    NoSubscriptions,
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// The push service accepted the message.
    Delivered {
        /// Endpoint delivered to.
        endpoint: String,
    },
    /// Delivery failed.
    Failed {
        /// Endpoint that failed.
        endpoint: String,
        /// Permanent failures are pruned.
        kind: FailureKind,
        /// Diagnostic text.
        reason: String,
    },
}

impl DeliveryOutcome {
    /// Endpoint this outcome is for.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::Delivered { endpoint } | Self::Failed { endpoint, .. } => endpoint,
        }
    }

    /// Whether delivery succeeded.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Aggregated fan-out result returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliverySummary {
    /// `sent` or `no_subscriptions`.
    pub status: DispatchStatus,
    /// Deliveries attempted (one per subscription).
    pub attempted: usize,
    /// Deliveries accepted by the push service.
    pub succeeded: usize,
    /// Deliveries that failed for any reason.
    pub failed: usize,
    /// Endpoints that failed, in subscription order.
    pub failed_endpoints: Vec<String>,
    /// Endpoints removed because the push service reported them gone.
    pub pruned_endpoints: Vec<String>,
    /// Per-endpoint detail, in subscription order.
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DeliverySummary {
    /// Summary for a target with nothing to deliver to.
    pub fn no_subscriptions() -> Self {
        Self {
            status: DispatchStatus::NoSubscriptions,
            attempted: 0,
            succeeded: 0,
            failed: 0,
            failed_endpoints: Vec::new(),
            pruned_endpoints: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    fn from_outcomes(outcomes: Vec<DeliveryOutcome>, pruned_endpoints: Vec<String>) -> Self {
        let succeeded = outcomes.iter().filter(|o| o.is_delivered()).count();
        let failed_endpoints: Vec<String> = outcomes
            .iter()
            .filter(|o| !o.is_delivered())
            .map(|o| o.endpoint().to_string())
            .collect();
        Self {
            status: DispatchStatus::Sent,
            attempted: outcomes.len(),
            succeeded,
            failed: failed_endpoints.len(),
            failed_endpoints,
            pruned_endpoints,
            outcomes,
        }
    }

    /// Human-readable status line.
    pub fn message(&self) -> String {
        match self.status {
            DispatchStatus::NoSubscriptions => "no active subscriptions".to_string(),
            DispatchStatus::Sent => format!(
                "notifications sent: {} delivered, {} failed",
                self.succeeded, self.failed
            ),
        }
    }
}

/// Fan-out tuning.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// VAPID `sub` claim.
    pub subject: String,
    /// Deliveries in flight at once.
    pub concurrency: usize,
    /// Upper bound for one delivery.
    pub timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            subject: crate::constants::DEFAULT_VAPID_SUBJECT.to_string(),
            concurrency: DISPATCH_CONCURRENCY,
            timeout: PUSH_REQUEST_TIMEOUT,
        }
    }
}

/// Delivers a notification to every subscription of a user.
pub struct Dispatcher {
    repository: Arc<dyn SubscriptionRepository>,
    transport: Arc<dyn PushTransport>,
    keys: Arc<KeyMaterialCache>,
    settings: DispatchSettings,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("keys", &self.keys)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Wire a dispatcher to its collaborators.
    pub fn new(
        repository: Arc<dyn SubscriptionRepository>,
        transport: Arc<dyn PushTransport>,
        keys: Arc<KeyMaterialCache>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            repository,
            transport,
            keys,
            settings,
        }
    }

    /// Send `payload` to every device `target` has registered.
    pub async fn dispatch(
        &self,
        target: &UserId,
        payload: &NotificationPayload,
        requester: &Identity,
    ) -> PushResult<DeliverySummary> {
        let requester = requester.require()?;

        let signing = self.keys.signing_material().map_err(|e| {
            log::error!("[Dispatch] Refusing to dispatch to {target}: {e}");
            e
        })?;

        let body = payload.to_bytes()?;

        let subscriptions = self.repository.list_by_owner(target).await?;
        if subscriptions.is_empty() {
            log::info!("[Dispatch] {requester} → {target}: no active subscriptions");
            return Ok(DeliverySummary::no_subscriptions());
        }

        let concurrency = self.settings.concurrency.max(1);
        let mut results: Vec<(usize, DeliveryOutcome, bool)> =
            stream::iter(subscriptions.iter().enumerate())
                .map(|(index, subscription)| {
                    let signing = &signing;
                    let body = body.as_slice();
                    async move {
                        let (outcome, pruned) = self.deliver(subscription, body, signing).await;
                        (index, outcome, pruned)
                    }
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut pruned = Vec::new();
        let mut outcomes = Vec::with_capacity(results.len());
        for (_, outcome, was_pruned) in results {
            if was_pruned {
                pruned.push(outcome.endpoint().to_string());
            }
            outcomes.push(outcome);
        }

        let summary = DeliverySummary::from_outcomes(outcomes, pruned);
        log::info!(
            "[Dispatch] {requester} → {target}: {} attempted, {} delivered, {} failed, {} pruned",
            summary.attempted,
            summary.succeeded,
            summary.failed,
            summary.pruned_endpoints.len()
        );
        Ok(summary)
    }

    /// Deliver to one subscription and prune it if the endpoint is gone.
    ///
    /// Returns the outcome and whether the subscription was removed.
    async fn deliver(
        &self,
        subscription: &Subscription,
        payload: &[u8],
        signing: &SigningKeyMaterial,
    ) -> (DeliveryOutcome, bool) {
        let request = PushRequest {
            endpoint: &subscription.endpoint,
            p256dh: &subscription.p256dh,
            auth: &subscription.auth,
            payload,
            signing,
            subject: &self.settings.subject,
        };

        let result = match tokio::time::timeout(self.settings.timeout, self.transport.send(&request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportFailure::transient(format!(
                "timed out after {}s",
                self.settings.timeout.as_secs_f32()
            ))),
        };

        let endpoint = subscription.endpoint.clone();
        let log_endpoint = endpoint_for_log(&subscription.endpoint);

        match result {
            Ok(()) => {
                log::debug!("[WebPush] Delivered to {log_endpoint}");
                (DeliveryOutcome::Delivered { endpoint }, false)
            }
            Err(failure) if failure.is_permanent() => {
                log::info!("[WebPush] Subscription {log_endpoint} is gone, pruning: {}", failure.reason);
                let pruned = match self.repository.delete_by_endpoint(&subscription.endpoint).await {
                    Ok(removed) => removed,
                    Err(e) => {
                        log::warn!("[WebPush] Failed to prune {log_endpoint}: {e}");
                        false
                    }
                };
                let outcome = DeliveryOutcome::Failed {
                    endpoint,
                    kind: failure.kind,
                    reason: failure.reason,
                };
                (outcome, pruned)
            }
            Err(failure) => {
                log::warn!("[WebPush] Delivery to {log_endpoint} failed: {}", failure.reason);
                let outcome = DeliveryOutcome::Failed {
                    endpoint,
                    kind: failure.kind,
                    reason: failure.reason,
                };
                (outcome, false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts_and_order() {
        let outcomes = vec![
            DeliveryOutcome::Failed {
                endpoint: "e1".into(),
                kind: FailureKind::Transient,
                reason: "500".into(),
            },
            DeliveryOutcome::Delivered {
                endpoint: "e2".into(),
            },
            DeliveryOutcome::Failed {
                endpoint: "e3".into(),
                kind: FailureKind::Permanent,
                reason: "410".into(),
            },
        ];
        let summary = DeliverySummary::from_outcomes(outcomes, vec!["e3".into()]);
        assert_eq!(summary.status, DispatchStatus::Sent);
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.failed_endpoints, ["e1", "e3"]);
        assert_eq!(summary.message(), "notifications sent: 1 delivered, 2 failed");
    }

    #[test]
    fn test_no_subscriptions_summary() {
        let summary = DeliverySummary::no_subscriptions();
        assert_eq!(summary.attempted, 0);
        assert_eq!(summary.message(), "no active subscriptions");

        let json = serde_json::to_value(&summary).expect("serialize");
        assert_eq!(json["status"], "no_subscriptions");
    }
}
