//! Notification payload delivered to the browser service worker.

// Rust guideline compliant 2026-02

use serde::{Deserialize, Serialize};

use crate::identity::UserId;

fn default_data() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// What the service worker shows. Serialized as the push message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub body: String,
    /// Icon URL (relative or absolute).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Badge URL (relative or absolute).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,
    /// Replaces earlier notifications with the same tag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Arbitrary data handed to the service worker's click handler.
    #[serde(default = "default_data")]
    pub data: serde_json::Value,
    /// Keep the notification on screen until the user acts on it.
    #[serde(default)]
    pub require_interaction: bool,
}

impl NotificationPayload {
    /// Payload with a title and body and nothing else.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            icon: None,
            badge: None,
            tag: None,
            data: default_data(),
            require_interaction: false,
        }
    }

    /// Set the icon.
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Set the badge.
    pub fn with_badge(mut self, badge: impl Into<String>) -> Self {
        self.badge = Some(badge.into());
        self
    }

    /// Set the tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Require user interaction to dismiss.
    pub fn with_require_interaction(mut self, require: bool) -> Self {
        self.require_interaction = require;
        self
    }

    /// JSON bytes sent as the encrypted push message body.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// A send request as it arrives from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Recipient. `None` means the requester.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<UserId>,
    /// What to show.
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

impl NotificationRequest {
    /// Send to the requester's own devices.
    pub fn to_self(payload: NotificationPayload) -> Self {
        Self {
            target: None,
            payload,
        }
    }

    /// Send to a named user's devices.
    pub fn to_user(target: impl Into<UserId>, payload: NotificationPayload) -> Self {
        Self {
            target: Some(target.into()),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_format() {
        let payload = NotificationPayload::new("Hi", "There")
            .with_icon("/vite.svg")
            .with_require_interaction(true);
        let json: serde_json::Value =
            serde_json::from_slice(&payload.to_bytes().expect("serialize")).expect("json");

        assert_eq!(json["title"], "Hi");
        assert_eq!(json["body"], "There");
        assert_eq!(json["icon"], "/vite.svg");
        assert_eq!(json["requireInteraction"], true);
        assert_eq!(json["data"], serde_json::json!({}));
        assert!(json.get("badge").is_none());
        assert!(json.get("tag").is_none());
    }

    #[test]
    fn test_request_parses_minimal_body_as_self_send() {
        let request: NotificationRequest =
            serde_json::from_str(r#"{"title": "t", "body": "b", "icon": "/vite.svg"}"#)
                .expect("parse");
        assert_eq!(request.target, None);
        assert_eq!(request.payload.icon.as_deref(), Some("/vite.svg"));
        assert!(!request.payload.require_interaction);
    }

    #[test]
    fn test_request_with_named_target() {
        let request: NotificationRequest = serde_json::from_str(
            r#"{"target": "bob", "title": "t", "body": "b", "requireInteraction": true}"#,
        )
        .expect("parse");
        assert_eq!(request.target, Some(UserId::new("bob")));
        assert!(request.payload.require_interaction);
    }
}
