//! Configuration loading.
//!
//! Reads `config.json` from the configuration directory, then applies
//! environment variable overrides. The VAPID private key is only ever taken
//! from the environment and is never written back to disk.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::constants::{
    CONFIG_DIR_NAME, DEFAULT_VAPID_SUBJECT, DISPATCH_CONCURRENCY, PUSH_REQUEST_TIMEOUT,
    PUSH_TTL_SECS, STORE_FILE_NAME,
};
use crate::identity::UserId;
use crate::notifications::dispatch::DispatchSettings;
use crate::service::TargetPolicy;

/// VAPID signing configuration.
#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct VapidConfig {
    /// Raw signing key text as supplied. NOT serialized to disk.
    #[serde(skip)]
    pub private_key: Option<String>,
    /// Optional independently supplied public key (base64url or PEM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Contact claim (`mailto:` or `https:` URI).
    pub subject: String,
}

impl std::fmt::Debug for VapidConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidConfig")
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .field("public_key", &self.public_key)
            .field("subject", &self.subject)
            .finish()
    }
}

impl Default for VapidConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            public_key: None,
            subject: DEFAULT_VAPID_SUBJECT.to_string(),
        }
    }
}

/// Fan-out and transport tuning.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Deliveries in flight at once.
    pub concurrency: usize,
    /// Per-delivery timeout in seconds.
    pub timeout_secs: u64,
    /// How long push services hold undelivered messages.
    pub ttl_secs: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: DISPATCH_CONCURRENCY,
            timeout_secs: PUSH_REQUEST_TIMEOUT.as_secs(),
            ttl_secs: PUSH_TTL_SECS,
        }
    }
}

impl DispatchConfig {
    /// Per-delivery timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration for vapid-dispatch.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    /// VAPID signing configuration.
    pub vapid: VapidConfig,
    /// Fan-out tuning.
    pub dispatch: DispatchConfig,
    /// Subscription store file. Defaults to `subscriptions.json` in the config dir.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
    /// Users allowed to notify others and list every subscription.
    pub admin_users: Vec<UserId>,
    /// Who may be named as a notification target.
    pub target_policy: TargetPolicy,
}

/// Turn a contact string into a VAPID subject URI.
///
/// A bare e-mail address gets a `mailto:` prefix; empty input falls back
/// to the default contact.
pub fn normalize_subject(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_VAPID_SUBJECT.to_string()
    } else if trimmed.starts_with("mailto:") || trimmed.starts_with("https:") {
        trimmed.to_string()
    } else if trimmed.contains('@') {
        format!("mailto:{trimmed}")
    } else {
        trimmed.to_string()
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// Directory selection priority:
    /// 1. `PUSH_CONFIG_DIR` env var: explicit override
    /// 2. Default: platform config dir (Linux: ~/.config/vapid-dispatch)
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("PUSH_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join(CONFIG_DIR_NAME))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let dir = Self::config_dir()?;
        let mut config = Self::load_from_dir(&dir)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Reads `config.json` from `dir`. A missing file yields defaults.
    pub fn load_from_dir(dir: &std::path::Path) -> Result<Self> {
        let config_path = dir.join("config.json");
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let mut config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;
        config.vapid.subject = normalize_subject(&config.vapid.subject);
        Ok(config)
    }

    /// Applies overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Unparseable numbers are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(private_key) = lookup("VAPID_PRIVATE_KEY") {
            if !private_key.trim().is_empty() {
                self.vapid.private_key = Some(private_key);
            }
        }

        if let Some(public_key) = lookup("VAPID_PUBLIC_KEY") {
            if !public_key.trim().is_empty() {
                self.vapid.public_key = Some(public_key);
            }
        }

        if let Some(subject) = lookup("VAPID_SUBJECT").or_else(|| lookup("VAPID_EMAIL")) {
            self.vapid.subject = normalize_subject(&subject);
        }

        if let Some(concurrency) = lookup("PUSH_CONCURRENCY") {
            match concurrency.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.dispatch.concurrency = n,
                _ => log::warn!("Ignoring invalid PUSH_CONCURRENCY={concurrency}"),
            }
        }

        if let Some(timeout) = lookup("PUSH_TIMEOUT_SECS") {
            match timeout.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.dispatch.timeout_secs = secs,
                _ => log::warn!("Ignoring invalid PUSH_TIMEOUT_SECS={timeout}"),
            }
        }

        if let Some(ttl) = lookup("PUSH_TTL_SECS") {
            match ttl.trim().parse::<u32>() {
                Ok(secs) => self.dispatch.ttl_secs = secs,
                Err(_) => log::warn!("Ignoring invalid PUSH_TTL_SECS={ttl}"),
            }
        }

        if let Some(path) = lookup("PUSH_STORE_PATH") {
            self.store_path = Some(PathBuf::from(path));
        }

        if let Some(admins) = lookup("PUSH_ADMIN_USERS") {
            self.admin_users = admins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(UserId::from)
                .collect();
        }

        if let Some(policy) = lookup("PUSH_TARGET_POLICY") {
            match policy.parse::<TargetPolicy>() {
                Ok(policy) => self.target_policy = policy,
                Err(e) => log::warn!("Ignoring PUSH_TARGET_POLICY: {e}"),
            }
        }
    }

    /// Where subscriptions are persisted.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::config_dir()?.join(STORE_FILE_NAME)),
        }
    }

    /// Fan-out settings for the dispatcher.
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            subject: self.vapid.subject.clone(),
            concurrency: self.dispatch.concurrency.max(1),
            timeout: self.dispatch.timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vapid.subject, "mailto:admin@example.com");
        assert_eq!(config.dispatch.concurrency, 8);
        assert_eq!(config.dispatch.timeout(), Duration::from_secs(10));
        assert_eq!(config.dispatch.ttl_secs, 86_400);
        assert_eq!(config.target_policy, TargetPolicy::SelfOnly);
        assert!(config.vapid.private_key.is_none());
    }

    #[test]
    fn test_config_serialization_excludes_private_key() {
        let mut config = Config::default();
        config.vapid.private_key = Some("super_secret_scalar".to_string());
        let json = serde_json::to_string(&config).unwrap();

        assert!(!json.contains("super_secret_scalar"));
        assert!(!json.contains("private_key"));
        assert!(!format!("{config:?}").contains("super_secret_scalar"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("VAPID_PRIVATE_KEY", "key-text"),
            ("VAPID_EMAIL", "ops@example.org"),
            ("PUSH_CONCURRENCY", "3"),
            ("PUSH_TIMEOUT_SECS", "2"),
            ("PUSH_ADMIN_USERS", "root, ops ,"),
            ("PUSH_TARGET_POLICY", "any_authenticated"),
            ("PUSH_STORE_PATH", "/tmp/subs.json"),
        ]));

        assert_eq!(config.vapid.private_key.as_deref(), Some("key-text"));
        assert_eq!(config.vapid.subject, "mailto:ops@example.org");
        assert_eq!(config.dispatch.concurrency, 3);
        assert_eq!(config.dispatch.timeout(), Duration::from_secs(2));
        assert_eq!(config.admin_users, vec![UserId::new("root"), UserId::new("ops")]);
        assert_eq!(config.target_policy, TargetPolicy::AnyAuthenticated);
        assert_eq!(config.store_path().unwrap(), PathBuf::from("/tmp/subs.json"));
    }

    #[test]
    fn test_invalid_numbers_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("PUSH_CONCURRENCY", "lots"),
            ("PUSH_TIMEOUT_SECS", "0"),
            ("PUSH_TTL_SECS", "-1"),
            ("PUSH_TARGET_POLICY", "everyone"),
        ]));
        assert_eq!(config.dispatch, DispatchConfig::default());
        assert_eq!(config.target_policy, TargetPolicy::SelfOnly);
    }

    #[test]
    fn test_subject_wins_over_email() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("VAPID_SUBJECT", "https://example.org/contact"),
            ("VAPID_EMAIL", "ops@example.org"),
        ]));
        assert_eq!(config.vapid.subject, "https://example.org/contact");
    }

    #[test]
    fn test_normalize_subject() {
        assert_eq!(normalize_subject("a@b.c"), "mailto:a@b.c");
        assert_eq!(normalize_subject("mailto:a@b.c"), "mailto:a@b.c");
        assert_eq!(normalize_subject("  "), DEFAULT_VAPID_SUBJECT);
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.dispatch, DispatchConfig::default());

        fs::write(
            dir.path().join("config.json"),
            r#"{"vapid": {"subject": "ops@example.org"}, "dispatch": {"concurrency": 2}, "admin_users": ["root"]}"#,
        )
        .unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.vapid.subject, "mailto:ops@example.org");
        assert_eq!(config.dispatch.concurrency, 2);
        assert_eq!(config.dispatch.timeout_secs, 10);
        assert_eq!(config.admin_users, vec![UserId::new("root")]);
    }

    #[test]
    fn test_load_from_dir_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "not json").unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }
}
