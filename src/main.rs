//! vapid-dispatch CLI - operator tool for VAPID web push.
//!
//! Manages VAPID keys and the JSON subscription store, and sends
//! notifications. See the `vapid_dispatch` library for the core
//! functionality.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use vapid_dispatch::notifications::pem::normalize_pem;
use vapid_dispatch::notifications::store::JsonFileSubscriptionStore;
use vapid_dispatch::notifications::transport::WebPushTransport;
use vapid_dispatch::{
    Config, Identity, KeyMaterialCache, NotificationPayload, NotificationRequest, PushService,
    SigningKeyMaterial, SubscribeRequest, UserId,
};

/// Global allocator configured per M-MIMALLOC-APPS guideline.
/// mimalloc provides better multi-threaded performance than the system allocator.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser)]
#[command(name = "vapid-dispatch")]
#[command(version)]
#[command(about = "Store browser push subscriptions and send VAPID web push notifications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// VAPID key management
    Keys {
        #[command(subcommand)]
        action: KeysAction,
    },
    /// Register a browser push subscription for a user
    Subscribe {
        /// Acting user
        #[arg(long = "as")]
        user: String,
        /// Push service endpoint URL
        #[arg(long)]
        endpoint: String,
        /// Browser ECDH public key (base64 or base64url)
        #[arg(long)]
        p256dh: String,
        /// Auth secret (base64 or base64url)
        #[arg(long)]
        auth: String,
    },
    /// Remove one of a user's subscriptions
    Unsubscribe {
        /// Acting user
        #[arg(long = "as")]
        user: String,
        /// Push service endpoint URL
        #[arg(long)]
        endpoint: String,
    },
    /// List subscriptions
    List {
        /// Acting user
        #[arg(long = "as")]
        user: String,
        /// Every user's subscriptions (administrators only)
        #[arg(long)]
        all: bool,
    },
    /// Send a notification and print the delivery summary as JSON
    Send {
        /// Acting user
        #[arg(long = "as")]
        user: String,
        /// Recipient (defaults to the acting user)
        #[arg(long)]
        to: Option<String>,
        #[arg(long)]
        title: String,
        #[arg(long)]
        body: String,
        #[arg(long)]
        icon: Option<String>,
        #[arg(long)]
        badge: Option<String>,
        #[arg(long)]
        tag: Option<String>,
        /// Extra data for the service worker, as a JSON object
        #[arg(long)]
        data: Option<String>,
        #[arg(long)]
        require_interaction: bool,
    },
}

#[derive(Subcommand)]
enum KeysAction {
    /// Generate a new keypair and print it as environment lines
    Generate {
        /// Emit the private key as PKCS#8 PEM instead of a raw scalar
        #[arg(long)]
        pem: bool,
    },
    /// Repair a pasted private key and print the normalized PEM
    Normalize {
        /// Key text (defaults to VAPID_PRIVATE_KEY)
        key: Option<String>,
    },
    /// Print the application server public key
    Public,
}

fn run_keys(action: KeysAction, config: &Config) -> Result<()> {
    match action {
        KeysAction::Generate { pem } => {
            let material = SigningKeyMaterial::generate();
            if pem {
                let pem = material.to_pkcs8_pem()?;
                println!("VAPID_PRIVATE_KEY=\"{}\"", pem.trim_end().replace('\n', "\\n"));
            } else {
                println!("VAPID_PRIVATE_KEY={}", material.export_private_base64url());
            }
            println!("VAPID_PUBLIC_KEY={}", material.public_key_base64url());
            println!("VAPID_SUBJECT={}", config.vapid.subject);
        }
        KeysAction::Normalize { key } => {
            let raw = key
                .or_else(|| config.vapid.private_key.clone())
                .context("No key given and VAPID_PRIVATE_KEY is not set")?;
            let material = SigningKeyMaterial::from_config(Some(&raw), None)?;
            let normalized = normalize_pem(&raw);
            if normalized.starts_with("-----BEGIN") {
                print!("{normalized}");
            } else {
                println!("{}", material.to_pkcs8_pem()?.trim_end());
            }
            eprintln!("Public key: {}", material.public_key_base64url());
        }
        KeysAction::Public => {
            let keys = KeyMaterialCache::new(&config.vapid);
            println!("{}", keys.public_key()?);
        }
    }
    Ok(())
}

async fn build_service(config: &Config) -> Result<PushService> {
    let store_path = config.store_path()?;
    let store = JsonFileSubscriptionStore::open(&store_path)
        .await
        .with_context(|| format!("Failed to open subscription store {}", store_path.display()))?;
    let transport = WebPushTransport::with_settings(config.dispatch.timeout(), config.dispatch.ttl_secs)
        .context("Failed to build HTTP client")?;
    Ok(PushService::from_config(
        config,
        Arc::new(store),
        Arc::new(transport),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Keys { action } => run_keys(action, &config)?,
        Commands::Subscribe {
            user,
            endpoint,
            p256dh,
            auth,
        } => {
            let service = build_service(&config).await?;
            let subscription = service
                .subscribe(&Identity::new(user), SubscribeRequest::new(endpoint, p256dh, auth))
                .await?;
            println!("{}", serde_json::to_string_pretty(&subscription)?);
        }
        Commands::Unsubscribe { user, endpoint } => {
            let service = build_service(&config).await?;
            let removed = service.unsubscribe(&Identity::new(user), &endpoint).await?;
            println!("{}", serde_json::json!({ "removed": removed }));
        }
        Commands::List { user, all } => {
            let service = build_service(&config).await?;
            let identity = Identity::new(user);
            let subscriptions = if all {
                service.list_all(&identity).await?
            } else {
                service.my_subscriptions(&identity).await?
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "subscriptions": subscriptions,
                    "count": subscriptions.len(),
                }))?
            );
        }
        Commands::Send {
            user,
            to,
            title,
            body,
            icon,
            badge,
            tag,
            data,
            require_interaction,
        } => {
            let mut payload =
                NotificationPayload::new(title, body).with_require_interaction(require_interaction);
            if let Some(icon) = icon {
                payload = payload.with_icon(icon);
            }
            if let Some(badge) = badge {
                payload = payload.with_badge(badge);
            }
            if let Some(tag) = tag {
                payload = payload.with_tag(tag);
            }
            if let Some(data) = data {
                let value: serde_json::Value =
                    serde_json::from_str(&data).context("--data must be valid JSON")?;
                payload = payload.with_data(value);
            }
            let request = match to {
                Some(target) => NotificationRequest::to_user(UserId::new(target), payload),
                None => NotificationRequest::to_self(payload),
            };

            let service = build_service(&config).await?;
            let summary = service.send(&Identity::new(user), request).await?;
            log::info!("{}", summary.message());
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
