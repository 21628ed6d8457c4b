// src/notify/mod.rs
pub mod discord;
pub mod email;
pub mod render;
pub mod slack;

use anyhow::Result;
use metrics::counter;
use serde::Serialize;

pub use discord::DiscordNotifier;
pub use email::EmailNotifier;
pub use slack::SlackNotifier;

/// Rendered digest, ready for any channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Digest {
    pub subject: String,
    pub html: String,
    pub text: String,
    /// Number of items in the digest; 0 for a "no spikes" update.
    pub item_count: usize,
}

/// One delivery channel.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, digest: &Digest) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// What the pipeline talks to: deliver one digest, report success.
#[async_trait::async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, digest: &Digest) -> bool;
}

/// Writes the digest summary to the log; used when nothing else is configured.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, digest: &Digest) -> Result<()> {
        tracing::info!(
            subject = %digest.subject,
            items = digest.item_count,
            "digest (log-only channel)"
        );
        tracing::debug!(body = %digest.text, "digest body");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Fan-out over configured channels. Succeeds when at least one delivered.
pub struct NotifierMux {
    channels: Vec<Box<dyn Notifier>>,
}

impl NotifierMux {
    pub fn new(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self { channels }
    }

    /// Email, Discord and Slack from env; log-only when none is configured.
    pub fn from_env() -> Result<Self> {
        let mut channels: Vec<Box<dyn Notifier>> = Vec::new();
        if let Some(email) = EmailNotifier::from_env()? {
            channels.push(Box::new(email));
        }
        if let Some(discord) = DiscordNotifier::from_env() {
            channels.push(Box::new(discord));
        }
        if let Some(slack) = SlackNotifier::from_env() {
            channels.push(Box::new(slack));
        }
        if channels.is_empty() {
            tracing::warn!("no notification channel configured, digests go to the log");
            channels.push(Box::new(LogNotifier));
        }
        Ok(Self::new(channels))
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }
}

#[async_trait::async_trait]
impl Dispatcher for NotifierMux {
    async fn dispatch(&self, digest: &Digest) -> bool {
        let mut delivered = 0usize;
        for ch in &self.channels {
            match ch.send(digest).await {
                Ok(()) => {
                    delivered += 1;
                    counter!("trend_notify_sent_total", "channel" => ch.name()).increment(1);
                }
                Err(e) => {
                    counter!("trend_notify_failed_total", "channel" => ch.name()).increment(1);
                    tracing::warn!(channel = ch.name(), error = %format!("{e:#}"), "notify channel failed");
                }
            }
        }
        delivered > 0
    }
}
