use anyhow::{Context, Result};
use lettre::message::{Mailbox, Message, MultiPart};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{Digest, Notifier};

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl EmailNotifier {
    /// `Ok(None)` when `SMTP_HOST` is unset. Once the host is set the rest
    /// must be valid: SMTP_USER, SMTP_PASS, NOTIFY_EMAIL_FROM and optionally
    /// NOTIFY_EMAIL_TO (defaults to the sender) and SMTP_PORT.
    pub fn from_env() -> Result<Option<Self>> {
        let Some(host) = env_opt("SMTP_HOST") else {
            return Ok(None);
        };
        let user = env_opt("SMTP_USER").context("SMTP_USER missing")?;
        let pass = env_opt("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr = env_opt("NOTIFY_EMAIL_FROM").unwrap_or_else(|| user.clone());
        let to_addr = env_opt("NOTIFY_EMAIL_TO").unwrap_or_else(|| from_addr.clone());

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .with_context(|| format!("invalid SMTP_HOST {host}"))?
            .credentials(Credentials::new(user, pass));
        if let Some(port) = env_opt("SMTP_PORT") {
            let port: u16 = port.parse().context("invalid SMTP_PORT")?;
            builder = builder.port(port);
        }

        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = to_addr.parse().context("invalid NOTIFY_EMAIL_TO")?;

        Ok(Some(Self {
            mailer: builder.build(),
            from,
            to,
        }))
    }
}

/// multipart/alternative: plain text first, HTML preferred by capable clients.
pub fn build_message(from: Mailbox, to: Mailbox, digest: &Digest) -> Result<Message> {
    Message::builder()
        .from(from)
        .to(to)
        .subject(digest.subject.clone())
        .multipart(MultiPart::alternative_plain_html(
            digest.text.clone(),
            digest.html.clone(),
        ))
        .context("build email")
}

#[async_trait::async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, digest: &Digest) -> Result<()> {
        let msg = build_message(self.from.clone(), self.to.clone(), digest)?;
        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_subject_and_both_bodies() {
        let digest = Digest {
            subject: "Viral Trend Update - No Spikes".into(),
            html: "<h3>nothing</h3>".into(),
            text: "nothing".into(),
            item_count: 0,
        };
        let msg = build_message(
            "bot@example.com".parse().unwrap(),
            "me@example.com".parse().unwrap(),
            &digest,
        )
        .unwrap();
        let raw = String::from_utf8(msg.formatted()).unwrap();
        assert!(raw.contains("Subject: Viral Trend Update - No Spikes"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("text/plain"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    #[serial_test::serial]
    fn unset_host_means_channel_off() {
        std::env::remove_var("SMTP_HOST");
        assert!(EmailNotifier::from_env().unwrap().is_none());
    }
}
