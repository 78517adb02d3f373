// src/mailer.rs

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub text_body: String,
}

impl OutgoingEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, text_body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            text_body: text_body.into(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<()>;
}

/// Delivers through the Postmark HTTP API.
pub struct PostmarkMailer {
    client: reqwest::Client,
    base_url: String,
    token: String,
    from: String,
}

impl PostmarkMailer {
    pub fn new(base_url: &str, token: &str, from: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            from: from.to_string(),
        }
    }
}

#[async_trait]
impl Mailer for PostmarkMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        let body = json!({
            "From": self.from,
            "To": email.to,
            "Subject": email.subject,
            "TextBody": email.text_body,
            "MessageStream": "outbound",
        });

        let resp = self
            .client
            .post(format!("{}/email", self.base_url))
            .header("Accept", "application/json")
            .header("X-Postmark-Server-Token", &self.token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("postmark returned {}: {}", status, detail)));
        }

        tracing::debug!(to = %email.to, subject = %email.subject, "email sent");
        Ok(())
    }
}

/// Writes mail to the log instead of sending it.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        tracing::info!(to = %email.to, subject = %email.subject, body = %email.text_body, "email (not delivered)");
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl Outbox {
    pub async fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().await.clone()
    }

    pub async fn sent_to(&self, to: &str) -> Vec<OutgoingEmail> {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|m| m.to == to)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Mailer for Outbox {
    async fn send(&self, email: &OutgoingEmail) -> Result<()> {
        self.sent.lock().await.push(email.clone());
        Ok(())
    }
}
