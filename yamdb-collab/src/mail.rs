use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use async_trait::async_trait;
use log::info;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use url::Url;

pub type ArcedMailer = Arc<dyn Mailer>;

/// A message to be delivered by email
#[derive(Debug, Clone, Serialize)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Error)]
#[error("Mail delivery to {to} failed: {reason}")]
pub struct MailError {
    pub to: String,
    pub reason: String,
}

/// Represents a type that can deliver mail
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), MailError>;
}

/// Delivers mail by posting it as JSON to an HTTP mail relay
pub struct RelayMailer {
    client: reqwest::Client,
    endpoint: Url,
    from: String,
}

#[derive(Serialize)]
struct RelayPayload<'a> {
    from: &'a str,
    #[serde(flatten)]
    mail: &'a Mail,
}

impl RelayMailer {
    pub fn new(endpoint: Url, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            from,
        }
    }
}

#[async_trait]
impl Mailer for RelayMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        let failed = |reason: String| MailError {
            to: mail.to.clone(),
            reason,
        };

        let payload = RelayPayload {
            from: &self.from,
            mail: &mail,
        };

        self.client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| failed(e.to_string()))?;

        Ok(())
    }
}

/// Writes mail to the log instead of delivering it.
/// Useful when running locally without a mail relay.
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: String) -> Self {
        Self { from }
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        info!(
            "Mail from {} to {}: [{}] {}",
            self.from, mail.to, mail.subject, mail.body
        );

        Ok(())
    }
}

/// Keeps every sent mail in memory, and can be told to fail
#[derive(Default)]
pub struct OutboxMailer {
    sent: Mutex<Vec<Mail>>,
    failing: AtomicBool,
}

impl OutboxMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes all following deliveries fail or succeed
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Mail> {
        self.sent.lock().clone()
    }

    /// The most recent mail sent to the given address
    pub fn last_to(&self, to: &str) -> Option<Mail> {
        self.sent.lock().iter().rev().find(|m| m.to == to).cloned()
    }
}

#[async_trait]
impl Mailer for OutboxMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError {
                to: mail.to,
                reason: "outbox is set to fail".to_string(),
            });
        }

        self.sent.lock().push(mail);
        Ok(())
    }
}
