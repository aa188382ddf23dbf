use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::config::AppConfig;

/// A file stored in object storage that is attached when the mail goes out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAttachment {
    pub filename: String,
    pub storage_key: String,
}

/// A rendered message, as stored in a `send-email` job payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: String,
    pub html_body: String,
    #[serde(default)]
    pub attachment: Option<EmailAttachment>,
}

/// Attachment bytes already fetched from storage.
pub struct ResolvedAttachment {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait EmailSender: Send + Sync + 'static {
    async fn send(
        &self,
        message: &EmailMessage,
        attachment: Option<ResolvedAttachment>,
    ) -> Result<()>;
}

/// Posts messages to an HTTP mail API as JSON with a bearer key.
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    from: String,
}

impl HttpMailer {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, from: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
            from: from.into(),
        }
    }
}

#[async_trait]
impl EmailSender for HttpMailer {
    async fn send(
        &self,
        message: &EmailMessage,
        attachment: Option<ResolvedAttachment>,
    ) -> Result<()> {
        let attachments: Vec<_> = attachment
            .into_iter()
            .map(|file| {
                json!({
                    "filename": file.filename,
                    "content": BASE64.encode(&file.bytes),
                })
            })
            .collect();

        let body = json!({
            "from": self.from,
            "to": [message.to],
            "cc": message.cc,
            "subject": message.subject,
            "html": message.html_body,
            "attachments": attachments,
        });

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("failed to reach mail API")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            bail!("mail API answered {status}: {text}");
        }
        Ok(())
    }
}

/// Used when no mail API is configured; the message is only logged.
pub struct LogMailer;

#[async_trait]
impl EmailSender for LogMailer {
    async fn send(
        &self,
        message: &EmailMessage,
        attachment: Option<ResolvedAttachment>,
    ) -> Result<()> {
        info!(
            to = %message.to,
            cc = ?message.cc,
            subject = %message.subject,
            attachment = attachment.as_ref().map(|file| file.filename.as_str()),
            "mail delivery disabled; message logged"
        );
        Ok(())
    }
}

pub fn build_mailer(config: &AppConfig) -> Arc<dyn EmailSender> {
    match &config.mail_api_url {
        Some(url) => Arc::new(HttpMailer::new(
            url.clone(),
            config.mail_api_key.clone(),
            config.mail_from.clone(),
        )),
        None => Arc::new(LogMailer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_payload_defaults_optional_fields() {
        let message: EmailMessage = serde_json::from_value(json!({
            "to": "coord@example.org",
            "subject": "Ateste",
            "html_body": "<p>ok</p>",
        }))
        .unwrap();
        assert!(message.cc.is_empty());
        assert!(message.attachment.is_none());
    }

    #[tokio::test]
    async fn log_mailer_accepts_everything() {
        let message = EmailMessage {
            to: "coord@example.org".into(),
            cc: vec!["fin@example.org".into()],
            subject: "Ateste".into(),
            html_body: "<p>ok</p>".into(),
            attachment: None,
        };
        assert!(LogMailer.send(&message, None).await.is_ok());
    }
}
