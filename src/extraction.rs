//! Best-effort pre-fill of note fields from the uploaded document.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    config::AppConfig,
    validation::{format_amount, parse_amount, parse_issue_date, NoteType, UploadedFile},
};

/// Suggested values. Every field is optional; the form stays editable.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedFields {
    pub note_type: Option<NoteType>,
    pub description: Option<String>,
    pub provider_name: Option<String>,
    pub provider_document: Option<String>,
    pub client_name: Option<String>,
    pub client_document: Option<String>,
    pub note_number: Option<String>,
    pub issued_at: Option<NaiveDate>,
    pub amount: Option<String>,
}

#[async_trait]
pub trait FieldExtractor: Send + Sync + 'static {
    async fn extract(&self, file: &UploadedFile) -> Result<ExtractedFields>;
}

/// Used when no extraction endpoint is configured.
pub struct DisabledExtractor;

#[async_trait]
impl FieldExtractor for DisabledExtractor {
    async fn extract(&self, _file: &UploadedFile) -> Result<ExtractedFields> {
        Ok(ExtractedFields::default())
    }
}

pub struct HttpFieldExtractor {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpFieldExtractor {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }
}

pub fn data_uri(file: &UploadedFile) -> String {
    format!("data:{};base64,{}", file.mime, BASE64.encode(&file.bytes))
}

#[async_trait]
impl FieldExtractor for HttpFieldExtractor {
    async fn extract(&self, file: &UploadedFile) -> Result<ExtractedFields> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "document": data_uri(file) }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("failed to reach extraction service")?;
        if !response.status().is_success() {
            bail!("extraction service answered {}", response.status());
        }

        let body: Value = response
            .json()
            .await
            .context("extraction response is not JSON")?;
        Ok(parse_suggestion(&body))
    }
}

pub fn build_extractor(config: &AppConfig) -> Arc<dyn FieldExtractor> {
    match &config.extraction_endpoint {
        Some(endpoint) => Arc::new(HttpFieldExtractor::new(
            endpoint.clone(),
            config.extraction_api_key.clone(),
        )),
        None => Arc::new(DisabledExtractor),
    }
}

fn text(body: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| body.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Accepts `1234.56`, `"1234.56"` and `"R$ 1.234,56"`.
fn lenient_amount(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite() && *v > 0.0)
            .map(|v| (v * 100.0).round() as i64),
        Value::String(s) => {
            let trimmed = s.trim();
            let looks_decimal_point = trimmed.contains('.')
                && !trimmed.contains(',')
                && trimmed
                    .rsplit_once('.')
                    .is_some_and(|(_, fraction)| fraction.len() <= 2);
            if looks_decimal_point {
                parse_amount(&trimmed.replacen('.', ",", 1)).ok()
            } else {
                parse_amount(trimmed).ok()
            }
        }
        _ => None,
    }
}

fn lenient_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10).unwrap_or(raw.trim());
    parse_issue_date(head).ok()
}

/// Reads the camelCase payload of the extraction service, ignoring anything it
/// cannot make sense of.
pub fn parse_suggestion(body: &Value) -> ExtractedFields {
    ExtractedFields {
        note_type: text(body, &["type", "noteType"]).and_then(|raw| raw.parse().ok()),
        description: text(body, &["description"]),
        provider_name: text(body, &["providerName"]),
        provider_document: text(body, &["providerDocument"]),
        client_name: text(body, &["clientName"]),
        client_document: text(body, &["clientDocument"]),
        note_number: text(body, &["noteNumber"]),
        issued_at: text(body, &["issuedAt", "issueDate"]).and_then(|raw| lenient_date(&raw)),
        amount: body
            .get("totalValue")
            .and_then(lenient_amount)
            .map(format_amount),
    }
}
