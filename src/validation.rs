//! Typed request payloads and the field rules applied before any transition runs.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    lifecycle::NoteChanges,
    utils::json::{classify_nullable, NullableValue},
};

pub const MAX_ATTACHMENT_BYTES: usize = 10 * 1024 * 1024;
pub const MIN_REJECTION_REASON_CHARS: usize = 10;

/// Column widths of the `notes` and `note_history` tables, in characters.
pub const MAX_NAME_CHARS: usize = 255;
pub const MAX_NUMBER_CHARS: usize = 64;
pub const MAX_DOCUMENT_CHARS: usize = 32;

pub const MIME_PDF: &str = "application/pdf";

/// Accepted for the invoice itself, its report and the authenticated attest path.
pub const NOTE_ATTACHMENT_MIME_TYPES: &[&str] = &[
    MIME_PDF,
    "application/xml",
    "text/xml",
    "image/jpeg",
    "image/png",
];

/// The public attestation link only takes signed PDFs.
pub const PUBLIC_ATTESTED_MIME_TYPES: &[&str] = &[MIME_PDF];

/// Local part, `@`, a dotted domain and an alphabetic TLD of two letters or more.
static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").expect("valid email regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    /// Keeps the first message reported for a field.
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn summary(&self) -> String {
        match self.fields.len() {
            0 => "invalid input".to_string(),
            1 => self
                .fields
                .values()
                .next()
                .cloned()
                .unwrap_or_else(|| "invalid input".to_string()),
            n => format!("{n} fields are invalid"),
        }
    }

    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NoteType {
    Service,
    Product,
}

impl NoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Service => "SERVICE",
            NoteType::Product => "PRODUCT",
        }
    }
}

impl FromStr for NoteType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SERVICE" => Ok(NoteType::Service),
            "PRODUCT" => Ok(NoteType::Product),
            other => Err(format!(
                "unknown note type '{other}'. Allowed types: SERVICE, PRODUCT"
            )),
        }
    }
}

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value.trim())
}

pub fn normalize_email(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("email is required".to_string());
    }
    if trimmed.chars().count() > MAX_NAME_CHARS {
        return Err(format!("email must have at most {MAX_NAME_CHARS} characters"));
    }
    if !is_valid_email(trimmed) {
        return Err(format!("'{trimmed}' is not a valid email address"));
    }
    Ok(trimmed.to_lowercase())
}

/// Splits a comma separated CC list, validating and deduplicating addresses and
/// dropping any that repeat the primary recipient.
pub fn normalize_cc_list(raw: &str, primary: &str) -> Result<Vec<String>, String> {
    let primary = primary.trim().to_lowercase();
    let mut normalized: Vec<String> = Vec::new();
    for part in raw.split(',') {
        if part.trim().is_empty() {
            continue;
        }
        let email = normalize_email(part)?;
        if email == primary || normalized.contains(&email) {
            continue;
        }
        normalized.push(email);
    }
    Ok(normalized)
}

/// Parses a pt-BR formatted amount (`R$ 1.234,56`) into cents.
pub fn parse_amount(raw: &str) -> Result<i64, String> {
    let mut value = raw.trim();
    if value
        .get(..2)
        .map(|prefix| prefix.eq_ignore_ascii_case("R$"))
        .unwrap_or(false)
    {
        value = &value[2..];
    }
    let compact: String = value
        .chars()
        .filter(|ch| !ch.is_whitespace() && *ch != '.')
        .collect();

    if compact.is_empty() {
        return Err("amount is required".to_string());
    }
    if compact.starts_with('-') {
        return Err("amount must be greater than zero".to_string());
    }

    let (integer, fraction) = match compact.split_once(',') {
        Some((integer, fraction)) => (integer, fraction),
        None => (compact.as_str(), ""),
    };

    let all_digits = |part: &str| part.chars().all(|ch| ch.is_ascii_digit());
    if !all_digits(integer) || !all_digits(fraction) || (integer.is_empty() && fraction.is_empty())
    {
        return Err(format!("'{}' is not a valid amount", raw.trim()));
    }
    if fraction.len() > 2 {
        return Err("amount accepts at most two decimal places".to_string());
    }

    let whole: i64 = if integer.is_empty() {
        0
    } else {
        integer
            .parse()
            .map_err(|_| "amount is too large".to_string())?
    };
    let cents: i64 = format!("{fraction:0<2}")
        .parse()
        .map_err(|_| format!("'{}' is not a valid amount", raw.trim()))?;

    let total = whole
        .checked_mul(100)
        .and_then(|value| value.checked_add(cents))
        .ok_or_else(|| "amount is too large".to_string())?;

    if total == 0 {
        return Err("amount must be greater than zero".to_string());
    }
    Ok(total)
}

/// Renders cents as `R$ 1.234,56`.
pub fn format_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    let whole = (cents / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (index, ch) in whole.chars().enumerate() {
        if index > 0 && (whole.len() - index) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    format!("{sign}R$ {grouped},{:02}", cents % 100)
}

/// Accepts ISO (`2024-03-15`) and Brazilian (`15/03/2024`) dates.
pub fn parse_issue_date(raw: &str) -> Result<NaiveDate, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("issue date is required".to_string());
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .map_err(|_| format!("'{value}' is not a valid date"))
}

/// Falls back to the filename when the client sent no useful content type.
pub fn resolve_mime(declared: Option<&str>, filename: &str) -> String {
    match declared.map(str::trim) {
        Some(mime) if !mime.is_empty() && mime != "application/octet-stream" => {
            mime.to_ascii_lowercase()
        }
        _ => mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}

pub fn check_attachment(size: usize, mime: &str, allowed: &[&str]) -> Result<(), String> {
    if size == 0 {
        return Err("file must not be empty".to_string());
    }
    if size > MAX_ATTACHMENT_BYTES {
        return Err("file exceeds the 10MB limit".to_string());
    }
    if !allowed.iter().any(|candidate| *candidate == mime) {
        return Err(format!(
            "file type '{mime}' is not accepted. Allowed types: {}",
            allowed.join(", ")
        ));
    }
    Ok(())
}

/// Stored filenames share the name column width.
pub fn check_filename(filename: &str) -> Result<(), String> {
    if filename.chars().count() > MAX_NAME_CHARS {
        return Err(format!(
            "file name must have at most {MAX_NAME_CHARS} characters"
        ));
    }
    Ok(())
}

fn check_upload(file: &UploadedFile, allowed: &[&str]) -> Result<(), String> {
    check_filename(&file.filename)?;
    check_attachment(file.bytes.len(), &file.mime, allowed)
}

fn max_chars(field: &str) -> Option<usize> {
    match field {
        "note_number" | "project_account_number" => Some(MAX_NUMBER_CHARS),
        "provider_document" | "client_document" => Some(MAX_DOCUMENT_CHARS),
        "provider_name" | "client_name" | "coordinator_name" | "attester_name" | "name" => {
            Some(MAX_NAME_CHARS)
        }
        _ => None,
    }
}

fn within_limit(errors: &mut ValidationErrors, field: &str, value: String) -> Option<String> {
    match max_chars(field) {
        Some(max) if value.chars().count() > max => {
            errors.add(field, format!("{field} must have at most {max} characters"));
            None
        }
        _ => Some(value),
    }
}

fn required(errors: &mut ValidationErrors, field: &str, value: Option<&str>) -> Option<String> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => within_limit(errors, field, value.to_string()),
        None => {
            errors.add(field, format!("{field} is required"));
            None
        }
    }
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn optional_within_limit(
    errors: &mut ValidationErrors,
    field: &str,
    value: Option<&str>,
) -> Option<String> {
    optional(value).and_then(|value| within_limit(errors, field, value))
}

fn parse_flag(value: Option<&str>) -> bool {
    value
        .map(|v| v.trim() == "1" || v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// An uploaded file as read from a multipart field.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

/// Raw multipart fields of the note creation form.
#[derive(Debug, Default)]
pub struct CreateNoteForm {
    pub note_type: Option<String>,
    pub description: Option<String>,
    pub amount: Option<String>,
    pub note_number: Option<String>,
    pub project_account_number: Option<String>,
    pub issued_at: Option<String>,
    pub provider_name: Option<String>,
    pub provider_document: Option<String>,
    pub client_name: Option<String>,
    pub client_document: Option<String>,
    pub coordinator_name: Option<String>,
    pub coordinator_email: Option<String>,
    pub cc_emails: Option<String>,
    pub force_create: Option<String>,
    pub file: Option<UploadedFile>,
    pub report: Option<UploadedFile>,
}

/// A creation request that passed every field rule.
#[derive(Debug, Clone)]
pub struct ValidatedNote {
    pub note_type: NoteType,
    pub description: String,
    pub amount_cents: i64,
    pub note_number: String,
    pub project_account_number: String,
    pub issued_at: NaiveDate,
    pub provider_name: String,
    pub provider_document: String,
    pub client_name: Option<String>,
    pub client_document: Option<String>,
    pub coordinator_name: String,
    pub coordinator_email: String,
    pub cc_emails: Vec<String>,
    pub force_create: bool,
    pub file: UploadedFile,
    pub report: Option<UploadedFile>,
}

impl CreateNoteForm {
    pub fn set_text(&mut self, name: &str, value: String) {
        let slot = match name {
            "note_type" => &mut self.note_type,
            "description" => &mut self.description,
            "amount" => &mut self.amount,
            "note_number" => &mut self.note_number,
            "project_account_number" => &mut self.project_account_number,
            "issued_at" => &mut self.issued_at,
            "provider_name" => &mut self.provider_name,
            "provider_document" => &mut self.provider_document,
            "client_name" => &mut self.client_name,
            "client_document" => &mut self.client_document,
            "coordinator_name" => &mut self.coordinator_name,
            "coordinator_email" => &mut self.coordinator_email,
            "cc_emails" => &mut self.cc_emails,
            "force_create" => &mut self.force_create,
            _ => return,
        };
        *slot = Some(value);
    }

    pub fn validate(self) -> Result<ValidatedNote, ValidationErrors> {
        let mut errors = ValidationErrors::default();

        let note_type = match required(&mut errors, "note_type", self.note_type.as_deref()) {
            Some(raw) => raw
                .parse::<NoteType>()
                .map_err(|err| errors.add("note_type", err))
                .ok(),
            None => None,
        };
        let description = required(&mut errors, "description", self.description.as_deref());
        let amount_cents = match self.amount.as_deref() {
            Some(raw) => parse_amount(raw).map_err(|err| errors.add("amount", err)).ok(),
            None => {
                errors.add("amount", "amount is required");
                None
            }
        };
        let note_number = required(&mut errors, "note_number", self.note_number.as_deref());
        let project_account_number = required(
            &mut errors,
            "project_account_number",
            self.project_account_number.as_deref(),
        );
        let issued_at = match self.issued_at.as_deref() {
            Some(raw) => parse_issue_date(raw)
                .map_err(|err| errors.add("issued_at", err))
                .ok(),
            None => {
                errors.add("issued_at", "issue date is required");
                None
            }
        };
        let provider_name = required(&mut errors, "provider_name", self.provider_name.as_deref());
        let provider_document = required(
            &mut errors,
            "provider_document",
            self.provider_document.as_deref(),
        );
        let coordinator_name = required(
            &mut errors,
            "coordinator_name",
            self.coordinator_name.as_deref(),
        );
        let client_name =
            optional_within_limit(&mut errors, "client_name", self.client_name.as_deref());
        let client_document = optional_within_limit(
            &mut errors,
            "client_document",
            self.client_document.as_deref(),
        );
        let coordinator_email = match normalize_email(self.coordinator_email.as_deref().unwrap_or(""))
        {
            Ok(email) => Some(email),
            Err(err) => {
                errors.add("coordinator_email", err);
                None
            }
        };
        let cc_emails = match normalize_cc_list(
            self.cc_emails.as_deref().unwrap_or(""),
            coordinator_email.as_deref().unwrap_or(""),
        ) {
            Ok(list) => list,
            Err(err) => {
                errors.add("cc_emails", err);
                Vec::new()
            }
        };

        let file = match self.file {
            Some(file) => match check_upload(&file, NOTE_ATTACHMENT_MIME_TYPES) {
                Ok(()) => Some(file),
                Err(err) => {
                    errors.add("file", err);
                    None
                }
            },
            None => {
                errors.add("file", "file is required");
                None
            }
        };
        let report = match self.report {
            Some(report) => {
                match check_upload(&report, NOTE_ATTACHMENT_MIME_TYPES) {
                    Ok(()) => Some(report),
                    Err(err) => {
                        errors.add("report", err);
                        None
                    }
                }
            }
            None => None,
        };

        match (
            note_type,
            description,
            amount_cents,
            note_number,
            project_account_number,
            issued_at,
            provider_name,
            provider_document,
            coordinator_name,
            coordinator_email,
            file,
        ) {
            (
                Some(note_type),
                Some(description),
                Some(amount_cents),
                Some(note_number),
                Some(project_account_number),
                Some(issued_at),
                Some(provider_name),
                Some(provider_document),
                Some(coordinator_name),
                Some(coordinator_email),
                Some(file),
            ) if errors.is_empty() => Ok(ValidatedNote {
                note_type,
                description,
                amount_cents,
                note_number,
                project_account_number,
                issued_at,
                provider_name,
                provider_document,
                client_name,
                client_document,
                coordinator_name,
                coordinator_email,
                cc_emails,
                force_create: parse_flag(self.force_create.as_deref()),
                file,
                report,
            }),
            _ => Err(errors),
        }
    }
}

/// Multipart body of an attestation, through either path.
#[derive(Debug, Default)]
pub struct AttestForm {
    pub attester_name: Option<String>,
    pub observation: Option<String>,
    pub file: Option<UploadedFile>,
}

#[derive(Debug, Clone)]
pub struct ValidatedAttestation {
    pub attester_name: Option<String>,
    pub observation: Option<String>,
    pub file: UploadedFile,
}

impl AttestForm {
    /// `require_name` is set on the public path, where the coordinator declares who they are.
    pub fn validate(
        self,
        allowed_mime_types: &[&str],
        require_name: bool,
    ) -> Result<ValidatedAttestation, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let attester_name = if require_name {
            required(&mut errors, "attester_name", self.attester_name.as_deref())
        } else {
            optional_within_limit(&mut errors, "attester_name", self.attester_name.as_deref())
        };
        let file = match self.file {
            Some(file) => match check_upload(&file, allowed_mime_types) {
                Ok(()) => Some(file),
                Err(err) => {
                    errors.add("file", err);
                    None
                }
            },
            None => {
                errors.add("file", "attested document is required");
                None
            }
        };

        match file {
            Some(file) if errors.is_empty() => Ok(ValidatedAttestation {
                attester_name,
                observation: optional(self.observation.as_deref()),
                file,
            }),
            _ => Err(errors),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub name: Option<String>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ValidatedRejection {
    pub name: String,
    pub reason: String,
}

impl RejectRequest {
    pub fn validate(self) -> Result<ValidatedRejection, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let name = required(&mut errors, "name", self.name.as_deref());
        let reason = optional(self.reason.as_deref()).unwrap_or_default();
        if reason.chars().count() < MIN_REJECTION_REASON_CHARS {
            errors.add(
                "reason",
                format!("reason must have at least {MIN_REJECTION_REASON_CHARS} characters"),
            );
        }
        match name {
            Some(name) if errors.is_empty() => Ok(ValidatedRejection { name, reason }),
            _ => Err(errors),
        }
    }
}

/// Reads a PATCH body. Absent keys stay untouched; `client_name` and
/// `client_document` may be cleared with `null`. A new coordinator is dropped
/// from the stored CC list even when `cc_emails` is not sent.
pub fn parse_note_changes(
    payload: &Value,
    current_coordinator_email: &str,
    current_cc_emails: &[String],
) -> Result<NoteChanges, ValidationErrors> {
    let Some(body) = payload.as_object() else {
        return Err(ValidationErrors::single(
            "request",
            "request body must be a JSON object",
        ));
    };

    let mut errors = ValidationErrors::default();
    let mut changes = NoteChanges::default();

    let text = |errors: &mut ValidationErrors, field: &str| -> Option<String> {
        match body.get(field)? {
            Value::String(value) if !value.trim().is_empty() => {
                within_limit(errors, field, value.trim().to_string())
            }
            Value::String(_) | Value::Null => {
                errors.add(field, format!("{field} must not be empty"));
                None
            }
            _ => {
                errors.add(field, format!("{field} must be a string"));
                None
            }
        }
    };

    if let Some(raw) = text(&mut errors, "note_type") {
        match raw.parse::<NoteType>() {
            Ok(kind) => changes.note_type = Some(kind.as_str().to_string()),
            Err(err) => errors.add("note_type", err),
        }
    }
    changes.description = text(&mut errors, "description");
    match body.get("amount") {
        None => {}
        Some(Value::String(raw)) => match parse_amount(raw) {
            Ok(cents) => changes.amount_cents = Some(cents),
            Err(err) => errors.add("amount", err),
        },
        Some(_) => errors.add("amount", "amount must be a string such as 1.234,56"),
    }
    changes.note_number = text(&mut errors, "note_number");
    changes.project_account_number = text(&mut errors, "project_account_number");
    if let Some(raw) = text(&mut errors, "issued_at") {
        match parse_issue_date(&raw) {
            Ok(date) => changes.issued_at = Some(date),
            Err(err) => errors.add("issued_at", err),
        }
    }
    changes.provider_name = text(&mut errors, "provider_name");
    changes.provider_document = text(&mut errors, "provider_document");
    changes.coordinator_name = text(&mut errors, "coordinator_name");
    if let Some(raw) = text(&mut errors, "coordinator_email") {
        match normalize_email(&raw) {
            Ok(email) => changes.coordinator_email = Some(email),
            Err(err) => errors.add("coordinator_email", err),
        }
    }

    for field in ["client_name", "client_document"] {
        let value = match classify_nullable(body.get(field)) {
            Ok(NullableValue::Omitted) => continue,
            Ok(NullableValue::Null) => None,
            Ok(NullableValue::String(value)) => {
                match optional(Some(value.as_str())) {
                    Some(value) => match within_limit(&mut errors, field, value) {
                        Some(value) => Some(value),
                        None => continue,
                    },
                    None => None,
                }
            }
            Err(err) => {
                errors.add(field, err);
                continue;
            }
        };
        if field == "client_name" {
            changes.client_name = Some(value);
        } else {
            changes.client_document = Some(value);
        }
    }

    match body.get("cc_emails") {
        None => {
            if let Some(primary) = changes.coordinator_email.as_deref() {
                if let Ok(list) = normalize_cc_list(&current_cc_emails.join(","), primary) {
                    if list != current_cc_emails {
                        changes.cc_emails = Some(list);
                    }
                }
            }
        }
        Some(Value::Null) => changes.cc_emails = Some(Vec::new()),
        Some(Value::String(raw)) => {
            let primary = changes
                .coordinator_email
                .as_deref()
                .unwrap_or(current_coordinator_email);
            match normalize_cc_list(raw, primary) {
                Ok(list) => changes.cc_emails = Some(list),
                Err(err) => errors.add("cc_emails", err),
            }
        }
        Some(_) => errors.add("cc_emails", "cc_emails must be a comma separated string"),
    }

    errors.into_result(changes)
}
