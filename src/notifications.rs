//! E-mail templates and the messages each transition sends.
//!
//! Messages are rendered here and queued as `send-email` jobs once the transition has
//! committed. A queue failure is logged and never undoes the transition.

use std::{fmt, str::FromStr};

use chrono::Utc;
use diesel::{pg::PgConnection, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    jobs::{enqueue_job, JobQueueResult, JOB_SEND_EMAIL},
    mailer::{EmailAttachment, EmailMessage},
    models::{EmailTemplateRow, NewEmailTemplate, Note, User},
    schema::{email_templates, users},
    state::AppState,
    validation::{format_amount, ValidationErrors},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    AttestationRequest,
    AttestationConfirmation,
    Rejection,
    Reminder,
    Expiration,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 5] = [
        TemplateKind::AttestationRequest,
        TemplateKind::AttestationConfirmation,
        TemplateKind::Rejection,
        TemplateKind::Reminder,
        TemplateKind::Expiration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::AttestationRequest => "attestation_request",
            TemplateKind::AttestationConfirmation => "attestation_confirmation",
            TemplateKind::Rejection => "rejection",
            TemplateKind::Reminder => "reminder",
            TemplateKind::Expiration => "expiration",
        }
    }

    fn default_subject(&self) -> &'static str {
        match self {
            TemplateKind::AttestationRequest => "Solicitação de ateste: nota [NumeroNota]",
            TemplateKind::AttestationConfirmation => "Nota [NumeroNota] atestada",
            TemplateKind::Rejection => "Nota [NumeroNota] rejeitada",
            TemplateKind::Reminder => "Lembrete: nota [NumeroNota] aguarda ateste",
            TemplateKind::Expiration => "Prazo de ateste expirado: nota [NumeroNota]",
        }
    }

    fn default_body(&self) -> &'static str {
        match self {
            TemplateKind::AttestationRequest => {
                "<p>Olá [NomeCoordenador],</p>\
                 <p>[NomeSolicitante] enviou a nota [NumeroNota] ([DescricaoNota]) no valor de \
                 [ValorNota] para o seu ateste.</p>\
                 <p>Prazo: [PrazoAteste]</p>\
                 <p><a href=\"[LinkAteste]\">Atestar ou rejeitar a nota</a></p>"
            }
            TemplateKind::AttestationConfirmation => {
                "<p>Olá [NomeSolicitante],</p>\
                 <p>A nota [NumeroNota] ([DescricaoNota]) foi atestada por [NomeAtestador].</p>\
                 <p>Observação: [Observacao]</p>"
            }
            TemplateKind::Rejection => {
                "<p>Olá [NomeSolicitante],</p>\
                 <p>A nota [NumeroNota] ([DescricaoNota]) foi rejeitada por [NomeAtestador].</p>\
                 <p>Motivo: [MotivoRejeicao]</p>"
            }
            TemplateKind::Reminder => {
                "<p>Olá [NomeCoordenador],</p>\
                 <p>A nota [NumeroNota] ([DescricaoNota]) no valor de [ValorNota] ainda aguarda \
                 o seu ateste. Prazo: [PrazoAteste].</p>\
                 <p><a href=\"[LinkAteste]\">Atestar ou rejeitar a nota</a></p>"
            }
            TemplateKind::Expiration => {
                "<p>Olá [NomeSolicitante],</p>\
                 <p>O prazo de ateste da nota [NumeroNota] ([DescricaoNota]) terminou em \
                 [PrazoAteste] sem decisão de [NomeCoordenador].</p>"
            }
        }
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TemplateKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
            .ok_or_else(|| format!("unknown template kind '{value}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub kind: TemplateKind,
    pub subject: String,
    pub body: String,
    /// False while the built-in text is in effect.
    pub customized: bool,
}

impl EmailTemplate {
    pub fn builtin(kind: TemplateKind) -> Self {
        Self {
            kind,
            subject: kind.default_subject().to_string(),
            body: kind.default_body().to_string(),
            customized: false,
        }
    }
}

pub fn load_template(conn: &mut PgConnection, kind: TemplateKind) -> QueryResult<EmailTemplate> {
    let row = email_templates::table
        .find(kind.as_str())
        .first::<EmailTemplateRow>(conn)
        .optional()?;
    Ok(match row {
        Some(row) => EmailTemplate {
            kind,
            subject: row.subject,
            body: row.body,
            customized: true,
        },
        None => EmailTemplate::builtin(kind),
    })
}

pub fn list_templates(conn: &mut PgConnection) -> QueryResult<Vec<EmailTemplate>> {
    TemplateKind::ALL
        .into_iter()
        .map(|kind| load_template(conn, kind))
        .collect()
}

pub fn save_template(
    conn: &mut PgConnection,
    kind: TemplateKind,
    subject: &str,
    body: &str,
) -> Result<EmailTemplate, SaveTemplateError> {
    let mut errors = ValidationErrors::default();
    if subject.trim().is_empty() {
        errors.add("subject", "subject is required");
    }
    if body.trim().is_empty() {
        errors.add("body", "body is required");
    }
    if !errors.is_empty() {
        return Err(SaveTemplateError::Validation(errors));
    }

    let row = NewEmailTemplate {
        kind: kind.as_str().to_string(),
        subject: subject.trim().to_string(),
        body: body.to_string(),
        updated_at: Utc::now().naive_utc(),
    };
    diesel::insert_into(email_templates::table)
        .values(&row)
        .on_conflict(email_templates::kind)
        .do_update()
        .set(&row)
        .execute(conn)?;
    Ok(load_template(conn, kind)?)
}

#[derive(Debug, thiserror::Error)]
pub enum SaveTemplateError {
    #[error("invalid template")]
    Validation(ValidationErrors),
    #[error(transparent)]
    Database(#[from] diesel::result::Error),
}

/// Values substituted into `[Placeholder]` markers.
#[derive(Debug, Default, Clone)]
pub struct TemplateValues {
    pub coordinator_name: String,
    pub requester_name: String,
    pub description: String,
    pub note_number: String,
    pub amount: String,
    pub deadline: String,
    pub link: String,
    pub attester_name: String,
    pub observation: String,
    pub rejection_reason: String,
}

impl TemplateValues {
    pub fn for_note(note: &Note, requester_name: &str) -> Self {
        Self {
            coordinator_name: note.coordinator_name.clone(),
            requester_name: requester_name.to_string(),
            description: note.description.clone(),
            note_number: note.note_number.clone(),
            amount: format_amount(note.amount_cents),
            deadline: note.attestation_deadline.format("%d/%m/%Y").to_string(),
            attester_name: note.attested_by_name.clone().unwrap_or_default(),
            observation: note.observation.clone().unwrap_or_default(),
            ..Self::default()
        }
    }

    fn pairs(&self) -> [(&'static str, &str); 10] {
        [
            ("[NomeCoordenador]", self.coordinator_name.as_str()),
            ("[NomeSolicitante]", self.requester_name.as_str()),
            ("[DescricaoNota]", self.description.as_str()),
            ("[NumeroNota]", self.note_number.as_str()),
            ("[ValorNota]", self.amount.as_str()),
            ("[PrazoAteste]", self.deadline.as_str()),
            ("[LinkAteste]", self.link.as_str()),
            ("[NomeAtestador]", self.attester_name.as_str()),
            ("[Observacao]", self.observation.as_str()),
            ("[MotivoRejeicao]", self.rejection_reason.as_str()),
        ]
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Replaces the known placeholders; anything else in brackets is left as written.
pub fn render(template: &str, values: &TemplateValues, html: bool) -> String {
    let mut rendered = template.to_string();
    for (marker, value) in values.pairs() {
        if rendered.contains(marker) {
            let value = if html {
                escape_html(value)
            } else {
                value.to_string()
            };
            rendered = rendered.replace(marker, &value);
        }
    }
    rendered
}

/// Lowercases, drops blanks and the primary recipient, and keeps the first occurrence
/// of each address.
pub fn dedupe_cc<'a>(to: &str, candidates: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let to = to.trim().to_lowercase();
    let mut cc: Vec<String> = Vec::new();
    for candidate in candidates {
        let address = candidate.trim().to_lowercase();
        if address.is_empty() || address == to || cc.contains(&address) {
            continue;
        }
        cc.push(address);
    }
    cc
}

pub fn compose(
    template: &EmailTemplate,
    values: &TemplateValues,
    to: &str,
    cc: Vec<String>,
    attachment: Option<EmailAttachment>,
) -> EmailMessage {
    EmailMessage {
        to: to.trim().to_lowercase(),
        cc,
        subject: render(&template.subject, values, false),
        html_body: render(&template.body, values, true),
        attachment,
    }
}

fn requester(conn: &mut PgConnection, note: &Note) -> QueryResult<User> {
    users::table.find(note.created_by).first(conn)
}

fn note_cc(note: &Note) -> impl Iterator<Item = &str> {
    note.cc_emails.iter().map(String::as_str)
}

/// To the coordinator, copying the requester and the note's CC list.
pub fn attestation_request(
    conn: &mut PgConnection,
    note: &Note,
    link: &str,
) -> QueryResult<EmailMessage> {
    let requester = requester(conn, note)?;
    let template = load_template(conn, TemplateKind::AttestationRequest)?;
    let mut values = TemplateValues::for_note(note, &requester.name);
    values.link = link.to_string();
    let cc = dedupe_cc(
        &note.coordinator_email,
        std::iter::once(requester.email.as_str()).chain(note_cc(note)),
    );
    Ok(compose(&template, &values, &note.coordinator_email, cc, None))
}

/// To the requester with the attested document attached.
pub fn attestation_confirmation(
    conn: &mut PgConnection,
    note: &Note,
) -> QueryResult<EmailMessage> {
    let requester = requester(conn, note)?;
    let template = load_template(conn, TemplateKind::AttestationConfirmation)?;
    let values = TemplateValues::for_note(note, &requester.name);
    let cc = dedupe_cc(
        &requester.email,
        std::iter::once(note.coordinator_email.as_str()).chain(note_cc(note)),
    );
    let attachment = match (&note.attested_file_key, &note.attested_file_name) {
        (Some(key), Some(name)) => Some(EmailAttachment {
            filename: name.clone(),
            storage_key: key.clone(),
        }),
        _ => None,
    };
    Ok(compose(&template, &values, &requester.email, cc, attachment))
}

pub fn rejection(
    conn: &mut PgConnection,
    note: &Note,
    rejected_by: &str,
    reason: &str,
) -> QueryResult<EmailMessage> {
    let requester = requester(conn, note)?;
    let template = load_template(conn, TemplateKind::Rejection)?;
    let mut values = TemplateValues::for_note(note, &requester.name);
    values.attester_name = rejected_by.to_string();
    values.rejection_reason = reason.to_string();
    let cc = dedupe_cc(
        &requester.email,
        std::iter::once(note.coordinator_email.as_str()).chain(note_cc(note)),
    );
    Ok(compose(&template, &values, &requester.email, cc, None))
}

pub fn reminder(conn: &mut PgConnection, note: &Note, link: &str) -> QueryResult<EmailMessage> {
    let requester = requester(conn, note)?;
    let template = load_template(conn, TemplateKind::Reminder)?;
    let mut values = TemplateValues::for_note(note, &requester.name);
    values.link = link.to_string();
    let cc = dedupe_cc(&note.coordinator_email, note_cc(note));
    Ok(compose(&template, &values, &note.coordinator_email, cc, None))
}

pub fn expiration(conn: &mut PgConnection, note: &Note) -> QueryResult<EmailMessage> {
    let requester = requester(conn, note)?;
    let template = load_template(conn, TemplateKind::Expiration)?;
    let values = TemplateValues::for_note(note, &requester.name);
    let cc = dedupe_cc(&requester.email, [note.coordinator_email.as_str()]);
    Ok(compose(&template, &values, &requester.email, cc, None))
}

pub fn queue_email(conn: &mut PgConnection, message: &EmailMessage) -> JobQueueResult<Uuid> {
    let payload = serde_json::to_value(message).unwrap_or_else(|_| json!({}));
    Ok(enqueue_job(conn, JOB_SEND_EMAIL, payload, None)?.id)
}

/// Builds and queues a message after a committed transition. Failures are logged only.
pub fn notify<F>(state: &AppState, note_id: Uuid, kind: TemplateKind, build: F)
where
    F: FnOnce(&mut PgConnection) -> QueryResult<EmailMessage>,
{
    let mut conn = match state.db() {
        Ok(conn) => conn,
        Err(err) => {
            warn!(note_id = %note_id, template = %kind, error = ?err, "failed to queue email due to pool error");
            return;
        }
    };

    let message = match build(&mut *conn) {
        Ok(message) => message,
        Err(err) => {
            warn!(note_id = %note_id, template = %kind, error = %err, "failed to render email");
            return;
        }
    };

    match queue_email(&mut conn, &message) {
        Ok(job_id) => {
            info!(note_id = %note_id, template = %kind, job_id = %job_id, to = %message.to, "email queued")
        }
        Err(err) => {
            warn!(note_id = %note_id, template = %kind, error = %err, "failed to queue email")
        }
    }
}
