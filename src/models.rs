use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = notes)]
pub struct Note {
    pub id: Uuid,
    pub created_by: Uuid,
    pub coordinator_name: String,
    pub coordinator_email: String,
    pub cc_emails: Vec<String>,
    pub note_type: String,
    pub description: String,
    pub amount_cents: i64,
    pub note_number: String,
    pub project_account_number: String,
    pub issued_at: NaiveDate,
    pub provider_name: String,
    pub provider_document: String,
    pub client_name: Option<String>,
    pub client_document: Option<String>,
    pub original_file_key: String,
    pub original_file_name: String,
    pub original_file_mime: String,
    pub original_file_checksum: String,
    pub report_file_key: Option<String>,
    pub report_file_name: Option<String>,
    pub attested_file_key: Option<String>,
    pub attested_file_name: Option<String>,
    pub status: String,
    pub attestation_deadline: NaiveDateTime,
    pub attested_at: Option<NaiveDateTime>,
    pub attested_by_name: Option<String>,
    pub attested_by_id: Option<Uuid>,
    pub observation: Option<String>,
    pub last_reminder_at: Option<NaiveDateTime>,
    pub deleted: bool,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notes)]
pub struct NewNote {
    pub id: Uuid,
    pub created_by: Uuid,
    pub coordinator_name: String,
    pub coordinator_email: String,
    pub cc_emails: Vec<String>,
    pub note_type: String,
    pub description: String,
    pub amount_cents: i64,
    pub note_number: String,
    pub project_account_number: String,
    pub issued_at: NaiveDate,
    pub provider_name: String,
    pub provider_document: String,
    pub client_name: Option<String>,
    pub client_document: Option<String>,
    pub original_file_key: String,
    pub original_file_name: String,
    pub original_file_mime: String,
    pub original_file_checksum: String,
    pub report_file_key: Option<String>,
    pub report_file_name: Option<String>,
    pub status: String,
    pub attestation_deadline: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = note_history)]
#[diesel(belongs_to(Note))]
pub struct NoteHistory {
    pub id: Uuid,
    pub note_id: Uuid,
    pub event_type: String,
    pub details: String,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = note_history)]
pub struct NewNoteHistory {
    pub id: Uuid,
    pub note_id: Uuid,
    pub event_type: String,
    pub details: String,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = settings)]
pub struct SettingsRow {
    pub id: i32,
    pub deadline_days: i32,
    pub reminder_frequency_days: i32,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = email_templates)]
#[diesel(primary_key(kind))]
pub struct EmailTemplateRow {
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable, AsChangeset)]
#[diesel(table_name = email_templates)]
pub struct NewEmailTemplate {
    pub kind: String,
    pub subject: String,
    pub body: String,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = refresh_tokens)]
#[diesel(belongs_to(User))]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
    pub revoked_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = refresh_tokens)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub issued_at: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}
