//! Note status transitions.
//!
//! Every transition locks the note row, checks its preconditions, updates the note
//! and appends exactly one history row inside a single database transaction. Blob
//! uploads happen before these functions are called; e-mails are queued after they
//! return.

pub mod access;
pub mod outcome;

use std::{fmt, str::FromStr};

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::{dsl::exists, prelude::*, select, PgConnection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    models::{NewNote, NewNoteHistory, Note, NoteHistory},
    schema::{note_history, notes},
    settings::LifecycleSettings,
};

use self::outcome::{TransitionError, TransitionResult};

/// Stored status of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NoteStatus {
    Pendente,
    Atestada,
    Rejeitada,
}

impl NoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Pendente => "PENDENTE",
            NoteStatus::Atestada => "ATESTADA",
            NoteStatus::Rejeitada => "REJEITADA",
        }
    }
}

impl FromStr for NoteStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDENTE" => Ok(NoteStatus::Pendente),
            "ATESTADA" => Ok(NoteStatus::Atestada),
            "REJEITADA" => Ok(NoteStatus::Rejeitada),
            other => Err(format!("unknown note status '{other}'")),
        }
    }
}

/// Status shown to users. `Expirada` is computed on read and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DisplayStatus {
    Pendente,
    Atestada,
    Rejeitada,
    Expirada,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayStatus::Pendente => "PENDENTE",
            DisplayStatus::Atestada => "ATESTADA",
            DisplayStatus::Rejeitada => "REJEITADA",
            DisplayStatus::Expirada => "EXPIRADA",
        }
    }
}

impl FromStr for DisplayStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDENTE" => Ok(DisplayStatus::Pendente),
            "ATESTADA" => Ok(DisplayStatus::Atestada),
            "REJEITADA" => Ok(DisplayStatus::Rejeitada),
            "EXPIRADA" => Ok(DisplayStatus::Expirada),
            other => Err(format!("unknown note status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HistoryEvent {
    Created,
    Attested,
    Reverted,
    Rejected,
    Edited,
    Deleted,
    Restored,
    Expired,
}

impl HistoryEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryEvent::Created => "CREATED",
            HistoryEvent::Attested => "ATTESTED",
            HistoryEvent::Reverted => "REVERTED",
            HistoryEvent::Rejected => "REJECTED",
            HistoryEvent::Edited => "EDITED",
            HistoryEvent::Deleted => "DELETED",
            HistoryEvent::Restored => "RESTORED",
            HistoryEvent::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for HistoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a history row is attributed to. Coordinators acting through a public link
/// have no account, so only their declared name is kept.
#[derive(Debug, Clone)]
pub struct HistoryAuthor {
    pub user_id: Option<Uuid>,
    pub name: Option<String>,
}

impl HistoryAuthor {
    pub fn user(user: &AuthenticatedUser) -> Self {
        Self {
            user_id: Some(user.user_id),
            name: Some(user.name.clone()),
        }
    }

    pub fn declared(name: &str) -> Self {
        Self {
            user_id: None,
            name: Some(name.to_string()),
        }
    }

    pub fn system() -> Self {
        Self {
            user_id: None,
            name: None,
        }
    }
}

pub fn stored_status(note: &Note) -> TransitionResult<NoteStatus> {
    note.status
        .parse()
        .map_err(|err: String| TransitionError::Dependency(anyhow::anyhow!(err)))
}

pub fn compute_deadline(issued_at: NaiveDate, settings: &LifecycleSettings) -> NaiveDateTime {
    issued_at.and_time(NaiveTime::MIN) + Duration::days(i64::from(settings.deadline_days))
}

pub fn is_expired(note: &Note, now: NaiveDateTime) -> bool {
    note.status == NoteStatus::Pendente.as_str() && now > note.attestation_deadline
}

pub fn display_status(note: &Note, now: NaiveDateTime) -> DisplayStatus {
    if is_expired(note, now) {
        return DisplayStatus::Expirada;
    }
    match note.status.parse::<NoteStatus>() {
        Ok(NoteStatus::Atestada) => DisplayStatus::Atestada,
        Ok(NoteStatus::Rejeitada) => DisplayStatus::Rejeitada,
        _ => DisplayStatus::Pendente,
    }
}

fn ensure_not_trashed(note: &Note) -> TransitionResult<()> {
    if note.deleted {
        return Err(TransitionError::InvalidState("note is in the trash".into()));
    }
    Ok(())
}

pub fn ensure_pending(note: &Note) -> TransitionResult<()> {
    ensure_not_trashed(note)?;
    if stored_status(note)? != NoteStatus::Pendente {
        return Err(TransitionError::not_pending());
    }
    Ok(())
}

pub fn ensure_revertible(note: &Note) -> TransitionResult<()> {
    ensure_not_trashed(note)?;
    if stored_status(note)? != NoteStatus::Atestada {
        return Err(TransitionError::InvalidState(
            "only attested notes can be reverted".into(),
        ));
    }
    Ok(())
}

pub fn ensure_trashable(note: &Note) -> TransitionResult<()> {
    if note.deleted {
        return Err(TransitionError::InvalidState(
            "note is already in the trash".into(),
        ));
    }
    match stored_status(note)? {
        NoteStatus::Pendente | NoteStatus::Rejeitada => Ok(()),
        NoteStatus::Atestada => Err(TransitionError::InvalidState(
            "attested notes cannot be moved to the trash".into(),
        )),
    }
}

pub fn ensure_restorable(note: &Note) -> TransitionResult<()> {
    if !note.deleted {
        return Err(TransitionError::InvalidState(
            "note is not in the trash".into(),
        ));
    }
    Ok(())
}

fn lock_note(conn: &mut PgConnection, note_id: Uuid) -> TransitionResult<Note> {
    Ok(notes::table.find(note_id).for_update().first::<Note>(conn)?)
}

fn reload(conn: &mut PgConnection, note_id: Uuid) -> TransitionResult<Note> {
    Ok(notes::table.find(note_id).first::<Note>(conn)?)
}

fn append_history(
    conn: &mut PgConnection,
    note_id: Uuid,
    event: HistoryEvent,
    details: String,
    author: &HistoryAuthor,
) -> TransitionResult<()> {
    let row = NewNoteHistory {
        id: Uuid::new_v4(),
        note_id,
        event_type: event.as_str().to_string(),
        details,
        author_id: author.user_id,
        author_name: author.name.clone(),
    };
    diesel::insert_into(note_history::table)
        .values(&row)
        .execute(conn)?;
    Ok(())
}

fn author_label(author: &HistoryAuthor) -> &str {
    author.name.as_deref().unwrap_or("system")
}

pub fn load_history(conn: &mut PgConnection, note_id: Uuid) -> QueryResult<Vec<NoteHistory>> {
    note_history::table
        .filter(note_history::note_id.eq(note_id))
        .order((note_history::created_at.asc(), note_history::id.asc()))
        .load(conn)
}

/// Non-trashed notes sharing the number and project account.
pub fn find_duplicates(
    conn: &mut PgConnection,
    note_number: &str,
    project_account_number: &str,
) -> QueryResult<Vec<Note>> {
    notes::table
        .filter(notes::note_number.eq(note_number.trim()))
        .filter(notes::project_account_number.eq(project_account_number.trim()))
        .filter(notes::deleted.eq(false))
        .order(notes::created_at.asc())
        .load(conn)
}

pub fn create_note(
    conn: &mut PgConnection,
    new_note: NewNote,
    author: &HistoryAuthor,
) -> TransitionResult<Note> {
    conn.transaction(|conn| {
        let note_id = new_note.id;
        let details = format!(
            "note {} submitted for attestation by {}",
            new_note.note_number, new_note.coordinator_name
        );
        diesel::insert_into(notes::table)
            .values(&new_note)
            .execute(conn)?;
        append_history(conn, note_id, HistoryEvent::Created, details, author)?;
        reload(conn, note_id)
    })
}

/// What an attestation stores on the note.
#[derive(Debug, Clone)]
pub struct AttestationRecord {
    pub attested_by_name: String,
    pub attested_by_id: Option<Uuid>,
    pub observation: Option<String>,
    pub attested_file_key: String,
    pub attested_file_name: String,
}

pub fn attest_note(
    conn: &mut PgConnection,
    note_id: Uuid,
    record: AttestationRecord,
    author: &HistoryAuthor,
) -> TransitionResult<Note> {
    conn.transaction(|conn| {
        let note = lock_note(conn, note_id)?;
        ensure_pending(&note)?;

        let now = Utc::now().naive_utc();
        diesel::update(notes::table.find(note_id))
            .set((
                notes::status.eq(NoteStatus::Atestada.as_str()),
                notes::attested_at.eq(Some(now)),
                notes::attested_by_name.eq(Some(&record.attested_by_name)),
                notes::attested_by_id.eq(record.attested_by_id),
                notes::observation.eq(record.observation.as_deref()),
                notes::attested_file_key.eq(Some(&record.attested_file_key)),
                notes::attested_file_name.eq(Some(&record.attested_file_name)),
                notes::updated_at.eq(now),
            ))
            .execute(conn)?;

        let mut details = format!("note attested by {}", record.attested_by_name);
        if let Some(observation) = record.observation.as_deref() {
            details.push_str(&format!(": {observation}"));
        }
        append_history(conn, note_id, HistoryEvent::Attested, details, author)?;
        reload(conn, note_id)
    })
}

pub fn reject_note(
    conn: &mut PgConnection,
    note_id: Uuid,
    reason: &str,
    author: &HistoryAuthor,
) -> TransitionResult<Note> {
    conn.transaction(|conn| {
        let note = lock_note(conn, note_id)?;
        ensure_pending(&note)?;

        let now = Utc::now().naive_utc();
        diesel::update(notes::table.find(note_id))
            .set((
                notes::status.eq(NoteStatus::Rejeitada.as_str()),
                notes::observation.eq(Some(reason)),
                notes::updated_at.eq(now),
            ))
            .execute(conn)?;

        let details = format!("note rejected by {}: {reason}", author_label(author));
        append_history(conn, note_id, HistoryEvent::Rejected, details, author)?;
        reload(conn, note_id)
    })
}

/// Returns the reverted note and the key of the attested file it no longer references.
pub fn revert_note(
    conn: &mut PgConnection,
    note_id: Uuid,
    author: &HistoryAuthor,
) -> TransitionResult<(Note, Option<String>)> {
    conn.transaction(|conn| {
        let note = lock_note(conn, note_id)?;
        ensure_revertible(&note)?;

        let now = Utc::now().naive_utc();
        diesel::update(notes::table.find(note_id))
            .set((
                notes::status.eq(NoteStatus::Pendente.as_str()),
                notes::attested_at.eq(None::<NaiveDateTime>),
                notes::attested_by_name.eq(None::<String>),
                notes::attested_by_id.eq(None::<Uuid>),
                notes::observation.eq(None::<String>),
                notes::attested_file_key.eq(None::<String>),
                notes::attested_file_name.eq(None::<String>),
                notes::updated_at.eq(now),
            ))
            .execute(conn)?;

        let details = format!(
            "attestation by {} reverted by {}",
            note.attested_by_name.as_deref().unwrap_or("unknown"),
            author_label(author)
        );
        append_history(conn, note_id, HistoryEvent::Reverted, details, author)?;
        Ok((reload(conn, note_id)?, note.attested_file_key))
    })
}

pub fn soft_delete_note(
    conn: &mut PgConnection,
    note_id: Uuid,
    author: &HistoryAuthor,
) -> TransitionResult<Note> {
    conn.transaction(|conn| {
        let note = lock_note(conn, note_id)?;
        ensure_trashable(&note)?;

        let now = Utc::now().naive_utc();
        diesel::update(notes::table.find(note_id))
            .set((
                notes::deleted.eq(true),
                notes::deleted_at.eq(Some(now)),
                notes::updated_at.eq(now),
            ))
            .execute(conn)?;

        let details = format!("note moved to the trash by {}", author_label(author));
        append_history(conn, note_id, HistoryEvent::Deleted, details, author)?;
        reload(conn, note_id)
    })
}

pub fn restore_note(
    conn: &mut PgConnection,
    note_id: Uuid,
    author: &HistoryAuthor,
) -> TransitionResult<Note> {
    conn.transaction(|conn| {
        let note = lock_note(conn, note_id)?;
        ensure_restorable(&note)?;

        let now = Utc::now().naive_utc();
        diesel::update(notes::table.find(note_id))
            .set((
                notes::deleted.eq(false),
                notes::deleted_at.eq(None::<NaiveDateTime>),
                notes::updated_at.eq(now),
            ))
            .execute(conn)?;

        let details = format!("note restored from the trash by {}", author_label(author));
        append_history(conn, note_id, HistoryEvent::Restored, details, author)?;
        reload(conn, note_id)
    })
}

/// Removes a trashed row and, through the cascade, its history. Returns the removed
/// note so the caller can drop its blobs.
pub fn purge_note(conn: &mut PgConnection, note_id: Uuid) -> TransitionResult<Note> {
    conn.transaction(|conn| {
        let note = lock_note(conn, note_id)?;
        ensure_restorable(&note)?;
        diesel::delete(notes::table.find(note_id)).execute(conn)?;
        Ok(note)
    })
}

/// Stamps a reminder. Skips notes that left the pending state since they were scanned.
pub fn record_reminder(
    conn: &mut PgConnection,
    note_id: Uuid,
    now: NaiveDateTime,
) -> QueryResult<bool> {
    let updated = diesel::update(
        notes::table
            .find(note_id)
            .filter(notes::status.eq(NoteStatus::Pendente.as_str()))
            .filter(notes::deleted.eq(false)),
    )
    .set(notes::last_reminder_at.eq(Some(now)))
    .execute(conn)?;
    Ok(updated == 1)
}

/// When the next reminder is due, counting from the last one or from creation.
pub fn reminder_due(note: &Note, settings: &LifecycleSettings, now: NaiveDateTime) -> bool {
    let since = note.last_reminder_at.unwrap_or(note.created_at);
    now - since >= Duration::days(i64::from(settings.reminder_frequency_days))
}

/// Descriptive fields a requester may correct while the note is pending.
#[derive(Debug, Default, Clone, AsChangeset)]
#[diesel(table_name = notes)]
pub struct NoteChanges {
    pub note_type: Option<String>,
    pub description: Option<String>,
    pub amount_cents: Option<i64>,
    pub note_number: Option<String>,
    pub project_account_number: Option<String>,
    pub issued_at: Option<NaiveDate>,
    pub provider_name: Option<String>,
    pub provider_document: Option<String>,
    pub client_name: Option<Option<String>>,
    pub client_document: Option<Option<String>>,
    pub coordinator_name: Option<String>,
    pub coordinator_email: Option<String>,
    pub cc_emails: Option<Vec<String>>,
}

impl NoteChanges {
    /// Names of the fields that differ from the stored note.
    pub fn changed_fields(&self, note: &Note) -> Vec<&'static str> {
        let mut changed = Vec::new();
        let mut check = |name: &'static str, differs: bool| {
            if differs {
                changed.push(name);
            }
        };
        check(
            "note_type",
            self.note_type.as_ref().is_some_and(|v| *v != note.note_type),
        );
        check(
            "description",
            self.description.as_ref().is_some_and(|v| *v != note.description),
        );
        check(
            "amount",
            self.amount_cents.is_some_and(|v| v != note.amount_cents),
        );
        check(
            "note_number",
            self.note_number.as_ref().is_some_and(|v| *v != note.note_number),
        );
        check(
            "project_account_number",
            self.project_account_number
                .as_ref()
                .is_some_and(|v| *v != note.project_account_number),
        );
        check(
            "issued_at",
            self.issued_at.is_some_and(|v| v != note.issued_at),
        );
        check(
            "provider_name",
            self.provider_name.as_ref().is_some_and(|v| *v != note.provider_name),
        );
        check(
            "provider_document",
            self.provider_document
                .as_ref()
                .is_some_and(|v| *v != note.provider_document),
        );
        check(
            "client_name",
            self.client_name.as_ref().is_some_and(|v| *v != note.client_name),
        );
        check(
            "client_document",
            self.client_document
                .as_ref()
                .is_some_and(|v| *v != note.client_document),
        );
        check(
            "coordinator_name",
            self.coordinator_name
                .as_ref()
                .is_some_and(|v| *v != note.coordinator_name),
        );
        check(
            "coordinator_email",
            self.coordinator_email
                .as_ref()
                .is_some_and(|v| *v != note.coordinator_email),
        );
        check(
            "cc_emails",
            self.cc_emails.as_ref().is_some_and(|v| *v != note.cc_emails),
        );
        changed
    }
}

/// Applies an edit. The attestation deadline is left as computed at creation.
pub fn edit_note(
    conn: &mut PgConnection,
    note_id: Uuid,
    changes: NoteChanges,
    author: &HistoryAuthor,
) -> TransitionResult<Note> {
    conn.transaction(|conn| {
        let note = lock_note(conn, note_id)?;
        ensure_pending(&note)?;

        let changed = changes.changed_fields(&note);
        if changed.is_empty() {
            return Err(TransitionError::Validation(
                crate::validation::ValidationErrors::single("request", "no changes provided"),
            ));
        }

        diesel::update(notes::table.find(note_id))
            .set((&changes, notes::updated_at.eq(Utc::now().naive_utc())))
            .execute(conn)?;

        let details = format!(
            "note edited by {}: {}",
            author_label(author),
            changed.join(", ")
        );
        append_history(conn, note_id, HistoryEvent::Edited, details, author)?;
        reload(conn, note_id)
    })
}

/// Records that a pending note ran past its deadline. The stored status is left
/// alone; returns false when there was nothing to record.
pub fn mark_expired(
    conn: &mut PgConnection,
    note_id: Uuid,
    now: NaiveDateTime,
) -> TransitionResult<bool> {
    conn.transaction(|conn| {
        let note = lock_note(conn, note_id)?;
        if note.deleted || !is_expired(&note, now) {
            return Ok(false);
        }

        let already_recorded: bool = select(exists(
            note_history::table
                .filter(note_history::note_id.eq(note_id))
                .filter(note_history::event_type.eq(HistoryEvent::Expired.as_str())),
        ))
        .get_result(conn)?;
        if already_recorded {
            return Ok(false);
        }

        let details = format!(
            "attestation deadline {} passed without a decision",
            note.attestation_deadline.format("%Y-%m-%d")
        );
        append_history(
            conn,
            note_id,
            HistoryEvent::Expired,
            details,
            &HistoryAuthor::system(),
        )?;
        Ok(true)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_note() -> Note {
        let created = NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Note {
            id: Uuid::new_v4(),
            created_by: Uuid::new_v4(),
            coordinator_name: "Carla".into(),
            coordinator_email: "coord@example.org".into(),
            cc_emails: vec![],
            note_type: "SERVICE".into(),
            description: "Consultoria".into(),
            amount_cents: 123_456,
            note_number: "NF-1".into(),
            project_account_number: "PRJ-1".into(),
            issued_at: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            provider_name: "Fornecedor".into(),
            provider_document: "12345678000190".into(),
            client_name: None,
            client_document: None,
            original_file_key: "notes/x/original/nota.pdf".into(),
            original_file_name: "nota.pdf".into(),
            original_file_mime: "application/pdf".into(),
            original_file_checksum: "00".into(),
            report_file_key: None,
            report_file_name: None,
            attested_file_key: None,
            attested_file_name: None,
            status: "PENDENTE".into(),
            attestation_deadline: NaiveDate::from_ymd_opt(2024, 4, 14)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            attested_at: None,
            attested_by_name: None,
            attested_by_id: None,
            observation: None,
            last_reminder_at: None,
            deleted: false,
            deleted_at: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn at(date: (i32, u32, u32), hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    #[test]
    fn deadline_is_issue_date_plus_configured_days() {
        let settings = LifecycleSettings {
            deadline_days: 30,
            reminder_frequency_days: 7,
        };
        let issued = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        assert_eq!(compute_deadline(issued, &settings), at((2024, 4, 14), 0));

        let short = LifecycleSettings {
            deadline_days: 1,
            ..settings
        };
        assert_eq!(compute_deadline(issued, &short), at((2024, 3, 16), 0));
    }

    #[test]
    fn pending_note_displays_expired_only_after_deadline() {
        let note = sample_note();
        assert_eq!(display_status(&note, at((2024, 4, 13), 23)), DisplayStatus::Pendente);
        assert_eq!(note.attestation_deadline, at((2024, 4, 14), 0));
        assert_eq!(display_status(&note, at((2024, 4, 14), 0)), DisplayStatus::Pendente);
        assert_eq!(display_status(&note, at((2024, 4, 14), 1)), DisplayStatus::Expirada);
        assert_eq!(note.status, "PENDENTE");
    }

    #[test]
    fn decided_notes_never_display_expired() {
        let mut note = sample_note();
        let late = at((2025, 1, 1), 0);
        note.status = "ATESTADA".into();
        assert_eq!(display_status(&note, late), DisplayStatus::Atestada);
        note.status = "REJEITADA".into();
        assert_eq!(display_status(&note, late), DisplayStatus::Rejeitada);
    }

    #[test]
    fn only_pending_notes_accept_attest_or_reject() {
        let mut note = sample_note();
        assert!(ensure_pending(&note).is_ok());

        note.status = "ATESTADA".into();
        assert!(matches!(
            ensure_pending(&note),
            Err(TransitionError::InvalidState(_))
        ));

        note.status = "PENDENTE".into();
        note.deleted = true;
        assert!(ensure_pending(&note).is_err());
    }

    #[test]
    fn attested_notes_cannot_be_trashed() {
        let mut note = sample_note();
        assert!(ensure_trashable(&note).is_ok());
        note.status = "REJEITADA".into();
        assert!(ensure_trashable(&note).is_ok());
        note.status = "ATESTADA".into();
        assert!(ensure_trashable(&note).is_err());
    }

    #[test]
    fn revert_requires_attested_note() {
        let mut note = sample_note();
        assert!(ensure_revertible(&note).is_err());
        note.status = "ATESTADA".into();
        assert!(ensure_revertible(&note).is_ok());
    }

    #[test]
    fn restore_requires_trashed_note() {
        let mut note = sample_note();
        assert!(ensure_restorable(&note).is_err());
        note.deleted = true;
        assert!(ensure_restorable(&note).is_ok());
        assert!(ensure_trashable(&note).is_err());
    }

    #[test]
    fn reminders_follow_configured_frequency() {
        let settings = LifecycleSettings {
            deadline_days: 30,
            reminder_frequency_days: 7,
        };
        let mut note = sample_note();
        assert!(!reminder_due(&note, &settings, at((2024, 3, 21), 12)));
        assert!(reminder_due(&note, &settings, at((2024, 3, 22), 12)));

        note.last_reminder_at = Some(at((2024, 3, 22), 12));
        assert!(!reminder_due(&note, &settings, at((2024, 3, 28), 12)));
        assert!(reminder_due(&note, &settings, at((2024, 3, 29), 13)));
    }

    #[test]
    fn changed_fields_ignores_unchanged_values() {
        let note = sample_note();
        let changes = NoteChanges {
            description: Some(note.description.clone()),
            amount_cents: Some(99),
            client_name: Some(Some("Cliente".into())),
            ..NoteChanges::default()
        };
        assert_eq!(changes.changed_fields(&note), vec!["amount", "client_name"]);
        assert!(NoteChanges::default().changed_fields(&note).is_empty());
    }

    #[test]
    fn status_strings_round_trip_through_parse() {
        for status in [NoteStatus::Pendente, NoteStatus::Atestada, NoteStatus::Rejeitada] {
            assert_eq!(status.as_str().parse::<NoteStatus>().unwrap(), status);
        }
        assert_eq!(
            "expirada".parse::<DisplayStatus>().unwrap(),
            DisplayStatus::Expirada
        );
        assert!("EXPIRADA".parse::<NoteStatus>().is_err());
    }
}
