use std::time::Duration;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use diesel::{pg::Pg, prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    auth::AuthenticatedUser,
    error::{AppError, AppResult},
    extraction::ExtractedFields,
    lifecycle::{
        self, access,
        outcome::{ActionResponse, ActionResult, TransitionError, TransitionResult},
        AttestationRecord, DisplayStatus, HistoryAuthor, NoteStatus,
    },
    models::{NewNote, Note, NoteHistory},
    notifications::{self, TemplateKind},
    schema::notes,
    state::AppState,
    storage::{self, FileSlot, PRESIGNED_URL_EXPIRY_SECONDS},
    validation::{
        check_attachment, format_amount, parse_note_changes, ValidatedAttestation, ValidatedNote,
        ValidationErrors, NOTE_ATTACHMENT_MIME_TYPES,
    },
};

use super::forms;

#[derive(Debug, Serialize)]
pub struct FileInfo {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct NoteFiles {
    pub original: FileInfo,
    pub report: Option<FileInfo>,
    pub attested: Option<FileInfo>,
}

#[derive(Debug, Serialize)]
pub struct NoteResponse {
    pub id: Uuid,
    pub created_by: Uuid,
    pub coordinator_name: String,
    pub coordinator_email: String,
    pub cc_emails: Vec<String>,
    pub note_type: String,
    pub description: String,
    pub amount_cents: i64,
    pub amount: String,
    pub note_number: String,
    pub project_account_number: String,
    pub issued_at: NaiveDate,
    pub provider_name: String,
    pub provider_document: String,
    pub client_name: Option<String>,
    pub client_document: Option<String>,
    pub status: String,
    pub display_status: DisplayStatus,
    pub attestation_deadline: NaiveDateTime,
    pub attested_at: Option<NaiveDateTime>,
    pub attested_by_name: Option<String>,
    pub observation: Option<String>,
    pub files: NoteFiles,
    pub deleted: bool,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

pub fn to_note_response(note: Note, now: NaiveDateTime) -> NoteResponse {
    let display_status = lifecycle::display_status(&note, now);
    NoteResponse {
        id: note.id,
        created_by: note.created_by,
        coordinator_name: note.coordinator_name,
        coordinator_email: note.coordinator_email,
        cc_emails: note.cc_emails,
        note_type: note.note_type,
        description: note.description,
        amount: format_amount(note.amount_cents),
        amount_cents: note.amount_cents,
        note_number: note.note_number,
        project_account_number: note.project_account_number,
        issued_at: note.issued_at,
        provider_name: note.provider_name,
        provider_document: note.provider_document,
        client_name: note.client_name,
        client_document: note.client_document,
        status: note.status,
        display_status,
        attestation_deadline: note.attestation_deadline,
        attested_at: note.attested_at,
        attested_by_name: note.attested_by_name,
        observation: note.observation,
        files: NoteFiles {
            original: FileInfo {
                filename: note.original_file_name,
                mime: Some(note.original_file_mime),
            },
            report: note.report_file_name.map(|filename| FileInfo {
                filename,
                mime: None,
            }),
            attested: note.attested_file_name.map(|filename| FileInfo {
                filename,
                mime: None,
            }),
        },
        deleted: note.deleted,
        deleted_at: note.deleted_at,
        created_at: note.created_at,
        updated_at: note.updated_at,
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub id: Uuid,
    pub event_type: String,
    pub details: String,
    pub author_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub created_at: NaiveDateTime,
}

impl From<NoteHistory> for HistoryResponse {
    fn from(row: NoteHistory) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            details: row.details,
            author_id: row.author_id,
            author_name: row.author_name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct NoteListQuery {
    pub status: Option<String>,
    #[serde(default)]
    pub trash: bool,
    pub q: Option<String>,
}

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct NoteSummary {
    #[serde(rename = "PENDENTE")]
    pub pending: i64,
    #[serde(rename = "ATESTADA")]
    pub attested: i64,
    #[serde(rename = "REJEITADA")]
    pub rejected: i64,
    #[serde(rename = "EXPIRADA")]
    pub expired: i64,
    pub trash: i64,
}

#[derive(Debug, Deserialize)]
pub struct DuplicateQuery {
    pub note_number: String,
    pub project_account_number: String,
}

#[derive(Debug, Serialize)]
pub struct DuplicateNote {
    pub id: Uuid,
    pub note_number: String,
    pub project_account_number: String,
    pub description: String,
    pub status: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct FileLinkResponse {
    pub url: String,
    pub filename: String,
    pub expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LinkParams {
    #[serde(default)]
    pub resend: bool,
}

#[derive(Debug, Serialize)]
pub struct AttestationLinkResponse {
    pub note_id: Uuid,
    pub link: String,
    pub resent: bool,
}

/// Owners and managers see everything; other users see notes they requested or
/// coordinate.
fn visible_notes<'a>(user: &AuthenticatedUser) -> notes::BoxedQuery<'a, Pg> {
    let query = notes::table.into_boxed();
    if user.role.is_elevated() {
        query
    } else {
        query.filter(
            notes::created_by
                .eq(user.user_id)
                .or(notes::coordinator_email.eq(user.email.trim().to_lowercase())),
        )
    }
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

pub(crate) fn load_note(state: &AppState, note_id: Uuid) -> TransitionResult<Note> {
    let mut conn = state.db()?;
    Ok(notes::table.find(note_id).first::<Note>(&mut conn)?)
}

fn load_visible_note(state: &AppState, user: &AuthenticatedUser, note_id: Uuid) -> AppResult<Note> {
    let mut conn = state.db()?;
    let note: Note = notes::table.find(note_id).first(&mut conn)?;
    if !access::can_view(user, &note) {
        return Err(AppError::forbidden());
    }
    Ok(note)
}

pub async fn list_notes(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(params): Query<NoteListQuery>,
) -> AppResult<Json<Vec<NoteResponse>>> {
    let status = params
        .status
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.parse::<DisplayStatus>())
        .transpose()
        .map_err(AppError::bad_request)?;

    let now = Utc::now().naive_utc();
    let mut query = visible_notes(&user).filter(notes::deleted.eq(params.trash));

    if let Some(status) = status {
        let pending = NoteStatus::Pendente.as_str();
        query = match status {
            DisplayStatus::Pendente => query
                .filter(notes::status.eq(pending))
                .filter(notes::attestation_deadline.ge(now)),
            DisplayStatus::Expirada => query
                .filter(notes::status.eq(pending))
                .filter(notes::attestation_deadline.lt(now)),
            DisplayStatus::Atestada => {
                query.filter(notes::status.eq(NoteStatus::Atestada.as_str()))
            }
            DisplayStatus::Rejeitada => {
                query.filter(notes::status.eq(NoteStatus::Rejeitada.as_str()))
            }
        };
    }

    if let Some(term) = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let pattern = format!("%{}%", escape_like(term));
        query = query.filter(
            notes::note_number
                .ilike(pattern.clone())
                .or(notes::description.ilike(pattern.clone()))
                .or(notes::provider_name.ilike(pattern)),
        );
    }

    let mut conn = state.db()?;
    let rows: Vec<Note> = query
        .order((notes::created_at.desc(), notes::id.asc()))
        .load(&mut conn)?;

    Ok(Json(
        rows.into_iter()
            .map(|note| to_note_response(note, now))
            .collect(),
    ))
}

pub async fn summarize_notes(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> AppResult<Json<NoteSummary>> {
    let mut conn = state.db()?;
    let rows: Vec<Note> = visible_notes(&user).load(&mut conn)?;
    let now = Utc::now().naive_utc();

    let mut summary = NoteSummary::default();
    for note in &rows {
        if note.deleted {
            summary.trash += 1;
            continue;
        }
        match lifecycle::display_status(note, now) {
            DisplayStatus::Pendente => summary.pending += 1,
            DisplayStatus::Atestada => summary.attested += 1,
            DisplayStatus::Rejeitada => summary.rejected += 1,
            DisplayStatus::Expirada => summary.expired += 1,
        }
    }
    Ok(Json(summary))
}

pub async fn find_duplicates(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(params): Query<DuplicateQuery>,
) -> AppResult<Json<Vec<DuplicateNote>>> {
    let mut conn = state.db()?;
    let rows = lifecycle::find_duplicates(
        &mut conn,
        &params.note_number,
        &params.project_account_number,
    )?;
    Ok(Json(
        rows.into_iter()
            .map(|note| DuplicateNote {
                id: note.id,
                note_number: note.note_number,
                project_account_number: note.project_account_number,
                description: note.description,
                status: note.status,
                created_at: note.created_at,
            })
            .collect(),
    ))
}

fn queue_attestation_request(state: &AppState, note: &Note) {
    let link = match state.attestation_link(note.id) {
        Ok(link) => link,
        Err(err) => {
            warn!(note_id = %note.id, error = ?err, "failed to mint attestation link");
            return;
        }
    };
    notifications::notify(state, note.id, TemplateKind::AttestationRequest, |conn| {
        notifications::attestation_request(conn, note, &link)
    });
}

pub async fn create_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    multipart: Multipart,
) -> TransitionResult<ActionResponse> {
    let form = forms::read_create_form(multipart).await?;
    let ValidatedNote {
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
        force_create,
        file,
        report,
    } = form.validate()?;

    let lifecycle_settings = {
        let mut conn = state.db()?;
        if !force_create {
            let existing =
                lifecycle::find_duplicates(&mut conn, &note_number, &project_account_number)?;
            if let Some(first) = existing.first() {
                info!(
                    existing_note_id = %first.id,
                    note_number = %note_number,
                    project_account_number = %project_account_number,
                    "note creation blocked by duplicate"
                );
                let mut result = TransitionError::Duplicate(format!(
                    "note {note_number} already exists for project account {project_account_number}"
                ))
                .to_action_result();
                result.note_id = Some(first.id);
                return Ok((StatusCode::CONFLICT, Json(result)));
            }
        }
        state.lifecycle_settings(&mut conn)?
    };

    let note_id = Uuid::new_v4();
    let original = storage::store_note_file(state.storage.as_ref(), note_id, FileSlot::Original, file)
        .await
        .map_err(|err| {
            error!(note_id = %note_id, error = ?err, "failed to store original file");
            TransitionError::Dependency(err)
        })?;

    let report = match report {
        Some(report) => {
            match storage::store_note_file(state.storage.as_ref(), note_id, FileSlot::Report, report)
                .await
            {
                Ok(blob) => Some(blob),
                Err(err) => {
                    error!(note_id = %note_id, error = ?err, "failed to store report file");
                    storage::discard_blobs(state.storage.as_ref(), [original.key.clone()]).await;
                    return Err(TransitionError::Dependency(err));
                }
            }
        }
        None => None,
    };

    let mut uploaded = vec![original.key.clone()];
    uploaded.extend(report.as_ref().map(|blob| blob.key.clone()));

    let new_note = NewNote {
        id: note_id,
        created_by: user.user_id,
        coordinator_name,
        coordinator_email,
        cc_emails,
        note_type: note_type.as_str().to_string(),
        description,
        amount_cents,
        note_number,
        project_account_number,
        issued_at,
        provider_name,
        provider_document,
        client_name,
        client_document,
        original_file_key: original.key,
        original_file_name: original.filename,
        original_file_mime: original.mime,
        original_file_checksum: original.checksum,
        report_file_key: report.as_ref().map(|blob| blob.key.clone()),
        report_file_name: report.map(|blob| blob.filename),
        status: NoteStatus::Pendente.as_str().to_string(),
        attestation_deadline: lifecycle::compute_deadline(issued_at, &lifecycle_settings),
    };

    let created = match state.db() {
        Ok(mut conn) => lifecycle::create_note(&mut conn, new_note, &HistoryAuthor::user(&user)),
        Err(err) => Err(err.into()),
    };
    let note = match created {
        Ok(note) => note,
        Err(err) => {
            storage::discard_blobs(state.storage.as_ref(), uploaded).await;
            return Err(err);
        }
    };

    info!(note_id = %note.id, note_number = %note.note_number, user_id = %user.user_id, "note created");
    queue_attestation_request(&state, &note);

    Ok((
        StatusCode::CREATED,
        Json(ActionResult::ok("note submitted for attestation").with_note(note.id)),
    ))
}

pub async fn extract_fields(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    multipart: Multipart,
) -> TransitionResult<Json<ExtractedFields>> {
    let file = forms::read_single_file(multipart)
        .await?
        .ok_or_else(|| ValidationErrors::single("file", "file is required"))?;
    check_attachment(file.bytes.len(), &file.mime, NOTE_ATTACHMENT_MIME_TYPES)
        .map_err(|err| ValidationErrors::single("file", err))?;

    match state.extractor.extract(&file).await {
        Ok(fields) => Ok(Json(fields)),
        Err(err) => {
            warn!(filename = %file.filename, error = ?err, "field extraction failed; returning empty suggestion");
            Ok(Json(ExtractedFields::default()))
        }
    }
}

pub async fn get_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> AppResult<Json<NoteResponse>> {
    let note = load_visible_note(&state, &user, note_id)?;
    Ok(Json(to_note_response(note, Utc::now().naive_utc())))
}

pub async fn update_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
    Json(payload): Json<Value>,
) -> TransitionResult<ActionResponse> {
    let note = load_note(&state, note_id)?;
    if !access::can_edit(&user, &note) {
        return Err(TransitionError::forbidden());
    }
    let changes = parse_note_changes(&payload, &note.coordinator_email, &note.cc_emails)?;

    let updated = {
        let mut conn = state.db()?;
        lifecycle::edit_note(&mut conn, note_id, changes, &HistoryAuthor::user(&user))?
    };
    info!(note_id = %note_id, user_id = %user.user_id, "note edited");

    if updated.coordinator_email != note.coordinator_email {
        queue_attestation_request(&state, &updated);
    }

    Ok((
        StatusCode::OK,
        Json(ActionResult::ok("note updated").with_note(note_id)),
    ))
}

pub async fn note_history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> AppResult<Json<Vec<HistoryResponse>>> {
    load_visible_note(&state, &user, note_id)?;
    let mut conn = state.db()?;
    let rows = lifecycle::load_history(&mut conn, note_id)?;
    Ok(Json(rows.into_iter().map(HistoryResponse::from).collect()))
}

pub(crate) async fn presign_note_file(
    state: &AppState,
    note: &Note,
    slot: FileSlot,
) -> AppResult<FileLinkResponse> {
    let (key, filename) = match slot {
        FileSlot::Original => (
            Some(note.original_file_key.clone()),
            Some(note.original_file_name.clone()),
        ),
        FileSlot::Report => (note.report_file_key.clone(), note.report_file_name.clone()),
        FileSlot::Attested => (
            note.attested_file_key.clone(),
            note.attested_file_name.clone(),
        ),
    };
    let (Some(key), Some(filename)) = (key, filename) else {
        return Err(AppError::not_found());
    };

    let url = state
        .storage
        .presign_get_object(&key, Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS))
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))?;

    Ok(FileLinkResponse {
        url,
        filename,
        expires_in: PRESIGNED_URL_EXPIRY_SECONDS,
    })
}

pub async fn download_note_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((note_id, kind)): Path<(Uuid, String)>,
) -> AppResult<Json<FileLinkResponse>> {
    let slot = kind.parse::<FileSlot>().map_err(AppError::bad_request)?;
    let note = load_visible_note(&state, &user, note_id)?;
    Ok(Json(presign_note_file(&state, &note, slot).await?))
}

pub async fn mint_attestation_link(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
    Query(params): Query<LinkParams>,
) -> TransitionResult<Json<AttestationLinkResponse>> {
    let note = load_note(&state, note_id)?;
    if !access::can_mint_link(&user, &note) {
        return Err(TransitionError::forbidden());
    }
    lifecycle::ensure_pending(&note)?;

    let link = state.attestation_link(note_id)?;
    if params.resend {
        notifications::notify(&state, note_id, TemplateKind::AttestationRequest, |conn| {
            notifications::attestation_request(conn, &note, &link)
        });
    }
    info!(note_id = %note_id, user_id = %user.user_id, resent = params.resend, "attestation link minted");

    Ok(Json(AttestationLinkResponse {
        note_id,
        link,
        resent: params.resend,
    }))
}

/// Uploads the attested document, then records the attestation. The blob is removed
/// again when the note turns out to be no longer pending.
pub(crate) async fn complete_attestation(
    state: &AppState,
    note_id: Uuid,
    attestation: ValidatedAttestation,
    attested_by_name: String,
    attested_by_id: Option<Uuid>,
    author: HistoryAuthor,
) -> TransitionResult<Note> {
    let blob = storage::store_note_file(
        state.storage.as_ref(),
        note_id,
        FileSlot::Attested,
        attestation.file,
    )
    .await
    .map_err(|err| {
        error!(note_id = %note_id, error = ?err, "failed to store attested file");
        TransitionError::Dependency(err)
    })?;

    let record = AttestationRecord {
        attested_by_name,
        attested_by_id,
        observation: attestation.observation,
        attested_file_key: blob.key.clone(),
        attested_file_name: blob.filename,
    };
    let attested = match state.db() {
        Ok(mut conn) => lifecycle::attest_note(&mut conn, note_id, record, &author),
        Err(err) => Err(err.into()),
    };
    let note = match attested {
        Ok(note) => note,
        Err(err) => {
            storage::discard_blobs(state.storage.as_ref(), [blob.key]).await;
            return Err(err);
        }
    };

    info!(note_id = %note_id, attested_by = ?note.attested_by_name, "note attested");
    notifications::notify(state, note_id, TemplateKind::AttestationConfirmation, |conn| {
        notifications::attestation_confirmation(conn, &note)
    });
    Ok(note)
}

pub async fn attest_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
    multipart: Multipart,
) -> TransitionResult<ActionResponse> {
    let note = load_note(&state, note_id)?;
    if !access::can_attest(&user, &note) {
        return Err(TransitionError::forbidden());
    }
    lifecycle::ensure_pending(&note)?;

    let attestation = forms::read_attest_form(multipart)
        .await?
        .validate(NOTE_ATTACHMENT_MIME_TYPES, false)?;
    let attested_by_name = attestation
        .attester_name
        .clone()
        .unwrap_or_else(|| user.name.clone());

    complete_attestation(
        &state,
        note_id,
        attestation,
        attested_by_name,
        Some(user.user_id),
        HistoryAuthor::user(&user),
    )
    .await?;

    Ok((
        StatusCode::OK,
        Json(ActionResult::ok("note attested").with_note(note_id)),
    ))
}

pub async fn revert_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> TransitionResult<ActionResponse> {
    if !access::can_revert(&user) {
        return Err(TransitionError::forbidden());
    }
    let (_, released) = {
        let mut conn = state.db()?;
        lifecycle::revert_note(&mut conn, note_id, &HistoryAuthor::user(&user))?
    };
    storage::discard_blobs(state.storage.as_ref(), released).await;
    info!(note_id = %note_id, user_id = %user.user_id, "attestation reverted");

    Ok((
        StatusCode::OK,
        Json(ActionResult::ok("attestation reverted").with_note(note_id)),
    ))
}

pub async fn trash_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> TransitionResult<ActionResponse> {
    let note = load_note(&state, note_id)?;
    if !access::can_soft_delete(&user, &note) {
        return Err(TransitionError::forbidden());
    }
    {
        let mut conn = state.db()?;
        lifecycle::soft_delete_note(&mut conn, note_id, &HistoryAuthor::user(&user))?;
    }
    info!(note_id = %note_id, user_id = %user.user_id, "note moved to trash");

    Ok((
        StatusCode::OK,
        Json(ActionResult::ok("note moved to the trash").with_note(note_id)),
    ))
}

pub async fn restore_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> TransitionResult<ActionResponse> {
    if !access::can_manage_trash(&user) {
        return Err(TransitionError::forbidden());
    }
    {
        let mut conn = state.db()?;
        lifecycle::restore_note(&mut conn, note_id, &HistoryAuthor::user(&user))?;
    }
    info!(note_id = %note_id, user_id = %user.user_id, "note restored");

    Ok((
        StatusCode::OK,
        Json(ActionResult::ok("note restored").with_note(note_id)),
    ))
}

pub async fn purge_note(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(note_id): Path<Uuid>,
) -> TransitionResult<ActionResponse> {
    let note = load_note(&state, note_id)?;
    if !access::can_purge(&user, &note) {
        return Err(TransitionError::forbidden());
    }
    let removed = {
        let mut conn = state.db()?;
        lifecycle::purge_note(&mut conn, note_id)?
    };

    let keys = std::iter::once(removed.original_file_key)
        .chain(removed.report_file_key)
        .chain(removed.attested_file_key);
    storage::discard_blobs(state.storage.as_ref(), keys).await;
    info!(note_id = %note_id, user_id = %user.user_id, "note permanently deleted");

    Ok((
        StatusCode::OK,
        Json(ActionResult::ok("note permanently deleted").with_note(note_id)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::tests::sample_note;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn response_exposes_derived_status_and_amount() {
        let note = sample_note();
        let late = note.attestation_deadline + chrono::Duration::hours(1);
        let response = to_note_response(note, late);
        assert_eq!(response.status, "PENDENTE");
        assert_eq!(response.display_status, DisplayStatus::Expirada);
        assert_eq!(response.amount, "R$ 1.234,56");
        assert!(response.files.attested.is_none());
    }
}
