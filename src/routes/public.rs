//! Unauthenticated endpoints reached through the link e-mailed to coordinators.
//! The token in the path names the note; every action re-checks that the note is
//! still pending.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    lifecycle::{
        self,
        outcome::{ActionResponse, ActionResult, TransitionError, TransitionResult},
        DisplayStatus, HistoryAuthor,
    },
    models::Note,
    notifications::{self, TemplateKind},
    state::AppState,
    storage::FileSlot,
    validation::{format_amount, RejectRequest, PUBLIC_ATTESTED_MIME_TYPES},
};

use super::{
    forms,
    notes::{complete_attestation, load_note, presign_note_file, FileLinkResponse},
};

#[derive(Debug, Serialize)]
pub struct PublicNoteSummary {
    pub id: Uuid,
    pub note_type: String,
    pub description: String,
    pub amount: String,
    pub note_number: String,
    pub project_account_number: String,
    pub issued_at: NaiveDate,
    pub provider_name: String,
    pub provider_document: String,
    pub coordinator_name: String,
    pub status: DisplayStatus,
    pub can_act: bool,
    pub attestation_deadline: NaiveDateTime,
    pub attested_at: Option<NaiveDateTime>,
    pub attested_by_name: Option<String>,
    pub original_file_name: String,
}

fn summarize(note: Note, now: NaiveDateTime) -> PublicNoteSummary {
    let status = lifecycle::display_status(&note, now);
    PublicNoteSummary {
        can_act: lifecycle::ensure_pending(&note).is_ok(),
        id: note.id,
        note_type: note.note_type,
        description: note.description,
        amount: format_amount(note.amount_cents),
        note_number: note.note_number,
        project_account_number: note.project_account_number,
        issued_at: note.issued_at,
        provider_name: note.provider_name,
        provider_document: note.provider_document,
        coordinator_name: note.coordinator_name,
        status,
        attestation_deadline: note.attestation_deadline,
        attested_at: note.attested_at,
        attested_by_name: note.attested_by_name,
        original_file_name: note.original_file_name,
    }
}

/// Resolves the note a token was minted for. Trashed notes are hidden from the link.
fn note_for_token(state: &AppState, token: &str) -> TransitionResult<Note> {
    let claims = state.jwt.verify_attestation_token(token).map_err(|err| {
        warn!(error = %err, "attestation token refused");
        TransitionError::Token(err)
    })?;
    let note = load_note(state, claims.note_id)?;
    if note.deleted {
        return Err(TransitionError::NotFound);
    }
    Ok(note)
}

pub async fn show_attestation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> TransitionResult<Json<PublicNoteSummary>> {
    let note = note_for_token(&state, &token)?;
    Ok(Json(summarize(note, Utc::now().naive_utc())))
}

pub async fn original_file(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> TransitionResult<Json<FileLinkResponse>> {
    let note = note_for_token(&state, &token)?;
    Ok(Json(presign_note_file(&state, &note, FileSlot::Original).await?))
}

pub async fn attest(
    State(state): State<AppState>,
    Path(token): Path<String>,
    multipart: Multipart,
) -> TransitionResult<ActionResponse> {
    let note = note_for_token(&state, &token)?;
    lifecycle::ensure_pending(&note)?;

    let attestation = forms::read_attest_form(multipart)
        .await?
        .validate(PUBLIC_ATTESTED_MIME_TYPES, true)?;
    let Some(name) = attestation.attester_name.clone() else {
        return Err(TransitionError::Validation(
            crate::validation::ValidationErrors::single("attester_name", "name is required"),
        ));
    };
    let author = HistoryAuthor::declared(&name);

    complete_attestation(&state, note.id, attestation, name, None, author).await?;

    Ok((
        StatusCode::OK,
        Json(ActionResult::ok("note attested").with_note(note.id)),
    ))
}

pub async fn reject(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(payload): Json<RejectRequest>,
) -> TransitionResult<ActionResponse> {
    let note = note_for_token(&state, &token)?;
    lifecycle::ensure_pending(&note)?;
    let rejection = payload.validate()?;

    let rejected = {
        let mut conn = state.db()?;
        lifecycle::reject_note(
            &mut conn,
            note.id,
            &rejection.reason,
            &HistoryAuthor::declared(&rejection.name),
        )?
    };
    info!(note_id = %rejected.id, rejected_by = %rejection.name, "note rejected");

    notifications::notify(&state, rejected.id, TemplateKind::Rejection, |conn| {
        notifications::rejection(conn, &rejected, &rejection.name, &rejection.reason)
    });

    Ok((
        StatusCode::OK,
        Json(ActionResult::ok("note rejected").with_note(rejected.id)),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::tests::sample_note;

    #[test]
    fn summary_offers_actions_only_while_pending() {
        let note = sample_note();
        let before = note.attestation_deadline - chrono::Duration::days(1);
        assert!(summarize(note.clone(), before).can_act);

        let mut attested = note;
        attested.status = "ATESTADA".into();
        let summary = summarize(attested, before);
        assert!(!summary.can_act);
        assert_eq!(summary.status, DisplayStatus::Atestada);
    }

    #[test]
    fn expired_notes_can_still_be_acted_on() {
        let note = sample_note();
        let after = note.attestation_deadline + chrono::Duration::days(3);
        let summary = summarize(note, after);
        assert_eq!(summary.status, DisplayStatus::Expirada);
        assert!(summary.can_act);
    }
}
