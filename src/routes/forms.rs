//! Reads multipart bodies into the typed forms of `crate::validation`.

use axum::extract::{multipart::Field, Multipart};
use tracing::error;

use crate::{
    lifecycle::outcome::TransitionError,
    validation::{resolve_mime, AttestForm, CreateNoteForm, UploadedFile, ValidationErrors},
};

fn malformed(err: impl std::fmt::Display) -> TransitionError {
    error!(error = %err, "invalid multipart data");
    TransitionError::Validation(ValidationErrors::single(
        "request",
        format!("invalid multipart data: {err}"),
    ))
}

async fn read_file(field: Field<'_>) -> Result<UploadedFile, TransitionError> {
    let filename = field.file_name().unwrap_or_default().to_string();
    let declared = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(malformed)?;
    Ok(UploadedFile {
        mime: resolve_mime(declared.as_deref(), &filename),
        filename,
        bytes: bytes.to_vec(),
    })
}

async fn read_text(field: Field<'_>) -> Result<String, TransitionError> {
    field.text().await.map_err(malformed)
}

pub async fn read_create_form(mut multipart: Multipart) -> Result<CreateNoteForm, TransitionError> {
    let mut form = CreateNoteForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = Some(read_file(field).await?),
            "report" => {
                let report = read_file(field).await?;
                // Browsers send an empty part when the optional input is left blank.
                if !report.bytes.is_empty() || !report.filename.is_empty() {
                    form.report = Some(report);
                }
            }
            _ => {
                let value = read_text(field).await?;
                form.set_text(&name, value);
            }
        }
    }
    Ok(form)
}

pub async fn read_attest_form(mut multipart: Multipart) -> Result<AttestForm, TransitionError> {
    let mut form = AttestForm::default();
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => form.file = Some(read_file(field).await?),
            "attester_name" => form.attester_name = Some(read_text(field).await?),
            "observation" => form.observation = Some(read_text(field).await?),
            _ => {}
        }
    }
    Ok(form)
}

pub async fn read_single_file(
    mut multipart: Multipart,
) -> Result<Option<UploadedFile>, TransitionError> {
    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        if field.name() == Some("file") {
            return Ok(Some(read_file(field).await?));
        }
    }
    Ok(None)
}
