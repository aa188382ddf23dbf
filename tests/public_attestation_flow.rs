mod common;

use anyhow::Result;
use ateste::jobs::JOB_SEND_EMAIL;
use axum::http::StatusCode;
use common::{acquire_db_lock, pdf, read_json, text, Part, TestApp};
use serde_json::json;

#[tokio::test]
async fn coordinator_attests_through_the_link_once() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let (_, requester) = app
        .user_with_token("Rita", "rita@example.org", "USER")
        .await?;
    let note_id = app
        .create_note(&requester, "NF-10", "PRJ-10", "coord@example.org")
        .await?;
    let token = app.attestation_token(note_id)?;

    let summary = read_json(app.get(&format!("/public/attestation/{token}"), None).await?).await?;
    assert_eq!(summary["id"], note_id.to_string());
    assert_eq!(summary["amount"], "R$ 1.234,56");
    assert_eq!(summary["can_act"], true);

    let file = app
        .get(&format!("/public/attestation/{token}/file"), None)
        .await?;
    assert_eq!(file.status(), StatusCode::OK);

    let path = format!("/public/attestation/{token}/attest");
    let response = app
        .post_multipart(
            &path,
            vec![
                text("attester_name", "Carla Coordenadora"),
                text("observation", "Conferido"),
                pdf("file", "assinado.pdf"),
            ],
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let note = app.note(note_id).await?;
    assert_eq!(note.status, "ATESTADA");
    assert_eq!(note.attested_by_name.as_deref(), Some("Carla Coordenadora"));
    assert!(note.attested_by_id.is_none());

    let again = app
        .post_multipart(
            &path,
            vec![text("attester_name", "Carla"), pdf("file", "assinado.pdf")],
            None,
        )
        .await?;
    assert_eq!(again.status(), StatusCode::CONFLICT);
    assert_eq!(app.history_events(note_id).await?, vec!["CREATED", "ATTESTED"]);

    let summary = read_json(app.get(&format!("/public/attestation/{token}"), None).await?).await?;
    assert_eq!(summary["can_act"], false);
    assert_eq!(summary["status"], "ATESTADA");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn a_token_only_acts_on_its_own_note() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let (_, requester) = app
        .user_with_token("Rita", "rita@example.org", "USER")
        .await?;
    let note_a = app
        .create_note(&requester, "NF-A", "PRJ-1", "coord@example.org")
        .await?;
    let note_b = app
        .create_note(&requester, "NF-B", "PRJ-1", "coord@example.org")
        .await?;
    let token_a = app.attestation_token(note_a)?;

    let response = app
        .post_multipart(
            &format!("/public/attestation/{token_a}/attest"),
            vec![text("attester_name", "Carla"), pdf("file", "assinado.pdf")],
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.note(note_a).await?.status, "ATESTADA");
    assert_eq!(app.note(note_b).await?.status, "PENDENTE");

    // Note B's claims carrying note A's signature.
    let token_b = app.attestation_token(note_b)?;
    let claims_b: Vec<&str> = token_b.split('.').collect();
    let signature_a = token_a.rsplit('.').next().unwrap_or_default();
    let tampered = format!("{}.{}.{}", claims_b[0], claims_b[1], signature_a);
    let response = app
        .get(&format!("/public/attestation/{tampered}"), None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn expired_and_invalid_links_read_differently() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let (_, requester) = app
        .user_with_token("Rita", "rita@example.org", "USER")
        .await?;
    let note_id = app
        .create_note(&requester, "NF-11", "PRJ-11", "coord@example.org")
        .await?;
    let expired = app
        .state
        .jwt
        .generate_attestation_token_with_expiry(note_id, chrono::Duration::seconds(-120))?;

    let response = app
        .get(&format!("/public/attestation/{expired}"), None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let expired_body = read_json(response).await?;

    let response = app
        .get("/public/attestation/not-a-token", None)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let invalid_body = read_json(response).await?;

    assert_eq!(expired_body["message"], "attestation link has expired");
    assert_eq!(invalid_body["message"], "attestation link is invalid");

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn rejection_requires_a_reason_and_notifies_the_requester() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let (_, requester) = app
        .user_with_token("Rita", "rita@example.org", "USER")
        .await?;
    let note_id = app
        .create_note(&requester, "NF-12", "PRJ-12", "coord@example.org")
        .await?;
    app.clear_jobs().await?;
    let token = app.attestation_token(note_id)?;
    let path = format!("/public/attestation/{token}/reject");

    let short = app
        .post_json(&path, &json!({ "name": "Carla", "reason": "curto" }), None)
        .await?;
    assert_eq!(short.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(short).await?;
    assert!(body["errors"]["reason"].is_string());
    assert_eq!(app.note(note_id).await?.status, "PENDENTE");

    let reason = "Valor diverge do contrato";
    let response = app
        .post_json(&path, &json!({ "name": "Carla", "reason": reason }), None)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let note = app.note(note_id).await?;
    assert_eq!(note.status, "REJEITADA");
    assert_eq!(note.observation.as_deref(), Some(reason));
    assert_eq!(app.history_events(note_id).await?, vec!["CREATED", "REJECTED"]);

    let jobs = app.jobs_by_type(JOB_SEND_EMAIL).await?;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].payload["to"], "rita@example.org");
    assert!(jobs[0].payload["html_body"]
        .as_str()
        .unwrap_or_default()
        .contains(reason));

    let attest = app
        .post_multipart(
            &format!("/public/attestation/{token}/attest"),
            vec![text("attester_name", "Carla"), pdf("file", "assinado.pdf")],
            None,
        )
        .await?;
    assert_eq!(attest.status(), StatusCode::CONFLICT);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn public_path_accepts_only_named_pdf_uploads() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let (_, requester) = app
        .user_with_token("Rita", "rita@example.org", "USER")
        .await?;
    let note_id = app
        .create_note(&requester, "NF-13", "PRJ-13", "coord@example.org")
        .await?;
    let token = app.attestation_token(note_id)?;
    let path = format!("/public/attestation/{token}/attest");

    let png = app
        .post_multipart(
            &path,
            vec![
                text("attester_name", "Carla"),
                Part::File {
                    name: "file",
                    filename: "foto.png",
                    content_type: "image/png",
                    bytes: b"\x89PNG\r\n\x1a\n",
                },
            ],
            None,
        )
        .await?;
    assert_eq!(png.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let unnamed = app
        .post_multipart(&path, vec![pdf("file", "assinado.pdf")], None)
        .await?;
    assert_eq!(unnamed.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(unnamed).await?;
    assert!(body["errors"]["attester_name"].is_string());

    assert_eq!(app.note(note_id).await?.status, "PENDENTE");
    assert_eq!(app.storage().object_count().await, 1);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn trashed_notes_are_hidden_from_the_link() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let (_, requester) = app
        .user_with_token("Rita", "rita@example.org", "USER")
        .await?;
    let note_id = app
        .create_note(&requester, "NF-14", "PRJ-14", "coord@example.org")
        .await?;
    let token = app.attestation_token(note_id)?;

    let response = app
        .delete(&format!("/api/notes/{note_id}"), Some(&requester))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.get(&format!("/public/attestation/{token}"), None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn over_long_public_names_are_field_errors() -> Result<()> {
    let _lock = acquire_db_lock().await;
    let Some(app) = TestApp::try_new().await? else {
        return Ok(());
    };

    let (_, requester) = app
        .user_with_token("Rita", "rita@example.org", "USER")
        .await?;
    let note_id = app
        .create_note(&requester, "NF-15", "PRJ-15", "coord@example.org")
        .await?;
    let token = app.attestation_token(note_id)?;

    let response = app
        .post_multipart(
            &format!("/public/attestation/{token}/attest"),
            vec![text("attester_name", "C".repeat(300)), pdf("file", "assinado.pdf")],
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await?;
    assert!(body["errors"]["attester_name"].is_string());

    let response = app
        .post_json(
            &format!("/public/attestation/{token}/reject"),
            &json!({ "name": "C".repeat(300), "reason": "Valor diverge do contrato" }),
            None,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json(response).await?;
    assert!(body["errors"]["name"].is_string());

    assert_eq!(app.note(note_id).await?.status, "PENDENTE");
    assert_eq!(app.storage().object_count().await, 1);
    assert_eq!(app.history_events(note_id).await?, vec!["CREATED"]);

    app.cleanup().await?;
    Ok(())
}
