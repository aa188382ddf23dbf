#![allow(dead_code)]

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use ateste::auth::jwt::JwtService;
use ateste::auth::password::hash_password;
use ateste::config::AppConfig;
use ateste::db::{self, PgPool};
use ateste::extraction::DisabledExtractor;
use ateste::mailer::{EmailMessage, EmailSender, ResolvedAttachment};
use ateste::models::{Job, NewUser, Note};
use ateste::routes;
use ateste::schema::{jobs, note_history, notes, users};
use ateste::state::AppState;
use ateste::storage::ObjectStorage;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::MigrationHarness;
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub const PASSWORD: &str = "correct-horse-battery";
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj <<>> endobj\ntrailer <<>>\n%%EOF";

#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            content_disposition,
        };
        self.objects.lock().await.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}",
            expires_in.as_secs()
        ))
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .lock()
            .await
            .get(key)
            .map(|obj| obj.bytes.clone())
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }
}

/// Keeps every delivered message so tests can inspect recipients and attachments.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(EmailMessage, Option<String>)>>,
}

#[async_trait]
impl EmailSender for RecordingMailer {
    async fn send(
        &self,
        message: &EmailMessage,
        attachment: Option<ResolvedAttachment>,
    ) -> Result<()> {
        self.sent
            .lock()
            .await
            .push((message.clone(), attachment.map(|file| file.filename)));
        Ok(())
    }
}

impl RecordingMailer {
    pub async fn sent(&self) -> Vec<(EmailMessage, Option<String>)> {
        self.sent.lock().await.clone()
    }
}

/// A multipart form part.
pub enum Part<'a> {
    Text(&'a str, String),
    File {
        name: &'a str,
        filename: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
}

pub fn text<'a>(name: &'a str, value: impl Into<String>) -> Part<'a> {
    Part::Text(name, value.into())
}

pub fn pdf<'a>(name: &'a str, filename: &'a str) -> Part<'a> {
    Part::File {
        name,
        filename,
        content_type: "application/pdf",
        bytes: PDF_BYTES,
    }
}

/// A complete creation form; callers push overrides or extra parts.
pub fn note_form<'a>(note_number: &str, account: &str, coordinator_email: &str) -> Vec<Part<'a>> {
    vec![
        text("note_type", "SERVICE"),
        text("description", "Consultoria de software"),
        text("amount", "1.234,56"),
        text("note_number", note_number),
        text("project_account_number", account),
        text("issued_at", Utc::now().date_naive().format("%d/%m/%Y").to_string()),
        text("provider_name", "ACME Serviços Ltda"),
        text("provider_document", "12.345.678/0001-90"),
        text("coordinator_name", "Carla Coordenadora"),
        text("coordinator_email", coordinator_email),
        text("cc_emails", "financeiro@example.org"),
        pdf("file", "nota.pdf"),
    ]
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    mailer: Arc<RecordingMailer>,
}

impl TestApp {
    /// Returns `None` when `TEST_DATABASE_URL` is unset so the suite can run without Postgres.
    pub async fn try_new() -> Result<Option<Self>> {
        let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
            eprintln!("TEST_DATABASE_URL not set; skipping integration test");
            return Ok(None);
        };

        let config = AppConfig {
            database_url,
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            public_base_url: "http://ateste.test".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            attestation_token_audience: "test-attestation".to_string(),
            attestation_token_expiry_days: 30,
            refresh_token_expiry_days: 30,
            refresh_cookie_secure: false,
            refresh_cookie_domain: None,
            cors_allowed_origin: None,
            aws_endpoint_url: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_region: "us-east-1".to_string(),
            s3_bucket: "test-bucket".to_string(),
            mail_api_url: None,
            mail_api_key: None,
            mail_from: "ateste@example.org".to_string(),
            extraction_endpoint: None,
            extraction_api_key: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let mailer = Arc::new(RecordingMailer::default());
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            pool,
            config,
            storage.clone(),
            mailer.clone(),
            Arc::new(DisabledExtractor),
            jwt,
        );
        let router = routes::create_router(state.clone());

        Ok(Some(Self {
            state,
            router,
            storage,
            mailer,
        }))
    }

    pub async fn cleanup(&self) -> Result<()> {
        self.with_conn(truncate_all).await
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn mailer(&self) -> Arc<RecordingMailer> {
        self.mailer.clone()
    }

    pub async fn insert_user(&self, name: &str, email: &str, role: &str) -> Result<Uuid> {
        let user = NewUser {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: hash_password(PASSWORD)?,
            role: role.to_string(),
        };
        self.with_conn(move |conn| {
            diesel::insert_into(users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    pub async fn login_token(&self, email: &str) -> Result<String> {
        #[derive(Serialize)]
        struct LoginPayload<'a> {
            email: &'a str,
            password: &'a str,
        }

        let response = self
            .post_json(
                "/api/auth/login",
                &LoginPayload {
                    email,
                    password: PASSWORD,
                },
                None,
            )
            .await?;
        ensure!(
            response.status() == StatusCode::OK,
            "login failed with status {}",
            response.status()
        );
        let body = read_json(response).await?;
        body["access_token"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("login response without access_token"))
    }

    /// Creates a user and returns an access token for them.
    pub async fn user_with_token(&self, name: &str, email: &str, role: &str) -> Result<(Uuid, String)> {
        let id = self.insert_user(name, email, role).await?;
        let token = self.login_token(email).await?;
        Ok((id, token))
    }

    /// Submits a note and returns its id; fails unless the server answers 201.
    pub async fn create_note(
        &self,
        token: &str,
        note_number: &str,
        account: &str,
        coordinator_email: &str,
    ) -> Result<Uuid> {
        let response = self
            .post_multipart(
                "/api/notes",
                note_form(note_number, account, coordinator_email),
                Some(token),
            )
            .await?;
        let status = response.status();
        let body = read_json(response).await?;
        ensure!(
            status == StatusCode::CREATED,
            "note creation failed with {status}: {body}"
        );
        note_id_of(&body)
    }

    pub fn attestation_token(&self, note_id: Uuid) -> Result<String> {
        self.state.jwt.generate_attestation_token(note_id)
    }

    pub async fn note(&self, note_id: Uuid) -> Result<Note> {
        self.with_conn(move |conn| {
            notes::table
                .find(note_id)
                .first::<Note>(conn)
                .context("failed to load note")
        })
        .await
    }

    pub async fn note_exists(&self, note_id: Uuid) -> Result<bool> {
        self.with_conn(move |conn| {
            let found = notes::table
                .find(note_id)
                .select(notes::id)
                .first::<Uuid>(conn)
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    pub async fn history_events(&self, note_id: Uuid) -> Result<Vec<String>> {
        self.with_conn(move |conn| {
            note_history::table
                .filter(note_history::note_id.eq(note_id))
                .order((note_history::created_at.asc(), note_history::id.asc()))
                .select(note_history::event_type)
                .load::<String>(conn)
                .context("failed to load history")
        })
        .await
    }

    pub async fn jobs_by_type(&self, ty: &str) -> Result<Vec<Job>> {
        let ty = ty.to_string();
        self.with_conn(move |conn| {
            jobs::table
                .filter(jobs::job_type.eq(&ty))
                .order(jobs::created_at.asc())
                .load::<Job>(conn)
                .context("failed to load jobs")
        })
        .await
    }

    pub async fn clear_jobs(&self) -> Result<()> {
        self.with_conn(|conn| {
            diesel::delete(jobs::table)
                .execute(conn)
                .context("failed to clear jobs")?;
            Ok(())
        })
        .await
    }

    async fn send(&self, request: Request<Body>) -> Result<hyper::Response<Body>> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .map_err(|err| anyhow!("router failed: {err}"))
    }

    fn builder(method: Method, path: &str, token: Option<&str>) -> axum::http::request::Builder {
        let builder = Request::builder().method(method).uri(path);
        match token {
            Some(token) => builder.header("authorization", format!("Bearer {token}")),
            None => builder,
        }
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let request = Self::builder(Method::GET, path, token).body(Body::empty())?;
        self.send(request).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let request = Self::builder(Method::DELETE, path, token).body(Body::empty())?;
        self.send(request).await
    }

    pub async fn post_empty(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let request = Self::builder(Method::POST, path, token).body(Body::empty())?;
        self.send(request).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let request = Self::builder(Method::POST, path, token)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(payload)?))?;
        self.send(request).await
    }

    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let request = Self::builder(Method::PATCH, path, token)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(payload)?))?;
        self.send(request).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let request = Self::builder(Method::PUT, path, token)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(payload)?))?;
        self.send(request).await
    }

    pub async fn post_multipart(
        &self,
        path: &str,
        parts: Vec<Part<'_>>,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        for part in parts {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend(value.as_bytes());
                }
                Part::File {
                    name,
                    filename,
                    content_type,
                    bytes,
                } => {
                    body.extend(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
                    body.extend(bytes);
                }
            }
            body.extend(b"\r\n");
        }
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Self::builder(Method::POST, path, token)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))?;
        self.send(request).await
    }

    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json(response: hyper::Response<Body>) -> Result<Value> {
    let bytes = body_to_vec(response.into_body()).await?;
    if bytes.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).context("response body is not JSON")
}

pub fn note_id_of(body: &Value) -> Result<Uuid> {
    let raw = body["note_id"]
        .as_str()
        .ok_or_else(|| anyhow!("response without note_id: {body}"))?;
    Ok(raw.parse()?)
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(db::MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute(
        "TRUNCATE TABLE note_history, notes, jobs, email_templates, refresh_tokens, users CASCADE;
         UPDATE settings SET deadline_days = 30, reminder_frequency_days = 7 WHERE id = 1;",
    )
    .context("failed to truncate tables")?;
    Ok(())
}
