use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    extraction::FieldExtractor,
    mailer::EmailSender,
    settings::{self, LifecycleSettings},
    storage::ObjectStorage,
};

pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Shared by the HTTP handlers and the worker.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn ObjectStorage>,
    pub mailer: Arc<dyn EmailSender>,
    pub extractor: Arc<dyn FieldExtractor>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn ObjectStorage>,
        mailer: Arc<dyn EmailSender>,
        extractor: Arc<dyn FieldExtractor>,
        jwt: JwtService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            mailer,
            extractor,
            jwt,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }

    pub fn lifecycle_settings(&self, conn: &mut PgConnection) -> AppResult<LifecycleSettings> {
        Ok(settings::load(conn)?)
    }

    /// Mints a token for the note and turns it into the public page URL.
    pub fn attestation_link(&self, note_id: uuid::Uuid) -> AppResult<String> {
        let token = self.jwt.generate_attestation_token(note_id)?;
        Ok(self.config.attestation_link(&token))
    }
}
