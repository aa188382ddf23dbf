use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use ateste::{
    auth::jwt::JwtService, config::AppConfig, db, default_handlers, extraction, mailer,
    state::AppState, storage::S3Storage, workers::deadlines::ensure_sweep_scheduled, Worker,
};

const WORKER_POOL_SIZE: u32 = 2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "worker",
        database_url = %config.redacted_database_url(),
        pool_size = WORKER_POOL_SIZE,
        mail_api = config.mail_api_url.is_some(),
        s3_bucket = %config.s3_bucket,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, WORKER_POOL_SIZE)?;
    {
        let mut conn = pool.get().context("failed to get database connection")?;
        if ensure_sweep_scheduled(&mut conn)? {
            tracing::info!("queued the first deadline sweep");
        }
    }

    let storage = Arc::new(S3Storage::from_config(&config).await);
    let mailer = mailer::build_mailer(&config);
    let extractor = extraction::build_extractor(&config);
    let jwt = JwtService::from_config(&config)?;

    let state = Arc::new(AppState::new(pool, config, storage, mailer, extractor, jwt));
    let worker = Worker::new(state, default_handlers(), Duration::from_secs(2));

    tokio::select! {
        _ = worker.run() => {}
        _ = signal::ctrl_c() => {
            tracing::info!("worker received shutdown signal");
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
