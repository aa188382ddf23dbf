use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use diesel::prelude::*;
use serde_json::json;
use tokio::task;
use tracing::{error, info, warn};

use crate::{
    jobs::{enqueue_job, has_pending_job, JobQueueResult, JOB_SWEEP_DEADLINES},
    lifecycle::{self, NoteStatus},
    models::{Job, Note},
    notifications::{self, TemplateKind},
    schema::notes,
    settings,
    state::AppState,
};

use super::{JobExecution, JobHandler};

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub expired: usize,
    pub reminded: usize,
}

/// Records expirations and sends reminders for every pending note in one pass.
pub fn sweep(state: &AppState, now: NaiveDateTime) -> Result<SweepReport, String> {
    let mut conn = state.db().map_err(|err| err.message().to_string())?;
    let lifecycle_settings = settings::load(&mut conn).map_err(|err| err.to_string())?;

    let pending: Vec<Note> = notes::table
        .filter(notes::status.eq(NoteStatus::Pendente.as_str()))
        .filter(notes::deleted.eq(false))
        .order(notes::attestation_deadline.asc())
        .load(&mut conn)
        .map_err(|err| err.to_string())?;
    drop(conn);

    let mut report = SweepReport {
        scanned: pending.len(),
        ..SweepReport::default()
    };

    for note in pending {
        if lifecycle::is_expired(&note, now) {
            let mut conn = state.db().map_err(|err| err.message().to_string())?;
            match lifecycle::mark_expired(&mut conn, note.id, now) {
                Ok(true) => {
                    drop(conn);
                    report.expired += 1;
                    info!(note_id = %note.id, "attestation deadline passed");
                    notifications::notify(state, note.id, TemplateKind::Expiration, |conn| {
                        notifications::expiration(conn, &note)
                    });
                }
                Ok(false) => {}
                Err(err) => warn!(note_id = %note.id, error = %err, "failed to record expiration"),
            }
            continue;
        }

        if !lifecycle::reminder_due(&note, &lifecycle_settings, now) {
            continue;
        }

        let link = match state.attestation_link(note.id) {
            Ok(link) => link,
            Err(err) => {
                warn!(note_id = %note.id, error = ?err, "failed to mint reminder link");
                continue;
            }
        };
        let mut conn = state.db().map_err(|err| err.message().to_string())?;
        match lifecycle::record_reminder(&mut conn, note.id, now) {
            Ok(true) => {
                drop(conn);
                report.reminded += 1;
                notifications::notify(state, note.id, TemplateKind::Reminder, |conn| {
                    notifications::reminder(conn, &note, &link)
                });
            }
            Ok(false) => {}
            Err(err) => warn!(note_id = %note.id, error = %err, "failed to stamp reminder"),
        }
    }

    Ok(report)
}

pub fn schedule_sweep(
    conn: &mut diesel::PgConnection,
    after: Duration,
) -> JobQueueResult<Job> {
    let run_after = Utc::now().naive_utc()
        + ChronoDuration::from_std(after).unwrap_or_else(|_| ChronoDuration::hours(1));
    enqueue_job(conn, JOB_SWEEP_DEADLINES, json!({}), Some(run_after))
}

/// Queues a sweep unless one is already waiting or running.
pub fn ensure_sweep_scheduled(conn: &mut diesel::PgConnection) -> JobQueueResult<bool> {
    if has_pending_job(conn, JOB_SWEEP_DEADLINES)? {
        return Ok(false);
    }
    schedule_sweep(conn, Duration::ZERO)?;
    Ok(true)
}

pub struct SweepDeadlinesJob {
    interval: Duration,
}

impl SweepDeadlinesJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for SweepDeadlinesJob {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_INTERVAL)
    }
}

#[async_trait]
impl JobHandler for SweepDeadlinesJob {
    fn job_type(&self) -> &'static str {
        JOB_SWEEP_DEADLINES
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let interval = self.interval;
        let result = task::spawn_blocking(move || {
            let report = sweep(&state, Utc::now().naive_utc());
            // The next run is queued even when this one failed.
            let next = state
                .db()
                .map_err(|err| err.message().to_string())
                .and_then(|mut conn| {
                    schedule_sweep(&mut conn, interval).map_err(|err| err.to_string())
                });
            (report, next)
        })
        .await;

        match result {
            Ok((Ok(report), next)) => {
                if let Err(err) = next {
                    error!(job_id = %job.id, error = %err, "failed to schedule next deadline sweep");
                }
                info!(
                    job_id = %job.id,
                    scanned = report.scanned,
                    expired = report.expired,
                    reminded = report.reminded,
                    "deadline sweep finished"
                );
                JobExecution::Success
            }
            Ok((Err(err), next)) => {
                if let Err(next_err) = next {
                    error!(job_id = %job.id, error = %next_err, "failed to schedule next deadline sweep");
                }
                JobExecution::Failed { error: err }
            }
            Err(join_err) => JobExecution::Retry {
                delay: interval,
                error: format!("deadline sweep panicked: {join_err}"),
            },
        }
    }
}
