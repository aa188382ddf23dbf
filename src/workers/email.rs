use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::{
    jobs::{email_retry_delay, JOB_SEND_EMAIL, MAX_EMAIL_ATTEMPTS},
    mailer::{EmailMessage, ResolvedAttachment},
    models::Job,
    state::AppState,
};

use super::{JobExecution, JobHandler};

/// Delivers one queued message through the configured `EmailSender`.
pub struct SendEmailJob;

impl SendEmailJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SendEmailJob {
    fn default() -> Self {
        Self::new()
    }
}

fn retry_or_fail(job: &Job, error: String) -> JobExecution {
    if job.attempts >= MAX_EMAIL_ATTEMPTS {
        JobExecution::Failed {
            error: format!("giving up after {} attempts: {error}", job.attempts),
        }
    } else {
        JobExecution::Retry {
            delay: email_retry_delay(job.attempts),
            error,
        }
    }
}

#[async_trait]
impl JobHandler for SendEmailJob {
    fn job_type(&self) -> &'static str {
        JOB_SEND_EMAIL
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let message: EmailMessage = match serde_json::from_value(job.payload.clone()) {
            Ok(message) => message,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid email payload: {err}"),
                }
            }
        };

        // The attestation may have been reverted since; send without the file then.
        let attachment = match &message.attachment {
            Some(file) => match state.storage.get_object(&file.storage_key).await {
                Ok(bytes) => Some(ResolvedAttachment {
                    filename: file.filename.clone(),
                    bytes,
                }),
                Err(err) => {
                    warn!(job_id = %job.id, key = %file.storage_key, error = %err, "attachment unavailable; sending without it");
                    None
                }
            },
            None => None,
        };

        match state.mailer.send(&message, attachment).await {
            Ok(()) => JobExecution::Success,
            Err(err) => {
                warn!(job_id = %job.id, to = %message.to, error = %err, "email delivery failed");
                retry_or_fail(&job, err.to_string())
            }
        }
    }
}
