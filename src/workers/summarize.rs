use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tokio::task;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{JobExecution, JobHandler};
use crate::{
    documents::{find_document, set_summary_status, store_content, store_summary},
    extraction::{extract_text, Extracted, SourceFile},
    jobs::JOB_SUMMARIZE_DOCUMENT,
    models::{Document, DocumentType, Job, SummaryStatus},
    state::AppState,
    summarizer::{DetailedSummary, SummarizeError, SummaryProvider},
};

const RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Summarize(#[from] SummarizeError),
    #[error("extraction task failed: {0}")]
    Join(#[from] task::JoinError),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Summarize(err) => err.is_transient(),
            PipelineError::Join(_) => true,
        }
    }
}

/// Runs text extraction on the blocking pool.
pub async fn extract_upload(
    file_name: String,
    doc_type: DocumentType,
    bytes: Bytes,
    uploaded_at: DateTime<Utc>,
) -> Result<Extracted, PipelineError> {
    let extracted = task::spawn_blocking(move || {
        extract_text(&SourceFile {
            file_name: &file_name,
            doc_type,
            bytes: &bytes,
            uploaded_at,
        })
    })
    .await?;
    Ok(extracted)
}

/// Extracts and summarizes a file without persisting anything.
pub async fn summarize_upload(
    summarizer: &dyn SummaryProvider,
    file_name: &str,
    doc_type: DocumentType,
    bytes: Bytes,
) -> Result<(Extracted, DetailedSummary), PipelineError> {
    let extracted = extract_upload(file_name.to_string(), doc_type, bytes, Utc::now()).await?;
    let mut summary = summarizer
        .generate_detailed_summary(&extracted.text, file_name)
        .await?;
    if summary.page_count.is_none() {
        summary.page_count = extracted.page_count;
    }
    Ok((extracted, summary))
}

#[derive(Debug, Deserialize)]
struct SummarizePayload {
    document_id: Uuid,
}

struct Failure {
    message: String,
    transient: bool,
}

impl Failure {
    fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transient: true,
        }
    }
}

impl From<PipelineError> for Failure {
    fn from(err: PipelineError) -> Self {
        Self {
            transient: err.is_transient(),
            message: err.to_string(),
        }
    }
}

pub struct SummarizeDocumentJob;

impl SummarizeDocumentJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SummarizeDocumentJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for SummarizeDocumentJob {
    fn job_type(&self) -> &'static str {
        JOB_SUMMARIZE_DOCUMENT
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: SummarizePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid summarize payload: {err}"),
                }
            }
        };
        let document_id = payload.document_id;

        let max_attempts = state.config.summarizer.max_attempts;
        let can_retry = job.attempts < max_attempts;

        let begin_state = state.clone();
        let begun = task::spawn_blocking(move || begin_processing(&begin_state, document_id))
            .await
            .unwrap_or_else(|join_err| Err(format!("worker panicked: {join_err}")));
        let document = match begun {
            Ok(Some(document)) => document,
            Ok(None) => return JobExecution::Success,
            Err(err) if can_retry => {
                warn!(job_id = %job.id, %document_id, error = %err, "summarize job will retry");
                return JobExecution::Retry {
                    delay: RETRY_DELAY,
                    error: err,
                };
            }
            Err(err) => {
                error!(job_id = %job.id, %document_id, error = %err, "summarize job out of attempts");
                return abandon(state, document_id, err).await;
            }
        };

        match run_pipeline(&state, &document).await {
            Ok(()) => {
                info!(%document_id, "document summary completed");
                JobExecution::Success
            }
            Err(failure) => settle_failure(state, document_id, failure, can_retry).await,
        }
    }
}

fn begin_processing(state: &AppState, document_id: Uuid) -> Result<Option<Document>, String> {
    let mut conn = state.db().map_err(|err| format!("{err:?}"))?;

    let Some(document) = find_document(&mut conn, document_id).map_err(|err| format!("{err:?}"))?
    else {
        info!(%document_id, "document deleted before summarization, skipping");
        return Ok(None);
    };

    match document.status() {
        SummaryStatus::Pending => set_summary_status(&mut conn, &document, SummaryStatus::Processing, None)
            .map(Some)
            .map_err(|err| err.to_string()),
        SummaryStatus::Processing => Ok(Some(document)),
        status => {
            info!(%document_id, %status, "document is not awaiting a summary, skipping");
            Ok(None)
        }
    }
}

async fn run_pipeline(state: &Arc<AppState>, document: &Document) -> Result<(), Failure> {
    let bytes = state
        .storage
        .get_object(&document.file_path)
        .await
        .map_err(|err| Failure::transient(format!("failed to fetch object: {err}")))?;

    let uploaded_at = DateTime::<Utc>::from_naive_utc_and_offset(document.uploaded_at, Utc);
    let extracted = extract_upload(
        document.original_name.clone(),
        document.document_type(),
        bytes,
        uploaded_at,
    )
    .await?;

    let content_state = state.clone();
    let content_id = document.id;
    let content = extracted.text.clone();
    task::spawn_blocking(move || -> Result<(), String> {
        let mut conn = content_state.db().map_err(|err| format!("{err:?}"))?;
        store_content(&mut conn, content_id, &content)
            .map(|_| ())
            .map_err(|err| format!("{err:?}"))
    })
    .await
    .map_err(|err| Failure::transient(format!("worker panicked: {err}")))?
    .map_err(Failure::transient)?;

    let mut summary = state
        .summarizer
        .generate_detailed_summary(&extracted.text, &document.original_name)
        .await
        .map_err(PipelineError::from)?;
    if summary.page_count.is_none() {
        summary.page_count = extracted.page_count;
    }

    let store_state = state.clone();
    let document_id = document.id;
    task::spawn_blocking(move || -> Result<(), Failure> {
        let mut conn = store_state
            .db()
            .map_err(|err| Failure::transient(format!("{err:?}")))?;
        let Some(current) =
            find_document(&mut conn, document_id).map_err(|err| Failure::transient(format!("{err:?}")))?
        else {
            return Ok(());
        };
        store_summary(&mut conn, &current, &extracted.text, &summary)
            .map(|_| ())
            .map_err(|err| Failure {
                message: err.to_string(),
                transient: false,
            })
    })
    .await
    .map_err(|err| Failure::transient(format!("worker panicked: {err}")))?
}

async fn settle_failure(
    state: Arc<AppState>,
    document_id: Uuid,
    failure: Failure,
    can_retry: bool,
) -> JobExecution {
    let retry = failure.transient && can_retry;
    let message = failure.message;
    let next = if retry {
        SummaryStatus::Pending
    } else {
        SummaryStatus::Error
    };

    match record_status(state, document_id, next, message.clone()).await {
        Ok(false) => {
            info!(%document_id, "document deleted during summarization");
            return JobExecution::Success;
        }
        Ok(true) => {}
        // Still `processing`; the next run resumes it.
        Err(err) if can_retry => {
            error!(%document_id, error = %err, "failed to record summary failure, retrying");
            return JobExecution::Retry {
                delay: RETRY_DELAY,
                error: message,
            };
        }
        Err(err) => {
            error!(%document_id, error = %err, "failed to record summary failure");
        }
    }

    if retry {
        warn!(%document_id, error = %message, "summarization failed, retrying");
        JobExecution::Retry {
            delay: RETRY_DELAY,
            error: message,
        }
    } else {
        error!(%document_id, error = %message, "summarization failed");
        JobExecution::Failed { error: message }
    }
}

/// Gives up on a job that never got as far as running the pipeline.
async fn abandon(state: Arc<AppState>, document_id: Uuid, message: String) -> JobExecution {
    if let Err(err) = record_status(state, document_id, SummaryStatus::Error, message.clone()).await {
        error!(%document_id, error = %err, "failed to record summary failure");
    }
    JobExecution::Failed { error: message }
}

/// Moves an unsettled document to `next`. Returns `false` when the document
/// no longer exists. Documents that are already completed or failed are left
/// alone.
async fn record_status(
    state: Arc<AppState>,
    document_id: Uuid,
    next: SummaryStatus,
    message: String,
) -> Result<bool, String> {
    task::spawn_blocking(move || -> Result<bool, String> {
        let mut conn = state.db().map_err(|err| format!("{err:?}"))?;
        let Some(mut document) =
            find_document(&mut conn, document_id).map_err(|err| format!("{err:?}"))?
        else {
            return Ok(false);
        };

        match document.status() {
            SummaryStatus::Pending | SummaryStatus::Processing => {}
            status => {
                info!(%document_id, %status, "document already settled, leaving status alone");
                return Ok(true);
            }
        }
        if next == SummaryStatus::Error && document.status() == SummaryStatus::Pending {
            document = set_summary_status(&mut conn, &document, SummaryStatus::Processing, None)
                .map_err(|err| err.to_string())?;
        }

        let summary_error = (next == SummaryStatus::Error).then_some(message.as_str());
        set_summary_status(&mut conn, &document, next, summary_error).map_err(|err| err.to_string())?;
        Ok(true)
    })
    .await
    .map_err(|join_err| format!("worker panicked: {join_err}"))?
}
