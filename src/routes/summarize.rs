use axum::extract::{Json, Multipart, State};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{error, info};

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::summarizer::DetailedSummary;
use crate::validation::validate_upload;
use crate::workers::summarize::{summarize_upload, PipelineError};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummarizeResponse {
    pub success: bool,
    pub summary: DetailedSummary,
    pub original_content: String,
}

pub async fn status() -> Json<Value> {
    Json(json!({ "message": "Summarization API is running" }))
}

/// Summarizes a single uploaded file without storing it.
pub async fn summarize_file(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<Json<SummarizeResponse>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("invalid multipart data: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().trim().to_string();
        let content_type = field.content_type().map(|mime| mime.to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|err| AppError::bad_request(format!("failed to read file bytes: {err}")))?;
        upload = Some((file_name, content_type, bytes));
        break;
    }

    let (file_name, content_type, bytes) =
        upload.ok_or_else(|| AppError::bad_request("file field is required"))?;

    let limits = state.upload_limits();
    let doc_type = validate_upload(&file_name, content_type.as_deref(), bytes.len(), &limits)
        .map_err(|rejection| AppError::bad_request(rejection.to_string()))?;

    info!(file_name = %file_name, %doc_type, size = bytes.len(), "summarizing uploaded file");

    let (extracted, summary) =
        summarize_upload(state.summarizer.as_ref(), &file_name, doc_type, bytes)
            .await
            .map_err(|err| match err {
                PipelineError::Summarize(err) => {
                    error!(error = %err, file_name = %file_name, "AI summary generation failed");
                    AppError::from(err)
                }
                PipelineError::Join(err) => AppError::internal(format!("text extraction failed: {err}")),
            })?;

    Ok(Json(SummarizeResponse {
        success: true,
        summary,
        original_content: extracted.text,
    }))
}
