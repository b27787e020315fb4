use std::time::Duration;

use axum::extract::{Json, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;
use chrono::{NaiveDateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::documents::{find_owned_document, set_summary_status};
use crate::error::{AppError, AppResult};
use crate::export::{export_file_name, render_summary_report};
use crate::jobs::{enqueue_summarize_document, has_open_summarize_job};
use crate::models::{Document, DocumentType, NewDocument, SummaryStatus};
use crate::schema::documents;
use crate::state::AppState;
use crate::storage::object_key_for;
use crate::summarizer::DetailedSummary;
use crate::utils::format::format_file_size;
use crate::validation::{validate_upload, UploadRejection};

const PRESIGNED_URL_EXPIRY_SECONDS: u64 = 300;
const MAX_NAME_CHARS: usize = 255;

pub(crate) fn content_disposition(kind: &str, filename: &str) -> Option<String> {
    if filename.is_empty() {
        return None;
    }

    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' | '\r' | '\n' => '_',
            _ => ch,
        })
        .collect();
    let ascii_fallback: String = sanitized
        .chars()
        .map(|ch| if ch.is_ascii() { ch } else { '_' })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    Some(format!(
        "{kind}; filename=\"{ascii_fallback}\"; filename*=UTF-8''{encoded}"
    ))
}

fn rfc3339(value: NaiveDateTime) -> String {
    value.and_utc().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFilter {
    #[default]
    All,
    Pdf,
    Txt,
    Pending,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListSort {
    #[default]
    Date,
    Name,
    Size,
    Type,
}

#[derive(Deserialize)]
pub struct DocumentListQuery {
    pub search: Option<String>,
    #[serde(default)]
    pub filter: ListFilter,
    #[serde(default)]
    pub sort: ListSort,
}

#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub name: String,
    pub original_name: String,
    pub size: i64,
    pub size_label: String,
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    pub uploaded_at: String,
    pub updated_at: String,
    pub summary_status: SummaryStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_error: Option<String>,
    pub has_content: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<Value>,
    pub url: String,
    pub public_url: String,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        let doc_type = doc.document_type();
        let summary_status = doc.status();
        Self {
            id: doc.id,
            size_label: format_file_size(u64::try_from(doc.size).unwrap_or_default()),
            name: doc.name,
            original_name: doc.original_name,
            size: doc.size,
            doc_type,
            uploaded_at: rfc3339(doc.uploaded_at),
            updated_at: rfc3339(doc.updated_at),
            summary_status,
            summary_error: doc.summary_error,
            has_content: doc.content.is_some(),
            summary: doc.summary,
            url: doc.url,
            public_url: doc.public_url,
        }
    }
}

#[derive(Serialize)]
pub struct RejectedFile {
    pub file_name: String,
    pub reason: String,
}

#[derive(Serialize)]
pub struct UploadBatchResponse {
    pub documents: Vec<DocumentResponse>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Serialize)]
pub struct DocumentDownloadResponse {
    pub url: String,
    pub expires_in: u64,
    pub filename: String,
    pub content_type: String,
    pub size: i64,
}

#[derive(Serialize)]
pub struct DocumentContentResponse {
    pub id: Uuid,
    pub content: String,
}

#[derive(Serialize)]
pub struct QuickSummaryResponse {
    pub id: Uuid,
    pub summary: String,
}

#[derive(Deserialize)]
pub struct UpdateDocumentRequest {
    pub name: Option<String>,
}

fn search_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + 2);
    escaped.push('%');
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

pub async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<DocumentListQuery>,
    user: AuthenticatedUser,
) -> AppResult<Json<Vec<DocumentResponse>>> {
    let mut conn = state.db()?;

    let mut query = documents::table
        .filter(documents::owner_id.eq(user.user_id))
        .into_boxed();

    if let Some(search) = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let pattern = search_pattern(search);
        query = query.filter(
            documents::name
                .ilike(pattern.clone())
                .or(documents::original_name.ilike(pattern)),
        );
    }

    query = match params.filter {
        ListFilter::All => query,
        ListFilter::Pdf => query.filter(documents::type_.eq(DocumentType::Pdf.as_str())),
        ListFilter::Txt => query.filter(documents::type_.eq(DocumentType::Txt.as_str())),
        ListFilter::Pending => {
            query.filter(documents::summary_status.eq(SummaryStatus::Pending.as_str()))
        }
        ListFilter::Processing => {
            query.filter(documents::summary_status.eq(SummaryStatus::Processing.as_str()))
        }
        ListFilter::Completed => {
            query.filter(documents::summary_status.eq(SummaryStatus::Completed.as_str()))
        }
        ListFilter::Error => {
            query.filter(documents::summary_status.eq(SummaryStatus::Error.as_str()))
        }
    };

    query = match params.sort {
        ListSort::Date => query.order(documents::uploaded_at.desc()),
        ListSort::Name => query.order((documents::original_name.asc(), documents::uploaded_at.desc())),
        ListSort::Size => query.order((documents::size.desc(), documents::uploaded_at.desc())),
        ListSort::Type => query.order((documents::type_.asc(), documents::uploaded_at.desc())),
    };

    let docs: Vec<Document> = query.load(&mut conn)?;
    Ok(Json(docs.into_iter().map(DocumentResponse::from).collect()))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentResponse>> {
    let doc = load_owned(&state, user.user_id, document_id)?;
    Ok(Json(doc.into()))
}

pub async fn upload_documents(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<UploadBatchResponse>)> {
    let limits = state.upload_limits();
    let mut created = Vec::new();
    let mut rejected = Vec::new();
    let mut file_fields = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        error!(error = %err, "invalid multipart data");
        AppError::bad_request(format!("invalid multipart data: {err}"))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        file_fields += 1;

        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|mime| mime.to_string());

        if file_fields > limits.max_files {
            rejected.push(RejectedFile {
                file_name,
                reason: UploadRejection::TooManyFiles(limits.max_files).to_string(),
            });
            continue;
        }

        let bytes = field.bytes().await.map_err(|err| {
            error!(error = %err, "failed to read file bytes");
            AppError::bad_request(format!("failed to read file bytes: {err}"))
        })?;

        let doc_type =
            match validate_upload(&file_name, content_type.as_deref(), bytes.len(), &limits) {
                Ok(doc_type) => doc_type,
                Err(rejection) => {
                    warn!(file_name = %file_name, reason = %rejection, "upload rejected");
                    rejected.push(RejectedFile {
                        file_name,
                        reason: rejection.to_string(),
                    });
                    continue;
                }
            };

        match store_upload(&state, user.user_id, file_name.trim(), doc_type, bytes).await
        {
            Ok(document) => {
                info!(
                    document_id = %document.id,
                    original_name = %document.original_name,
                    size = document.size,
                    "document upload succeeded"
                );
                created.push(DocumentResponse::from(document));
            }
            Err(err) => {
                error!(error = %err.message(), file_name = %file_name, "document upload failed");
                rejected.push(RejectedFile {
                    file_name,
                    reason: err.message().to_string(),
                });
            }
        }
    }

    if file_fields == 0 {
        return Err(AppError::bad_request("file field is required"));
    }

    let status = if created.is_empty() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::CREATED
    };

    Ok((
        status,
        Json(UploadBatchResponse {
            documents: created,
            rejected,
        }),
    ))
}

async fn store_upload(
    state: &AppState,
    owner_id: Uuid,
    original_name: &str,
    doc_type: DocumentType,
    bytes: Bytes,
) -> AppResult<Document> {
    let doc_id = Uuid::new_v4();
    let key = object_key_for(owner_id, doc_type);
    let checksum_hex = hex::encode(Sha256::digest(&bytes));
    let size = bytes.len() as i64;

    state
        .storage
        .put_object(
            &key,
            bytes,
            Some(doc_type.mime_type().to_string()),
            content_disposition("inline", original_name),
        )
        .await
        .map_err(|err| {
            error!(error = %err, key = %key, "failed to store document");
            AppError::internal(format!("failed to store document: {err}"))
        })?;

    let new_document = NewDocument {
        id: doc_id,
        owner_id,
        name: original_name.to_string(),
        original_name: original_name.to_string(),
        size,
        doc_type: doc_type.as_str().to_string(),
        summary_status: SummaryStatus::Pending.as_str().to_string(),
        url: format!("/api/documents/{doc_id}/download"),
        public_url: state.storage.public_url(&key),
        file_path: key.clone(),
        checksum: checksum_hex,
    };

    let inserted = state.db().and_then(|mut conn| {
        conn.transaction(|conn| {
            diesel::insert_into(documents::table)
                .values(&new_document)
                .execute(conn)?;
            enqueue_summarize_document(conn, doc_id)?;
            documents::table.find(doc_id).first::<Document>(conn)
        })
        .map_err(AppError::from)
    });

    match inserted {
        Ok(document) => Ok(document),
        Err(err) => {
            if let Err(cleanup_err) = state.storage.delete_object(&key).await {
                warn!(error = %cleanup_err, key = %key, "failed to remove orphaned object");
            }
            Err(err)
        }
    }
}

pub async fn update_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
    Json(payload): Json<UpdateDocumentRequest>,
) -> AppResult<Json<DocumentResponse>> {
    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| AppError::bad_request("no changes provided"))?;
    if name.is_empty() {
        return Err(AppError::bad_request("name must not be empty"));
    }
    if name.chars().count() > MAX_NAME_CHARS {
        return Err(AppError::bad_request("name must be at most 255 characters"));
    }

    let existing = load_owned(&state, user.user_id, document_id)?;
    let mut conn = state.db()?;
    let document: Document = diesel::update(documents::table.find(existing.id))
        .set((
            documents::name.eq(name),
            documents::updated_at.eq(Utc::now().naive_utc()),
        ))
        .get_result(&mut conn)?;

    Ok(Json(document.into()))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let document = load_owned(&state, user.user_id, document_id)?;

    if let Err(err) = state.storage.delete_object(&document.file_path).await {
        warn!(document_id = %document.id, error = %err, "failed to delete stored object");
    }

    let mut conn = state.db()?;
    diesel::delete(documents::table.find(document.id)).execute(&mut conn)?;
    info!(document_id = %document.id, "document deleted");

    Ok(StatusCode::NO_CONTENT)
}

pub async fn download_document(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentDownloadResponse>> {
    let document = load_owned(&state, user.user_id, document_id)?;

    let presigned_url = state
        .storage
        .presign_get_object(
            &document.file_path,
            Duration::from_secs(PRESIGNED_URL_EXPIRY_SECONDS),
        )
        .await
        .map_err(|err| AppError::internal(format!("failed to generate download URL: {err}")))?;

    Ok(Json(DocumentDownloadResponse {
        url: presigned_url,
        expires_in: PRESIGNED_URL_EXPIRY_SECONDS,
        content_type: document.document_type().mime_type().to_string(),
        filename: document.original_name,
        size: document.size,
    }))
}

pub async fn get_document_content(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DocumentContentResponse>> {
    let document = load_owned(&state, user.user_id, document_id)?;
    let content = document
        .content
        .ok_or_else(|| AppError::conflict("document content has not been extracted yet"))?;
    Ok(Json(DocumentContentResponse {
        id: document.id,
        content,
    }))
}

pub async fn get_document_summary(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<DetailedSummary>> {
    let document = load_owned(&state, user.user_id, document_id)?;
    Ok(Json(completed_summary(&document)?))
}

pub async fn export_document_summary(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    let document = load_owned(&state, user.user_id, document_id)?;
    let summary = completed_summary(&document)?;

    let report = render_summary_report(&summary, &document.name, Utc::now());
    let disposition = content_disposition("attachment", &export_file_name(&document.name))
        .ok_or_else(|| AppError::internal("document has no name"))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report,
    ))
}

pub async fn request_summary(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<(StatusCode, Json<DocumentResponse>)> {
    let document = load_owned(&state, user.user_id, document_id)?;

    let mut conn = state.db()?;
    let updated = conn.transaction::<_, AppError, _>(|conn| {
        let open_job = has_open_summarize_job(conn, document.id)?;
        if document.status() == SummaryStatus::Processing {
            if open_job {
                return Err(AppError::conflict("summary is already being generated"));
            }
            warn!(document_id = %document.id, "document stuck in processing without a job, requeueing");
        }
        let updated = set_summary_status(conn, &document, SummaryStatus::Pending, None)?;
        if !open_job {
            enqueue_summarize_document(conn, document.id)?;
        }
        Ok(updated)
    })?;

    info!(document_id = %updated.id, "summary requested");
    Ok((StatusCode::ACCEPTED, Json(updated.into())))
}

pub async fn quick_summary(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
    user: AuthenticatedUser,
) -> AppResult<Json<QuickSummaryResponse>> {
    let document = load_owned(&state, user.user_id, document_id)?;
    let content = document
        .content
        .ok_or_else(|| AppError::conflict("document content has not been extracted yet"))?;

    let summary = state.summarizer.generate_quick_summary(&content).await?;
    Ok(Json(QuickSummaryResponse {
        id: document.id,
        summary,
    }))
}

fn load_owned(state: &AppState, owner_id: Uuid, document_id: Uuid) -> AppResult<Document> {
    let mut conn = state.db()?;
    find_owned_document(&mut conn, owner_id, document_id)?.ok_or_else(AppError::not_found)
}

fn completed_summary(document: &Document) -> AppResult<DetailedSummary> {
    let status = document.status();
    match (&document.summary, status) {
        (Some(summary), SummaryStatus::Completed) => {
            Ok(serde_json::from_value(summary.clone())?)
        }
        _ => Err(AppError::conflict(format!(
            "summary is not available (status: {status})"
        ))),
    }
}
