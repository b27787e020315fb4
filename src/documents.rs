//! Row-level operations on `documents` shared by the HTTP handlers and the
//! summarization worker.
//!
//! Status writes are compare-and-swap on the previously observed status, so a
//! concurrent writer turns into [`DocumentStoreError::Stale`] instead of a
//! silently lost update.

use chrono::Utc;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use thiserror::Error;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Document, StatusTransitionError, SummaryStatus};
use crate::schema::documents;
use crate::summarizer::DetailedSummary;

#[derive(Debug, Error)]
pub enum DocumentStoreError {
    #[error(transparent)]
    Transition(#[from] StatusTransitionError),
    #[error("document {0} was modified concurrently")]
    Stale(Uuid),
    #[error("failed to encode summary: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl From<DocumentStoreError> for AppError {
    fn from(value: DocumentStoreError) -> Self {
        match value {
            DocumentStoreError::Transition(err) => err.into(),
            DocumentStoreError::Stale(_) => AppError::conflict(value.to_string()),
            DocumentStoreError::Encode(err) => err.into(),
            DocumentStoreError::Database(err) => err.into(),
        }
    }
}

pub fn find_document(conn: &mut PgConnection, id: Uuid) -> QueryResult<Option<Document>> {
    documents::table.find(id).first(conn).optional()
}

pub fn find_owned_document(
    conn: &mut PgConnection,
    owner_id: Uuid,
    id: Uuid,
) -> QueryResult<Option<Document>> {
    documents::table
        .filter(documents::id.eq(id))
        .filter(documents::owner_id.eq(owner_id))
        .first(conn)
        .optional()
}

pub fn set_summary_status(
    conn: &mut PgConnection,
    document: &Document,
    next: SummaryStatus,
    summary_error: Option<&str>,
) -> Result<Document, DocumentStoreError> {
    let current = document.status();
    current.transition_to(next)?;

    diesel::update(
        documents::table
            .filter(documents::id.eq(document.id))
            .filter(documents::summary_status.eq(current.as_str())),
    )
    .set((
        documents::summary_status.eq(next.as_str()),
        documents::summary_error.eq(summary_error),
        documents::updated_at.eq(Utc::now().naive_utc()),
    ))
    .get_result::<Document>(conn)
    .optional()?
    .ok_or(DocumentStoreError::Stale(document.id))
}

/// Saves extracted text without touching the summary status.
pub fn store_content(conn: &mut PgConnection, id: Uuid, content: &str) -> QueryResult<usize> {
    diesel::update(documents::table.find(id))
        .set((
            documents::content.eq(Some(content)),
            documents::updated_at.eq(Utc::now().naive_utc()),
        ))
        .execute(conn)
}

/// Persists a finished summary and moves the document to `completed`.
pub fn store_summary(
    conn: &mut PgConnection,
    document: &Document,
    content: &str,
    summary: &DetailedSummary,
) -> Result<Document, DocumentStoreError> {
    let current = document.status();
    current.transition_to(SummaryStatus::Completed)?;
    let encoded = serde_json::to_value(summary)?;

    diesel::update(
        documents::table
            .filter(documents::id.eq(document.id))
            .filter(documents::summary_status.eq(current.as_str())),
    )
    .set((
        documents::content.eq(Some(content)),
        documents::summary.eq(Some(encoded)),
        documents::summary_status.eq(SummaryStatus::Completed.as_str()),
        documents::summary_error.eq(None::<String>),
        documents::updated_at.eq(Utc::now().naive_utc()),
    ))
    .get_result::<Document>(conn)
    .optional()?
    .ok_or(DocumentStoreError::Stale(document.id))
}
