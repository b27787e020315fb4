use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::schema::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = users)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    pub role: String,
}

/// A stored upload. `doc_type` and `summary_status` hold the string forms of
/// [`DocumentType`] and [`SummaryStatus`]; use the accessors to read them typed.
#[derive(Debug, Clone, Queryable, Identifiable, Associations)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(User, foreign_key = owner_id))]
pub struct Document {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub original_name: String,
    pub size: i64,
    pub doc_type: String,
    pub uploaded_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    pub content: Option<String>,
    pub summary: Option<serde_json::Value>,
    pub summary_status: String,
    pub summary_error: Option<String>,
    pub url: String,
    pub public_url: String,
    pub file_path: String,
    pub checksum: String,
}

impl Document {
    pub fn document_type(&self) -> DocumentType {
        self.doc_type.parse().unwrap_or(DocumentType::Txt)
    }

    pub fn status(&self) -> SummaryStatus {
        self.summary_status.parse().unwrap_or(SummaryStatus::Error)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub original_name: String,
    pub size: i64,
    #[diesel(column_name = type_)]
    pub doc_type: String,
    pub summary_status: String,
    pub url: String,
    pub public_url: String,
    pub file_path: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub run_after: NaiveDateTime,
    pub last_error: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub id: Uuid,
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub run_after: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Pdf,
    Txt,
}

impl DocumentType {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Pdf => "pdf",
            DocumentType::Txt => "txt",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            DocumentType::Pdf => "application/pdf",
            DocumentType::Txt => "text/plain",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }

    /// Classifies an upload. A declared content type that is neither PDF nor
    /// plain text is only overridden by a `.pdf`/`.txt` extension when it is a
    /// generic binary type.
    pub fn detect(content_type: Option<&str>, file_name: &str) -> Option<Self> {
        let declared = content_type
            .map(|value| value.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
            .filter(|value| !value.is_empty());

        match declared.as_deref() {
            Some("application/pdf") => return Some(DocumentType::Pdf),
            Some("text/plain") => return Some(DocumentType::Txt),
            Some("application/octet-stream") | None => {}
            Some(_) => return None,
        }

        let extension = file_name.rsplit_once('.').map(|(_, ext)| ext)?;
        if extension.eq_ignore_ascii_case("pdf") {
            Some(DocumentType::Pdf)
        } else if extension.eq_ignore_ascii_case("txt") {
            Some(DocumentType::Txt)
        } else {
            None
        }
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pdf" => Ok(DocumentType::Pdf),
            "txt" => Ok(DocumentType::Txt),
            other => Err(format!("unknown document type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("summary status cannot change from {from} to {to}")]
pub struct StatusTransitionError {
    pub from: SummaryStatus,
    pub to: SummaryStatus,
}

impl SummaryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SummaryStatus::Pending => "pending",
            SummaryStatus::Processing => "processing",
            SummaryStatus::Completed => "completed",
            SummaryStatus::Error => "error",
        }
    }

    pub fn can_transition_to(self, next: SummaryStatus) -> bool {
        use SummaryStatus::*;

        self == next
            || matches!(
                (self, next),
                (Pending, Processing)
                    | (Processing, Completed)
                    | (Processing, Error)
                    | (Processing, Pending)
                    | (Completed, Pending)
                    | (Error, Pending)
            )
    }

    pub fn transition_to(self, next: SummaryStatus) -> Result<SummaryStatus, StatusTransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(StatusTransitionError {
                from: self,
                to: next,
            })
        }
    }
}

impl fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SummaryStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(SummaryStatus::Pending),
            "processing" => Ok(SummaryStatus::Processing),
            "completed" => Ok(SummaryStatus::Completed),
            "error" => Ok(SummaryStatus::Error),
            other => Err(format!("unknown summary status '{other}'")),
        }
    }
}
