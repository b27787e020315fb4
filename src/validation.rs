use thiserror::Error;

use crate::config::AppConfig;
use crate::models::DocumentType;
use crate::utils::format::format_file_size;

const MAX_NAME_CHARS: usize = 255;

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_file_bytes: usize,
    pub max_files: usize,
}

impl UploadLimits {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_file_bytes: config.max_upload_bytes,
            max_files: config.max_files_per_upload,
        }
    }

    /// Request body ceiling for a full batch, with headroom for multipart framing.
    pub fn request_body_limit(&self) -> usize {
        self.max_file_bytes
            .saturating_mul(self.max_files)
            .saturating_add(1024 * 1024)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadRejection {
    #[error("file name is missing")]
    MissingName,
    #[error("file name must be at most 255 characters")]
    NameTooLong,
    #[error("file is empty")]
    Empty,
    #[error("file is too large ({size}); the limit is {limit}")]
    TooLarge { size: String, limit: String },
    #[error("unsupported file type; only PDF and TXT files are accepted")]
    UnsupportedType,
    #[error("too many files in one upload; at most {0} are accepted")]
    TooManyFiles(usize),
}

/// Checks a single uploaded file and classifies it. A missing content type is
/// guessed from the file name.
pub fn validate_upload(
    file_name: &str,
    content_type: Option<&str>,
    size: usize,
    limits: &UploadLimits,
) -> Result<DocumentType, UploadRejection> {
    let file_name = file_name.trim();
    if file_name.is_empty() {
        return Err(UploadRejection::MissingName);
    }
    if file_name.chars().count() > MAX_NAME_CHARS {
        return Err(UploadRejection::NameTooLong);
    }
    if size == 0 {
        return Err(UploadRejection::Empty);
    }
    if size > limits.max_file_bytes {
        let limit = limits.max_file_bytes;
        let mut size_label = format_file_size(size as u64);
        let mut limit_label = format_file_size(limit as u64);
        if size_label == limit_label {
            size_label = format!("{size} bytes");
            limit_label = format!("{limit} bytes");
        }
        return Err(UploadRejection::TooLarge {
            size: size_label,
            limit: limit_label,
        });
    }

    let guessed = mime_guess::from_path(file_name).first_raw();
    let declared = content_type
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or(guessed);

    DocumentType::detect(declared, file_name).ok_or(UploadRejection::UnsupportedType)
}
