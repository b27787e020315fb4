//! Turns uploaded bytes into the text handed to the summarizer.
//!
//! Every result is prefixed with a short metadata header so the model knows
//! what kind of file it is looking at. Extraction never fails: PDFs that
//! PDFium cannot open, or that carry no text layer, still produce a
//! description built from the file name and size.

use chrono::{DateTime, SecondsFormat, Utc};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::models::DocumentType;

const PDF_MAGIC: &[u8] = b"%PDF";
const BYTES_PER_ESTIMATED_PAGE: u64 = 50_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    PlainText,
    PdfText,
    Heuristic,
    /// The bytes were not a PDF at all; only file metadata is described.
    BasicInfo,
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub text: String,
    pub page_count: Option<u32>,
    pub method: ExtractionMethod,
}

pub struct SourceFile<'a> {
    pub file_name: &'a str,
    pub doc_type: DocumentType,
    pub bytes: &'a [u8],
    pub uploaded_at: DateTime<Utc>,
}

impl SourceFile<'_> {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn size_kb(&self) -> String {
        format!("{:.2}", self.size() as f64 / 1024.0)
    }

    fn uploaded(&self) -> String {
        self.uploaded_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Blocking: PDF extraction goes through PDFium, so async callers should run
/// this on `spawn_blocking`.
pub fn extract_text(source: &SourceFile<'_>) -> Extracted {
    match source.doc_type {
        DocumentType::Txt => extract_plain_text(source),
        DocumentType::Pdf => extract_pdf(source),
    }
}

fn extract_plain_text(source: &SourceFile<'_>) -> Extracted {
    let text = String::from_utf8_lossy(source.bytes);

    let body = if text.trim().is_empty() {
        format!(
            "Text file: {}\nFile size: {} KB\nUploaded at: {}\n\n\
             Note: this file is empty or contains no readable text.",
            source.file_name,
            source.size_kb(),
            source.uploaded(),
        )
    } else {
        format!(
            "File name: {}\nFile size: {} KB\nCharacters: {}\nUploaded at: {}\n\n\
             ===== FILE CONTENT =====\n{}",
            source.file_name,
            source.size_kb(),
            text.chars().count(),
            source.uploaded(),
            text.trim(),
        )
    };

    Extracted {
        text: body,
        page_count: None,
        method: ExtractionMethod::PlainText,
    }
}

fn extract_pdf(source: &SourceFile<'_>) -> Extracted {
    if !source.bytes.starts_with(PDF_MAGIC) {
        warn!(file = source.file_name, "missing %PDF header, describing file metadata only");
        return basic_pdf_description(source, "the file does not start with a PDF header");
    }

    match read_pdf_pages(source.bytes) {
        Ok(pdf) if pdf.text.trim().is_empty() => {
            warn!(
                file = source.file_name,
                pages = pdf.pages,
                "pdf has no text layer, describing pdf heuristically"
            );
            heuristic_pdf_description(source)
        }
        Ok(pdf) => {
            debug!(pages = pdf.pages, chars = pdf.text.len(), "pdf text extracted");
            let text = format!(
                "PDF file: {}\nFile size: {} KB\nTotal pages: {}\nCharacters: {}\nUploaded at: {}\n\n\
                 ===== PDF CONTENT =====\n{}",
                source.file_name,
                source.size_kb(),
                pdf.pages,
                pdf.text.chars().count(),
                source.uploaded(),
                pdf.text.trim(),
            );
            Extracted {
                text,
                page_count: Some(pdf.pages),
                method: ExtractionMethod::PdfText,
            }
        }
        Err(err) => {
            warn!(error = %err, file = source.file_name, "pdfium unavailable, describing pdf heuristically");
            heuristic_pdf_description(source)
        }
    }
}

struct PdfText {
    text: String,
    pages: u32,
}

fn bind_pdfium() -> Result<Pdfium, PdfiumError> {
    let bindings = match std::env::var("PDFIUM_LIBRARY_PATH") {
        Ok(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&dir))
            .or_else(|_| Pdfium::bind_to_system_library())?,
        Err(_) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library())?,
    };
    Ok(Pdfium::new(bindings))
}

fn read_pdf_pages(bytes: &[u8]) -> Result<PdfText, String> {
    let pdfium = bind_pdfium().map_err(|err| format!("bind pdfium: {err}"))?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|err| format!("load pdf: {err}"))?;

    let pages = document.pages();
    let mut combined = String::new();
    for page_index in 0..pages.len() {
        let page = pages
            .get(page_index)
            .map_err(|err| format!("load page {page_index}: {err}"))?;
        if let Ok(page_text) = page.text() {
            combined.push_str(&page_text.all());
            combined.push('\n');
        };
    }

    Ok(PdfText {
        text: combined,
        pages: u32::from(pages.len()),
    })
}

pub fn estimated_page_count(size: u64) -> u64 {
    (size / BYTES_PER_ESTIMATED_PAGE).max(1)
}

pub fn complexity_label(size: u64) -> &'static str {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    if size > 5 * MIB {
        "very detailed"
    } else if size > MIB {
        "detailed"
    } else if size > 500 * KIB {
        "standard"
    } else {
        "simple"
    }
}

pub fn guess_document_kind(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    let kinds = [
        (["report", "レポート"], "report"),
        (["manual", "マニュアル"], "manual"),
        (["contract", "契約"], "contract"),
        (["spec", "仕様"], "specification"),
        (["proposal", "提案"], "proposal"),
    ];
    kinds
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| lower.contains(needle)))
        .map(|(_, kind)| *kind)
        .unwrap_or("general document")
}

fn basic_pdf_description(source: &SourceFile<'_>, problem: &str) -> Extracted {
    let text = format!(
        "PDF file: {}\nFile size: {} KB\nUploaded at: {}\n\n\
         Note: an error occurred while processing this PDF file: {}\n\n\
         The summary is generated from this basic information only.",
        source.file_name,
        source.size_kb(),
        source.uploaded(),
        problem,
    );

    Extracted {
        text,
        page_count: None,
        method: ExtractionMethod::BasicInfo,
    }
}

fn heuristic_pdf_description(source: &SourceFile<'_>) -> Extracted {
    let pages = estimated_page_count(source.size());
    let complexity = complexity_label(source.size());
    let kind = guess_document_kind(source.file_name);
    let size_kb = source.size_kb();

    let text = format!(
        "PDF file: {name}\n\
         File size: {size_kb} KB\n\
         Uploaded at: {uploaded}\n\
         Estimated pages: {pages}\n\
         Document complexity: {complexity}\n\
         Estimated document type: {kind}\n\
         \n\
         ===== ANALYSIS =====\n\
         The following characteristics are inferred for this PDF file:\n\
         \n\
         [Structure]\n\
         - About {pages} page(s) of {complexity} content, judging by the file size ({size_kb} KB)\n\
         - Likely structured as a {kind}\n\
         \n\
         [Content]\n\
         - Main theme suggested by the file name \"{name}\"\n\
         - Information laid out the way a typical {kind} is\n\
         - May contain figures or tables given its size\n\
         \n\
         Note: this analysis is inferred from the file name, size and format, \
         not from text extracted from the PDF.",
        name = source.file_name,
        uploaded = source.uploaded(),
    );

    Extracted {
        text,
        page_count: Some(u32::try_from(pages).unwrap_or(u32::MAX)),
        method: ExtractionMethod::Heuristic,
    }
}
